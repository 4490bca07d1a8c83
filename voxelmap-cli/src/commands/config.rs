//! Configuration management CLI commands.

use clap::Subcommand;
use voxelmap::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Write a default configuration file if none exists
    Init,
}

/// Run a config subcommand.
pub fn run(command: ConfigCommands) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            let path = config_file_path();
            println!("{}", path.display());
            if !path.exists() {
                println!("(file does not exist, defaults are in use)");
            }
            Ok(())
        }
        ConfigCommands::Init => {
            let path = ConfigFile::ensure_exists()?;
            println!("Configuration file: {}", path.display());
            Ok(())
        }
    }
}
