//! VoxelMap CLI - Command-line interface
//!
//! Exports voxel worlds to map tile pyramids and maintains the tile store.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use commands::config::ConfigCommands;
use commands::export::ExportArgs;
use commands::store::StoreAction;
use commands::tile::TileArgs;
use error::CliError;
use runner::CliRunner;

#[derive(Parser)]
#[command(name = "voxelmap")]
#[command(version = voxelmap::VERSION)]
#[command(about = "Render voxel worlds into map tile pyramids", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.voxelmap/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render all base-zoom tiles and build the pyramid
    Export(ExportArgs),

    /// Write one tile to a PNG file, rendering it if needed
    Tile(TileArgs),

    /// Tile store maintenance
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Configuration file management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() {
    voxelmap::panic::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        e.exit();
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        Commands::Config { command } => commands::config::run(command),
        Commands::Export(args) => {
            let runner = CliRunner::new(cli.config.as_deref())?;
            commands::export::run(runner, args).await
        }
        Commands::Tile(args) => {
            let runner = CliRunner::new(cli.config.as_deref())?;
            commands::tile::run(runner, args).await
        }
        Commands::Store { action } => {
            let runner = CliRunner::new(cli.config.as_deref())?;
            commands::store::run(runner, action)
        }
    }
}
