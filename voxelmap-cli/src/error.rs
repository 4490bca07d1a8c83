//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::path::PathBuf;
use std::process;

use voxelmap::chunk::SourceError;
use voxelmap::color::ColorTableError;
use voxelmap::config::ConfigFileError;
use voxelmap::coord::TilePos;
use voxelmap::export::ExportError;
use voxelmap::store::StoreError;
use voxelmap::tile::TileGeneratorError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(std::io::Error),
    /// Configuration file error
    Config(ConfigFileError),
    /// Block color table could not be loaded
    Colors { path: PathBuf, error: ColorTableError },
    /// World storage or simulation error
    Source(SourceError),
    /// Tile store error
    Store(StoreError),
    /// Export run failed
    Export(ExportError),
    /// Tile lookup failed
    Tile(TileGeneratorError),
    /// Requested tile does not exist and cannot be rendered
    TileNotFound(TilePos),
    /// Failed to start the simulation thread
    Simulation(std::io::Error),
    /// Failed to write output file
    FileWrite { path: PathBuf, error: std::io::Error },
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Export(ExportError::AlreadyRunning) => {
                eprintln!();
                eprintln!("Another export is using this tile store. Wait for it to finish.");
            }
            CliError::Store(StoreError::Sqlite(_)) | CliError::Source(SourceError::Sqlite(_)) => {
                eprintln!();
                eprintln!("Check the database paths with: voxelmap config path");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(e) => write!(f, "Failed to initialize logging: {}", e),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Colors { path, error } => {
                write!(f, "Failed to load block colors '{}': {}", path.display(), error)
            }
            CliError::Source(e) => write!(f, "World source error: {}", e),
            CliError::Store(e) => write!(f, "Tile store error: {}", e),
            CliError::Export(e) => write!(f, "Export failed: {}", e),
            CliError::Tile(e) => write!(f, "Failed to get tile: {}", e),
            CliError::TileNotFound(tile) => write!(f, "Tile {} not found", tile),
            CliError::Simulation(e) => write!(f, "Failed to start simulation thread: {}", e),
            CliError::FileWrite { path, error } => {
                write!(f, "Failed to write file '{}': {}", path.display(), error)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::LoggingInit(e) => Some(e),
            CliError::Config(e) => Some(e),
            CliError::Colors { error, .. } => Some(error),
            CliError::Source(e) => Some(e),
            CliError::Store(e) => Some(e),
            CliError::Export(e) => Some(e),
            CliError::Tile(e) => Some(e),
            CliError::Simulation(e) => Some(e),
            CliError::FileWrite { error, .. } => Some(error),
            CliError::TileNotFound(_) => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        CliError::Source(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Store(e)
    }
}

impl From<ExportError> for CliError {
    fn from(e: ExportError) -> Self {
        CliError::Export(e)
    }
}

impl From<TileGeneratorError> for CliError {
    fn from(e: TileGeneratorError) -> Self {
        CliError::Tile(e)
    }
}
