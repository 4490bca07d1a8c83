//! Configuration module for VoxelMap.
//!
//! User settings live in `~/.voxelmap/config.ini`. A missing file means
//! "all defaults"; a present file only needs the keys it wants to override.
//!
//! ```text
//! config.ini ──► parser::parse_ini ──► ConfigFile ──► render_settings()
//!                                                 ├──► export_config()
//!                                                 └──► source_kind
//! ```

mod defaults;
mod file;
mod parser;
mod settings;
mod writer;

pub use defaults::*;
pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, ExportSettings, LoggingSettings, RenderConfigSettings, StoreSettings,
    WorldSettings,
};
