//! CLI command implementations.
//!
//! # Command Modules
//!
//! - [`config`] - Configuration file location and initialization
//! - [`export`] - Full export: base zoom render plus pyramid
//! - [`store`] - Tile store maintenance (stats, checkpoint, vacuum, extent)
//! - [`tile`] - Fetch or render a single tile to a PNG file

pub mod config;
pub mod export;
pub mod store;
pub mod tile;
