//! VoxelMap - raster tile pyramids from voxel worlds
//!
//! Renders a chunked voxel world into a multi-resolution map tile pyramid,
//! persists it in a durable tile store and serves individual tiles through a
//! small hot cache.
//!
//! ```text
//!  ChunkDataSource ──► TileRenderer ──► TileStore (base zoom)
//!  (durable | live)                        │
//!                                          ▼
//!                              PyramidDownsampler (zoom-1 … 0)
//!                                          │
//!                                          ▼
//!                           CachedTileStore ──► MapTileGenerator
//! ```
//!
//! [`export::ExportOrchestrator`] drives a whole export pass. Everything else
//! can be used on its own.

pub mod chunk;
pub mod color;
pub mod config;
pub mod coord;
mod db;
pub mod export;
pub mod logging;
pub mod panic;
pub mod pyramid;
pub mod render;
pub mod store;
pub mod tile;

/// Version of the VoxelMap library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
