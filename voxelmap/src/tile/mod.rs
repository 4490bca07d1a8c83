//! Tile serving.
//!
//! [`TileGenerator`] is the surface downstream collaborators (an HTTP layer,
//! the CLI) use to fetch tiles. [`MapTileGenerator`] answers from the hot
//! cache, then the durable store, and finally, for base-zoom tiles when a
//! chunk source is configured, by rendering on demand:
//!
//! ```text
//! request ──► hot cache ──hit──► bytes + etag
//!                │ miss
//!                ▼
//!           tile store ──hit──► cache, return
//!                │ miss
//!                ▼
//!        chunk source + renderer ──► store ──► cache, return
//! ```

mod error;
mod generator;

pub use error::TileGeneratorError;
pub use generator::{MapTileGenerator, TileGenerator};
