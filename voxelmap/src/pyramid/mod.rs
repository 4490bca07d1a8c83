//! Coarser zoom levels built from finer ones.
//!
//! Tile `(x, y)` at zoom `z` is composed from the four zoom `z + 1` tiles
//! `(2x, 2y)`, `(2x + 1, 2y)`, `(2x, 2y + 1)` and `(2x + 1, 2y + 1)`, each
//! shrunk to half size into its quadrant:
//!
//! ```text
//!   zoom z+1                     zoom z
//! ┌────────┬────────┐         ┌────┬────┐
//! │ 2x,2y  │2x+1,2y │   ──►   │ TL │ TR │
//! ├────────┼────────┤         ├────┼────┤
//! │2x,2y+1 │2x+1,.. │         │ BL │ BR │
//! └────────┴────────┘         └────┴────┘
//! ```
//!
//! Missing quadrants stay transparent. Targets come from the finer level's
//! persisted extent halved with floor division, which can produce edge
//! tiles with little or no backing data; a target with no quadrants at all
//! is not written.

mod downsampler;

pub use downsampler::{compose_quadrants, LevelReport, PyramidDownsampler, TileOutcome};

use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum PyramidError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("background task failed: {0}")]
    Join(String),
}
