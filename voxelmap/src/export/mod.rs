//! Full-pyramid export.
//!
//! [`ExportOrchestrator`] drives one export pass through a fixed sequence of
//! states:
//!
//! ```text
//! Idle ─► Initializing ─► RenderingBaseZoom ─► GeneratingPyramidLevels
//!                                                        │
//!                 Completed ◄── Checkpointing ◄──────────┘
//!                    (or Failed from any running state)
//! ```
//!
//! Base-zoom tiles render in parallel. Pyramid levels are generated one at
//! a time from `base_zoom - 1` down to 0, each fully written before the
//! next starts. The write-ahead log is checkpointed once at the end.
//!
//! Individual tile failures are logged and counted. Tile store failures
//! abort the pass, as does cancelling the token passed to
//! [`ExportOrchestrator::with_cancellation`].

mod orchestrator;
mod progress;
mod state;

pub use orchestrator::{ExportConfig, ExportOrchestrator, ExportSummary};
pub use progress::{ExportProgress, ExportProgressCallback};
pub use state::ExportState;

use thiserror::Error;

use crate::chunk::SourceError;
use crate::coord::CoordError;
use crate::pyramid::PyramidError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("an export is already running")]
    AlreadyRunning,

    #[error("export cancelled")]
    Cancelled,

    #[error("chunk source failed: {0}")]
    Source(#[from] SourceError),

    #[error("tile store failed: {0}")]
    Storage(#[from] StoreError),

    #[error(transparent)]
    Coord(#[from] CoordError),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<PyramidError> for ExportError {
    fn from(err: PyramidError) -> Self {
        match err {
            PyramidError::Store(e) => ExportError::Storage(e),
            PyramidError::Join(msg) => ExportError::Join(msg),
        }
    }
}

impl From<tokio::task::JoinError> for ExportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExportError::Join(err.to_string())
    }
}
