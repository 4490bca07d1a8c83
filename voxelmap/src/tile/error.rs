//! Error types for tile serving.
//!
//! Wraps the failures of the layers a tile request passes through: the
//! tile store, the chunk source and the renderer.

use std::fmt;

use crate::chunk::SourceError;
use crate::coord::CoordError;
use crate::store::StoreError;

/// Errors that can occur while serving a tile.
#[derive(Debug)]
pub enum TileGeneratorError {
    /// Zoom level out of range
    InvalidTile(CoordError),
    /// Durable tile store failed
    Store(StoreError),
    /// Chunk data could not be read for an on-demand render
    Source(SourceError),
    /// Internal error (background task failure)
    Internal(String),
}

impl fmt::Display for TileGeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileGeneratorError::InvalidTile(err) => write!(f, "Invalid tile: {}", err),
            TileGeneratorError::Store(err) => write!(f, "Tile store failed: {}", err),
            TileGeneratorError::Source(err) => write!(f, "Chunk source failed: {}", err),
            TileGeneratorError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for TileGeneratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TileGeneratorError::InvalidTile(err) => Some(err),
            TileGeneratorError::Store(err) => Some(err),
            TileGeneratorError::Source(err) => Some(err),
            TileGeneratorError::Internal(_) => None,
        }
    }
}

impl From<CoordError> for TileGeneratorError {
    fn from(err: CoordError) -> Self {
        TileGeneratorError::InvalidTile(err)
    }
}

impl From<StoreError> for TileGeneratorError {
    fn from(err: StoreError) -> Self {
        TileGeneratorError::Store(err)
    }
}

impl From<SourceError> for TileGeneratorError {
    fn from(err: SourceError) -> Self {
        TileGeneratorError::Source(err)
    }
}

impl From<tokio::task::JoinError> for TileGeneratorError {
    fn from(err: tokio::task::JoinError) -> Self {
        TileGeneratorError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_tile_display() {
        let err = TileGeneratorError::from(CoordError::InvalidZoom(42));
        let msg = err.to_string();
        assert!(msg.starts_with("Invalid tile:"));
        assert!(msg.contains("42"));
    }

    #[test]
    fn test_internal_display() {
        let err = TileGeneratorError::Internal("unexpected state".to_string());
        assert_eq!(err.to_string(), "Internal error: unexpected state");
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err = TileGeneratorError::from(SourceError::SimulationUnavailable);
        assert!(err.source().is_some());
        assert!(TileGeneratorError::Internal("x".into()).source().is_none());
    }
}
