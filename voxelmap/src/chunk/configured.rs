//! Runtime selection between the durable and live chunk sources.

use std::time::Duration;

use super::{ChunkDataSource, DurableChunkSource, LiveChunkSource, SourceError, TileChunkData, WorldStorage};
use crate::coord::{ChunkPos, TilePos};

/// Which chunk source a run reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKind {
    /// Persisted world storage; complete coverage, any thread.
    #[default]
    Durable,
    /// Resident simulation memory through the simulation thread.
    Live,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Durable => "durable",
            SourceKind::Live => "live",
        }
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "durable" => Ok(SourceKind::Durable),
            "live" => Ok(SourceKind::Live),
            other => Err(format!("unknown chunk source '{}', expected durable or live", other)),
        }
    }
}

/// A chunk source chosen by configuration.
pub enum ConfiguredSource<W> {
    Durable(DurableChunkSource<W>),
    Live(LiveChunkSource<W>),
}

impl<W: WorldStorage> ConfiguredSource<W> {
    pub fn kind(&self) -> SourceKind {
        match self {
            ConfiguredSource::Durable(_) => SourceKind::Durable,
            ConfiguredSource::Live(_) => SourceKind::Live,
        }
    }
}

impl<W: WorldStorage> ChunkDataSource for ConfiguredSource<W> {
    fn name(&self) -> &str {
        match self {
            ConfiguredSource::Durable(s) => s.name(),
            ConfiguredSource::Live(s) => s.name(),
        }
    }

    async fn tile_chunks(&self, tile: TilePos) -> Result<Option<TileChunkData>, SourceError> {
        match self {
            ConfiguredSource::Durable(s) => s.tile_chunks(tile).await,
            ConfiguredSource::Live(s) => s.tile_chunks(tile).await,
        }
    }

    async fn chunk_positions(&self) -> Result<Vec<ChunkPos>, SourceError> {
        match self {
            ConfiguredSource::Durable(s) => s.chunk_positions().await,
            ConfiguredSource::Live(s) => s.chunk_positions().await,
        }
    }

    fn requires_residency(&self) -> bool {
        match self {
            ConfiguredSource::Durable(s) => s.requires_residency(),
            ConfiguredSource::Live(s) => s.requires_residency(),
        }
    }

    async fn load_resident(
        &self,
        chunks: &[ChunkPos],
        timeout: Duration,
    ) -> Result<Vec<ChunkPos>, SourceError> {
        match self {
            ConfiguredSource::Durable(s) => s.load_resident(chunks, timeout).await,
            ConfiguredSource::Live(s) => s.load_resident(chunks, timeout).await,
        }
    }

    async fn unload_resident(&self, chunks: &[ChunkPos]) {
        match self {
            ConfiguredSource::Durable(s) => s.unload_resident(chunks).await,
            ConfiguredSource::Live(s) => s.unload_resident(chunks).await,
        }
    }
}
