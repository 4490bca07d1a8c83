//! Chunk data extraction.
//!
//! The renderer consumes [`TileChunkData`] bundles produced by a
//! [`ChunkDataSource`]. Two sources are provided:
//!
//! | Source                  | Thread            | Coverage                   |
//! |-------------------------|-------------------|----------------------------|
//! | [`DurableChunkSource`]  | any               | every stored chunk         |
//! | [`LiveChunkSource`]     | simulation thread | resident chunks only       |
//!
//! Both enumerate chunk positions from [`WorldStorage`], and
//! [`ConfiguredSource`] picks one at runtime.

pub mod codec;
mod configured;
mod durable;
mod live;
mod snapshot;
mod source;
mod storage;

pub use configured::{ConfiguredSource, SourceKind};
pub use durable::DurableChunkSource;
pub use live::{
    LiveChunkSource, ResidentWorld, SimulationHandle, SimulationThread, StorageBackedWorld,
    DEFAULT_POLL_INTERVAL,
};
pub use snapshot::{
    column_index, voxel_index, BlockEntityPayload, ChunkSnapshot, ChunkSnapshotBuilder, AIR,
};
pub use source::{ChunkDataSource, SourceError, TileChunkData};
pub use storage::{MemoryWorldStorage, SqliteWorldStorage, WorldStorage};
