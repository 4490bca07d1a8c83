//! CLI runner for common setup and operations.
//!
//! Loads configuration, initializes logging and builds the library
//! components every command needs, so the command handlers stay small.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use voxelmap::chunk::{
    ConfiguredSource, DurableChunkSource, LiveChunkSource, SimulationThread, SourceKind,
    SqliteWorldStorage, StorageBackedWorld,
};
use voxelmap::color::{init_block_colors, BlockColorTable};
use voxelmap::config::ConfigFile;
use voxelmap::logging::{init_logging, LoggingGuard};
use voxelmap::render::TileRenderer;
use voxelmap::store::SqliteTileStore;

use crate::error::CliError;

/// How often the simulation thread ticks its resident world.
const SIMULATION_TICK: Duration = Duration::from_millis(50);

/// A configured chunk source, plus the simulation thread backing it when
/// the source is live. The thread stops when this is dropped.
pub struct WorldSource {
    pub source: Arc<ConfiguredSource<SqliteWorldStorage>>,
    _simulation: Option<SimulationThread>,
}

/// Runner that manages CLI lifecycle and common operations.
pub struct CliRunner {
    _logging_guard: LoggingGuard,
    config: ConfigFile,
}

impl CliRunner {
    /// Load config (from `config_path` or the default location) and start
    /// logging.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let logging_guard = init_logging(&config.logging.directory, &config.logging.file)
            .map_err(CliError::LoggingInit)?;

        Ok(Self {
            _logging_guard: logging_guard,
            config,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ConfigFile {
        &mut self.config
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("VoxelMap v{}", voxelmap::VERSION);
        info!("VoxelMap CLI: {} command", command);
    }

    /// Opens the configured tile store.
    pub fn open_tile_store(&self) -> Result<Arc<SqliteTileStore>, CliError> {
        let store = SqliteTileStore::open(&self.config.store.database, self.reader_count())?;
        info!(path = %self.config.store.database.display(), "Tile store opened");
        Ok(Arc::new(store))
    }

    /// Renderer using the configured block colors.
    pub fn renderer(&self) -> Result<TileRenderer, CliError> {
        let table = match &self.config.render.block_colors {
            Some(path) => load_color_table(path)?,
            None => BlockColorTable::builtin(),
        };
        let colors = init_block_colors(table);
        Ok(TileRenderer::new(colors, self.config.render_settings()))
    }

    /// Opens world storage and wraps it in the configured chunk source.
    pub fn open_world(&self) -> Result<WorldSource, CliError> {
        let storage = Arc::new(SqliteWorldStorage::open(
            &self.config.world.database,
            self.reader_count(),
        )?);
        let tile_size = self.config.render.tile_size;

        let world = match self.config.world.source {
            SourceKind::Durable => WorldSource {
                source: Arc::new(ConfiguredSource::Durable(DurableChunkSource::new(
                    storage, tile_size,
                ))),
                _simulation: None,
            },
            SourceKind::Live => {
                let loads_per_tick = self.config.export.residency_batch_size;
                let world_storage = Arc::clone(&storage);
                let simulation = SimulationThread::spawn(
                    move || StorageBackedWorld::new(world_storage, loads_per_tick),
                    SIMULATION_TICK,
                )
                .map_err(CliError::Simulation)?;
                WorldSource {
                    source: Arc::new(ConfiguredSource::Live(LiveChunkSource::new(
                        simulation.handle(),
                        storage,
                        tile_size,
                    ))),
                    _simulation: Some(simulation),
                }
            }
        };

        info!(
            source = self.config.world.source.as_str(),
            path = %self.config.world.database.display(),
            "World opened"
        );
        Ok(world)
    }

    fn reader_count(&self) -> usize {
        self.config.export.parallelism.max(1)
    }
}

fn load_color_table(path: &Path) -> Result<BlockColorTable, CliError> {
    let table = BlockColorTable::load_json(path).map_err(|error| CliError::Colors {
        path: path.to_path_buf(),
        error,
    })?;
    info!(path = %path.display(), blocks = table.len(), "Loaded block color table");
    Ok(table)
}
