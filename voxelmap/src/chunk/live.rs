//! Chunk source over the live, resident simulation state.
//!
//! The resident world may only be touched from the simulation thread. Every
//! read is packaged as a job, sent to that thread over a channel, and the
//! caller awaits the reply on a oneshot:
//!
//! ```text
//! ┌──────────────┐   Job(closure)   ┌───────────────────────┐
//! │ render tasks │ ───────────────► │  simulation thread    │
//! │   (async)    │                  │  owns ResidentWorld   │
//! │              │ ◄─────────────── │  job / tick / job ... │
//! └──────────────┘  oneshot reply   └───────────────────────┘
//! ```

use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use super::{ChunkDataSource, ChunkSnapshot, SourceError, TileChunkData, WorldStorage};
use crate::coord::{ChunkPos, TilePos};
use crate::panic::panic_message;

/// How often residency is re-checked while waiting for a load.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(20);

// =============================================================================
// Resident world
// =============================================================================

/// The simulation's in-memory chunk state.
///
/// Implementations need not be `Send`: the world is created on, and never
/// leaves, the simulation thread.
pub trait ResidentWorld: 'static {
    /// Snapshot of a resident chunk, `None` if it is not in memory.
    fn snapshot(&self, pos: ChunkPos) -> Option<ChunkSnapshot>;

    fn is_resident(&self, pos: ChunkPos) -> bool;

    /// Asks the world to bring a chunk into memory. Loading may complete on
    /// a later tick.
    fn request_load(&mut self, pos: ChunkPos);

    /// Releases a chunk previously requested.
    fn unload(&mut self, pos: ChunkPos);

    /// Advances the world by one update.
    fn tick(&mut self);
}

/// A resident world that streams chunks in from world storage, a few per
/// tick.
pub struct StorageBackedWorld<W> {
    storage: Arc<W>,
    resident: HashMap<ChunkPos, ChunkSnapshot>,
    pending: VecDeque<ChunkPos>,
    loads_per_tick: usize,
}

impl<W: WorldStorage> StorageBackedWorld<W> {
    pub fn new(storage: Arc<W>, loads_per_tick: usize) -> Self {
        Self {
            storage,
            resident: HashMap::new(),
            pending: VecDeque::new(),
            loads_per_tick: loads_per_tick.max(1),
        }
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }
}

impl<W: WorldStorage> ResidentWorld for StorageBackedWorld<W> {
    fn snapshot(&self, pos: ChunkPos) -> Option<ChunkSnapshot> {
        self.resident.get(&pos).cloned()
    }

    fn is_resident(&self, pos: ChunkPos) -> bool {
        self.resident.contains_key(&pos)
    }

    fn request_load(&mut self, pos: ChunkPos) {
        if !self.resident.contains_key(&pos) && !self.pending.contains(&pos) {
            self.pending.push_back(pos);
        }
    }

    fn unload(&mut self, pos: ChunkPos) {
        self.resident.remove(&pos);
        self.pending.retain(|p| *p != pos);
    }

    fn tick(&mut self) {
        for _ in 0..self.loads_per_tick {
            let Some(pos) = self.pending.pop_front() else {
                break;
            };
            match self.storage.load_chunk(pos) {
                Ok(Some(snapshot)) => {
                    self.resident.insert(pos, snapshot);
                }
                Ok(None) => debug!(chunk_x = pos.x, chunk_z = pos.z, "Requested chunk not in storage"),
                Err(e) => warn!(chunk_x = pos.x, chunk_z = pos.z, error = %e, "Failed to stream chunk"),
            }
        }
    }
}

// =============================================================================
// Simulation thread
// =============================================================================

type Job = Box<dyn FnOnce(&mut dyn ResidentWorld) + Send>;

enum Message {
    Job(Job),
    Shutdown,
}

/// Cloneable handle for submitting work to the simulation thread.
#[derive(Clone)]
pub struct SimulationHandle {
    tx: mpsc::Sender<Message>,
}

impl SimulationHandle {
    /// Runs `job` on the simulation thread and waits for its result.
    ///
    /// # Errors
    ///
    /// [`SourceError::SimulationUnavailable`] if the thread has stopped, or
    /// [`SourceError::Join`] if the job panicked.
    pub async fn run<R, F>(&self, job: F) -> Result<R, SourceError>
    where
        F: FnOnce(&mut dyn ResidentWorld) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let wrapped: Job = Box::new(move |world| {
            let result = catch_unwind(AssertUnwindSafe(|| job(world))).map_err(panic_message);
            let _ = reply_tx.send(result);
        });

        self.tx
            .send(Message::Job(wrapped))
            .map_err(|_| SourceError::SimulationUnavailable)?;

        match reply_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(SourceError::Join(format!(
                "simulation job panicked: {}",
                message
            ))),
            Err(_) => Err(SourceError::SimulationUnavailable),
        }
    }
}

/// The dedicated thread owning the resident world.
///
/// Between jobs the world is ticked every `tick_interval`. Dropping the
/// thread handle shuts the loop down and joins it.
pub struct SimulationThread {
    handle: SimulationHandle,
    join: Option<JoinHandle<()>>,
}

impl SimulationThread {
    /// Spawns the thread. `make_world` runs on the new thread, so the world
    /// itself never crosses threads.
    pub fn spawn<F, R>(make_world: F, tick_interval: Duration) -> std::io::Result<Self>
    where
        F: FnOnce() -> R + Send + 'static,
        R: ResidentWorld,
    {
        let (tx, rx) = mpsc::channel::<Message>();

        let join = std::thread::Builder::new()
            .name("simulation".into())
            .spawn(move || {
                let mut world = make_world();
                run_loop(&mut world, rx, tick_interval);
            })?;

        info!(tick_ms = tick_interval.as_millis() as u64, "Simulation thread started");
        Ok(Self {
            handle: SimulationHandle { tx },
            join: Some(join),
        })
    }

    pub fn handle(&self) -> SimulationHandle {
        self.handle.clone()
    }

    /// Stops the loop and waits for the thread to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.handle.tx.send(Message::Shutdown);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                error!("Simulation thread panicked during shutdown");
            }
        }
    }
}

impl Drop for SimulationThread {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_loop(world: &mut dyn ResidentWorld, rx: mpsc::Receiver<Message>, tick_interval: Duration) {
    let mut last_tick = Instant::now();
    loop {
        let wait = tick_interval.saturating_sub(last_tick.elapsed());
        match rx.recv_timeout(wait) {
            Ok(Message::Job(job)) => job(&mut *world),
            Ok(Message::Shutdown) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        if last_tick.elapsed() >= tick_interval {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| world.tick())) {
                error!(panic = %panic_message(payload), "World tick panicked");
            }
            last_tick = Instant::now();
        }
    }
    debug!("Simulation thread stopped");
}

// =============================================================================
// LiveChunkSource
// =============================================================================

/// Reads chunk snapshots from the resident world.
///
/// Only chunks currently in memory are visible, so bulk callers load
/// batches into residency first (see [`ChunkDataSource::load_resident`]).
/// Position enumeration still comes from durable world storage.
pub struct LiveChunkSource<W> {
    simulation: SimulationHandle,
    storage: Arc<W>,
    tile_size: u32,
    poll_interval: Duration,
}

impl<W: WorldStorage> LiveChunkSource<W> {
    pub fn new(simulation: SimulationHandle, storage: Arc<W>, tile_size: u32) -> Self {
        Self {
            simulation,
            storage,
            tile_size,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl<W: WorldStorage> ChunkDataSource for LiveChunkSource<W> {
    fn name(&self) -> &str {
        "live"
    }

    async fn tile_chunks(&self, tile: TilePos) -> Result<Option<TileChunkData>, SourceError> {
        let mut data = TileChunkData::new(tile, self.tile_size)?;

        let data = self
            .simulation
            .run(move |world| {
                for pos in tile.chunks(data.chunks_per_tile()) {
                    if let Some(snapshot) = world.snapshot(pos) {
                        data.insert(snapshot);
                    }
                }
                data
            })
            .await?;

        if data.is_empty() {
            return Ok(None);
        }
        if !data.is_complete() {
            debug!(
                tile = %tile,
                present = data.len(),
                expected = data.expected_len(),
                "Partial tile"
            );
        }
        Ok(Some(data))
    }

    async fn chunk_positions(&self) -> Result<Vec<ChunkPos>, SourceError> {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || storage.chunk_positions())
            .await
            .map_err(|e| SourceError::Join(e.to_string()))?
    }

    fn requires_residency(&self) -> bool {
        true
    }

    async fn load_resident(
        &self,
        chunks: &[ChunkPos],
        timeout: Duration,
    ) -> Result<Vec<ChunkPos>, SourceError> {
        let requested = chunks.to_vec();
        self.simulation
            .run({
                let requested = requested.clone();
                move |world| {
                    for pos in requested {
                        world.request_load(pos);
                    }
                }
            })
            .await?;

        // Each waiting chunk gets `timeout` from the last time the world made
        // progress on this batch, so a throttled stream is never cut short.
        let mut deadline = Instant::now() + timeout;
        let mut waiting = requested;
        let mut resident = Vec::with_capacity(waiting.len());

        loop {
            let (ready, still_waiting) = self
                .simulation
                .run(move |world| {
                    waiting
                        .into_iter()
                        .partition::<Vec<_>, _>(|pos| world.is_resident(*pos))
                })
                .await?;
            if !ready.is_empty() {
                deadline = Instant::now() + timeout;
            }
            resident.extend(ready);
            waiting = still_waiting;

            if waiting.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                for pos in &waiting {
                    warn!(
                        chunk_x = pos.x,
                        chunk_z = pos.z,
                        timeout_ms = timeout.as_millis() as u64,
                        "Chunk did not become resident, skipping"
                    );
                }
                break;
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        Ok(resident)
    }

    async fn unload_resident(&self, chunks: &[ChunkPos]) {
        let chunks = chunks.to_vec();
        let count = chunks.len();
        let result = self
            .simulation
            .run(move |world| {
                for pos in chunks {
                    world.unload(pos);
                }
            })
            .await;
        if let Err(e) = result {
            warn!(count, error = %e, "Failed to unload chunk batch");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::MemoryWorldStorage;

    fn storage() -> Arc<MemoryWorldStorage> {
        Arc::new(MemoryWorldStorage::from_snapshots([
            ChunkSnapshot::uniform(ChunkPos::new(0, 0), 10, 1),
            ChunkSnapshot::uniform(ChunkPos::new(1, 0), 10, 1),
        ]))
    }

    fn spawn(storage: Arc<MemoryWorldStorage>) -> SimulationThread {
        SimulationThread::spawn(
            move || StorageBackedWorld::new(storage, 8),
            Duration::from_millis(2),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_live_source_sees_only_resident_chunks() {
        let storage = storage();
        let sim = spawn(Arc::clone(&storage));
        let source = LiveChunkSource::new(sim.handle(), storage, 64)
            .with_poll_interval(Duration::from_millis(2));

        assert!(source.requires_residency());
        assert!(source.tile_chunks(TilePos::new(9, 0, 0)).await.unwrap().is_none());

        let loaded = source
            .load_resident(&[ChunkPos::new(0, 0)], Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(loaded, vec![ChunkPos::new(0, 0)]);

        let data = source.tile_chunks(TilePos::new(9, 0, 0)).await.unwrap().unwrap();
        assert_eq!(data.len(), 1);

        source.unload_resident(&[ChunkPos::new(0, 0)]).await;
        assert!(source.tile_chunks(TilePos::new(9, 0, 0)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_live_source_skips_chunk_after_timeout() {
        let storage = storage();
        let sim = spawn(Arc::clone(&storage));
        let source = LiveChunkSource::new(sim.handle(), storage, 64)
            .with_poll_interval(Duration::from_millis(2));

        let loaded = source
            .load_resident(
                &[ChunkPos::new(1, 0), ChunkPos::new(50, 50)],
                Duration::from_millis(100),
            )
            .await
            .unwrap();
        assert_eq!(loaded, vec![ChunkPos::new(1, 0)]);
    }

    #[tokio::test]
    async fn test_throttled_batch_is_not_cut_short() {
        // One chunk per 10ms tick: the whole batch takes far longer than the
        // timeout, but every chunk arrives well within it.
        let positions: Vec<ChunkPos> = (0..30).map(|x| ChunkPos::new(x, 0)).collect();
        let storage = Arc::new(MemoryWorldStorage::from_snapshots(
            positions.iter().map(|pos| ChunkSnapshot::uniform(*pos, 10, 1)),
        ));
        let sim = SimulationThread::spawn(
            {
                let storage = Arc::clone(&storage);
                move || StorageBackedWorld::new(storage, 1)
            },
            Duration::from_millis(10),
        )
        .unwrap();
        let source = LiveChunkSource::new(sim.handle(), storage, 64)
            .with_poll_interval(Duration::from_millis(2));

        let loaded = source
            .load_resident(&positions, Duration::from_millis(150))
            .await
            .unwrap();
        assert_eq!(loaded.len(), positions.len());
    }

    #[tokio::test]
    async fn test_simulation_job_panic_is_reported() {
        let sim = spawn(storage());
        let result: Result<(), _> = sim.handle().run(|_| panic!("boom")).await;
        assert!(matches!(result, Err(SourceError::Join(msg)) if msg.contains("boom")));

        // Thread keeps serving after a panicking job.
        let resident = sim
            .handle()
            .run(|world| world.is_resident(ChunkPos::new(0, 0)))
            .await
            .unwrap();
        assert!(!resident);
    }

    #[tokio::test]
    async fn test_stopped_simulation_is_unavailable() {
        let sim = spawn(storage());
        let handle = sim.handle();
        sim.shutdown();
        let result = handle.run(|_| ()).await;
        assert!(matches!(result, Err(SourceError::SimulationUnavailable)));
    }
}
