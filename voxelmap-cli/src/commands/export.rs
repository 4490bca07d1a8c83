//! Export command: render every tile and build the pyramid.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use voxelmap::chunk::SourceKind;
use voxelmap::export::{ExportOrchestrator, ExportProgress, ExportSummary};
use voxelmap::store::{CachedTileStore, TileStore};

use crate::error::CliError;
use crate::runner::CliRunner;

/// Overrides for the `[export]` and `[world]` config sections.
#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Base zoom level (finest level, rendered from chunks)
    #[arg(long)]
    pub base_zoom: Option<u8>,

    /// Number of tiles rendered concurrently
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Chunk source: durable or live
    #[arg(long)]
    pub source: Option<SourceKind>,

    /// Delete all stored tiles before exporting
    #[arg(long)]
    pub clean: bool,
}

pub async fn run(mut runner: CliRunner, args: ExportArgs) -> Result<(), CliError> {
    runner.log_startup("export");

    let config = runner.config_mut();
    if let Some(zoom) = args.base_zoom {
        config.export.base_zoom = zoom;
    }
    if let Some(parallelism) = args.parallelism {
        config.export.parallelism = parallelism.max(1);
    }
    if let Some(source) = args.source {
        config.world.source = source;
    }

    let store = runner.open_tile_store()?;
    if args.clean {
        clean_store(store.as_ref())?;
    }

    let world = runner.open_world()?;
    let renderer = runner.renderer()?;
    let hot = Arc::new(CachedTileStore::new(
        Arc::clone(&store),
        runner.config().store.hot_cache_capacity,
    ));

    let completed = Arc::new(AtomicU64::new(0));
    let status_completed = Arc::clone(&completed);
    voxelmap::panic::set_status_callback(move || {
        format!(
            "export in progress, {} tiles done",
            status_completed.load(Ordering::Relaxed)
        )
    });

    let progress = Arc::new(move |p: ExportProgress| {
        completed.store(p.tiles_completed, Ordering::Relaxed);
        println!(
            "  zoom {:>2}: {}/{} tiles ({:.1}%)",
            p.current_zoom,
            p.tiles_completed,
            p.total_tiles,
            p.percent_complete()
        );
    });

    let cancellation = CancellationToken::new();
    let interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping export");
            println!("Stopping export...");
            interrupt.cancel();
        }
    });

    let orchestrator = ExportOrchestrator::new(
        Arc::clone(&world.source),
        store,
        renderer,
        runner.config().export_config(),
    )
    .with_progress(progress)
    .with_hot_cache(hot)
    .with_cancellation(cancellation);

    println!(
        "Exporting from {} world (base zoom {})...",
        runner.config().world.source.as_str(),
        runner.config().export.base_zoom
    );

    let result = orchestrator.run_export().await;
    voxelmap::panic::clear_status_callback();
    let summary = result?;

    print_summary(&summary);
    info!(
        rendered = summary.tiles_rendered,
        failed = summary.tiles_failed,
        pyramid = summary.pyramid_tiles,
        "Export command finished"
    );
    Ok(())
}

fn clean_store<T: TileStore>(store: &T) -> Result<(), CliError> {
    let mut removed = 0;
    for zoom in store.zoom_levels()? {
        removed += store.clear_zoom(zoom)?;
    }
    store.checkpoint()?;
    println!("Removed {} stored tiles", removed);
    Ok(())
}

fn print_summary(summary: &ExportSummary) {
    println!();
    println!("Export complete in {:.1}s", summary.duration.as_secs_f64());
    println!("  Base tiles rendered: {}", summary.tiles_rendered);
    println!("  Base tiles empty:    {}", summary.tiles_empty);
    println!("  Base tiles failed:   {}", summary.tiles_failed);
    println!("  Pyramid tiles:       {}", summary.pyramid_tiles);
    println!("  Pyramid levels:      {}", summary.levels_generated);
}
