//! Progress reporting for exports.
//!
//! Progress is reported via a callback that can be wired to a terminal
//! progress line or to logging.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

/// Progress callback for exports.
pub type ExportProgressCallback = Arc<dyn Fn(ExportProgress) + Send + Sync>;

/// One progress update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportProgress {
    /// Tiles finished so far across all levels. Never decreases.
    pub tiles_completed: u64,
    /// Estimated tiles in the whole pass.
    pub total_tiles: u64,
    /// Zoom level being worked on.
    pub current_zoom: u8,
}

impl ExportProgress {
    pub fn percent_complete(&self) -> f64 {
        if self.total_tiles == 0 {
            return 100.0;
        }
        (self.tiles_completed as f64 / self.total_tiles as f64 * 100.0).min(100.0)
    }
}

/// Counts finished tiles and fires the callback every `interval` tiles.
pub(crate) struct ProgressTracker {
    callback: Option<ExportProgressCallback>,
    interval: u64,
    total: AtomicU64,
    completed: AtomicU64,
    zoom: AtomicU8,
}

impl ProgressTracker {
    pub fn new(callback: Option<ExportProgressCallback>, interval: u64) -> Self {
        Self {
            callback,
            interval: interval.max(1),
            total: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            zoom: AtomicU8::new(0),
        }
    }

    pub fn set_total(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn set_zoom(&self, zoom: u8) {
        self.zoom.store(zoom, Ordering::Relaxed);
    }

    pub fn advance(&self) {
        let done = self.completed.fetch_add(1, Ordering::Relaxed) + 1;
        if done % self.interval == 0 {
            self.emit();
        }
    }

    /// Reports the current counts regardless of the interval.
    pub fn emit(&self) {
        if let Some(callback) = &self.callback {
            callback(self.snapshot());
        }
    }

    pub fn snapshot(&self) -> ExportProgress {
        let completed = self.completed.load(Ordering::Relaxed);
        ExportProgress {
            tiles_completed: completed,
            total_tiles: self.total.load(Ordering::Relaxed).max(completed),
            current_zoom: self.zoom.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_percent_complete() {
        let p = ExportProgress {
            tiles_completed: 25,
            total_tiles: 200,
            current_zoom: 9,
        };
        assert!((p.percent_complete() - 12.5).abs() < f64::EPSILON);

        let empty = ExportProgress {
            tiles_completed: 0,
            total_tiles: 0,
            current_zoom: 0,
        };
        assert_eq!(empty.percent_complete(), 100.0);
    }

    #[test]
    fn test_tracker_emits_on_interval() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let tracker = ProgressTracker::new(Some(Arc::new(move |p| sink.lock().push(p))), 3);
        tracker.set_total(10);
        tracker.set_zoom(4);

        for _ in 0..7 {
            tracker.advance();
        }

        let seen = seen.lock();
        let completed: Vec<u64> = seen.iter().map(|p| p.tiles_completed).collect();
        assert_eq!(completed, vec![3, 6]);
        assert!(seen.iter().all(|p| p.current_zoom == 4 && p.total_tiles == 10));
    }

    #[test]
    fn test_total_never_below_completed() {
        let tracker = ProgressTracker::new(None, 100);
        tracker.set_total(1);
        tracker.advance();
        tracker.advance();
        assert_eq!(tracker.snapshot().total_tiles, 2);
    }
}
