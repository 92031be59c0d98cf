//! Background periodic cache flusher (spec.md §5).
//!
//! A `std::thread::spawn`ed loop sleeps for a configured interval, checks an
//! `AtomicBool` dirty flag, and if set, asks the cache (behind a `Mutex`) to
//! persist itself to `path`. The dirty flag is written with `Release`
//! ordering and read with `Acquire`, so a write that happens-before the flag
//! set is visible to whichever thread observes the flag cleared — matching
//! the REDESIGN FLAGS guidance to prefer message passing or a mutex over the
//! shared cache rather than mutating it from multiple threads without one.
//! No teacher analog (Windjammer has no persistent incremental cache); the
//! shape borrows the teacher's asset hot-reload loop
//! (`windjammer-game-framework/src/asset_hot_reload.rs`'s poll-interval/
//! `last_poll` pattern), retargeted from filesystem mtimes to an explicit
//! dirty flag since spec.md §5 specifies the flag directly.

use crate::cache::ProjectCache;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// spec.md §5's default flush interval, overridable via `rsc.toml`'s
/// `[cache] flush_interval_secs`.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;

/// Handle to a running flusher thread. Dropping this does not stop the
/// thread — call `stop` explicitly, then `join` to wait for a clean exit.
pub struct Flusher {
    dirty: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Flusher {
    /// Spawns the background loop. `cache` is shared with whatever thread
    /// mutates it via `full_diff`/`recompile_non_persistent`; this thread
    /// only ever calls `persist` and writes the result to `path`.
    pub fn spawn(cache: Arc<Mutex<ProjectCache>>, path: PathBuf, interval: Duration) -> Self {
        let dirty = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let loop_dirty = Arc::clone(&dirty);
        let loop_stop = Arc::clone(&stop);
        let handle = std::thread::spawn(move || loop {
            std::thread::sleep(interval);
            if loop_stop.load(Ordering::Acquire) {
                return;
            }
            if loop_dirty.swap(false, Ordering::AcqRel) {
                let bytes = cache.lock().unwrap().persist();
                let _ = std::fs::write(&path, bytes);
            }
        });

        Self {
            dirty,
            stop,
            handle: Some(handle),
        }
    }

    /// Marks the cache dirty so the next tick persists it. `Release` pairs
    /// with the loop's `AcqRel` swap: every mutation the caller made before
    /// calling `mark_dirty` is visible to the flusher once it observes the
    /// flag set.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    /// Signals the loop to exit after its current sleep and waits for it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dirty_flag_triggers_a_persist_within_a_few_ticks() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("project.rsc-cache");
        let cache = Arc::new(Mutex::new(ProjectCache::new()));

        let flusher = Flusher::spawn(Arc::clone(&cache), cache_path.clone(), Duration::from_millis(10));
        flusher.mark_dirty();
        std::thread::sleep(Duration::from_millis(100));
        flusher.stop();

        assert!(cache_path.exists());
    }

    #[test]
    fn clean_cache_is_never_written() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("project.rsc-cache");
        let cache = Arc::new(Mutex::new(ProjectCache::new()));

        let flusher = Flusher::spawn(Arc::clone(&cache), cache_path.clone(), Duration::from_millis(10));
        std::thread::sleep(Duration::from_millis(60));
        flusher.stop();

        assert!(!cache_path.exists());
    }
}
