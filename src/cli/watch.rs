// rsc watch - run an initial diff, then re-diff whenever a source file's
// mtime advances (spec.md §4.9). A thin polling loop, not a from-scratch
// filesystem watcher — grounded on the teacher's
// `windjammer-game-framework/src/asset_hot_reload.rs` update loop, which
// polls mtimes on the same kind of interval rather than subscribing to OS
// filesystem events.
//
// This is the one long-running command, so it's the one that runs spec.md
// §5's concurrency model for real: the core loop below owns the only mutable
// access path into `ProjectCache` via diffs, while a `Flusher` (background
// thread) periodically persists it to disk whenever a diff marks it dirty.

use crate::cache::ProjectCache;
use crate::error::ErrorLevel;
use crate::flusher::Flusher;
use anyhow::Result;
use colored::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

fn snapshot_mtimes(dir: &Path) -> HashMap<PathBuf, SystemTime> {
    let mut mtimes = HashMap::new();
    for entry in walkdir::WalkDir::new(dir).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(modified) = meta.modified() {
                mtimes.insert(entry.path().to_path_buf(), modified);
            }
        }
    }
    mtimes
}

fn run_diff(cache: &mut ProjectCache, dir: &Path, flusher: &Flusher) -> Result<()> {
    let compiled_before = cache.stats.files_compiled;
    let diagnostics = cache.full_diff(dir)?;
    if cache.stats.files_compiled != compiled_before {
        flusher.mark_dirty();
    }

    let error_count = diagnostics.iter().filter(|d| d.diagnostic.level == ErrorLevel::Error).count();
    for cached in &diagnostics {
        let rendered = cached.diagnostic.display(&cached.path.display().to_string());
        if cached.diagnostic.level == ErrorLevel::Error {
            println!("{}", rendered.red());
        } else {
            println!("{}", rendered.yellow());
        }
    }
    println!(
        "{} {} compiled, {} error(s), {} warning(s)",
        "Diffed:".cyan().bold(),
        cache.stats.files_compiled,
        error_count,
        diagnostics.len() - error_count
    );
    Ok(())
}

pub fn execute(dir: &Path, poll_interval: Duration) -> Result<()> {
    let source_root = super::resolve_source_root(dir);
    let flush_interval = Duration::from_secs(super::resolve_flush_interval(dir));
    println!("{} {}", "Watching".green().bold(), source_root.display());

    let cache = Arc::new(Mutex::new(ProjectCache::new()));
    let flusher = Flusher::spawn(Arc::clone(&cache), dir.join(".rsc-cache"), flush_interval);

    {
        let mut guard = cache.lock().unwrap();
        run_diff(&mut guard, &source_root, &flusher)?;
    }

    let mut mtimes = snapshot_mtimes(&source_root);
    loop {
        std::thread::sleep(poll_interval);
        let current = snapshot_mtimes(&source_root);
        if current != mtimes {
            let mut guard = cache.lock().unwrap();
            run_diff(&mut guard, &source_root, &flusher)?;
            mtimes = current;
        }
    }
}
