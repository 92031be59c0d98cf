// CLI subcommand implementations for the `rsc` binary.

pub mod build;
pub mod check;
pub mod watch;

use crate::config::ProjectConfig;
use std::path::{Path, PathBuf};

fn load_config(dir: &Path) -> Option<ProjectConfig> {
    ProjectConfig::load_from_file(&dir.join("rsc.toml")).ok()
}

/// Resolves the directory a command should actually diff: `<dir>/rsc.toml`'s
/// `[project] source_root` when the config file is present, else `dir`
/// itself (spec.md §4.10).
pub(crate) fn resolve_source_root(dir: &Path) -> PathBuf {
    load_config(dir)
        .map(|c| dir.join(c.project.source_root))
        .unwrap_or_else(|| dir.to_path_buf())
}

/// Resolves the background flusher's flush interval: `rsc.toml`'s
/// `[cache] flush_interval_secs` when present, else the spec's default.
pub(crate) fn resolve_flush_interval(dir: &Path) -> u64 {
    load_config(dir)
        .map(|c| c.cache.flush_interval_secs)
        .unwrap_or(crate::flusher::DEFAULT_FLUSH_INTERVAL_SECS)
}
