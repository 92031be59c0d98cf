//! Project configuration file, `rsc.toml` (spec.md §4.10).
//!
//! Grounded on the teacher's `config.rs` `WjConfig`/`PackageConfig` split
//! (serde + toml, a `load_from_file`/`save_to_file` pair returning a `String`
//! error), scoped down to what this compiler actually needs: a project name,
//! a source root to diff, and the background flusher's interval.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    pub name: String,
    #[serde(default = "default_source_root")]
    pub source_root: PathBuf,
}

fn default_source_root() -> PathBuf {
    PathBuf::from("scripts")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSection {
    #[serde(default = "default_flush_interval")]
    pub flush_interval_secs: u64,
}

fn default_flush_interval() -> u64 {
    crate::flusher::DEFAULT_FLUSH_INTERVAL_SECS
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            flush_interval_secs: default_flush_interval(),
        }
    }
}

/// `rsc.toml`'s full shape (spec.md §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectSection,
    #[serde(default)]
    pub cache: CacheSection,
}

impl ProjectConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, String> {
        let content = fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse {}: {e}", path.display()))
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| format!("failed to serialize config: {e}"))?;
        fs::write(path, content).map_err(|e| format!("failed to write {}: {e}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            [project]
            name = "my-scripts"
            source_root = "scripts"
        "#;
        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.project.name, "my-scripts");
        assert_eq!(config.cache.flush_interval_secs, 5);
    }

    #[test]
    fn overrides_flush_interval() {
        let toml = r#"
            [project]
            name = "my-scripts"
            source_root = "scripts"

            [cache]
            flush_interval_secs = 30
        "#;
        let config: ProjectConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.cache.flush_interval_secs, 30);
    }

    #[test]
    fn round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rsc.toml");
        let config = ProjectConfig {
            project: ProjectSection {
                name: "demo".into(),
                source_root: PathBuf::from("src"),
            },
            cache: CacheSection::default(),
        };
        config.save_to_file(&path).unwrap();
        let loaded = ProjectConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.project.name, "demo");
        assert_eq!(loaded.cache.flush_interval_secs, 5);
    }
}
