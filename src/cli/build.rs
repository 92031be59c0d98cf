// rsc build - run a full diff and persist the resulting cache to disk (spec.md §4.8.4/§6).

use crate::cache::ProjectCache;
use crate::error::ErrorLevel;
use anyhow::Result;
use colored::*;
use std::path::{Path, PathBuf};

pub fn execute(dir: &Path, output: Option<&Path>) -> Result<()> {
    let output = output.map(Path::to_path_buf).unwrap_or_else(|| default_cache_path(dir));
    let source_root = super::resolve_source_root(dir);

    println!(
        "{} {} (target: {})",
        "Building".green().bold(),
        source_root.display(),
        output.display()
    );

    let mut cache = ProjectCache::new();
    let diagnostics = cache.full_diff(&source_root)?;

    let error_count = diagnostics.iter().filter(|d| d.diagnostic.level == ErrorLevel::Error).count();
    for cached in &diagnostics {
        let rendered = cached.diagnostic.display(&cached.path.display().to_string());
        if cached.diagnostic.level == ErrorLevel::Error {
            println!("{}", rendered.red());
        } else {
            println!("{}", rendered.yellow());
        }
    }

    if error_count > 0 {
        anyhow::bail!("build failed with {error_count} error(s)");
    }

    std::fs::write(&output, cache.persist())?;
    println!("\n{} wrote {}", "Success!".green().bold(), output.display());

    Ok(())
}

fn default_cache_path(dir: &Path) -> PathBuf {
    dir.join(".rsc-cache")
}
