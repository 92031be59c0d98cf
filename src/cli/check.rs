// rsc check - run a full diff and report diagnostics without persisting a cache.

use crate::cache::ProjectCache;
use crate::error::ErrorLevel;
use anyhow::{bail, Result};
use colored::*;
use std::path::Path;

pub fn execute(dir: &Path) -> Result<()> {
    let source_root = super::resolve_source_root(dir);
    println!("{} {}", "Checking".green().bold(), source_root.display());

    let mut cache = ProjectCache::new();
    let diagnostics = cache.full_diff(&source_root)?;

    let mut error_count = 0;
    for cached in &diagnostics {
        let rendered = cached.diagnostic.display(&cached.path.display().to_string());
        match cached.diagnostic.level {
            ErrorLevel::Error => {
                error_count += 1;
                println!("{}", rendered.red());
            }
            ErrorLevel::Warning => println!("{}", rendered.yellow()),
        }
    }

    println!(
        "\n{} {} compiled, {} skipped, {} error(s), {} warning(s)",
        "Done:".cyan().bold(),
        cache.stats.files_compiled,
        cache.stats.files_skipped,
        error_count,
        diagnostics.len() - error_count
    );

    if error_count > 0 {
        bail!("{error_count} error(s) found");
    }

    Ok(())
}
