use std::collections::BTreeMap;
use std::io::IsTerminal as _;
use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use colored::Colorize as _;
use humansize::{DECIMAL, format_size};
use inquire::Confirm;

use cache_core::CacheCleanup;
use cache_core::cleanup::{CleanupCacheEntry, EntryFilter};

use crate::cmd::resolve_cache_dir;

#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Cache directory (default: the platform cache dir for cachegrind).
    #[arg(long, value_name = "PATH")]
    cache_dir: Option<PathBuf>,

    /// Delete every cache entry.
    #[arg(long)]
    all: bool,

    /// Filter: entries for this repository (use `.` for the current directory).
    #[arg(long, value_name = "PATH")]
    repo: Option<PathBuf>,

    /// Filter: entries older than N days.
    #[arg(long = "older-than", value_name = "DAYS")]
    older_than: Option<f64>,

    /// Filter: entries for a specific tool (e.g. `cl`, `clang`).
    #[arg(long, value_name = "NAME")]
    tool: Option<String>,

    /// Print what would be deleted instead of deleting it.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Skip the confirmation prompt before a non-dry-run deletion.
    #[arg(short, long)]
    yes: bool,
}

pub fn exec(options: Options) -> Result<i32> {
    if options.all && (options.repo.is_some() || options.older_than.is_some() || options.tool.is_some()) {
        println!("Error: --all cannot be combined with --repo, --older-than, or --tool.");
        return Ok(1);
    }
    if !options.all && options.repo.is_none() && options.older_than.is_none() && options.tool.is_none() {
        println!("Error: --clear requires a filter (--repo, --older-than, --tool) or --all.");
        return Ok(1);
    }
    if let Some(days) = options.older_than {
        if days < 0.0 {
            println!("Error: --older-than cannot be negative.");
            return Ok(1);
        }
    }

    let repo = options.repo.as_ref().map(|r| {
        if r.as_os_str() == "." {
            std::env::current_dir().unwrap_or_else(|_| r.clone())
        } else {
            r.clone()
        }
    });

    let cache_dir = resolve_cache_dir(options.cache_dir.as_ref())?;
    let cleanup = CacheCleanup::new(cache_dir);
    let filter = EntryFilter {
        repo,
        older_than_days: options.older_than,
        tool: options.tool.clone(),
    };
    let entries = cleanup.find_entries(&filter);

    if entries.is_empty() {
        println!("No matching entries found.");
        return Ok(0);
    }

    let total_size: u64 = entries.iter().map(|e| e.size_bytes).sum();

    if options.dry_run {
        println!(
            "Would delete {} entries ({})",
            entries.len(),
            format_size(total_size, DECIMAL)
        );
        println!();
        for (repo_dir, count) in group_by_repo(&entries) {
            println!("{repo_dir}: {count} entries");
        }
        return Ok(0);
    }

    if !options.yes && std::io::stdin().is_terminal() {
        let confirmed = Confirm::new(&format!(
            "Delete {} entries ({})? This cannot be undone.",
            entries.len(),
            format_size(total_size, DECIMAL)
        ))
        .with_default(false)
        .prompt()?;
        if !confirmed {
            return Ok(0);
        }
    }

    let (deleted, failed, deleted_bytes) = cleanup.delete_entries(&entries, false);
    println!(
        "Deleted {deleted} entries ({})",
        format_size(deleted_bytes, DECIMAL)
    );
    if failed > 0 {
        println!(
            "{}",
            format!("Warning: {failed} entries could not be deleted (permission denied or in use)")
                .yellow()
        );
    }

    Ok(0)
}

fn group_by_repo(entries: &[CleanupCacheEntry]) -> BTreeMap<String, usize> {
    let mut by_repo: BTreeMap<String, usize> = BTreeMap::new();
    for entry in entries {
        *by_repo
            .entry(entry.metadata.repo_dir.to_string_lossy().into_owned())
            .or_insert(0) += 1;
    }
    by_repo
}
