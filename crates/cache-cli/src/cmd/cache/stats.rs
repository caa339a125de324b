use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;
use humansize::{DECIMAL, format_size};

use cache_core::CacheCleanup;

use super::fmt::format_age;
use crate::cmd::resolve_cache_dir;

#[derive(Clone, Debug, Args)]
pub struct Options {
    /// Cache directory (default: the platform cache dir for cachegrind).
    #[arg(long, value_name = "PATH")]
    cache_dir: Option<PathBuf>,
}

pub fn exec(options: Options) -> Result<i32> {
    let cache_dir = resolve_cache_dir(options.cache_dir.as_ref())?;
    let cleanup = CacheCleanup::new(cache_dir);
    let stats = cleanup.get_stats();

    if stats.is_empty() {
        println!("Cache is empty.");
        return Ok(0);
    }

    println!("Cachegrind Cache Statistics");
    println!("{}", "=".repeat(60));
    println!();

    let mut total_entries = 0usize;
    let mut total_size = 0u64;

    let mut repos: Vec<_> = stats.values().collect();
    repos.sort_by(|a, b| a.repo_dir.cmp(&b.repo_dir));

    for repo_stats in repos {
        println!("{}", repo_stats.repo_dir);
        println!("  Entries: {}", repo_stats.entry_count());
        println!("  Size: {}", format_size(repo_stats.total_size(), DECIMAL));
        println!("  Oldest: {}", format_age(repo_stats.oldest_days()));
        println!("  Newest: {}", format_age(repo_stats.newest_days()));
        println!();

        total_entries += repo_stats.entry_count();
        total_size += repo_stats.total_size();
    }

    println!("{}", "-".repeat(60));
    println!(
        "Total: {total_entries} entries, {}",
        format_size(total_size, DECIMAL)
    );

    Ok(0)
}
