use clap::Subcommand;

pub mod clear;
mod fmt;
pub mod stats;

#[derive(Clone, Debug, Subcommand)]
pub enum Command {
    /// Print per-repository cache statistics.
    Stats(stats::Options),

    /// Delete matching cache entries.
    Clear(clear::Options),
}
