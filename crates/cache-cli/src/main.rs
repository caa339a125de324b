//! The binary entrypoint for `cachegrind`, the compile-cache cleanup tool.

use clap::{Parser, Subcommand, crate_version};
use color_eyre::Result;
use tracing_subscriber::util::SubscriberInitExt;

// Since this is a binary crate, these modules stay non-`pub` so the
// compiler can correctly warn about dead code:
// https://github.com/rust-lang/rust/issues/74970
mod cmd;
mod log;

#[derive(Clone, Debug, Parser)]
#[command(
    name = "cachegrind",
    about = "Inspect and clear the cachegrind compile cache",
    version = crate_version!()
)]
struct TopLevelFlags {
    #[command(subcommand)]
    command: Command,

    /// When to colorize output.
    #[arg(long, value_enum, default_value_t = log::WhenColor::Auto)]
    color: log::WhenColor,
}

#[derive(Clone, Debug, Subcommand)]
enum Command {
    /// Inspect or clear cached entries.
    #[clap(subcommand)]
    Cache(cmd::cache::Command),
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let top = TopLevelFlags::parse();
    log::make_logger(top.color).init();

    let code = match top.command {
        Command::Cache(cmd) => match cmd {
            cmd::cache::Command::Stats(opts) => cmd::cache::stats::exec(opts)?,
            cmd::cache::Command::Clear(opts) => cmd::cache::clear::exec(opts)?,
        },
    };

    std::process::exit(code);
}
