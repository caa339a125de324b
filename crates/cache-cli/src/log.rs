use clap::ValueEnum;
use tracing_subscriber::{Layer as _, layer::SubscriberExt as _};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum WhenColor {
    Always,
    Never,
    Auto,
}

/// Build (but do not install) the process-wide subscriber.
///
/// Verbosity is controlled by `CACHEGRIND_LOG` (standard `EnvFilter`
/// syntax, e.g. `CACHEGRIND_LOG=cache_core=debug`), defaulting to `info`.
pub fn make_logger(color: WhenColor) -> impl tracing::Subscriber {
    let layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_target(true)
        .with_writer(std::io::stderr);
    let layer = match color {
        WhenColor::Always => layer.with_ansi(true),
        WhenColor::Never => layer.with_ansi(false),
        WhenColor::Auto => layer,
    };

    tracing_subscriber::registry().with(
        layer.with_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                .with_env_var("CACHEGRIND_LOG")
                .from_env_lossy(),
        ),
    )
}
