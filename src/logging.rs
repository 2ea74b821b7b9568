//! Log output setup.
//!
//! The subscriber is built once in `main`; library code only emits `tracing`
//! events and never configures output itself.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// How chatty a run should be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Verbosity {
    /// Errors only
    Quiet,
    #[default]
    Normal,
    /// Include debug detail for every entry
    Verbose,
}

impl Verbosity {
    /// `quiet` wins when both flags are given.
    pub fn from_flags(quiet: bool, verbose: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }

    pub fn level(&self) -> Level {
        match self {
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Normal => Level::INFO,
            Verbosity::Verbose => Level::DEBUG,
        }
    }
}

/// Build the filter for a verbosity. A `RUST_LOG` value, when set, takes
/// precedence over the flags.
pub fn filter(verbosity: Verbosity) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(verbosity.level().into())
        .from_env_lossy()
}

/// Install the global subscriber, writing to stderr so stdout carries only
/// the run summary.
pub fn init(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(verbosity))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
