//! Structured logging initialization for enn.
//!
//! All log output goes to stderr so command output on stdout stays parseable.

use std::io::{self, IsTerminal};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStyle {
    /// JSON lines, one object per event (robot mode).
    Json,
    /// Colored human output for an interactive stderr.
    Pretty,
    /// Plain single-line output when stderr is piped.
    Compact,
}

impl LogStyle {
    pub fn detect(robot_mode: bool) -> Self {
        if robot_mode {
            Self::Json
        } else if io::stderr().is_terminal() {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

/// Default filter directive for a verbosity setting.
///
/// The `redis` crate is held at `warn` unless tracing everything.
pub const fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        return "enn=error,redis=error";
    }
    match verbose {
        0 => "enn=info,redis=warn",
        1 => "enn=debug,redis=warn",
        _ => "enn=trace,redis=debug",
    }
}

/// Initialize the tracing subscriber from CLI flags.
///
/// `RUST_LOG` overrides the directive derived from `verbose`/`quiet`.
/// Calling this more than once is harmless; later calls are ignored.
///
/// | Mode  | stderr | Output                       |
/// |-------|--------|------------------------------|
/// | Robot | any    | JSON lines with thread names |
/// | Human | TTY    | Pretty colored output        |
/// | Human | piped  | Compact plain output         |
pub fn init_logging(robot_mode: bool, verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let layer = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::NONE)
        .with_writer(io::stderr);
    let registry = tracing_subscriber::registry().with(filter);

    let _ = match LogStyle::detect(robot_mode) {
        LogStyle::Json => registry
            .with(layer.json().with_target(true).with_thread_names(true))
            .try_init(),
        LogStyle::Pretty => registry.with(layer.with_target(false)).try_init(),
        LogStyle::Compact => registry
            .with(layer.with_ansi(false).with_target(false).compact())
            .try_init(),
    };
}
