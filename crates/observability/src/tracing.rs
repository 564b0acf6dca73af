//! Tracing/logging initialization.
//!
//! Filtering follows `RUST_LOG` (default `info`). Login audit lines are
//! emitted under the `audit` target, so `RUST_LOG=audit=info,warn` isolates
//! them.

use tracing_subscriber::EnvFilter;

/// Output format of the process logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, multi-line output for local development.
    Pretty,
}

impl LogFormat {
    /// `GATEKEEP_LOG_FORMAT=pretty` selects [`LogFormat::Pretty`]; anything
    /// else keeps JSON.
    pub fn from_env() -> Self {
        Self::parse(std::env::var("GATEKEEP_LOG_FORMAT").ok().as_deref())
    }

    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
