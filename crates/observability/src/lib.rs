//! Tracing and logging setup shared by the binaries.

/// Initialize process-wide tracing, choosing the output format from
/// `GATEKEEP_LOG_FORMAT`.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Subscriber configuration (filters, formats).
pub mod tracing;
