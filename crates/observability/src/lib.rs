//! Process-wide tracing setup shared by the docfleet binaries.

/// Initialize process-wide tracing using `DOCFLEET_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{LogFormat, LogFormatError, init_with};
