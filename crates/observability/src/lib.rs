//! Logging setup shared by the gate binary and hosts embedding the gate.

/// Initialize process-wide logging with the default settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(&tracing::LogSettings::default());
}

/// Tracing subscriber configuration.
pub mod tracing;

pub use self::tracing::{LogFormat, LogSettings};
