//! Process-wide tracing setup.

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::Format;

/// Initialize tracing with defaults (`info`, JSON).
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with("info", Format::Json);
}

/// Initialize tracing with an explicit default level and output format.
///
/// `RUST_LOG`, when set, takes precedence over `default_level`.
pub fn init_with(default_level: &str, format: Format) {
    tracing::init_with(default_level, format);
}
