//! Tracing subscriber setup

use crate::config::CodecConfig;

/// Install a formatted subscriber at the configured level.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(config: &CodecConfig) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_target(false)
        .try_init()
        .is_ok()
}

/// Same as [`init`] but writes through the test harness capture.
pub fn init_for_tests(config: &CodecConfig) -> bool {
    tracing_subscriber::fmt()
        .with_max_level(config.tracing_level())
        .with_test_writer()
        .try_init()
        .is_ok()
}
