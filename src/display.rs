//! Global notification level and stderr diagnostics.
//!
//! The engine never writes to stdout. The few diagnostics it produces (the
//! disk-full notice, verbose open/close traces) go to stderr, gated by a
//! process-wide level: 0 = silent, 1 = errors only, 2 = warnings, 3+ =
//! verbose. The default is 1 so that error diagnostics are visible without
//! any setup.

use std::sync::atomic::{AtomicI32, Ordering};

static NOTIFICATION_LEVEL: AtomicI32 = AtomicI32::new(1);

/// Sets the global notification level. 0 = silent, 1 = errors only,
/// 2 = warnings, 3+ = verbose.
pub fn set_notification_level(level: i32) {
    NOTIFICATION_LEVEL.store(level, Ordering::Relaxed);
}

/// Returns the current notification level.
#[inline]
pub fn notification_level() -> i32 {
    NOTIFICATION_LEVEL.load(Ordering::Relaxed)
}
