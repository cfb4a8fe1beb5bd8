// Path: crates/services/src/time.rs
//! Wall-clock helpers shared by the handlers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
///
/// Saturates at zero for clocks before the epoch rather than panicking; a
/// node with such a clock will simply treat everything as expired.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
