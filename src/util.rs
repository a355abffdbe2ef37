//! Small shared helpers.

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
///
/// Used for timestamps that must survive a process restart (cache entries,
/// provider failure times). Window and breaker arithmetic uses `Instant`.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Human-readable rendering of a window length for rejection reasons.
pub(crate) fn format_window_ms(window_ms: u64) -> String {
    if window_ms < 60_000 {
        format!("{}s", window_ms / 1000)
    } else if window_ms < 3_600_000 {
        format!("{}m", window_ms / 60_000)
    } else if window_ms < 86_400_000 {
        format!("{}h", window_ms / 3_600_000)
    } else {
        format!("{}d", window_ms / 86_400_000)
    }
}
