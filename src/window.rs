//! Trailing time-window policy for chart readings.
//!
//! All functions take the reference time as a parameter instead of calling
//! `Utc::now()`, so window membership is deterministic in tests.

use chrono::{DateTime, Duration, SubsecRound, Utc};

/// Default width of the chart window.
pub const DEFAULT_WINDOW_HOURS: i64 = 24;

// ---

/// Returns `true` if `timestamp` lies inside the window ending at `reference`.
///
/// Membership is strictly greater than the lower bound:
///   timestamp >  reference - window  →  inside
///   timestamp == reference - window  →  outside
pub fn is_within_window(reference: DateTime<Utc>, timestamp: DateTime<Utc>, window: Duration) -> bool {
    // ---
    timestamp > reference - window
}

/// Drop the sub-second part of an instant.
///
/// Stored timestamps have second granularity, so range queries compare
/// against a whole-second reference.
pub fn truncate_to_seconds(instant: DateTime<Utc>) -> DateTime<Utc> {
    // ---
    instant.trunc_subsecs(0)
}

/// The `[start, end]` range used by the initial bulk fetch.
pub fn fetch_range(now: DateTime<Utc>, window: Duration) -> (DateTime<Utc>, DateTime<Utc>) {
    // ---
    let end = truncate_to_seconds(now);
    (end - window, end)
}
