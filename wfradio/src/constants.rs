//! Default tuning parameters for the synchronization engine.
//!
//! Every value here is the fallback used when `config.yaml` does not say
//! otherwise (see [`crate::config_ext::WildflowerConfigExt`]).

use std::time::Duration;

// ============================================================================
// Endpoints
// ============================================================================

/// Backend serving the position and station endpoints
pub const DEFAULT_BASE_URL: &str = "https://wildflower-radio-zj59.onrender.com";

/// Path returning every station's track and current segment in one object
pub const DEFAULT_POSITIONS_PATH: &str = "/getAllTrackInformation";

/// Path returning the station directory
pub const DEFAULT_STATIONS_PATH: &str = "/getAllStations";

/// HTTP timeout for both endpoints (seconds)
///
/// Kept below the poll interval multiple so a hung request cannot pile up
/// more than a few skipped polls.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// User agent sent to the backend
pub const USER_AGENT: &str = concat!("wfradio/", env!("CARGO_PKG_VERSION"));

// ============================================================================
// Timers
// ============================================================================

/// Position poll interval (milliseconds)
///
/// Value: 1 second, the cadence the backend updates positions at
pub const POLL_INTERVAL_MS: u64 = 1000;

/// Progress tick interval (milliseconds)
///
/// Drives end-of-segment detection and the predictive switch.
pub const PROGRESS_INTERVAL_MS: u64 = 200;

pub fn poll_interval() -> Duration {
    Duration::from_millis(POLL_INTERVAL_MS)
}

pub fn progress_interval() -> Duration {
    Duration::from_millis(PROGRESS_INTERVAL_MS)
}

// ============================================================================
// Synchronization
// ============================================================================

/// Seconds subtracted from the server position on the initial seek
///
/// Starting slightly behind leaves room for the first chunk to buffer.
pub const BUFFER_SECONDS: f64 = 3.0;

/// Maximum tolerated |local - server| before a corrective seek (seconds)
pub const DRIFT_TOLERANCE_SECONDS: f64 = 1.0;

/// Remaining time at which the warmed segment is started early (seconds)
///
/// 0 disables the predictive switch; hand-off then waits for the natural end.
pub const PREDICTIVE_WINDOW_SECONDS: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_ordering() {
        assert!(progress_interval() < poll_interval());
        assert!(Duration::from_secs(DEFAULT_TIMEOUT_SECS) > poll_interval());
    }

    #[test]
    fn test_sync_values_are_sane() {
        assert!(BUFFER_SECONDS >= 0.0);
        assert!(DRIFT_TOLERANCE_SECONDS > 0.0);
        assert!(PREDICTIVE_WINDOW_SECONDS < DRIFT_TOLERANCE_SECONDS);
        assert!(DEFAULT_POSITIONS_PATH.starts_with('/'));
        assert!(DEFAULT_STATIONS_PATH.starts_with('/'));
    }
}
