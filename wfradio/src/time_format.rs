//! Elapsed/total time rendering for the now-playing view.

/// Format a number of seconds as `H:MM:SS`, or `M:SS` under one hour
///
/// Fractions are truncated; negative and non-finite inputs render as `0:00`.
///
/// ```
/// use wfradio::format_time;
///
/// assert_eq!(format_time(65.0), "1:05");
/// assert_eq!(format_time(3661.0), "1:01:01");
/// ```
pub fn format_time(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };

    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(65.0), "1:05");
        assert_eq!(format_time(3661.0), "1:01:01");
        assert_eq!(format_time(599.9), "9:59");
        assert_eq!(format_time(3600.0), "1:00:00");
        assert_eq!(format_time(36000.0 + 59.0), "10:00:59");
    }

    #[test]
    fn test_format_time_degenerate_inputs() {
        assert_eq!(format_time(-4.0), "0:00");
        assert_eq!(format_time(f64::NAN), "0:00");
        assert_eq!(format_time(f64::INFINITY), "0:00");
    }
}
