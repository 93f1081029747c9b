//! Timestamp helpers.

use chrono::{DateTime, Utc};

/// Represents a timestamp that can be serialized/deserialized.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an ISO 8601 formatted string.
///
/// Format: `YYYY-MM-DDTHH:MM:SS.ffffff+00:00`
///
/// # Examples
///
/// ```
/// use shipline::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with("+00:00"));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Milliseconds between two timestamps, clamped at zero.
#[must_use]
pub fn duration_ms(start: Timestamp, end: Timestamp) -> f64 {
    let micros = (end - start).num_microseconds().unwrap_or(i64::MAX).max(0);
    #[allow(clippy::cast_precision_loss)]
    let ms = micros as f64 / 1000.0;
    ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_duration_ms() {
        let start = now_utc();
        let end = start + Duration::milliseconds(1500);
        assert!((duration_ms(start, end) - 1500.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_duration_ms_clamps_negative() {
        let start = now_utc();
        let end = start - Duration::seconds(1);
        assert!(duration_ms(start, end).abs() < f64::EPSILON);
    }
}
