use chrono::{DateTime, Utc};

pub fn format_timestamp(value: Option<DateTime<Utc>>) -> String {
    value
        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// `"{m}m {s}s"`, or `"{s}s"` under a minute. Empty when unknown.
pub fn format_duration_ms(value: Option<f64>) -> String {
    let Some(ms) = value.filter(|v| v.is_finite()) else {
        return String::new();
    };
    let total_seconds = (ms / 1000.0).round() as i64;
    let (minutes, seconds) = (total_seconds / 60, total_seconds % 60);
    if minutes != 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_drop_seconds() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 7, 59).unwrap();
        assert_eq!(format_timestamp(Some(ts)), "2024-05-01 09:07");
        assert_eq!(format_timestamp(None), "");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration_ms(Some(61_000.0)), "1m 1s");
        assert_eq!(format_duration_ms(Some(4_400.0)), "4s");
        assert_eq!(format_duration_ms(Some(120_000.0)), "2m 0s");
        assert_eq!(format_duration_ms(None), "");
        assert_eq!(format_duration_ms(Some(f64::NAN)), "");
    }
}
