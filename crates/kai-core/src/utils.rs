use chrono::Utc;

// ============== Timestamp Helpers ==============

/// Milliseconds since the Unix epoch (event log timestamps).
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

// ============== Text Helpers ==============

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// `1h 2m 3s` style duration (hours omitted when zero).
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let mins = (seconds % 3600) / 60;
    let secs = seconds % 60;
    if hours > 0 {
        return format!("{hours}h {mins}m {secs}s");
    }
    if mins > 0 {
        return format!("{mins}m {secs}s");
    }
    format!("{secs}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "a".repeat(510);
        let t = truncate_text(&s, 500);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), 503);
        assert_eq!(truncate_text("short", 500), "short");
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(5), "5s");
        assert_eq!(format_duration(65), "1m 5s");
        assert_eq!(format_duration(3 * 3600 + 61), "3h 1m 1s");
    }
}
