//! Calendar-day keys and streak computation
//!
//! Completions are keyed by UTC calendar day (YYYY-MM-DD). Streaks are
//! recomputed from the full day set on every completion; the set is small
//! (one entry per active day) and the scan is index-backed.

use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeSet;

/// Today's UTC day key, YYYY-MM-DD
pub fn today_key() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Parse a day key back to a date
pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
}

/// Current and longest streaks over a set of completion days.
///
/// The current streak is the run of consecutive days ending today, or ending
/// yesterday when today has no completion yet (completing today extends it
/// rather than restarting at 1).
pub fn compute_streaks(days: &BTreeSet<NaiveDate>, today: NaiveDate) -> (i64, i64) {
    if days.is_empty() {
        return (0, 0);
    }

    let mut longest: i64 = 0;
    let mut run: i64 = 0;
    let mut prev: Option<NaiveDate> = None;

    for &day in days {
        run = match prev {
            Some(p) if day == p + Duration::days(1) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        prev = Some(day);
    }

    // Current streak: the final run, if it reaches today or yesterday
    let current = match days.iter().next_back() {
        Some(&last) if last == today || last == today - Duration::days(1) => run,
        _ => 0,
    };

    (current, longest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn set(days: &[&str]) -> BTreeSet<NaiveDate> {
        days.iter().map(|s| d(s)).collect()
    }

    #[test]
    fn test_empty() {
        assert_eq!(compute_streaks(&BTreeSet::new(), d("2026-02-10")), (0, 0));
    }

    #[test]
    fn test_single_day_today() {
        let days = set(&["2026-02-10"]);
        assert_eq!(compute_streaks(&days, d("2026-02-10")), (1, 1));
    }

    #[test]
    fn test_run_ending_today() {
        let days = set(&["2026-02-08", "2026-02-09", "2026-02-10"]);
        assert_eq!(compute_streaks(&days, d("2026-02-10")), (3, 3));
    }

    #[test]
    fn test_run_ending_yesterday_still_current() {
        let days = set(&["2026-02-08", "2026-02-09"]);
        assert_eq!(compute_streaks(&days, d("2026-02-10")), (2, 2));
    }

    #[test]
    fn test_stale_run_is_not_current() {
        let days = set(&["2026-02-01", "2026-02-02", "2026-02-03"]);
        assert_eq!(compute_streaks(&days, d("2026-02-10")), (0, 3));
    }

    #[test]
    fn test_longest_in_the_past() {
        let days = set(&[
            "2026-01-01",
            "2026-01-02",
            "2026-01-03",
            "2026-01-04",
            "2026-02-09",
            "2026-02-10",
        ]);
        assert_eq!(compute_streaks(&days, d("2026-02-10")), (2, 4));
    }

    #[test]
    fn test_gap_resets_run() {
        let days = set(&["2026-02-06", "2026-02-08", "2026-02-10"]);
        assert_eq!(compute_streaks(&days, d("2026-02-10")), (1, 1));
    }

    #[test]
    fn test_month_boundary() {
        let days = set(&["2026-01-31", "2026-02-01"]);
        assert_eq!(compute_streaks(&days, d("2026-02-01")), (2, 2));
    }

    #[test]
    fn test_day_key_roundtrip() {
        let key = today_key();
        assert!(parse_day_key(&key).is_some());
        assert_eq!(parse_day_key("2026-02-30"), None);
        assert_eq!(parse_day_key("not-a-day"), None);
    }
}
