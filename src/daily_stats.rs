//! Calendar helpers for daily activity and reading streaks.

use std::collections::HashMap;

use chrono::{Duration, Local, NaiveDate};

use crate::local_db_model::DailyStat;

/// How far back streaks are searched.
pub const STREAK_LOOKBACK_DAYS: i64 = 365;

pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn date_key(date: NaiveDate) -> String {
    date.format(DATE_KEY_FORMAT).to_string()
}

/// Key of the current local calendar day.
pub fn today_key() -> String {
    date_key(today())
}

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn parse_date_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DATE_KEY_FORMAT).ok()
}

fn is_active(stats: &HashMap<String, DailyStat>, day: NaiveDate) -> bool {
    stats
        .get(&date_key(day))
        .map(DailyStat::has_activity)
        .unwrap_or(false)
}

/// Consecutive active days ending at `today`. Zero when today is idle.
pub fn current_streak(stats: &HashMap<String, DailyStat>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    for offset in 0..STREAK_LOOKBACK_DAYS {
        if !is_active(stats, today - Duration::days(offset)) {
            break;
        }
        streak += 1;
    }
    streak
}

/// Longest run of active days within the lookback window.
pub fn best_streak(stats: &HashMap<String, DailyStat>, today: NaiveDate) -> u32 {
    let mut best = current_streak(stats, today);
    let mut run = 0;
    for offset in 0..STREAK_LOOKBACK_DAYS {
        if is_active(stats, today - Duration::days(offset)) {
            run += 1;
            best = best.max(run);
        } else {
            run = 0;
        }
    }
    best
}

/// Inclusive on both ends; keys compare lexicographically because of the fixed format.
pub fn in_range(date: &str, start: &str, end: &str) -> bool {
    date >= start && date <= end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats_for(days: &[&str]) -> HashMap<String, DailyStat> {
        days.iter()
            .map(|d| {
                let mut stat = DailyStat::empty(*d);
                stat.minutes_read = 3;
                (d.to_string(), stat)
            })
            .collect()
    }

    fn day(key: &str) -> NaiveDate {
        parse_date_key(key).unwrap()
    }

    #[test]
    fn streak_counts_back_from_today() {
        let stats = stats_for(&["2026-10-14", "2026-10-15", "2026-10-16"]);
        assert_eq!(current_streak(&stats, day("2026-10-16")), 3);
        assert_eq!(current_streak(&stats, day("2026-10-17")), 0);
    }

    #[test]
    fn idle_record_breaks_the_streak() {
        let mut stats = stats_for(&["2026-10-14", "2026-10-16"]);
        stats.insert("2026-10-15".into(), DailyStat::empty("2026-10-15"));
        assert_eq!(current_streak(&stats, day("2026-10-16")), 1);
    }

    #[test]
    fn best_streak_finds_older_runs() {
        let stats = stats_for(&[
            "2026-10-01",
            "2026-10-02",
            "2026-10-03",
            "2026-10-04",
            "2026-10-16",
        ]);
        assert_eq!(current_streak(&stats, day("2026-10-16")), 1);
        assert_eq!(best_streak(&stats, day("2026-10-16")), 4);
    }

    #[test]
    fn range_is_inclusive() {
        assert!(in_range("2026-10-01", "2026-10-01", "2026-10-31"));
        assert!(in_range("2026-10-31", "2026-10-01", "2026-10-31"));
        assert!(!in_range("2026-11-01", "2026-10-01", "2026-10-31"));
        assert_eq!(date_key(day("2026-02-03")), "2026-02-03");
    }
}
