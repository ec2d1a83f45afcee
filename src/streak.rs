//! Day-boundary rule for habit streaks

use chrono::NaiveDate;
use thiserror::Error;

use crate::dates;
use crate::models::Streak;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StreakError {
    #[error("streak already completed on {0}")]
    AlreadyCompleted(String),

    #[error("streak not found: {0}")]
    NotFound(String),

    #[error("failed to save streak {0}")]
    Storage(String),
}

/// Count the streak should hold once completed on `today`.
///
/// Same day is rejected, the day after the last completion extends the run,
/// anything else (never completed, a gap, an unreadable date) starts over at 1.
pub fn next_count(streak: &Streak, today: NaiveDate) -> Result<u32, StreakError> {
    let last = streak
        .last_completed_date
        .as_deref()
        .and_then(dates::parse_date);

    match last {
        Some(day) if day == today => Err(StreakError::AlreadyCompleted(dates::format_date(today))),
        Some(day) if today.pred_opt() == Some(day) => Ok(streak.current_streak.saturating_add(1)),
        _ => Ok(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn streak(count: u32, last: Option<&str>) -> Streak {
        Streak {
            id: "s1".into(),
            task_name: "Stretch".into(),
            current_streak: count,
            last_completed_date: last.map(String::from),
            created_at: 0,
            remote_id: None,
        }
    }

    #[test]
    fn yesterday_extends() {
        let s = streak(4, Some("2026-10-18"));
        assert_eq!(next_count(&s, day(2026, 10, 19)), Ok(5));
    }

    #[test]
    fn across_month_boundary() {
        let s = streak(9, Some("2026-09-30"));
        assert_eq!(next_count(&s, day(2026, 10, 1)), Ok(10));
    }

    #[test]
    fn same_day_is_rejected() {
        let s = streak(2, Some("2026-10-19"));
        assert_eq!(
            next_count(&s, day(2026, 10, 19)),
            Err(StreakError::AlreadyCompleted("2026-10-19".into()))
        );
    }

    #[test]
    fn gap_resets() {
        let s = streak(12, Some("2026-10-17"));
        assert_eq!(next_count(&s, day(2026, 10, 19)), Ok(1));
    }

    #[test]
    fn never_completed_starts_at_one() {
        assert_eq!(next_count(&streak(0, None), day(2026, 10, 19)), Ok(1));
    }

    #[test]
    fn future_last_date_resets() {
        let s = streak(3, Some("2026-10-25"));
        assert_eq!(next_count(&s, day(2026, 10, 19)), Ok(1));
    }
}
