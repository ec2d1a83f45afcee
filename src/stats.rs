//! Summary figures over completed-task history

use chrono::NaiveDate;
use std::collections::HashSet;

use crate::dates;
use crate::models::HistoryEntry;

/// Sum of actual minutes spent
pub fn total_minutes(history: &[HistoryEntry]) -> u64 {
    history.iter().map(|e| u64::from(e.actual_duration)).sum()
}

/// How closely actual time matched the plan, as a rounded percentage.
///
/// Each entry scores `min(planned/actual, actual/planned)`; entries with a
/// zero on either side are skipped.
pub fn average_accuracy(history: &[HistoryEntry]) -> u32 {
    let scores: Vec<f64> = history
        .iter()
        .filter(|e| e.actual_duration > 0 && e.task.duration > 0)
        .map(|e| {
            let planned = f64::from(e.task.duration);
            let actual = f64::from(e.actual_duration);
            (planned / actual).min(actual / planned) * 100.0
        })
        .collect();

    if scores.is_empty() {
        return 0;
    }
    (scores.iter().sum::<f64>() / scores.len() as f64).round() as u32
}

/// Consecutive days, counting back from `today`, with at least one completion.
///
/// A today without completions yet does not break the run.
pub fn streak_days(history: &[HistoryEntry], today: NaiveDate) -> u32 {
    let days: HashSet<NaiveDate> = history
        .iter()
        .filter_map(|e| dates::local_date_of(e.completed_at))
        .collect();

    let mut day = if days.contains(&today) {
        today
    } else {
        match today.pred_opt() {
            Some(yesterday) => yesterday,
            None => return 0,
        }
    };

    let mut streak = 0;
    while days.contains(&day) {
        streak += 1;
        match day.pred_opt() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// `45m`, `2h`, `1h 30m`
pub fn format_minutes(minutes: u64) -> String {
    let hours = minutes / 60;
    let mins = minutes % 60;
    match (hours, mins) {
        (0, m) => format!("{}m", m),
        (h, 0) => format!("{}h", h),
        (h, m) => format!("{}h {}m", h, m),
    }
}
