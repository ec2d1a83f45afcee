//! Countdown for the current task, recomputed on every read

use crate::models::{Task, TaskStatus};

pub const MS_PER_MINUTE: i64 = 60_000;

/// Remaining time at the start of the countdown
pub fn planned_remaining_ms(task: &Task) -> i64 {
    task.remaining_time
        .unwrap_or(i64::from(task.duration) * MS_PER_MINUTE)
}

/// Milliseconds left at `now_ms`, floored at zero.
///
/// Only a running task with a start timestamp counts down; otherwise the
/// stored remaining time is returned unchanged.
pub fn remaining_ms(task: &Task, now_ms: i64) -> i64 {
    let planned = planned_remaining_ms(task);
    match (task.status, task.started_at) {
        (TaskStatus::Running, Some(started)) => {
            let elapsed = now_ms.saturating_sub(started).max(0);
            planned.saturating_sub(elapsed).max(0)
        }
        _ => planned.max(0),
    }
}

/// Whether a countdown should be shown at all
pub fn is_counting_down(current: Option<&Task>) -> bool {
    current.is_some_and(|task| task.status == TaskStatus::Running)
}

/// `m:ss`
pub fn format_countdown(ms: i64) -> String {
    let ms = ms.max(0);
    let minutes = ms / MS_PER_MINUTE;
    let seconds = (ms % MS_PER_MINUTE) / 1000;
    format!("{}:{:02}", minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(duration: u32, started_at: i64) -> Task {
        Task {
            id: "t".into(),
            name: "Focus".into(),
            duration,
            start_time: None,
            status: TaskStatus::Running,
            created_at: 0,
            scheduled_date: "2026-10-19".into(),
            started_at: Some(started_at),
            remaining_time: Some(i64::from(duration) * MS_PER_MINUTE),
            remote_id: None,
        }
    }

    #[test]
    fn counts_down_from_start() {
        let task = running(25, 1_000);
        assert_eq!(remaining_ms(&task, 1_000), 25 * MS_PER_MINUTE);
        assert_eq!(remaining_ms(&task, 61_000), 24 * MS_PER_MINUTE);
    }

    #[test]
    fn floors_at_zero() {
        let task = running(1, 0);
        assert_eq!(remaining_ms(&task, 10 * MS_PER_MINUTE), 0);
    }

    #[test]
    fn paused_task_holds_its_remaining_time() {
        let mut task = running(10, 0);
        task.status = TaskStatus::Paused;
        task.remaining_time = Some(90_000);
        assert_eq!(remaining_ms(&task, 5 * MS_PER_MINUTE), 90_000);
        assert!(!is_counting_down(Some(&task)));
    }

    #[test]
    fn falls_back_to_duration_without_remaining_time() {
        let mut task = running(5, 0);
        task.remaining_time = None;
        assert_eq!(planned_remaining_ms(&task), 5 * MS_PER_MINUTE);
    }

    #[test]
    fn countdown_format() {
        assert_eq!(format_countdown(0), "0:00");
        assert_eq!(format_countdown(65_500), "1:05");
        assert_eq!(format_countdown(25 * MS_PER_MINUTE), "25:00");
        assert_eq!(format_countdown(-3), "0:00");
    }
}
