//! Record shapes persisted by taskloop
//!
//! Field names are camelCase on disk. Reading is lenient so that backups
//! written by the browser popup also load: its remote id is `supabaseId`,
//! `startTime` turns into a millisecond timestamp once a task has run, and
//! older records may lack `createdAt` or `scheduledDate`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lifecycle of a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Paused,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
        };
        f.write_str(label)
    }
}

/// Identifier assigned by the remote backend.
///
/// REST backends hand out either integer keys or text keys (uuids), so both
/// are accepted and rendered verbatim in `id=eq.<id>` filters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RemoteId {
    Int(i64),
    Text(String),
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteId::Int(id) => write!(f, "{}", id),
            RemoteId::Text(id) => f.write_str(id),
        }
    }
}

/// A timed task scheduled for one calendar date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredTask")]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Planned duration in minutes
    pub duration: u32,
    /// Wall-clock start the user planned, e.g. "09:30"
    pub start_time: Option<String>,
    pub status: TaskStatus,
    /// Epoch milliseconds
    pub created_at: i64,
    /// `YYYY-MM-DD`
    pub scheduled_date: String,
    /// Epoch milliseconds at which the current countdown began
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<i64>,
    /// Milliseconds left on the countdown when it (re)started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
}

/// String or number, whichever a writer happened to use
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(n) => Some(*n),
            Scalar::Float(f) if f.is_finite() => Some(f.round() as i64),
            Scalar::Float(_) => None,
            Scalar::Text(text) => text.trim().parse().ok(),
        }
    }

    fn into_text(self) -> String {
        match self {
            Scalar::Int(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(text) => text,
        }
    }
}

/// Task as found on disk or in a backup, before defaults are filled in
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StoredTask {
    id: Option<Scalar>,
    name: Option<String>,
    duration: Option<Scalar>,
    start_time: Option<Scalar>,
    status: Option<TaskStatus>,
    created_at: Option<Scalar>,
    scheduled_date: Option<String>,
    started_at: Option<Scalar>,
    remaining_time: Option<Scalar>,
    #[serde(alias = "supabaseId")]
    remote_id: Option<RemoteId>,
}

impl From<StoredTask> for Task {
    fn from(stored: StoredTask) -> Self {
        // A numeric startTime is the moment the countdown began
        let (start_time, started_from_start_time) = match stored.start_time {
            Some(Scalar::Text(clock)) => (Some(clock), None),
            Some(other) => (None, other.as_i64()),
            None => (None, None),
        };
        let created_at = stored
            .created_at
            .as_ref()
            .and_then(Scalar::as_i64)
            .unwrap_or(0);
        let scheduled_date = stored
            .scheduled_date
            .filter(|date| !date.trim().is_empty())
            .or_else(|| {
                (created_at > 0)
                    .then(|| crate::dates::local_date_of(created_at))
                    .flatten()
                    .map(crate::dates::format_date)
            })
            .unwrap_or_default();

        Task {
            id: stored.id.map(Scalar::into_text).unwrap_or_default(),
            name: stored.name.unwrap_or_default(),
            duration: stored
                .duration
                .as_ref()
                .and_then(Scalar::as_i64)
                .and_then(|minutes| u32::try_from(minutes).ok())
                .unwrap_or(0),
            start_time,
            status: stored.status.unwrap_or_default(),
            created_at,
            scheduled_date,
            started_at: stored
                .started_at
                .as_ref()
                .and_then(Scalar::as_i64)
                .or(started_from_start_time),
            remaining_time: stored.remaining_time.as_ref().and_then(Scalar::as_i64),
            remote_id: stored.remote_id,
        }
    }
}

/// Input for creating a task; unset fields receive defaults
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: String,
    pub duration: u32,
    pub start_time: Option<String>,
    pub status: Option<TaskStatus>,
    pub scheduled_date: Option<String>,
}

/// Partial task update. `None` leaves the stored field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub duration: Option<u32>,
    pub start_time: Option<String>,
    pub status: Option<TaskStatus>,
    pub scheduled_date: Option<String>,
    pub started_at: Option<i64>,
    pub remaining_time: Option<i64>,
}

impl TaskPatch {
    pub fn apply(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(duration) = self.duration {
            task.duration = duration;
        }
        if let Some(start_time) = &self.start_time {
            task.start_time = Some(start_time.clone());
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(date) = &self.scheduled_date {
            task.scheduled_date = date.clone();
        }
        if let Some(started_at) = self.started_at {
            task.started_at = Some(started_at);
        }
        if let Some(remaining) = self.remaining_time {
            task.remaining_time = Some(remaining);
        }
    }
}

/// Snapshot of a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub task: Task,
    /// Epoch milliseconds
    #[serde(default)]
    pub completed_at: i64,
    /// Minutes actually spent
    #[serde(default)]
    pub actual_duration: u32,
}

/// A daily habit counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Streak {
    pub id: String,
    pub task_name: String,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub last_completed_date: Option<String>,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, alias = "supabaseId", skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreakPatch {
    pub task_name: Option<String>,
    pub current_streak: Option<u32>,
    pub last_completed_date: Option<String>,
}

impl StreakPatch {
    pub fn apply(&self, streak: &mut Streak) {
        if let Some(name) = &self.task_name {
            streak.task_name = name.clone();
        }
        if let Some(count) = self.current_streak {
            streak.current_streak = count;
        }
        if let Some(date) = &self.last_completed_date {
            streak.last_completed_date = Some(date.clone());
        }
    }
}

/// An unscheduled to-do item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTask {
    pub id: String,
    pub task_name: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default, alias = "supabaseId", skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingTaskPatch {
    pub task_name: Option<String>,
    pub completed: Option<bool>,
}

impl PendingTaskPatch {
    pub fn apply(&self, item: &mut PendingTask) {
        if let Some(name) = &self.task_name {
            item.task_name = name.clone();
        }
        if let Some(completed) = self.completed {
            item.completed = completed;
        }
    }
}

/// Flat option map, always read merged over [`default_settings`]
pub type Settings = Map<String, Value>;

pub fn default_settings() -> Settings {
    let mut settings = Map::new();
    settings.insert("badgeFormat".into(), Value::from("time"));
    settings.insert("showBadgeWhenIdle".into(), Value::from(false));
    settings.insert("enableNotifications".into(), Value::from(true));
    settings.insert("notifyBeforeEnd".into(), Value::from(true));
    settings.insert("notificationSound".into(), Value::from("default"));
    settings.insert("autoStartNext".into(), Value::from(false));
    settings.insert("allowOvertime".into(), Value::from(true));
    settings.insert("defaultDuration".into(), Value::from(30));
    settings.insert("historyRetention".into(), Value::from(30));
    settings
}

/// Backup document written by `export` and read by `import`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub tasks: Vec<Task>,
    pub task_history: Vec<HistoryEntry>,
    pub settings: Settings,
    pub export_date: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub streaks: Option<Vec<Streak>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_tasks: Option<Vec<PendingTask>>,
}

pub const EXPORT_VERSION: &str = "1.0.0";

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn task_uses_camel_case_keys() {
        let task = Task {
            id: "1".into(),
            name: "Write report".into(),
            duration: 30,
            start_time: None,
            status: TaskStatus::Pending,
            created_at: 1_700_000_000_000,
            scheduled_date: "2026-10-19".into(),
            started_at: None,
            remaining_time: None,
            remote_id: Some(RemoteId::Int(7)),
        };

        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(value["scheduledDate"], "2026-10-19");
        assert_eq!(value["createdAt"], 1_700_000_000_000_i64);
        assert_eq!(value["status"], "pending");
        assert_eq!(value["remoteId"], 7);
        assert!(value.get("startedAt").is_none());
    }

    #[test]
    fn history_entry_flattens_task() {
        let raw = serde_json::json!({
            "id": "abc",
            "name": "Read",
            "duration": 20,
            "status": "completed",
            "createdAt": 1,
            "scheduledDate": "2026-10-18",
            "completedAt": 2,
            "actualDuration": 25
        });

        let entry: HistoryEntry = serde_json::from_value(raw).unwrap();
        assert_eq!(entry.task.name, "Read");
        assert_eq!(entry.task.status, TaskStatus::Completed);
        assert_eq!(entry.actual_duration, 25);
    }

    #[test]
    fn remote_id_accepts_text_and_integers() {
        let int: RemoteId = serde_json::from_value(serde_json::json!(12)).unwrap();
        let text: RemoteId = serde_json::from_value(serde_json::json!("a-b")).unwrap();
        assert_eq!(int.to_string(), "12");
        assert_eq!(text.to_string(), "a-b");
    }

    #[test]
    fn task_patch_only_touches_set_fields() {
        let mut task = Task {
            id: "1".into(),
            name: "Old".into(),
            duration: 10,
            start_time: Some("08:00".into()),
            status: TaskStatus::Pending,
            created_at: 0,
            scheduled_date: "2026-10-19".into(),
            started_at: None,
            remaining_time: None,
            remote_id: None,
        };
        let before = task.clone();

        TaskPatch {
            status: Some(TaskStatus::Running),
            ..Default::default()
        }
        .apply(&mut task);

        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(
            Task {
                status: TaskStatus::Running,
                ..before
            },
            task
        );
    }

    #[test]
    fn reads_popup_task_layout() {
        let raw = serde_json::json!({
            "id": "lx1abc",
            "name": "Write report",
            "duration": 30,
            "startTime": 1_760_000_000_000_i64,
            "status": "running",
            "remainingTime": 1_800_000,
            "supabaseId": 41
        });

        let task: Task = serde_json::from_value(raw).unwrap();
        assert_eq!(task.start_time, None);
        assert_eq!(task.started_at, Some(1_760_000_000_000));
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.remote_id, Some(RemoteId::Int(41)));
        assert_eq!(task.created_at, 0);
        assert_eq!(task.scheduled_date, "");
    }

    #[test]
    fn missing_scheduled_date_comes_from_creation_day() {
        let day = chrono::NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let created_at = crate::dates::start_of_day_ms(day).unwrap() + 3_600_000;
        let raw = serde_json::json!({
            "id": 7,
            "name": "Stretch",
            "duration": "15",
            "startTime": "07:30",
            "createdAt": created_at
        });

        let task: Task = serde_json::from_value(raw).unwrap();
        assert_eq!(task.id, "7");
        assert_eq!(task.duration, 15);
        assert_eq!(task.start_time.as_deref(), Some("07:30"));
        assert_eq!(task.scheduled_date, "2026-10-18");
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn stored_layout_reads_back_unchanged() {
        let task = Task {
            id: "1".into(),
            name: "Read".into(),
            duration: 20,
            start_time: Some("08:15".into()),
            status: TaskStatus::Paused,
            created_at: 5,
            scheduled_date: "2026-10-19".into(),
            started_at: Some(9),
            remaining_time: Some(60_000),
            remote_id: Some(RemoteId::Text("r-1".into())),
        };
        let value = serde_json::to_value(&task).unwrap();
        assert_eq!(serde_json::from_value::<Task>(value).unwrap(), task);
    }
}
