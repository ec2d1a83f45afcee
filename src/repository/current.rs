//! The single "currently running task" slot and the start/pause/complete
//! flow built on it.
//!
//! The slot and the task collection are separate stored values. Writing the
//! slot is followed by a task update; the two writes are not atomic.

use crate::models::{HistoryEntry, Task, TaskPatch, TaskStatus};
use crate::store::keys;
use crate::timer;

use super::Repository;

impl Repository {
    pub async fn get_current_task(&self) -> Option<Task> {
        match self.store.get::<Task>(keys::CURRENT_TASK).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read current task");
                None
            }
        }
    }

    /// Replace the slot and mirror status and timer fields onto the task
    pub async fn set_current_task(&self, task: &Task) -> bool {
        if let Err(e) = self.store.set(keys::CURRENT_TASK, task).await {
            tracing::error!(error = %e, "Failed to save current task");
            return false;
        }

        if !task.id.is_empty() {
            self.update_task(
                &task.id,
                TaskPatch {
                    status: Some(task.status),
                    started_at: task.started_at,
                    remaining_time: task.remaining_time,
                    ..Default::default()
                },
            )
            .await;
        }
        true
    }

    pub async fn clear_current_task(&self) -> bool {
        match self.store.remove(keys::CURRENT_TASK).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Failed to clear current task");
                false
            }
        }
    }

    /// Begin or resume the countdown of a task.
    ///
    /// Another running task in the slot is paused first so at most one task
    /// is running.
    pub async fn start_task(&self, id: &str, now_ms: i64) -> Option<Task> {
        if let Some(current) = self.get_current_task().await
            && current.status == TaskStatus::Running
            && current.id != id
        {
            self.pause_current(now_ms).await;
        }

        let Some(task) = self.get_task(id).await else {
            tracing::error!(task_id = id, "Cannot start unknown task");
            return None;
        };

        let snapshot = Task {
            status: TaskStatus::Running,
            started_at: Some(now_ms),
            remaining_time: Some(timer::planned_remaining_ms(&task)),
            ..task
        };

        if !self.set_current_task(&snapshot).await {
            return None;
        }
        tracing::info!(task_id = id, "Task started");
        Some(snapshot)
    }

    /// Freeze the running countdown at its current remaining time
    pub async fn pause_current(&self, now_ms: i64) -> Option<Task> {
        let current = self.get_current_task().await?;
        if current.status != TaskStatus::Running {
            tracing::debug!(task_id = %current.id, status = %current.status, "Current task is not running");
            return None;
        }

        let snapshot = Task {
            status: TaskStatus::Paused,
            remaining_time: Some(timer::remaining_ms(&current, now_ms)),
            ..current
        };

        if !self.set_current_task(&snapshot).await {
            return None;
        }
        tracing::info!(task_id = %snapshot.id, "Task paused");
        Some(snapshot)
    }

    /// Mark the slot's task completed, record it in history, empty the slot
    pub async fn complete_current(&self, actual_duration: Option<u32>) -> Option<HistoryEntry> {
        let current = self.get_current_task().await?;

        let updated = self
            .update_task(
                &current.id,
                TaskPatch {
                    status: Some(TaskStatus::Completed),
                    ..Default::default()
                },
            )
            .await;
        // The task may have been deleted while it was running
        let completed = updated.unwrap_or(Task {
            status: TaskStatus::Completed,
            ..current
        });

        let entry = self.add_to_history(&completed, actual_duration).await;
        // The task is already marked completed, so the slot must not keep it running
        self.clear_current_task().await;
        match &entry {
            Some(_) => tracing::info!(task_id = %completed.id, "Task completed"),
            None => tracing::error!(
                task_id = %completed.id,
                "Task completed but missing from history"
            ),
        }
        entry
    }
}
