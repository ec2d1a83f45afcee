use chrono::NaiveDate;

use crate::dates;
use crate::models::{HistoryEntry, Task, TaskPatch};
use crate::remote::Table;
use crate::store::{StoreError, keys};

use super::Repository;

const MS_PER_DAY: i64 = 86_400_000;

impl Repository {
    async fn load_history(&self) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .store
            .get::<Vec<HistoryEntry>>(keys::TASK_HISTORY)
            .await?
            .unwrap_or_default())
    }

    pub async fn get_task_history(&self) -> Vec<HistoryEntry> {
        match self.load_history().await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read task history");
                Vec::new()
            }
        }
    }

    /// Append a completed task.
    ///
    /// `actual_duration` falls back to the planned duration when absent or
    /// zero. A mirrored task whose actual time differs gets its remote
    /// duration patched.
    pub async fn add_to_history(
        &self,
        task: &Task,
        actual_duration: Option<u32>,
    ) -> Option<HistoryEntry> {
        let entry = HistoryEntry {
            task: task.clone(),
            completed_at: dates::now_ms(),
            actual_duration: actual_duration
                .filter(|minutes| *minutes > 0)
                .unwrap_or(task.duration),
        };

        {
            let _guard = self.store.lock(keys::TASK_HISTORY).await;
            let mut history = match self.load_history().await {
                Ok(history) => history,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read task history");
                    return None;
                }
            };
            history.push(entry.clone());
            if let Err(e) = self.store.set(keys::TASK_HISTORY, &history).await {
                tracing::error!(error = %e, "Failed to save task history");
                return None;
            }
        }

        tracing::info!(
            task_id = %task.id,
            planned = task.duration,
            actual = entry.actual_duration,
            "Task added to history"
        );

        if let Some(remote_id) = &task.remote_id
            && entry.actual_duration != task.duration
        {
            self.mirror_update(
                Table::Tasks,
                remote_id.clone(),
                TaskPatch {
                    duration: Some(entry.actual_duration),
                    ..Default::default()
                },
            );
        }

        Some(entry)
    }

    /// Entries completed on a local calendar day
    pub async fn history_by_date(&self, date: NaiveDate) -> Vec<HistoryEntry> {
        let Some(start) = dates::start_of_day_ms(date) else {
            return Vec::new();
        };
        let end = date
            .succ_opt()
            .and_then(dates::start_of_day_ms)
            .unwrap_or(start + MS_PER_DAY);
        self.history_by_range(start, end - 1).await
    }

    /// Entries completed within `[start_ms, end_ms]`
    pub async fn history_by_range(&self, start_ms: i64, end_ms: i64) -> Vec<HistoryEntry> {
        self.get_task_history()
            .await
            .into_iter()
            .filter(|e| e.completed_at >= start_ms && e.completed_at <= end_ms)
            .collect()
    }

    /// Drop entries older than `retention_days`; `0` keeps everything.
    ///
    /// Returns how many entries were removed.
    pub async fn prune_history(&self, retention_days: u32, now_ms: i64) -> Option<usize> {
        if retention_days == 0 {
            return Some(0);
        }
        let cutoff = now_ms - i64::from(retention_days) * MS_PER_DAY;

        let _guard = self.store.lock(keys::TASK_HISTORY).await;
        let mut history = match self.load_history().await {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read task history");
                return None;
            }
        };

        let before = history.len();
        history.retain(|e| e.completed_at >= cutoff);
        let removed = before - history.len();
        if removed == 0 {
            return Some(0);
        }

        if let Err(e) = self.store.set(keys::TASK_HISTORY, &history).await {
            tracing::error!(error = %e, "Failed to save task history");
            return None;
        }
        tracing::info!(removed, retention_days, "Old history pruned");
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{local_repo, mirrored_repo};
    use super::*;
    use crate::models::{NewTask, TaskStatus};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn seed(repo: &Repository, entries: &[(i64, u32)]) {
        let history: Vec<HistoryEntry> = entries
            .iter()
            .enumerate()
            .map(|(i, (completed_at, minutes))| HistoryEntry {
                task: Task {
                    id: i.to_string(),
                    name: format!("task {}", i),
                    duration: *minutes,
                    start_time: None,
                    status: TaskStatus::Completed,
                    created_at: 0,
                    scheduled_date: "2026-10-19".into(),
                    started_at: None,
                    remaining_time: None,
                    remote_id: None,
                },
                completed_at: *completed_at,
                actual_duration: *minutes,
            })
            .collect();
        repo.store().set(keys::TASK_HISTORY, &history).await.unwrap();
    }

    #[tokio::test]
    async fn actual_duration_defaults_to_planned() {
        let repo = local_repo();
        let task = repo
            .add_task(NewTask {
                name: "Write report".into(),
                duration: 30,
                ..Default::default()
            })
            .await
            .unwrap();

        let entry = repo.add_to_history(&task, None).await.unwrap();
        assert_eq!(entry.actual_duration, 30);
        assert_eq!(entry.task.id, task.id);

        let zero = repo.add_to_history(&task, Some(0)).await.unwrap();
        assert_eq!(zero.actual_duration, 30);

        assert_eq!(repo.get_task_history().await.len(), 2);
    }

    #[tokio::test]
    async fn differing_actual_duration_is_patched_remotely() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(query_param("id", "eq.9"))
            .and(body_json(json!({"duration": 45})))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let repo = mirrored_repo(&server);
        let task = Task {
            id: "local".into(),
            name: "Deep work".into(),
            duration: 30,
            start_time: None,
            status: TaskStatus::Completed,
            created_at: 0,
            scheduled_date: "2026-10-19".into(),
            started_at: None,
            remaining_time: None,
            remote_id: Some(crate::models::RemoteId::Int(9)),
        };

        repo.add_to_history(&task, Some(45)).await.unwrap();
        // Same as planned: no patch
        repo.add_to_history(&task, Some(30)).await.unwrap();
        repo.settle().await;
    }

    #[tokio::test]
    async fn range_and_day_queries() {
        let repo = local_repo();
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let start = dates::start_of_day_ms(day).unwrap();
        seed(&repo, &[(start - 1, 10), (start + 1_000, 20), (start + 7_200_000, 30)]).await;

        let on_day = repo.history_by_date(day).await;
        assert_eq!(on_day.len(), 2);

        let ranged = repo.history_by_range(start, start + 1_000).await;
        assert_eq!(ranged.len(), 1);
        assert_eq!(ranged[0].actual_duration, 20);
    }

    #[tokio::test]
    async fn prune_respects_retention() {
        let repo = local_repo();
        let now = 100 * MS_PER_DAY;
        seed(&repo, &[(now - 40 * MS_PER_DAY, 10), (now - 5 * MS_PER_DAY, 20), (now, 30)]).await;

        assert_eq!(repo.prune_history(0, now).await, Some(0));
        assert_eq!(repo.get_task_history().await.len(), 3);

        assert_eq!(repo.prune_history(30, now).await, Some(1));
        let left: Vec<u32> = repo
            .get_task_history()
            .await
            .iter()
            .map(|e| e.actual_duration)
            .collect();
        assert_eq!(left, vec![20, 30]);
    }
}
