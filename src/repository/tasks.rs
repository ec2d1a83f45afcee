use crate::dates;
use crate::models::{NewTask, RemoteId, Task, TaskPatch};
use crate::store::keys;

use super::{Patch, Record, Repository, generate_id};

impl Record for Task {
    const KEY: &'static str = keys::TASKS;

    type Patch = TaskPatch;

    fn id(&self) -> &str {
        &self.id
    }

    fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    fn set_remote_id(&mut self, remote_id: RemoteId) {
        self.remote_id = Some(remote_id);
    }
}

impl Patch<Task> for TaskPatch {
    fn apply_to(&self, record: &mut Task) {
        self.apply(record);
    }
}

impl Repository {
    pub async fn get_tasks(&self) -> Vec<Task> {
        self.all().await
    }

    pub async fn get_task(&self, id: &str) -> Option<Task> {
        self.find(id).await
    }

    /// Create a task, defaulting status to pending and the date to today
    pub async fn add_task(&self, input: NewTask) -> Option<Task> {
        let name = input.name.trim();
        if name.is_empty() {
            tracing::warn!("Refusing to add a task without a name");
            return None;
        }

        let now = dates::now_ms();
        let task = Task {
            id: generate_id(now),
            name: name.to_string(),
            duration: input.duration,
            start_time: input.start_time,
            status: input.status.unwrap_or_default(),
            created_at: now,
            scheduled_date: input
                .scheduled_date
                .unwrap_or_else(|| dates::format_date(dates::today())),
            started_at: None,
            remaining_time: None,
            remote_id: None,
        };

        self.insert(task).await
    }

    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Option<Task> {
        self.modify::<Task>(id, patch).await
    }

    pub async fn delete_task(&self, id: &str) -> bool {
        self.discard::<Task>(id).await
    }

    /// Tasks scheduled on exactly `date` (`YYYY-MM-DD`)
    pub async fn get_tasks_by_date(&self, date: &str) -> Vec<Task> {
        self.get_tasks()
            .await
            .into_iter()
            .filter(|task| task.scheduled_date == date)
            .collect()
    }

    pub async fn get_todays_tasks(&self) -> Vec<Task> {
        self.get_tasks_by_date(&dates::format_date(dates::today()))
            .await
    }
}
