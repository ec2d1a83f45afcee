use crate::dates;
use crate::models::{PendingTask, PendingTaskPatch, RemoteId};
use crate::store::keys;

use super::{Patch, Record, Repository, generate_id};

impl Record for PendingTask {
    const KEY: &'static str = keys::PENDING_TASKS;

    type Patch = PendingTaskPatch;

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

impl Patch<PendingTask> for PendingTaskPatch {
    fn apply_to(&self, record: &mut PendingTask) {
        self.apply(record);
    }
}

impl Repository {
    pub async fn get_pending_tasks(&self) -> Vec<PendingTask> {
        self.all().await
    }

    pub async fn add_pending_task(&self, task_name: &str) -> Option<PendingTask> {
        let task_name = task_name.trim();
        if task_name.is_empty() {
            tracing::warn!("Refusing to add a pending task without a name");
            return None;
        }

        let now = dates::now_ms();
        self.insert(PendingTask {
            id: generate_id(now),
            task_name: task_name.to_string(),
            completed: false,
            created_at: now,
            remote_id: None,
        })
        .await
    }

    pub async fn update_pending_task(
        &self,
        id: &str,
        patch: PendingTaskPatch,
    ) -> Option<PendingTask> {
        self.modify::<PendingTask>(id, patch).await
    }

    pub async fn delete_pending_task(&self, id: &str) -> bool {
        self.discard::<PendingTask>(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{local_repo, mirrored_repo};
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn crud_cycle() {
        let repo = local_repo();
        let milk = repo.add_pending_task("Buy milk").await.unwrap();
        let mail = repo.add_pending_task("Answer mail").await.unwrap();
        assert!(!milk.completed);

        let done = repo
            .update_pending_task(
                &milk.id,
                PendingTaskPatch {
                    completed: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(done.completed);
        assert_eq!(done.task_name, "Buy milk");

        assert!(repo.delete_pending_task(&mail.id).await);
        assert_eq!(repo.get_pending_tasks().await, vec![done]);
        assert!(!repo.delete_pending_task(&mail.id).await);
    }

    #[tokio::test]
    async fn create_payload_reaches_pending_table() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/PendingTasks"))
            .and(body_json(json!({"task_name": "Call bank", "completed": false})))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "p-9"})))
            .expect(1)
            .mount(&server)
            .await;

        let repo = mirrored_repo(&server);
        let item = repo.add_pending_task("Call bank").await.unwrap();
        repo.settle().await;

        let stored = repo.get_pending_tasks().await;
        assert_eq!(stored[0].id, item.id);
        assert_eq!(stored[0].remote_id, Some(RemoteId::Text("p-9".into())));
    }
}
