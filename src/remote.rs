//! Best-effort mirror of local records into a REST backend
//!
//! Every call here is at-most-once: failures are logged as warnings and
//! turned into `None`/`false`. Nothing is queued for retry.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::RemoteConfig;
use crate::models::{PendingTask, PendingTaskPatch, RemoteId, Streak, StreakPatch, Task, TaskPatch};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid header value: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

/// Which remote table an entity lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Tasks,
    Streaks,
    PendingTasks,
}

impl Table {
    fn name(self, config: &RemoteConfig) -> &str {
        match self {
            Table::Tasks => &config.tasks_table,
            Table::Streaks => &config.streaks_table,
            Table::PendingTasks => &config.pending_table,
        }
    }
}

/// A local record with a remote counterpart
pub trait Mirrored {
    const TABLE: Table;

    /// Insert body, in remote column names
    fn create_payload(&self) -> Value;
}

/// A partial update that can be narrowed to remote columns.
///
/// Fields without a remote column are dropped.
pub trait RemotePatch {
    fn update_payload(&self) -> Map<String, Value>;
}

impl Mirrored for Task {
    const TABLE: Table = Table::Tasks;

    fn create_payload(&self) -> Value {
        json!({
            "task_name": self.name,
            "duration": self.duration,
            "date": self.scheduled_date,
        })
    }
}

impl RemotePatch for TaskPatch {
    fn update_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        if let Some(name) = &self.name {
            payload.insert("task_name".into(), json!(name));
        }
        if let Some(duration) = self.duration {
            payload.insert("duration".into(), json!(duration));
        }
        if let Some(date) = &self.scheduled_date {
            payload.insert("date".into(), json!(date));
        }
        payload
    }
}

impl Mirrored for Streak {
    const TABLE: Table = Table::Streaks;

    fn create_payload(&self) -> Value {
        json!({
            "task_name": self.task_name,
            "current_streak": self.current_streak,
            "last_completed_date": self.last_completed_date,
        })
    }
}

impl RemotePatch for StreakPatch {
    fn update_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        if let Some(name) = &self.task_name {
            payload.insert("task_name".into(), json!(name));
        }
        if let Some(count) = self.current_streak {
            payload.insert("current_streak".into(), json!(count));
        }
        if let Some(date) = &self.last_completed_date {
            payload.insert("last_completed_date".into(), json!(date));
        }
        payload
    }
}

impl Mirrored for PendingTask {
    const TABLE: Table = Table::PendingTasks;

    fn create_payload(&self) -> Value {
        json!({
            "task_name": self.task_name,
            "completed": self.completed,
        })
    }
}

impl RemotePatch for PendingTaskPatch {
    fn update_payload(&self) -> Map<String, Value> {
        let mut payload = Map::new();
        if let Some(name) = &self.task_name {
            payload.insert("task_name".into(), json!(name));
        }
        if let Some(completed) = self.completed {
            payload.insert("completed".into(), json!(completed));
        }
        payload
    }
}

/// REST client for the mirror tables
#[derive(Clone)]
pub struct MirrorClient {
    http: reqwest::Client,
    config: Arc<RemoteConfig>,
}

impl MirrorClient {
    pub fn new(config: RemoteConfig) -> Result<Self, MirrorError> {
        let mut headers = HeaderMap::new();
        headers.insert("apikey", HeaderValue::from_str(&config.api_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let http = reqwest::Client::builder()
            .user_agent(concat!("taskloop/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// Insert a record; returns the id the backend assigned
    pub async fn create<R: Mirrored>(&self, record: &R) -> Option<RemoteId> {
        let url = self.config.endpoint(R::TABLE.name(&self.config));
        let request = self
            .http
            .request(Method::POST, url)
            .json(&record.create_payload());

        match self.send(request).await {
            Ok(body) => {
                let id = body
                    .as_ref()
                    .and_then(first_row)
                    .and_then(|row| row.get("id").cloned())
                    .and_then(|id| serde_json::from_value::<RemoteId>(id).ok());
                if id.is_none() {
                    tracing::warn!(table = ?R::TABLE, "Remote insert returned no id");
                }
                id
            }
            Err(e) => {
                tracing::warn!(table = ?R::TABLE, error = %e, "Remote insert failed");
                None
            }
        }
    }

    /// Patch remote columns of a record.
    ///
    /// Skipped without a round-trip when no field maps to a remote column.
    pub async fn update<P: RemotePatch>(
        &self,
        table: Table,
        remote_id: &RemoteId,
        patch: &P,
    ) -> Option<Value> {
        let payload = patch.update_payload();
        if payload.is_empty() {
            tracing::debug!(table = ?table, remote_id = %remote_id, "Nothing to mirror");
            return None;
        }

        let request = self
            .filtered(Method::PATCH, table, remote_id)
            .json(&Value::Object(payload));

        match self.send(request).await {
            Ok(body) => body.as_ref().and_then(first_row).cloned(),
            Err(e) => {
                tracing::warn!(table = ?table, remote_id = %remote_id, error = %e, "Remote update failed");
                None
            }
        }
    }

    pub async fn delete(&self, table: Table, remote_id: &RemoteId) -> bool {
        let request = self.filtered(Method::DELETE, table, remote_id);
        match self.send(request).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(table = ?table, remote_id = %remote_id, error = %e, "Remote delete failed");
                false
            }
        }
    }

    fn filtered(&self, method: Method, table: Table, remote_id: &RemoteId) -> RequestBuilder {
        let url = self.config.endpoint(table.name(&self.config));
        self.http
            .request(method, url)
            .query(&[("id", format!("eq.{}", remote_id))])
    }

    async fn send(&self, request: RequestBuilder) -> Result<Option<Value>, MirrorError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MirrorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            return Ok(None);
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(serde_json::from_str(&text).ok())
    }
}

/// Representations come back as a bare object or a one-row array
fn first_row(body: &Value) -> Option<&Value> {
    match body {
        Value::Array(rows) => rows.first(),
        Value::Object(_) => Some(body),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskStatus;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> RemoteConfig {
        RemoteConfig {
            enabled: true,
            url: format!("{}/rest/v1", server.uri()),
            api_key: "anon-key".into(),
            ..Default::default()
        }
    }

    fn sample_task() -> Task {
        Task {
            id: "local-1".into(),
            name: "Write report".into(),
            duration: 30,
            start_time: Some("09:00".into()),
            status: TaskStatus::Pending,
            created_at: 0,
            scheduled_date: "2026-10-19".into(),
            started_at: None,
            remaining_time: None,
            remote_id: None,
        }
    }

    #[tokio::test]
    async fn create_maps_columns_and_reads_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/Tasks"))
            .and(header("apikey", "anon-key"))
            .and(header("authorization", "Bearer anon-key"))
            .and(header("prefer", "return=representation"))
            .and(body_json(json!({
                "task_name": "Write report",
                "duration": 30,
                "date": "2026-10-19"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!([{"id": 41}])))
            .expect(1)
            .mount(&server)
            .await;

        let client = MirrorClient::new(config_for(&server)).unwrap();
        let id = client.create(&sample_task()).await;
        assert_eq!(id, Some(RemoteId::Int(41)));
    }

    #[tokio::test]
    async fn create_failure_is_swallowed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = MirrorClient::new(config_for(&server)).unwrap();
        assert_eq!(client.create(&sample_task()).await, None);
    }

    #[tokio::test]
    async fn update_sends_only_remote_columns() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/Tasks"))
            .and(query_param("id", "eq.41"))
            .and(body_json(json!({"task_name": "Renamed"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": 41, "task_name": "Renamed"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = MirrorClient::new(config_for(&server)).unwrap();
        let patch = TaskPatch {
            name: Some("Renamed".into()),
            status: Some(TaskStatus::Running),
            started_at: Some(5),
            ..Default::default()
        };
        let row = client.update(Table::Tasks, &RemoteId::Int(41), &patch).await;
        assert_eq!(row.unwrap()["task_name"], "Renamed");
    }

    #[tokio::test]
    async fn update_without_remote_columns_skips_request() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = MirrorClient::new(config_for(&server)).unwrap();
        let patch = TaskPatch {
            status: Some(TaskStatus::Paused),
            ..Default::default()
        };
        assert!(client.update(Table::Tasks, &RemoteId::Int(1), &patch).await.is_none());
    }

    #[tokio::test]
    async fn delete_targets_streak_table() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/rest/v1/Streaks"))
            .and(query_param("id", "eq.abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let client = MirrorClient::new(config_for(&server)).unwrap();
        assert!(client.delete(Table::Streaks, &RemoteId::Text("abc".into())).await);
    }

    #[tokio::test]
    async fn unreachable_backend_returns_false() {
        let config = RemoteConfig {
            enabled: true,
            url: "http://127.0.0.1:9".into(),
            api_key: "k".into(),
            timeout_secs: 1,
            ..Default::default()
        };
        let client = MirrorClient::new(config).unwrap();
        assert!(!client.delete(Table::PendingTasks, &RemoteId::Int(3)).await);
    }

    #[test]
    fn pending_and_streak_payloads() {
        let streak = Streak {
            id: "s".into(),
            task_name: "Stretch".into(),
            current_streak: 3,
            last_completed_date: Some("2026-10-18".into()),
            created_at: 0,
            remote_id: None,
        };
        assert_eq!(
            streak.create_payload(),
            json!({"task_name": "Stretch", "current_streak": 3, "last_completed_date": "2026-10-18"})
        );

        let patch = PendingTaskPatch {
            completed: Some(true),
            ..Default::default()
        };
        assert_eq!(Value::Object(patch.update_payload()), json!({"completed": true}));
    }
}
