//! Backup export/import and full reset

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::dates;
use crate::models::{
    EXPORT_VERSION, ExportDocument, HistoryEntry, PendingTask, Settings, Streak, Task,
    default_settings,
};
use crate::store::{StoreError, keys};

use super::Repository;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid backup file format: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

/// What an import replaced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSummary {
    pub tasks: usize,
    pub history: usize,
    pub streaks: Option<usize>,
    pub pending_tasks: Option<usize>,
    /// Array entries that could not be read as records
    pub skipped: usize,
}

fn array<'a>(doc: &'a Map<String, Value>, field: &str) -> Result<&'a [Value], ImportError> {
    match doc.get(field) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(ImportError::Invalid(format!("`{}` must be an array", field))),
    }
}

/// Decode entries one by one; unreadable ones are counted and dropped
fn records<T: DeserializeOwned>(items: &[Value], field: &str, skipped: &mut usize) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value(item.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!(field, index, error = %e, "Skipping unreadable backup entry");
                *skipped += 1;
                None
            }
        })
        .collect()
}

struct Backup {
    tasks: Vec<Task>,
    history: Vec<HistoryEntry>,
    settings: Settings,
    streaks: Option<Vec<Streak>>,
    pending_tasks: Option<Vec<PendingTask>>,
    skipped: usize,
}

/// Check the document's shape before anything is written.
///
/// `tasks` and `taskHistory` must be arrays and `settings` an object;
/// `streaks` and `pendingTasks` must be arrays when present.
fn parse_backup(text: &str) -> Result<Backup, ImportError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(doc) = value else {
        return Err(ImportError::Invalid("expected a JSON object".into()));
    };

    let tasks = array(&doc, "tasks")?;
    let history = array(&doc, "taskHistory")?;
    let settings = match doc.get("settings") {
        Some(Value::Object(settings)) => settings.clone(),
        _ => return Err(ImportError::Invalid("`settings` must be an object".into())),
    };
    let streaks = match doc.get("streaks") {
        None | Some(Value::Null) => None,
        Some(_) => Some(array(&doc, "streaks")?),
    };
    let pending = match doc.get("pendingTasks") {
        None | Some(Value::Null) => None,
        Some(_) => Some(array(&doc, "pendingTasks")?),
    };

    let mut skipped = 0;
    Ok(Backup {
        tasks: records(tasks, "tasks", &mut skipped),
        history: records(history, "taskHistory", &mut skipped),
        settings,
        streaks: streaks.map(|items| records(items, "streaks", &mut skipped)),
        pending_tasks: pending.map(|items| records(items, "pendingTasks", &mut skipped)),
        skipped,
    })
}

impl Repository {
    pub async fn export_data(&self) -> Option<ExportDocument> {
        let stored_settings = match self.store.get::<Settings>(keys::SETTINGS).await {
            Ok(settings) => settings.unwrap_or_default(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read settings for export");
                return None;
            }
        };

        Some(ExportDocument {
            tasks: self.get_tasks().await,
            task_history: self.get_task_history().await,
            settings: stored_settings,
            export_date: dates::to_rfc3339(dates::now_ms()),
            version: EXPORT_VERSION.to_string(),
            streaks: Some(self.get_streaks().await),
            pending_tasks: Some(self.get_pending_tasks().await),
        })
    }

    /// Replace tasks and history (and streaks/pending items when present)
    /// from a backup; settings are merged over the defaults.
    ///
    /// Nothing is written unless the whole document validates.
    pub async fn import_data(&self, text: &str) -> Result<ImportSummary, ImportError> {
        let backup = parse_backup(text).inspect_err(|e| {
            tracing::warn!(error = %e, "Import rejected");
        })?;

        let mut settings = default_settings();
        settings.extend(backup.settings);

        let summary = ImportSummary {
            tasks: backup.tasks.len(),
            history: backup.history.len(),
            streaks: backup.streaks.as_ref().map(Vec::len),
            pending_tasks: backup.pending_tasks.as_ref().map(Vec::len),
            skipped: backup.skipped,
        };

        self.replace(keys::TASKS, &backup.tasks).await?;
        self.replace(keys::TASK_HISTORY, &backup.history).await?;
        self.replace(keys::SETTINGS, &settings).await?;
        if let Some(streaks) = &backup.streaks {
            self.replace(keys::STREAKS, streaks).await?;
        }
        if let Some(pending) = &backup.pending_tasks {
            self.replace(keys::PENDING_TASKS, pending).await?;
        }

        tracing::info!(
            tasks = summary.tasks,
            history = summary.history,
            skipped = summary.skipped,
            "Backup imported"
        );
        Ok(summary)
    }

    async fn replace<T: serde::Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let _guard = self.store.lock(key).await;
        self.store.set(key, value).await
    }

    /// Wipe every collection, then store default settings
    pub async fn clear_all(&self) -> bool {
        if let Err(e) = self.store.clear().await {
            tracing::error!(error = %e, "Failed to clear storage");
            return false;
        }
        tracing::info!("All data cleared");
        self.reset_settings().await
    }
}
