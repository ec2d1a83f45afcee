use chrono::NaiveDate;

use crate::dates;
use crate::models::{RemoteId, Streak, StreakPatch};
use crate::store::keys;
use crate::streak::{self, StreakError};

use super::{Patch, Record, Refused, Repository, generate_id};

impl Record for Streak {
    const KEY: &'static str = keys::STREAKS;

    type Patch = StreakPatch;

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

impl Patch<Streak> for StreakPatch {
    fn apply_to(&self, record: &mut Streak) {
        self.apply(record);
    }
}

impl Repository {
    pub async fn get_streaks(&self) -> Vec<Streak> {
        self.all().await
    }

    pub async fn add_streak(&self, task_name: &str) -> Option<Streak> {
        let task_name = task_name.trim();
        if task_name.is_empty() {
            tracing::warn!("Refusing to add a streak without a name");
            return None;
        }

        let now = dates::now_ms();
        self.insert(Streak {
            id: generate_id(now),
            task_name: task_name.to_string(),
            current_streak: 0,
            last_completed_date: None,
            created_at: now,
            remote_id: None,
        })
        .await
    }

    pub async fn update_streak(&self, id: &str, patch: StreakPatch) -> Option<Streak> {
        self.modify::<Streak>(id, patch).await
    }

    pub async fn delete_streak(&self, id: &str) -> bool {
        self.discard::<Streak>(id).await
    }

    pub async fn complete_streak_today(&self, id: &str) -> Result<Streak, StreakError> {
        self.complete_streak_on(id, dates::today()).await
    }

    /// Mark a streak done on `today`, extending or restarting the count.
    ///
    /// The same-day check and the write happen under one collection lock.
    pub async fn complete_streak_on(
        &self,
        id: &str,
        today: NaiveDate,
    ) -> Result<Streak, StreakError> {
        let result = self
            .modify_with::<Streak, StreakError>(id, |current| {
                let count = streak::next_count(current, today)?;
                Ok(StreakPatch {
                    current_streak: Some(count),
                    last_completed_date: Some(dates::format_date(today)),
                    ..Default::default()
                })
            })
            .await;

        match result {
            Ok(updated) => {
                tracing::info!(streak_id = id, count = updated.current_streak, "Streak completed");
                Ok(updated)
            }
            Err(Refused::Rejected(e)) => {
                tracing::info!(streak_id = id, "{}", e);
                Err(e)
            }
            Err(Refused::NotFound) => Err(StreakError::NotFound(id.to_string())),
            Err(Refused::Storage) => Err(StreakError::Storage(id.to_string())),
        }
    }
}
