//! Text substrate: every key is a JSON file in one directory

use async_trait::async_trait;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{StoreError, Substrate, validate_key};

pub struct FileSubstrate {
    dir: PathBuf,
}

impl FileSubstrate {
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl Substrate for FileSubstrate {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let text = serde_json::to_string_pretty(&value)?;

        // Readers never observe a partially written collection
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        for key in self.keys().await? {
            self.remove(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn stores_one_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileSubstrate::open(dir.path()).unwrap();

        files.set("tasks", json!([])).await.unwrap();
        files.set("settings", json!({"defaultDuration": 25})).await.unwrap();

        assert!(dir.path().join("tasks.json").exists());
        assert_eq!(
            files.get("settings").await.unwrap(),
            Some(json!({"defaultDuration": 25}))
        );
        assert_eq!(
            files.keys().await.unwrap(),
            vec!["settings".to_string(), "tasks".to_string()]
        );
    }

    #[tokio::test]
    async fn missing_key_is_absent_and_remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileSubstrate::open(dir.path()).unwrap();

        assert_eq!(files.get("streaks").await.unwrap(), None);
        files.remove("streaks").await.unwrap();
    }

    #[tokio::test]
    async fn corrupt_file_surfaces_as_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tasks.json"), "{not json").unwrap();
        let files = FileSubstrate::open(dir.path()).unwrap();

        assert!(matches!(
            files.get("tasks").await,
            Err(StoreError::Json(_))
        ));
    }
}
