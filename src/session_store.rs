//! Filesystem-backed session storage for `tower-sessions`.
//!
//! Every session lives in its own JSON file named `session_<id>` inside the
//! configured directory. Cookies pointing at these files are signed with a key
//! generated at process start (see [`crate::api::router`]), so a restart
//! orphans every file written by the previous process; expired files are
//! swept by [`ExpiredDeletion::delete_expired`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tower_sessions::SessionStore;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion};
use tracing::{debug, warn};
use uuid::Uuid;

const FILE_PREFIX: &str = "session_";

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    /// Creates the store, making sure the directory exists.
    pub async fn open(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            anyhow::anyhow!("Failed to create session directory {}: {e}", dir.display())
        })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &Id) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{id}"))
    }

    async fn write_record(&self, record: &Record) -> session_store::Result<()> {
        let bytes =
            serde_json::to_vec(record).map_err(|e| session_store::Error::Encode(e.to_string()))?;

        // Write-then-rename so a concurrent load never sees a half-written file.
        // One temp file per write: concurrent saves of a session only race on
        // the rename.
        let path = self.path_for(&record.id);
        let tmp = self
            .dir
            .join(format!("{FILE_PREFIX}{}.{}.tmp", record.id, Uuid::new_v4()));
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))?;

        Ok(())
    }

    async fn remove_file(path: &Path) -> session_store::Result<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(session_store::Error::Backend(e.to_string())),
        }
    }

    /// Deletes expired session files every `period` until the task is aborted.
    pub fn spawn_cleanup(self, period: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = self.delete_expired().await {
                    warn!("Error deleting expired sessions: {e}");
                }
            }
        })
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        while tokio::fs::try_exists(self.path_for(&record.id))
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))?
        {
            record.id = Id::default();
        }

        self.write_record(record).await
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.write_record(record).await
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let path = self.path_for(session_id);

        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(session_store::Error::Backend(e.to_string())),
        };

        let record: Record =
            serde_json::from_slice(&bytes).map_err(|e| session_store::Error::Decode(e.to_string()))?;

        if record.expiry_date <= OffsetDateTime::now_utc() {
            Self::remove_file(&path).await?;
            return Ok(None);
        }

        Ok(Some(record))
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        Self::remove_file(&self.path_for(session_id)).await
    }
}

#[async_trait]
impl ExpiredDeletion for FileSessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))?;

        let now = OffsetDateTime::now_utc();
        let mut removed = 0usize;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| session_store::Error::Backend(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !name.starts_with(FILE_PREFIX) || name.ends_with(".tmp") {
                continue;
            }

            let path = entry.path();
            let expired = match tokio::fs::read(&path).await {
                Ok(bytes) => serde_json::from_slice::<Record>(&bytes)
                    .map_or(true, |record| record.expiry_date <= now),
                Err(e) if e.kind() == ErrorKind::NotFound => false,
                Err(e) => return Err(session_store::Error::Backend(e.to_string())),
            };

            if expired {
                Self::remove_file(&path).await?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Deleted {removed} expired session files");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    async fn temp_store() -> FileSessionStore {
        let dir = std::env::temp_dir().join(format!("sorbet-sessions-{}", uuid::Uuid::new_v4()));
        FileSessionStore::open(dir).await.unwrap()
    }

    fn record(expiry: OffsetDateTime) -> Record {
        let mut data = HashMap::new();
        data.insert("username".to_string(), serde_json::json!("admin"));
        data.insert("temp".to_string(), serde_json::json!(true));
        Record {
            id: Id::default(),
            data,
            expiry_date: expiry,
        }
    }

    #[tokio::test]
    async fn create_then_load() {
        let store = temp_store().await;
        let mut rec = record(OffsetDateTime::now_utc() + time::Duration::hours(1));

        store.create(&mut rec).await.unwrap();
        assert!(store.path_for(&rec.id).exists());

        let loaded = store.load(&rec.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, rec.id);
        assert_eq!(loaded.data.get("username"), Some(&serde_json::json!("admin")));
        assert_eq!(loaded.data.get("temp"), Some(&serde_json::json!(true)));
    }

    #[tokio::test]
    async fn missing_session_loads_as_none() {
        let store = temp_store().await;
        assert!(store.load(&Id::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_dropped_on_load() {
        let store = temp_store().await;
        let mut rec = record(OffsetDateTime::now_utc() - time::Duration::minutes(1));
        store.create(&mut rec).await.unwrap();

        assert!(store.load(&rec.id).await.unwrap().is_none());
        assert!(!store.path_for(&rec.id).exists());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = temp_store().await;
        let mut rec = record(OffsetDateTime::now_utc() + time::Duration::hours(1));
        store.create(&mut rec).await.unwrap();

        store.delete(&rec.id).await.unwrap();
        store.delete(&rec.id).await.unwrap();
        assert!(store.load(&rec.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_expired_keeps_live_sessions() {
        let store = temp_store().await;
        let mut live = record(OffsetDateTime::now_utc() + time::Duration::hours(1));
        let mut stale = record(OffsetDateTime::now_utc() - time::Duration::hours(1));
        store.create(&mut live).await.unwrap();
        store.create(&mut stale).await.unwrap();
        tokio::fs::write(store.dir().join("unrelated.txt"), b"keep")
            .await
            .unwrap();

        store.delete_expired().await.unwrap();

        assert!(store.path_for(&live.id).exists());
        assert!(!store.path_for(&stale.id).exists());
        assert!(store.dir().join("unrelated.txt").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_saves_of_one_session_all_succeed() {
        let store = temp_store().await;
        let mut rec = record(OffsetDateTime::now_utc() + time::Duration::hours(1));
        store.create(&mut rec).await.unwrap();

        let saves: Vec<_> = (0..64)
            .map(|_| {
                let store = store.clone();
                let rec = rec.clone();
                tokio::spawn(async move { store.save(&rec).await })
            })
            .collect();

        for save in saves {
            save.await.unwrap().unwrap();
        }

        assert_eq!(store.load(&rec.id).await.unwrap().unwrap().id, rec.id);

        let mut entries = tokio::fs::read_dir(store.dir()).await.unwrap();
        while let Some(entry) = entries.next_entry().await.unwrap() {
            assert!(!entry.file_name().to_string_lossy().ends_with(".tmp"));
        }
    }
}
