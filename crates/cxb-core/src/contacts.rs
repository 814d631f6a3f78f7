//! Append-only contact log.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};
use tracing::error;

use crate::{
    domain::{ChatId, MessageId, UserId},
    errors::StoreError,
};

/// One authorized contact as persisted in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub chat_id: ChatId,
    pub phone_number: Option<String>,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Telegram user the shared contact belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    /// Telegram user who sent the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    /// Unix timestamp reported by Telegram for the message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_date: Option<i64>,
    /// RFC3339 UTC time the bot captured the record.
    pub captured_at: String,
}

/// Write-only contact persistence.
#[async_trait]
pub trait ContactStore: Send + Sync {
    async fn append(&self, record: &ContactRecord) -> Result<(), StoreError>;
}

/// JSON-lines file store.
///
/// Each record is encoded as a single line and written with one `write_all`
/// while holding the store mutex, so concurrent appends never interleave.
/// A write that fails midway is truncated back to the previous length.
#[derive(Debug)]
pub struct JsonlContactStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlContactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cut a torn tail left by a failed write so the next line starts clean.
    async fn truncate_to(&self, len: u64) {
        let res = async {
            let f = OpenOptions::new().write(true).open(&self.path).await?;
            f.set_len(len).await
        }
        .await;
        if let Err(e) = res {
            error!(path = %self.path.display(), error = %e, "failed to roll back partial contact record");
        }
    }

    /// Decode the whole log. Operator/test helper; the dispatcher never reads.
    pub async fn read_all(&self) -> Result<Vec<ContactRecord>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str::<ContactRecord>(l).map_err(StoreError::from))
            .collect()
    }
}

#[async_trait]
impl ContactStore for JsonlContactStore {
    async fn append(&self, record: &ContactRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let prev_len = file.metadata().await?.len();

        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            drop(file);
            self.truncate_to(prev_len).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    records: std::sync::Mutex<Vec<ContactRecord>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ContactRecord> {
        match self.records.lock() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ContactStore for MemoryContactStore {
    async fn append(&self, record: &ContactRecord) -> Result<(), StoreError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|_| StoreError("memory store poisoned".to_string()))?;
        guard.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(chat: i64, name: &str) -> ContactRecord {
        ContactRecord {
            chat_id: ChatId(chat),
            phone_number: Some(format!("+{chat}")),
            display_name: name.to_string(),
            first_name: Some(name.to_string()),
            last_name: None,
            user_id: Some(UserId(chat)),
            from_user_id: Some(UserId(chat)),
            message_id: Some(MessageId(7)),
            message_date: Some(1_700_000_000),
            captured_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn append_adds_exactly_one_decodable_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlContactStore::new(dir.path().join("nested/contacts.jsonl"));

        let rec = record(2, "A");
        store.append(&rec).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.lines().count(), 1);
        assert!(raw.ends_with('\n'));
        assert_eq!(store.read_all().await.unwrap(), vec![rec]);
    }

    #[tokio::test]
    async fn non_ascii_names_are_stored_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlContactStore::new(dir.path().join("contacts.jsonl"));
        store.append(&record(1, "Иван")).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("Иван"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonlContactStore::new(dir.path().join("contacts.jsonl")));

        const N: i64 = 64;
        let mut tasks = Vec::new();
        for i in 0..N {
            let store = store.clone();
            // Long names make partial writes visible if they ever happen.
            let name = format!("{i}-{}", "x".repeat(4096));
            tasks.push(tokio::spawn(async move {
                store.append(&record(i, &name)).await
            }));
        }
        for t in tasks {
            t.await.unwrap().unwrap();
        }

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.lines().count(), N as usize);
        let mut seen = raw
            .lines()
            .map(|l| serde_json::from_str::<ContactRecord>(l).unwrap().chat_id.0)
            .collect::<Vec<_>>();
        seen.sort_unstable();
        assert_eq!(seen, (0..N).collect::<Vec<_>>());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unwritable_target_is_a_store_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the log file should be makes the open fail.
        let target = dir.path().join("contacts.jsonl");
        std::fs::create_dir_all(&target).unwrap();
        let store = JsonlContactStore::new(&target);

        let err = store.append(&record(1, "A")).await.unwrap_err();
        assert!(err.to_string().contains("contact store write failed"));
    }

    #[cfg(target_os = "linux")]
    const FSIZE_CHILD_ENV: &str = "CXB_CONTACTS_FSIZE_CHILD";

    /// Runs in a re-executed test process: the file size limit is process-wide.
    #[cfg(target_os = "linux")]
    fn append_under_file_size_limit(path: &Path) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let store = JsonlContactStore::new(path);

        let mut original = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        unsafe {
            libc::signal(libc::SIGXFSZ, libc::SIG_IGN);
            assert_eq!(libc::getrlimit(libc::RLIMIT_FSIZE, &mut original), 0);
            let capped = libc::rlimit {
                rlim_cur: 100,
                rlim_max: original.rlim_max,
            };
            assert_eq!(libc::setrlimit(libc::RLIMIT_FSIZE, &capped), 0);
        }

        let big = record(1, &"x".repeat(300));
        assert!(rt.block_on(store.append(&big)).is_err());

        unsafe {
            assert_eq!(libc::setrlimit(libc::RLIMIT_FSIZE, &original), 0);
        }
        rt.block_on(store.append(&record(2, "B"))).unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_append_leaves_no_partial_line() {
        if let Some(path) = std::env::var_os(FSIZE_CHILD_ENV) {
            append_under_file_size_limit(Path::new(&path));
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.jsonl");
        let status = std::process::Command::new(std::env::current_exe().unwrap())
            .args([
                "--exact",
                "contacts::tests::failed_append_leaves_no_partial_line",
                "--test-threads=1",
            ])
            .env(FSIZE_CHILD_ENV, &path)
            .status()
            .unwrap();
        assert!(status.success());

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(raw.lines().count(), 1);
        let rec: ContactRecord = serde_json::from_str(raw.trim_end()).unwrap();
        assert_eq!(rec.chat_id, ChatId(2));
    }

    #[tokio::test]
    async fn memory_store_keeps_insertion_order() {
        let store = MemoryContactStore::new();
        store.append(&record(1, "A")).await.unwrap();
        store.append(&record(2, "B")).await.unwrap();
        let names = store
            .records()
            .into_iter()
            .map(|r| r.display_name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["A", "B"]);
    }
}
