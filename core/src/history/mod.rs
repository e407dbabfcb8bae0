//! Append-only, file-partitioned chat history.
//!
//! Partitioning follows spec.md §6 exactly: `global/history.txt`,
//! `rooms/<roomname>.txt`, and `private/<u1>_<u2>.txt` with the pair sorted
//! lexicographically so the file is independent of who sent first. A single
//! `tokio::sync::Mutex` serializes every append the way `LoggerLocal::say_mutex`
//! serializes voice playback in the teacher crate — cheap insurance that two
//! concurrent appends never interleave mid-line.

use std::path::{Path, PathBuf};

use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use crate::error::HistoryError;

/// Which conversation a record belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryScope {
    Global,
    Room(String),
    /// Normalizes the two participants into sorted order at construction, so
    /// `Private::new("bob", "alice")` and `Private::new("alice", "bob")`
    /// always resolve to the same file.
    Private(String, String),
}

impl HistoryScope {
    pub fn private(a: &str, b: &str) -> Self {
        if a < b {
            HistoryScope::Private(a.to_string(), b.to_string())
        } else {
            HistoryScope::Private(b.to_string(), a.to_string())
        }
    }

    fn relative_path(&self) -> PathBuf {
        match self {
            HistoryScope::Global => PathBuf::from("global/history.txt"),
            HistoryScope::Room(name) => PathBuf::from("rooms").join(format!("{name}.txt")),
            HistoryScope::Private(u1, u2) => {
                PathBuf::from("private").join(format!("{u1}_{u2}.txt"))
            }
        }
    }
}

/// One appended line: `YYYY-MM-DD HH:MM:SS [sender-or-system]: message`.
fn format_record(sender: Option<&str>, message: &str) -> String {
    let ts = Local::now().format("%Y-%m-%d %H:%M:%S");
    let who = sender.unwrap_or("system");
    format!("{ts} [{who}]: {message}\n")
}

/// The history subsystem. Constructing with `root: None` makes every
/// operation a no-op, satisfying "History may be disabled at runtime."
pub struct HistoryStore {
    root: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root,
            write_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.root.is_some()
    }

    /// Appends one record. Failures are logged and swallowed: a broken
    /// history disk must never fail the chat operation that triggered it.
    pub async fn append(&self, scope: &HistoryScope, sender: Option<&str>, message: &str) {
        let Some(root) = &self.root else {
            return;
        };

        if let Err(e) = self.append_inner(root, scope, sender, message).await {
            tracing::warn!(error = %e, "history append failed");
        }
    }

    async fn append_inner(
        &self,
        root: &Path,
        scope: &HistoryScope,
        sender: Option<&str>,
        message: &str,
    ) -> Result<(), HistoryError> {
        let path = root.join(scope.relative_path());
        let line = format_record(sender, message);

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| HistoryError::Io {
                    path: parent.display().to_string(),
                    source,
                })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| HistoryError::Io {
                path: path.display().to_string(),
                source,
            })?;

        file.write_all(line.as_bytes())
            .await
            .map_err(|source| HistoryError::Io {
                path: path.display().to_string(),
                source,
            })?;

        Ok(())
    }

    /// Returns up to the last `n` lines for `scope`, oldest-first. Reads open
    /// the file independently of the write lock, per spec; disabled history
    /// or a missing file both return an empty vec rather than an error.
    pub async fn tail(&self, scope: &HistoryScope, n: usize) -> Vec<String> {
        let Some(root) = &self.root else {
            return Vec::new();
        };
        let path = root.join(scope.relative_path());

        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(_) => return Vec::new(),
        };

        let mut lines = Vec::new();
        let mut reader = BufReader::new(file).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            lines.push(line);
        }

        let start = lines.len().saturating_sub(n);
        lines.split_off(start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_store_is_a_no_op() {
        let store = HistoryStore::new(None);
        store.append(&HistoryScope::Global, Some("alice"), "hi").await;
        assert!(store.tail(&HistoryScope::Global, 10).await.is_empty());
    }

    #[tokio::test]
    async fn private_scope_is_order_independent() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(Some(dir.path().to_path_buf()));

        store
            .append(&HistoryScope::private("bob", "alice"), Some("alice"), "hey bob")
            .await;
        store
            .append(&HistoryScope::private("alice", "bob"), Some("bob"), "hey alice")
            .await;

        let tail = store.tail(&HistoryScope::private("alice", "bob"), 10).await;
        assert_eq!(tail.len(), 2);
        assert!(tail[0].contains("hey bob"));
        assert!(tail[1].contains("hey alice"));
    }

    #[tokio::test]
    async fn room_and_global_are_partitioned() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(Some(dir.path().to_path_buf()));

        store.append(&HistoryScope::Global, Some("alice"), "global line").await;
        store
            .append(&HistoryScope::Room("lobby".into()), Some("alice"), "room line")
            .await;

        let global = store.tail(&HistoryScope::Global, 10).await;
        let room = store.tail(&HistoryScope::Room("lobby".into()), 10).await;
        assert_eq!(global.len(), 1);
        assert_eq!(room.len(), 1);
        assert!(global[0].contains("global line"));
        assert!(room[0].contains("room line"));
    }

    #[tokio::test]
    async fn tail_caps_at_n() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(Some(dir.path().to_path_buf()));
        for i in 0..5 {
            store
                .append(&HistoryScope::Global, Some("alice"), &format!("msg {i}"))
                .await;
        }
        let tail = store.tail(&HistoryScope::Global, 2).await;
        assert_eq!(tail.len(), 2);
        assert!(tail[0].contains("msg 3"));
        assert!(tail[1].contains("msg 4"));
    }
}
