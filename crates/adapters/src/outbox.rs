//! Outbox dispatcher - appends notifications to a JSONL file instead of
//! sending them, for dry runs and review.

use async_trait::async_trait;
use serde::Serialize;
use skyrelay_domain::{DispatchError, Dispatcher, Notification};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct OutboxWriter {
    path: PathBuf,
    file: Arc<Mutex<tokio::fs::File>>,
}

impl OutboxWriter {
    pub async fn new(path: PathBuf) -> Result<Self, OutboxError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append(&self, entry: &OutboxEntry<'_>) -> Result<(), OutboxError> {
        // One write per line keeps concurrent deliveries from interleaving
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// One line of the outbox file
#[derive(Serialize)]
struct OutboxEntry<'a> {
    id: Uuid,
    channel_id: &'a str,
    #[serde(with = "time::serde::rfc3339")]
    queued_at: OffsetDateTime,
    notification: &'a Notification,
}

#[derive(Debug, Clone)]
pub struct OutboxDispatcher {
    writer: OutboxWriter,
}

impl OutboxDispatcher {
    pub fn new(writer: OutboxWriter) -> Self {
        Self { writer }
    }

    pub fn path(&self) -> &Path {
        self.writer.path()
    }
}

#[async_trait]
impl Dispatcher for OutboxDispatcher {
    async fn deliver(
        &self,
        channel_id: &str,
        notification: &Notification,
    ) -> Result<(), DispatchError> {
        let entry = OutboxEntry {
            id: Uuid::new_v4(),
            channel_id,
            queued_at: OffsetDateTime::now_utc(),
            notification,
        };

        self.writer
            .append(&entry)
            .await
            .map_err(|error| DispatchError::Io(format!("Outbox write failed: {}", error)))
    }

    fn platform(&self) -> &'static str {
        "outbox"
    }
}
