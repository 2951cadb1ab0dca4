use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::platform::StoredMessage;

/// Thread-safe, append-only, in-memory message log.
/// Cloning shares the same underlying log; it lives as long as the process.
#[derive(Clone, Default)]
pub struct MessageLog {
    messages: Arc<RwLock<Vec<StoredMessage>>>,
}

/// Point-in-time copy of the log, serialized as `{"total": N, "messages": [...]}`
#[derive(Debug, Clone, Serialize)]
pub struct LogSnapshot {
    #[serde(rename = "total")]
    pub count: usize,
    pub messages: Vec<StoredMessage>,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a batch under one write lock, preserving order.
    /// Returns the log length after the append.
    pub async fn append_all(&self, batch: Vec<StoredMessage>) -> usize {
        let mut messages = self.messages.write().await;
        if !batch.is_empty() {
            messages.extend(batch);
            info!("Total messages stored: {}", messages.len());
        }
        messages.len()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn snapshot(&self) -> LogSnapshot {
        let messages = self.messages.read().await.clone();
        LogSnapshot {
            count: messages.len(),
            messages,
        }
    }
}
