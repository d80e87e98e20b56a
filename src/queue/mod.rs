use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::config::QueueConfig;
use crate::core::TransactionRecord;

/// Durable FIFO hand-off between the listener and the scoring loop.
///
/// Push appends to the tail, pop takes from the head, strictly FIFO.
/// Pop is non-blocking; callers sleep on `Ok(None)`. There is no
/// acknowledgment: a crash between pop and processing loses that one
/// record.
#[async_trait]
pub trait RecordQueue: Send + Sync {
    async fn push(&self, record: &TransactionRecord) -> Result<(), QueueError>;

    /// `Err(QueueError::Malformed)` means a payload was consumed but did
    /// not decode; the record is gone and the caller should log and move on.
    async fn pop(&self) -> Result<Option<TransactionRecord>, QueueError>;

    /// Current backlog length.
    async fn depth(&self) -> Result<usize, QueueError>;
}

/// Queue adapter backed by a Redis list.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    key: String,
}

impl RedisQueue {
    pub async fn connect(config: &QueueConfig) -> Result<Self, QueueError> {
        let client = redis::Client::open(config.url.as_str()).map_err(QueueError::Store)?;
        let conn = client
            .get_tokio_connection_manager()
            .await
            .map_err(QueueError::Store)?;
        Ok(Self {
            conn,
            key: config.key.clone(),
        })
    }
}

#[async_trait]
impl RecordQueue for RedisQueue {
    async fn push(&self, record: &TransactionRecord) -> Result<(), QueueError> {
        let payload = encode(record)?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(&self.key, payload)
            .await
            .map_err(QueueError::Store)?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<TransactionRecord>, QueueError> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn
            .lpop(&self.key, None)
            .await
            .map_err(QueueError::Store)?;
        match payload {
            Some(payload) => decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn.clone();
        conn.llen(&self.key).await.map_err(QueueError::Store)
    }
}

/// Wire format: plain JSON, one record per list entry. Kept as free
/// functions so the round-trip is testable without a live store.
pub fn encode(record: &TransactionRecord) -> Result<String, QueueError> {
    serde_json::to_string(record).map_err(QueueError::Malformed)
}

pub fn decode(payload: &str) -> Result<TransactionRecord, QueueError> {
    serde_json::from_str(payload).map_err(QueueError::Malformed)
}

#[derive(Debug)]
pub enum QueueError {
    Store(redis::RedisError),
    Malformed(serde_json::Error),
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Store(e) => write!(f, "queue store error: {e}"),
            QueueError::Malformed(e) => write!(f, "malformed queue payload: {e}"),
        }
    }
}

impl std::error::Error for QueueError {}

/// In-process queue double for tests: same contract, no store.
#[cfg(test)]
pub(crate) struct MemoryQueue {
    items: std::sync::Mutex<std::collections::VecDeque<String>>,
}

#[cfg(test)]
impl MemoryQueue {
    pub(crate) fn new() -> Self {
        Self {
            items: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    /// Inject a raw payload, bypassing the codec.
    pub(crate) fn push_raw(&self, payload: &str) {
        self.items.lock().unwrap().push_back(payload.to_string());
    }
}

#[cfg(test)]
#[async_trait]
impl RecordQueue for MemoryQueue {
    async fn push(&self, record: &TransactionRecord) -> Result<(), QueueError> {
        let payload = encode(record)?;
        self.items.lock().unwrap().push_back(payload);
        Ok(())
    }

    async fn pop(&self) -> Result<Option<TransactionRecord>, QueueError> {
        let payload = self.items.lock().unwrap().pop_front();
        match payload {
            Some(payload) => decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn depth(&self) -> Result<usize, QueueError> {
        Ok(self.items.lock().unwrap().len())
    }
}
