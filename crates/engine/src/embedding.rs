//! Fire-and-forget embedding jobs.
//!
//! Requests that author examples or approve answers hand the text to an
//! [`EmbeddingQueue`] and move on. A worker in the background drains the
//! receiving end; until it does, the row simply has no embedding.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// What to embed and where the vector goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum EmbeddingJob {
    /// The question text of an example.
    Example { id: i64, text: String },
    /// The question of an analytics row marked correct.
    Record { id: i64, text: String },
}

impl EmbeddingJob {
    pub fn text(&self) -> &str {
        match self {
            Self::Example { text, .. } | Self::Record { text, .. } => text,
        }
    }
}

/// The sending half of the embedding channel. Never blocks.
#[derive(Debug, Clone)]
pub struct EmbeddingQueue {
    tx: mpsc::Sender<EmbeddingJob>,
}

impl EmbeddingQueue {
    /// A bounded queue and the receiver a worker should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EmbeddingJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue a job. Returns `false` when it was dropped.
    pub fn enqueue(&self, job: EmbeddingJob) -> bool {
        match self.tx.try_send(job) {
            Ok(()) => {
                debug!("Embedding job queued");
                true
            }
            Err(TrySendError::Full(job)) => {
                warn!(?job, "Embedding queue full, dropping job");
                false
            }
            Err(TrySendError::Closed(job)) => {
                warn!(?job, "Embedding worker stopped, dropping job");
                false
            }
        }
    }
}
