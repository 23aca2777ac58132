//! Drains the embedding queue and writes vectors back through the store.

use querysmith_core::{DatasetStore, GenerationModelProvider, Result, StoreError};
use querysmith_engine::{EmbeddingJob, EmbeddingQueue};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Consumes [`EmbeddingJob`]s one at a time.
pub struct EmbeddingWorker {
    store: Arc<dyn DatasetStore>,
    llm: Arc<dyn GenerationModelProvider>,
    rx: mpsc::Receiver<EmbeddingJob>,
}

impl EmbeddingWorker {
    pub fn new(
        store: Arc<dyn DatasetStore>,
        llm: Arc<dyn GenerationModelProvider>,
        rx: mpsc::Receiver<EmbeddingJob>,
    ) -> Self {
        Self { store, llm, rx }
    }

    /// Process jobs until the queue closes or `cancel` fires.
    /// Returns the number of vectors written.
    pub async fn run(mut self, cancel: CancellationToken) -> usize {
        info!(model = self.llm.name(), "Embedding worker started");
        let mut written = 0;
        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            match self.process(&job).await {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => warn!(?job, error = %e, "Embedding job failed"),
            }
        }
        info!(written, "Embedding worker stopped");
        written
    }

    /// Embed one job's text and store the vector.
    /// `Ok(false)` means the model has no embedding capability.
    pub async fn process(&self, job: &EmbeddingJob) -> Result<bool> {
        let Some(vector) = self.llm.embed(job.text()).await? else {
            debug!(model = self.llm.name(), "Model produces no embeddings, skipping job");
            return Ok(false);
        };

        match job {
            EmbeddingJob::Example { id, .. } => self.store.set_example_embedding(*id, vector).await?,
            EmbeddingJob::Record { id, .. } => self.store.set_record_embedding(*id, vector).await?,
        }
        debug!(?job, "Embedding stored");
        Ok(true)
    }
}

/// Queue every stored example that has no embedding yet.
/// Returns how many jobs were accepted by the queue.
pub async fn backfill(store: &dyn DatasetStore, queue: &EmbeddingQueue) -> std::result::Result<usize, StoreError> {
    let missing = store.examples_missing_embedding().await?;
    let total = missing.len();
    let queued = missing
        .into_iter()
        .filter(|example| {
            queue.enqueue(EmbeddingJob::Example {
                id: example.id,
                text: example.key.clone(),
            })
        })
        .count();
    info!(total, queued, "Embedding backfill queued");
    Ok(queued)
}
