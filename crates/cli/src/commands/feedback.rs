//! `querysmith feedback`: Record a reviewer verdict.

use querysmith_engine::EmbeddingQueue;
use querysmith_workflow::EmbeddingWorker;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::{CliResult, active_generation_model, chat_service, load_config, open_store};

pub async fn run(explicit: Option<&Path>, chat_id: i64, correct: bool) -> CliResult {
    let config = load_config(explicit)?;
    let store = open_store(&config).await?;

    let (queue, rx) = EmbeddingQueue::channel(1);
    let service = chat_service(&config, store.clone()).with_embedding_queue(queue);
    service.record_feedback(chat_id, correct).await?;
    // Closes the queue so the worker below stops once drained
    drop(service);

    println!("✅ Answer {chat_id} marked {}", if correct { "correct" } else { "wrong" });

    // Drain the job an approval queues
    match active_generation_model(store.as_ref()).await {
        Ok(Some(llm)) => {
            let written = EmbeddingWorker::new(store, llm, rx).run(CancellationToken::new()).await;
            if written > 0 {
                println!("   Question embedded for future ranking");
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Skipping question embedding"),
    }

    Ok(())
}
