//! `querysmith daemon`: Background jobs: retention cleanup and embeddings.

use querysmith_engine::EmbeddingQueue;
use querysmith_workflow::{EmbeddingWorker, JobScheduler, RetentionJob, backfill};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{CliResult, active_generation_model, load_config, open_store};

pub async fn run(explicit: Option<&Path>) -> CliResult {
    let config = load_config(explicit)?;
    let store = open_store(&config).await?;
    let cancel = CancellationToken::new();

    println!("querysmith daemon: starting background jobs");
    println!("   Storage:    {}", store_label(&config.storage.database_url));
    println!(
        "   Retention:  {}",
        if config.retention.enabled {
            format!(
                "every '{}', keep {} days",
                config.retention.schedule, config.retention.keep_days
            )
        } else {
            "disabled".into()
        }
    );

    let scheduler = JobScheduler::new();
    if config.retention.enabled {
        let job = Arc::new(RetentionJob::new(store.clone(), config.retention.keep_days));
        scheduler
            .add_job(job, &config.retention.schedule, config.retention.max_concurrent)
            .await?;
    }
    let scheduler_handle = scheduler.start(cancel.clone());

    // The queue stays open for the daemon's lifetime
    let (queue, rx) = EmbeddingQueue::channel(config.embeddings.queue_capacity);
    let worker_handle = match active_generation_model(store.as_ref()).await {
        Ok(Some(llm)) => {
            if config.embeddings.backfill_on_start {
                backfill(store.as_ref(), &queue).await?;
            }
            let worker = EmbeddingWorker::new(store.clone(), llm, rx);
            println!("   Embeddings: worker running");
            Some(tokio::spawn(worker.run(cancel.clone())))
        }
        Ok(None) => {
            println!("   Embeddings: no active model, worker disabled");
            None
        }
        Err(e) => {
            warn!(error = %e, "Active model unusable, embedding worker disabled");
            println!("   Embeddings: disabled ({e})");
            None
        }
    };

    info!(jobs = ?scheduler.job_names().await, "Daemon running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    cancel.cancel();
    scheduler_handle.await?;
    if let Some(handle) = worker_handle {
        handle.await?;
    }
    drop(queue);

    Ok(())
}

/// The storage URL without query parameters.
fn store_label(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}
