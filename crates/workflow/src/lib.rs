//! Background work: cron scheduling, retention cleanup, and embeddings.
//!
//! Nothing here sits on the request path. Each piece has its own failure
//! domain; errors are logged and never reach an in-flight question.
//!
//! | Piece | Trigger |
//! |---|---|
//! | [`JobScheduler`] | 5-field cron expressions, checked once a minute |
//! | [`RetentionJob`] | registered with the scheduler |
//! | [`EmbeddingWorker`] | jobs arriving on an [`querysmith_engine::EmbeddingQueue`] |

pub mod cron;
pub mod embedding_worker;
pub mod retention;
pub mod scheduler;

pub use cron::CronExpr;
pub use embedding_worker::{EmbeddingWorker, backfill};
pub use retention::RetentionJob;
pub use scheduler::{Job, JobScheduler};
