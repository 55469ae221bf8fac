//! Dispatch orchestration: scheduler, per-chunk workers, and metrics.

mod metrics;
mod scheduler;
mod worker;

pub use metrics::{Metrics, MetricsReporter, MetricsSnapshot};
pub use scheduler::{Scheduler, SchedulerStats};
pub use worker::{OutcomeStatus, WorkerOutcome, WorkerTask};
