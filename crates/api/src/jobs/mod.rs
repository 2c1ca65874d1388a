//! Background job scheduler and job implementations.

mod due_reports;
mod pool_metrics;
mod scheduler;

pub use due_reports::DueReportsJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
