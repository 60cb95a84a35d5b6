//! Clip job orchestration.
//!
//! This crate provides:
//! - Job runner for the download → trim pipeline
//! - Bounded FIFO dispatcher with a fixed number of worker slots
//! - Result publication with download leases
//! - Periodic retention of clips and job records

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod publisher;
pub mod retention;
pub mod runner;

#[cfg(test)]
mod testing;

pub use config::WorkerConfig;
pub use dispatcher::{Dispatcher, DispatcherStats, JobHandle};
pub use error::{DispatchError, PublishError, PublishResult};
pub use logging::JobLogger;
pub use publisher::{ArtifactLease, ResultPublisher, SweepReport};
pub use retention::{RetentionReport, RetentionService};
pub use runner::{JobRunner, RunnerSettings};
