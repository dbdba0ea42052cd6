//! Priority-queued admission scheduler over the two-tier resource pools.
//!
//! Jobs are admitted into the running tier when possible, otherwise into the
//! started tier, and promoted from STARTED in strict FIFO order as running
//! capacity frees up. See [`runner::Scheduler`] for the state machine.

pub mod metrics;
pub mod runner;
pub mod types;

pub use metrics::SchedulerMetrics;
pub use runner::Scheduler;
pub use types::{Admission, CompletionEvent, JobRequest, JobSummary, Priority, Submission};
