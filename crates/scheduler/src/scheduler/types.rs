use std::time::Duration;

use psys_core::CellId;
use serde::{Deserialize, Serialize};

use crate::error::JobError;
use crate::kcmd::JobHandle;
use crate::manifest::ProcessGroup;

/// Job priority class. Lower numeric value = higher priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default)]
pub enum Priority {
    /// Latency critical, e.g. a live preview pipeline.
    P0 = 0,
    /// Interactive.
    P1 = 1,
    /// Normal batch work.
    #[default]
    P2 = 2,
    /// Background, tolerates delay.
    P3 = 3,
}

impl Priority {
    /// Highest first.
    pub const ALL: [Priority; 4] = [Priority::P0, Priority::P1, Priority::P2, Priority::P3];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A job as handed to `submit`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequest {
    pub group: ProcessGroup,
    #[serde(default)]
    pub priority: Priority,
    /// Client-chosen value echoed back in the completion event.
    #[serde(default)]
    pub token: u64,
    /// Minimum throughput hint for an external frequency controller.
    #[serde(default)]
    pub min_throughput: Option<u32>,
}

impl JobRequest {
    pub fn new(group: ProcessGroup) -> Self {
        Self {
            group,
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_token(mut self, token: u64) -> Self {
        self.token = token;
        self
    }

    pub fn with_min_throughput(mut self, fps: u32) -> Self {
        self.min_throughput = Some(fps);
        self
    }
}

/// Where `submit` left the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Admission {
    /// Holds running-tier resources and was dispatched for execution.
    Running,
    /// Holds started-tier resources and waits for promotion.
    Started,
    /// Both tiers are exhausted; the job waits in its session queue.
    Deferred,
    /// Dispatch failed; the error is already in the completion queue.
    Completed,
}

/// Result of a successful `submit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Submission {
    pub handle: JobHandle,
    pub admission: Admission,
}

/// Details of a job that finished successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub cells: Vec<CellId>,
    /// The job waited in the started tier before running.
    pub promoted: bool,
    /// Time from submission to entering RUNNING.
    pub queued: Duration,
    /// Time spent RUNNING.
    pub run_time: Duration,
}

/// Exactly one of these is produced for every accepted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionEvent {
    pub handle: JobHandle,
    pub token: u64,
    pub outcome: Result<JobSummary, JobError>,
}

impl CompletionEvent {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order() {
        assert!(Priority::P0 < Priority::P3);
        assert_eq!(Priority::ALL.map(Priority::index), [0, 1, 2, 3]);
        assert_eq!(Priority::default(), Priority::P2);
    }

    #[test]
    fn job_request_from_json_uses_defaults() {
        let json = r#"{ "group": { "nodes": [ { "cell_type": "vector" } ] }, "token": 9 }"#;
        let req: JobRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.token, 9);
        assert_eq!(req.priority, Priority::P2);
        assert_eq!(req.min_throughput, None);
        assert_eq!(req.group.nodes.len(), 1);
    }
}
