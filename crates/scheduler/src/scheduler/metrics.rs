use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::resource::PoolOccupancy;

use super::types::Priority;

/// Engine operational counters and gauges.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub jobs_submitted: u64,
    pub admitted_running: u64,
    pub admitted_started: u64,
    /// Submissions that found both tiers exhausted.
    pub deferred: u64,
    pub promotions: u64,
    /// Promotion attempts that hit a unit still held in the running tier.
    pub promotion_conflicts: u64,
    pub completed_ok: u64,
    pub completed_err: u64,
    pub timeouts: u64,
    pub cancellations: u64,
    pub dispatch_failures: u64,
    pub rejected_impossible: u64,

    /// Jobs currently RUNNING.
    pub running_jobs: usize,
    /// Length of the global STARTED queue.
    pub started_queue_depth: usize,
    /// Deferred NEW jobs per priority, across all sessions.
    pub deferred_by_priority: HashMap<Priority, usize>,
    pub started_occupancy: PoolOccupancy,
    pub running_occupancy: PoolOccupancy,

    pub last_completion: Option<DateTime<Utc>>,
    /// Mean RUNNING time of successfully completed jobs.
    pub avg_run_duration: Duration,
}

impl SchedulerMetrics {
    /// Record a finished job.
    pub fn record_completion(&mut self, success: bool, run_time: Option<Duration>) {
        self.last_completion = Some(Utc::now());
        if !success {
            self.completed_err += 1;
            return;
        }
        self.completed_ok += 1;

        let Some(duration) = run_time else { return };
        let count = self.completed_ok;
        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        self.avg_run_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_run_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn completed(&self) -> u64 {
        self.completed_ok + self.completed_err
    }
}
