use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::error::{AllocError, JobError, SubmitError};
use crate::kcmd::{JobHandle, Kcmd, SessionId};
use crate::manifest::ManifestError;
use crate::resource::{ResourcePools, Tier};
use crate::scheduler::types::{Admission, JobRequest, Priority, Submission};

use super::Scheduler;

impl Scheduler {
    /// Run admission for a new job once.
    ///
    /// The running tier is tried only while no job waits in STARTED; then the
    /// started tier. If both are exhausted the job is deferred in its
    /// session queue, unless nothing holds any resource, in which case it is
    /// rejected outright.
    pub fn submit(&mut self, session: SessionId, request: JobRequest) -> Result<Submission, SubmitError> {
        let limit = self.config.max_jobs_per_session;
        let backlog_limit = self.config.completion_queue_depth;
        let s = self
            .sessions
            .get_mut(&session)
            .ok_or(SubmitError::UnknownSession(session))?;
        if s.live.len() >= limit {
            return Err(SubmitError::SessionFull { session, limit });
        }
        if s.completions.len() >= backlog_limit {
            return Err(SubmitError::CompletionBacklog {
                session,
                pending: s.completions.len(),
            });
        }
        let behind_pending = s.has_pending_at_or_above(request.priority);
        s.issued += 1;
        let issue_id = s.issued;

        let handle = JobHandle(self.next_handle);
        self.next_handle += 1;
        self.metrics.jobs_submitted += 1;

        let requirements = match self.interpreter.interpret(&request.group) {
            Ok(r) => r,
            Err(ManifestError::Impossible {
                demand,
                requested,
                capacity,
            }) => {
                self.metrics.rejected_impossible += 1;
                warn!(job = %handle, %demand, requested, capacity, "Rejected: exceeds total capacity");
                return Err(SubmitError::Impossible {
                    handle,
                    demand,
                    requested,
                    capacity,
                });
            }
            Err(source) => {
                warn!(job = %handle, error = %source, "Rejected: invalid manifest");
                return Err(SubmitError::InvalidManifest { handle, source });
            }
        };

        let mut kcmd = Kcmd::new(
            handle,
            session,
            request.token,
            issue_id,
            request.priority,
            Arc::new(request.group),
            requirements,
            request.min_throughput,
        );
        if let Some(s) = self.sessions.get_mut(&session) {
            s.live.insert(handle);
        }

        if behind_pending {
            debug!(job = %handle, priority = ?kcmd.priority, "queued behind pending jobs");
            self.defer(kcmd);
            return Ok(Submission {
                handle,
                admission: Admission::Deferred,
            });
        }

        let started_waiting = !self.started_queue.is_empty();
        let admission = match admit(&mut self.pools, &mut kcmd, started_waiting) {
            Ok(tier) => self.launch(&mut kcmd, tier),
            Err(source) if self.pools.is_idle() => {
                if let Some(s) = self.sessions.get_mut(&session) {
                    s.live.remove(&handle);
                }
                warn!(job = %handle, error = %source, "Rejected: exhausted with no active job");
                return Err(SubmitError::Exhausted { handle, source });
            }
            Err(source) => {
                debug!(job = %handle, error = %source, "both tiers exhausted, deferring");
                self.defer(kcmd);
                return Ok(Submission {
                    handle,
                    admission: Admission::Deferred,
                });
            }
        };
        self.jobs.insert(handle, kcmd);
        Ok(Submission { handle, admission })
    }

    fn defer(&mut self, kcmd: Kcmd) {
        self.metrics.deferred += 1;
        if let Some(s) = self.sessions.get_mut(&kcmd.session) {
            s.pending[kcmd.priority.index()].push_back(kcmd.handle);
        }
        self.jobs.insert(kcmd.handle, kcmd);
    }

    /// Dispatch a freshly admitted job in the tier it was granted.
    pub(super) fn launch(&mut self, kcmd: &mut Kcmd, tier: Tier) -> Admission {
        info!(job = %kcmd.handle, issue = kcmd.issue_id, %tier, priority = ?kcmd.priority, "admitted");
        match tier {
            Tier::Running => {
                self.metrics.admitted_running += 1;
                self.run(kcmd)
            }
            Tier::Started => {
                self.metrics.admitted_started += 1;
                self.stage(kcmd)
            }
        }
    }

    /// One scheduling pass: promote STARTED jobs, then retry deferred ones.
    pub fn reschedule(&mut self) {
        let promoted = self.promote_started();
        let admitted = self.admit_deferred();
        if promoted + admitted > 0 {
            debug!(promoted, admitted, "reschedule pass");
        }
    }

    /// Promote STARTED jobs in FIFO order until the queue is empty or the
    /// head cannot move into the running tier.
    pub(super) fn promote_started(&mut self) -> usize {
        let mut promoted = 0;
        while let Some(&handle) = self.started_queue.front() {
            let Some(mut kcmd) = self.jobs.remove(&handle) else {
                self.started_queue.pop_front();
                continue;
            };
            let moved = match kcmd.grant.as_mut() {
                Some(grant) => self.pools.move_grant(grant, Tier::Running),
                None => Ok(()),
            };
            match moved {
                Ok(()) => {
                    self.started_queue.pop_front();
                    self.metrics.promotions += 1;
                    kcmd.promoted = true;
                    info!(job = %handle, "promoted to running tier");
                    self.run(&mut kcmd);
                    self.jobs.insert(handle, kcmd);
                    promoted += 1;
                }
                Err(e) => {
                    self.metrics.promotion_conflicts += 1;
                    debug!(job = %handle, error = %e, "promotion blocked");
                    self.jobs.insert(handle, kcmd);
                    break;
                }
            }
        }
        promoted
    }

    /// Retry deferred NEW jobs: highest priority first, sessions in
    /// ascending id, FIFO within a queue. Stops at the first job that
    /// still does not fit.
    pub(super) fn admit_deferred(&mut self) -> usize {
        let mut admitted = 0;
        let session_ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        for priority in Priority::ALL {
            for &sid in &session_ids {
                loop {
                    let Some(handle) = self.pending_head(sid, priority) else {
                        break;
                    };
                    let Some(mut kcmd) = self.jobs.remove(&handle) else {
                        self.pop_pending(sid, priority);
                        continue;
                    };
                    let started_waiting = !self.started_queue.is_empty();
                    match admit(&mut self.pools, &mut kcmd, started_waiting) {
                        Ok(tier) => {
                            self.pop_pending(sid, priority);
                            self.launch(&mut kcmd, tier);
                            self.jobs.insert(handle, kcmd);
                            admitted += 1;
                        }
                        Err(e) if self.pools.is_idle() => {
                            self.pop_pending(sid, priority);
                            warn!(job = %handle, error = %e, "deferred job cannot fit an idle machine");
                            self.finish(&mut kcmd, Err(JobError::Exhausted));
                            self.jobs.insert(handle, kcmd);
                        }
                        Err(_) => {
                            self.jobs.insert(handle, kcmd);
                            return admitted;
                        }
                    }
                }
            }
        }
        admitted
    }

    fn pending_head(&self, session: SessionId, priority: Priority) -> Option<JobHandle> {
        self.sessions
            .get(&session)
            .and_then(|s| s.pending[priority.index()].front().copied())
    }

    fn pop_pending(&mut self, session: SessionId, priority: Priority) {
        if let Some(s) = self.sessions.get_mut(&session) {
            s.pending[priority.index()].pop_front();
        }
    }
}

/// Reserve a job's whole requirement set in one tier.
///
/// On success the grant is stored on the command object. On failure no
/// unit stays reserved and the started-tier error is returned.
fn admit(pools: &mut ResourcePools, kcmd: &mut Kcmd, started_waiting: bool) -> Result<Tier, AllocError> {
    if !started_waiting {
        match pools.allocate_group(Tier::Running, kcmd.requirements.nodes()) {
            Ok(grant) => {
                kcmd.grant = Some(grant);
                return Ok(Tier::Running);
            }
            Err(e) => trace!(job = %kcmd.handle, error = %e, "running tier exhausted"),
        }
    }
    let grant = pools.allocate_group(Tier::Started, kcmd.requirements.nodes())?;
    kcmd.grant = Some(grant);
    Ok(Tier::Started)
}
