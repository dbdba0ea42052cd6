use psys_core::CellId;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, EngineError, JobError};
use crate::firmware::{CompletionNotice, DispatchRequest, DispatchStage, FirmwareStatus};
use crate::kcmd::{JobHandle, Kcmd, KcmdState, SessionId};
use crate::resource::Grant;
use crate::scheduler::types::{Admission, CompletionEvent, JobSummary};

use super::Scheduler;

impl Scheduler {
    // ── Dispatch ──────────────────────────────────────────────

    /// RUN_PREPARED -> RUNNING, arming the watchdog. Dispatch failure completes the job.
    pub(super) fn run(&mut self, kcmd: &mut Kcmd) -> Admission {
        let staged = kcmd.state() == KcmdState::Started;
        kcmd.advance(KcmdState::RunPrepared);
        match self.dispatch(kcmd, DispatchStage::Run) {
            Ok(()) => {
                let now = Instant::now();
                let timeout = self.config.watchdog_timeout();
                kcmd.advance(KcmdState::Running);
                kcmd.running_since = Some(now);
                kcmd.deadline = Some(now + timeout);
                self.watchdog.arm(kcmd.handle, timeout);
                debug!(job = %kcmd.handle, ?timeout, "running");
                Admission::Running
            }
            Err(e) => {
                // Firmware still holds the START stage of a promoted job.
                if staged {
                    self.cancel_in_firmware(kcmd.handle);
                }
                self.dispatch_failed(kcmd, e);
                Admission::Completed
            }
        }
    }

    /// START_PREPARED -> STARTED, joining the promotion queue.
    pub(super) fn stage(&mut self, kcmd: &mut Kcmd) -> Admission {
        kcmd.advance(KcmdState::StartPrepared);
        match self.dispatch(kcmd, DispatchStage::Start) {
            Ok(()) => {
                kcmd.advance(KcmdState::Started);
                self.started_queue.push_back(kcmd.handle);
                debug!(job = %kcmd.handle, queue = self.started_queue.len(), "started");
                Admission::Started
            }
            Err(e) => {
                self.dispatch_failed(kcmd, e);
                Admission::Completed
            }
        }
    }

    fn dispatch(&self, kcmd: &Kcmd, stage: DispatchStage) -> Result<(), DispatchError> {
        let request = DispatchRequest {
            handle: kcmd.handle,
            token: kcmd.token,
            priority: kcmd.priority,
            stage,
            extents: kcmd.grant.as_ref().map(Grant::extents).unwrap_or(&[]),
            group: &kcmd.group,
        };
        self.firmware.dispatch(&request)
    }

    fn dispatch_failed(&mut self, kcmd: &mut Kcmd, error: DispatchError) {
        self.metrics.dispatch_failures += 1;
        warn!(job = %kcmd.handle, error = %error, "dispatch failed");
        self.finish(kcmd, Err(JobError::Dispatch(error)));
    }

    fn cancel_in_firmware(&self, handle: JobHandle) {
        if let Err(e) = self.firmware.cancel(handle) {
            warn!(job = %handle, error = %e, "firmware cancel failed, completing anyway");
        }
    }

    // ── Completion ────────────────────────────────────────────

    /// Drive a job to COMPLETE: release its grant, disarm its watchdog,
    /// unlink it from every queue and publish its completion event.
    ///
    /// Returns false if the job had already completed; nothing is touched then.
    pub(super) fn finish(&mut self, kcmd: &mut Kcmd, outcome: Result<(), JobError>) -> bool {
        if kcmd.state().is_terminal() {
            return false;
        }
        let handle = kcmd.handle;
        let cells: Vec<CellId> = kcmd
            .grant
            .as_ref()
            .map(|g| g.cells().collect())
            .unwrap_or_default();
        if let Some(grant) = kcmd.grant.take() {
            self.pools.free(grant);
        }
        self.watchdog.disarm(handle);
        self.started_queue.retain(|h| *h != handle);

        let now = Instant::now();
        let run_time = kcmd.running_since.map(|t| now - t);
        kcmd.advance(KcmdState::Complete);
        kcmd.deadline = None;
        self.metrics.record_completion(outcome.is_ok(), run_time);

        let outcome = outcome.map(|()| JobSummary {
            cells,
            promoted: kcmd.promoted,
            queued: kcmd
                .running_since
                .map(|t| t - kcmd.submitted_at)
                .unwrap_or_default(),
            run_time: run_time.unwrap_or_default(),
        });
        match &outcome {
            Ok(_) => info!(job = %handle, "completed"),
            Err(e) => info!(job = %handle, error = %e, "completed with error"),
        }

        if let Some(session) = self.sessions.get_mut(&kcmd.session) {
            session.live.remove(&handle);
            for queue in session.pending.iter_mut() {
                queue.retain(|h| *h != handle);
            }
            session.completions.push_back(CompletionEvent {
                handle,
                token: kcmd.token,
                outcome,
            });
            session.notify.notify_one();
        }
        true
    }

    /// Check a job out of the table, apply `f`, and put it back.
    fn with_job<R>(&mut self, handle: JobHandle, f: impl FnOnce(&mut Self, &mut Kcmd) -> R) -> Option<R> {
        let mut kcmd = self.jobs.remove(&handle)?;
        let result = f(self, &mut kcmd);
        self.jobs.insert(handle, kcmd);
        Some(result)
    }

    /// Apply a firmware completion notice. Unknown or finished handles are ignored.
    ///
    /// A staged job only completes here on a firmware error.
    pub fn on_notice(&mut self, notice: CompletionNotice) {
        let handle = notice.handle;
        match self.job_state(handle) {
            None => warn!(job = %handle, "completion for unknown job ignored"),
            Some(KcmdState::Complete) => {
                debug!(job = %handle, "completion for finished job ignored");
            }
            Some(KcmdState::Running) => {
                let outcome = match notice.status {
                    FirmwareStatus::Success => Ok(()),
                    FirmwareStatus::Error(code) => Err(JobError::Firmware(code)),
                };
                self.with_job(handle, |s, kcmd| s.finish(kcmd, outcome));
            }
            Some(KcmdState::Started) => match notice.status {
                FirmwareStatus::Error(code) => {
                    warn!(job = %handle, code, "firmware error for staged job");
                    self.with_job(handle, |s, kcmd| s.finish(kcmd, Err(JobError::Firmware(code))));
                }
                FirmwareStatus::Success => {
                    warn!(job = %handle, "completion for staged job ignored");
                }
            },
            Some(state) => {
                warn!(job = %handle, %state, "completion for job that is not running ignored");
            }
        }
    }

    /// Force a timed-out job to COMPLETE. A no-op if it already finished.
    pub fn on_watchdog_expired(&mut self, handle: JobHandle) {
        if self.job_state(handle) != Some(KcmdState::Running) {
            debug!(job = %handle, "watchdog expiry for finished job ignored");
            return;
        }
        let timeout = self.config.watchdog_timeout();
        warn!(job = %handle, ?timeout, "watchdog expired, aborting");
        self.metrics.timeouts += 1;
        self.with_job(handle, |s, kcmd| {
            s.cancel_in_firmware(handle);
            s.finish(kcmd, Err(JobError::Timeout(timeout)))
        });
    }

    // ── Client operations ─────────────────────────────────────

    /// Cancel a job. Its grant is released before this returns.
    pub fn cancel(&mut self, session: SessionId, handle: JobHandle) -> Result<(), EngineError> {
        if self.owned_job(session, handle)?.state().is_terminal() {
            return Err(EngineError::AlreadyComplete(handle));
        }
        self.metrics.cancellations += 1;
        self.with_job(handle, |s, kcmd| {
            if kcmd.state().is_dispatched() {
                s.cancel_in_firmware(handle);
            }
            s.finish(kcmd, Err(JobError::Cancelled))
        });
        info!(job = %handle, %session, "cancelled");
        Ok(())
    }

    /// Abort every live job of a session and forget its completions.
    pub fn close_session(&mut self, id: SessionId) -> Result<(), EngineError> {
        let live: Vec<JobHandle> = self.session(id)?.live.iter().copied().collect();
        let aborted = live.len();
        for handle in live {
            self.with_job(handle, |s, kcmd| {
                if kcmd.state().is_dispatched() {
                    s.cancel_in_firmware(handle);
                }
                s.finish(kcmd, Err(JobError::Aborted))
            });
        }
        if let Some(session) = self.sessions.remove(&id) {
            session.notify.notify_waiters();
            session.notify.notify_one();
        }
        self.jobs.retain(|_, k| k.session != id);
        info!(session = %id, aborted, "session closed");
        Ok(())
    }

    /// Reap one completion event, releasing its command object.
    pub fn poll_completion(&mut self, session: SessionId) -> Result<Option<CompletionEvent>, EngineError> {
        let event = self.session_mut(session)?.completions.pop_front();
        if let Some(event) = &event {
            self.jobs.remove(&event.handle);
        }
        Ok(event)
    }

    // ── Throughput constraints ────────────────────────────────

    /// Store or clear a job's minimum-throughput hint.
    pub fn set_throughput_constraint(
        &mut self,
        session: SessionId,
        handle: JobHandle,
        min_fps: Option<u32>,
    ) -> Result<(), EngineError> {
        if self.owned_job(session, handle)?.state().is_terminal() {
            return Err(EngineError::AlreadyComplete(handle));
        }
        if let Some(kcmd) = self.jobs.get_mut(&handle) {
            kcmd.min_throughput = min_fps;
        }
        Ok(())
    }

    /// Highest throughput hint among RUNNING jobs.
    pub fn throughput_demand(&self) -> Option<u32> {
        self.jobs
            .values()
            .filter(|k| k.state() == KcmdState::Running)
            .filter_map(|k| k.min_throughput)
            .max()
    }
}
