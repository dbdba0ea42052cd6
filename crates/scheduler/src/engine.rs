//! Async front end: one lock around the [`Scheduler`] plus a dedicated
//! scheduling task that drains completion and timer events.

use std::sync::{Arc, Mutex, MutexGuard};

use psys_core::{EngineConfig, HardwareDescription};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::completion::{EngineEvent, EventReceiver};
use crate::error::{EngineError, SubmitError};
use crate::firmware::FirmwareLink;
use crate::kcmd::{JobHandle, KcmdState, SessionId};
use crate::scheduler::{CompletionEvent, JobRequest, Scheduler, SchedulerMetrics, Submission};
use crate::watchdog::TokioWatchdog;

/// Running admission engine.
///
/// Client calls resolve synchronously under the state lock. Promotion and
/// deferred admission happen on the scheduling task, which wakes whenever
/// a completion, watchdog expiry or client call is signalled.
pub struct Engine {
    inner: Arc<Mutex<Scheduler>>,
    events: mpsc::UnboundedSender<EngineEvent>,
    task: Option<JoinHandle<()>>,
}

impl Engine {
    /// Start the engine and its scheduling task. Must be called within a Tokio runtime.
    ///
    /// `events` is the receiving half of the
    /// [`completion_channel`](crate::completion::completion_channel) whose
    /// notifier was given to `firmware`.
    pub fn start(
        config: EngineConfig,
        hw: Arc<HardwareDescription>,
        firmware: Arc<dyn FirmwareLink>,
        events: EventReceiver,
    ) -> Self {
        let EventReceiver { rx, tx } = events;
        let watchdog = TokioWatchdog::new(Handle::current(), tx.clone());
        let scheduler = Scheduler::new(config, hw, firmware, Box::new(watchdog));
        let inner = Arc::new(Mutex::new(scheduler));
        let task = tokio::spawn(run_scheduling_task(Arc::clone(&inner), rx));
        info!("Engine started");
        Self {
            inner,
            events: tx,
            task: Some(task),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Scheduler>, EngineError> {
        self.inner.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn wake(&self) -> Result<(), EngineError> {
        self.events
            .send(EngineEvent::Wake)
            .map_err(|_| EngineError::Shutdown)
    }

    pub fn open_session(&self) -> Result<SessionId, EngineError> {
        self.lock()?.open_session()
    }

    /// Abort every live job of the session and drop it.
    pub fn close_session(&self, session: SessionId) -> Result<(), EngineError> {
        self.lock()?.close_session(session)?;
        self.wake()
    }

    /// Admit a job. Returns once the admission decision is made, not when it runs.
    pub fn submit(&self, session: SessionId, request: JobRequest) -> Result<Submission, SubmitError> {
        if self.events.is_closed() {
            return Err(SubmitError::Shutdown);
        }
        let submission = self
            .inner
            .lock()
            .map_err(|_| SubmitError::LockPoisoned)?
            .submit(session, request)?;
        if self.events.send(EngineEvent::Wake).is_err() {
            warn!(job = %submission.handle, "scheduling task gone after admission");
        }
        Ok(submission)
    }

    /// Cancel a job. Its resources are released before this returns.
    pub fn cancel(&self, session: SessionId, handle: JobHandle) -> Result<(), EngineError> {
        self.lock()?.cancel(session, handle)?;
        self.wake()
    }

    /// Reap one completion event without waiting.
    pub fn poll_completion(&self, session: SessionId) -> Result<Option<CompletionEvent>, EngineError> {
        self.lock()?.poll_completion(session)
    }

    /// Wait for the next completion event of a session.
    pub async fn next_completion(&self, session: SessionId) -> Result<CompletionEvent, EngineError> {
        loop {
            let notify = {
                let mut scheduler = self.lock()?;
                if let Some(event) = scheduler.poll_completion(session)? {
                    return Ok(event);
                }
                scheduler.session_notify(session)?
            };
            if self.events.is_closed() {
                return Err(EngineError::Shutdown);
            }
            notify.notified().await;
        }
    }

    pub fn set_throughput_constraint(
        &self,
        session: SessionId,
        handle: JobHandle,
        min_fps: Option<u32>,
    ) -> Result<(), EngineError> {
        self.lock()?.set_throughput_constraint(session, handle, min_fps)
    }

    /// Highest minimum-throughput hint among RUNNING jobs.
    pub fn throughput_demand(&self) -> Result<Option<u32>, EngineError> {
        Ok(self.lock()?.throughput_demand())
    }

    pub fn job_state(&self, handle: JobHandle) -> Result<Option<KcmdState>, EngineError> {
        Ok(self.lock()?.job_state(handle))
    }

    pub fn metrics(&self) -> Result<SchedulerMetrics, EngineError> {
        Ok(self.lock()?.metrics())
    }

    /// Stop the scheduling task and wait for it to exit.
    ///
    /// Jobs still held by the engine are dropped without completion events.
    pub async fn shutdown(mut self) {
        info!("Engine shutdown requested");
        let _ = self.events.send(EngineEvent::Shutdown);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "scheduling task failed");
            }
        }
        info!("Engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // The watchdog keeps a sender alive, so the task only exits on an explicit stop.
        if self.task.take().is_some() {
            debug!("Engine dropped without shutdown, stopping scheduling task");
            let _ = self.events.send(EngineEvent::Shutdown);
        }
    }
}

/// Drain every queued event per wake, then run one scheduling pass.
async fn run_scheduling_task(inner: Arc<Mutex<Scheduler>>, mut rx: mpsc::UnboundedReceiver<EngineEvent>) {
    debug!("scheduling task started");
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(event) = rx.try_recv() {
            batch.push(event);
        }

        let mut scheduler = match inner.lock() {
            Ok(guard) => guard,
            Err(_) => {
                error!("engine state lock poisoned, scheduling task exiting");
                return;
            }
        };
        let mut stop = false;
        for event in batch {
            match event {
                EngineEvent::Notice(notice) => scheduler.on_notice(notice),
                EngineEvent::WatchdogExpired(handle) => scheduler.on_watchdog_expired(handle),
                EngineEvent::Wake => {}
                EngineEvent::Shutdown => stop = true,
            }
        }
        scheduler.reschedule();
        if stop {
            break;
        }
    }
    debug!("scheduling task stopped");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use psys_core::HardwareConfig;

    use super::*;
    use crate::completion::completion_channel;
    use crate::manifest::{ProcessGroup, ProcessNode};
    use crate::sim::SimulatedFirmware;

    fn engine() -> Engine {
        let config = HardwareConfig::default().with_cell("x0", "x");
        let hw = Arc::new(HardwareDescription::from_config(&config).unwrap());
        let (notifier, events) = completion_channel();
        let firmware = SimulatedFirmware::new(notifier, Duration::from_millis(10));
        Engine::start(EngineConfig::default(), hw, Arc::new(firmware), events)
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_engine_stops_its_task() {
        let engine = engine();
        let state = Arc::downgrade(&engine.inner);
        drop(engine);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(state.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn submit_is_rejected_once_the_task_is_gone() {
        let engine = engine();
        let session = engine.open_session().unwrap();
        if let Some(task) = &engine.task {
            task.abort();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        let request = JobRequest::new(ProcessGroup::new(vec![ProcessNode::on_type("x")]));
        assert!(matches!(engine.submit(session, request), Err(SubmitError::Shutdown)));
        assert_eq!(engine.cancel(session, JobHandle(1)), Err(EngineError::UnknownJob(JobHandle(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_the_task() {
        let engine = engine();
        let state = Arc::downgrade(&engine.inner);
        engine.shutdown().await;
        assert!(state.upgrade().is_none());
    }
}
