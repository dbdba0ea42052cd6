//! In-process firmware simulator.
//!
//! Completes RUN dispatches after a fixed latency through a
//! [`CompletionNotifier`]. Individual jobs can be scripted, by client token,
//! to fail with an error code or to hang so the watchdog has to reap them.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::completion::CompletionNotifier;
use crate::error::{CancelError, DispatchError};
use crate::firmware::{DispatchRequest, DispatchStage, FirmwareLink, FirmwareStatus};
use crate::kcmd::JobHandle;

#[derive(Default)]
struct SimState {
    failures: HashMap<u64, i32>,
    hang_tokens: HashSet<u64>,
    link_down: bool,
    staged: HashSet<JobHandle>,
    hung: HashSet<JobHandle>,
    inflight: HashMap<JobHandle, JoinHandle<()>>,
    log: Vec<(JobHandle, DispatchStage)>,
}

pub struct SimulatedFirmware {
    notifier: CompletionNotifier,
    runtime: Handle,
    latency: Duration,
    state: Mutex<SimState>,
}

impl SimulatedFirmware {
    /// Must be called within a Tokio runtime.
    pub fn new(notifier: CompletionNotifier, latency: Duration) -> Self {
        Self {
            notifier,
            runtime: Handle::current(),
            latency,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Jobs submitted with `token` complete with firmware error `code`.
    pub fn with_failure(mut self, token: u64, code: i32) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.failures.insert(token, code);
        }
        self
    }

    /// Jobs submitted with `token` never complete.
    pub fn with_hang(mut self, token: u64) -> Self {
        if let Ok(state) = self.state.get_mut() {
            state.hang_tokens.insert(token);
        }
        self
    }

    /// While down, every dispatch and cancel fails with `LinkDown`.
    pub fn set_link_down(&self, down: bool) {
        if let Ok(mut state) = self.state.lock() {
            state.link_down = down;
        }
    }

    /// Every accepted dispatch, in order.
    pub fn dispatch_log(&self) -> Vec<(JobHandle, DispatchStage)> {
        self.state.lock().map(|s| s.log.clone()).unwrap_or_default()
    }
}

impl FirmwareLink for SimulatedFirmware {
    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<(), DispatchError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| DispatchError::Rejected("simulator state poisoned".into()))?;
        if state.link_down {
            return Err(DispatchError::LinkDown);
        }
        let handle = request.handle;
        state.log.push((handle, request.stage));

        match request.stage {
            DispatchStage::Start => {
                state.staged.insert(handle);
                trace!(job = %handle, "sim: staged");
            }
            DispatchStage::Run => {
                state.staged.remove(&handle);
                if state.hang_tokens.contains(&request.token) {
                    debug!(job = %handle, "sim: hanging");
                    state.hung.insert(handle);
                    return Ok(());
                }
                let status = match state.failures.get(&request.token) {
                    Some(&code) => FirmwareStatus::Error(code),
                    None => FirmwareStatus::Success,
                };
                let notifier = self.notifier.clone();
                let latency = self.latency;
                let task = self.runtime.spawn(async move {
                    tokio::time::sleep(latency).await;
                    notifier.notify(handle, status);
                });
                state.inflight.retain(|_, t| !t.is_finished());
                state.inflight.insert(handle, task);
            }
        }
        Ok(())
    }

    fn cancel(&self, handle: JobHandle) -> Result<(), CancelError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CancelError::Rejected("simulator state poisoned".into()))?;
        if state.link_down {
            return Err(CancelError::LinkDown);
        }
        if let Some(task) = state.inflight.remove(&handle) {
            task.abort();
            return Ok(());
        }
        if state.staged.remove(&handle) || state.hung.remove(&handle) {
            return Ok(());
        }
        Err(CancelError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::{completion_channel, EngineEvent};
    use crate::firmware::CompletionNotice;
    use crate::manifest::ProcessGroup;
    use crate::scheduler::Priority;

    fn request(group: &ProcessGroup, handle: u64, token: u64, stage: DispatchStage) -> DispatchRequest<'_> {
        DispatchRequest {
            handle: JobHandle(handle),
            token,
            priority: Priority::P2,
            stage,
            extents: &[],
            group,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn run_dispatch_completes_after_latency() {
        let (notifier, mut events) = completion_channel();
        let sim = SimulatedFirmware::new(notifier, Duration::from_millis(50)).with_failure(7, -5);
        let group = ProcessGroup::default();

        sim.dispatch(&request(&group, 1, 0, DispatchStage::Run)).unwrap();
        sim.dispatch(&request(&group, 2, 7, DispatchStage::Run)).unwrap();

        let first = events.rx.recv().await.unwrap();
        let second = events.rx.recv().await.unwrap();
        let mut statuses = vec![first, second];
        statuses.sort_by_key(|e| match e {
            EngineEvent::Notice(n) => n.handle,
            _ => JobHandle(0),
        });
        assert_eq!(
            statuses,
            vec![
                EngineEvent::Notice(CompletionNotice {
                    handle: JobHandle(1),
                    status: FirmwareStatus::Success
                }),
                EngineEvent::Notice(CompletionNotice {
                    handle: JobHandle(2),
                    status: FirmwareStatus::Error(-5)
                }),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn start_dispatch_and_hang_never_complete() {
        let (notifier, mut events) = completion_channel();
        let sim = SimulatedFirmware::new(notifier, Duration::from_millis(10)).with_hang(3);
        let group = ProcessGroup::default();

        sim.dispatch(&request(&group, 1, 0, DispatchStage::Start)).unwrap();
        sim.dispatch(&request(&group, 2, 3, DispatchStage::Run)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(events.rx.try_recv().is_err());

        assert_eq!(sim.cancel(JobHandle(1)), Ok(()));
        assert_eq!(sim.cancel(JobHandle(2)), Ok(()));
        assert_eq!(sim.cancel(JobHandle(2)), Err(CancelError::NotFound));
        assert_eq!(sim.dispatch_log().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_pending_completion() {
        let (notifier, mut events) = completion_channel();
        let sim = SimulatedFirmware::new(notifier, Duration::from_millis(100));
        let group = ProcessGroup::default();

        sim.dispatch(&request(&group, 4, 0, DispatchStage::Run)).unwrap();
        sim.cancel(JobHandle(4)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(events.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn link_down_rejects_everything() {
        let (notifier, _events) = completion_channel();
        let sim = SimulatedFirmware::new(notifier, Duration::ZERO);
        let group = ProcessGroup::default();
        sim.set_link_down(true);

        assert_eq!(
            sim.dispatch(&request(&group, 1, 0, DispatchStage::Run)),
            Err(DispatchError::LinkDown)
        );
        assert_eq!(sim.cancel(JobHandle(1)), Err(CancelError::LinkDown));
        assert!(sim.dispatch_log().is_empty());
    }
}
