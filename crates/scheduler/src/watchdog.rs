//! Per-job deadline timers.

use std::collections::HashMap;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::completion::EngineEvent;
use crate::kcmd::JobHandle;

/// Arms and disarms one deadline per running job.
///
/// Expiry is reported as an event on the engine channel, so an expiry that
/// races a completion is resolved by whichever the scheduler sees first.
pub trait WatchdogTimer: Send {
    fn arm(&mut self, handle: JobHandle, timeout: Duration);

    /// Idempotent. Disarming an unknown or fired timer is a no-op.
    fn disarm(&mut self, handle: JobHandle);
}

/// Watchdog backed by Tokio sleep tasks.
pub(crate) struct TokioWatchdog {
    runtime: Handle,
    events: mpsc::UnboundedSender<EngineEvent>,
    timers: HashMap<JobHandle, JoinHandle<()>>,
}

impl TokioWatchdog {
    pub(crate) fn new(runtime: Handle, events: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            runtime,
            events,
            timers: HashMap::new(),
        }
    }
}

impl WatchdogTimer for TokioWatchdog {
    fn arm(&mut self, handle: JobHandle, timeout: Duration) {
        let events = self.events.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = events.send(EngineEvent::WatchdogExpired(handle));
        });
        if let Some(previous) = self.timers.insert(handle, task) {
            previous.abort();
        }
        trace!(job = %handle, ?timeout, "watchdog armed");
    }

    fn disarm(&mut self, handle: JobHandle) {
        if let Some(task) = self.timers.remove(&handle) {
            task.abort();
            trace!(job = %handle, "watchdog disarmed");
        }
    }
}

impl Drop for TokioWatchdog {
    fn drop(&mut self) {
        for (_, task) in self.timers.drain() {
            task.abort();
        }
    }
}
