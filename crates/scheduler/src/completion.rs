//! Completion and timer events flowing into the scheduling task.
//!
//! Producers (the firmware link, watchdog timers, client calls) push into an
//! unbounded channel and never block. The scheduling task drains it.

use tokio::sync::mpsc;
use tracing::warn;

use crate::firmware::{CompletionNotice, FirmwareStatus};
use crate::kcmd::JobHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum EngineEvent {
    Notice(CompletionNotice),
    WatchdogExpired(JobHandle),
    /// Re-run promotion and deferred admission.
    Wake,
    Shutdown,
}

/// Cloneable, non-blocking sender for firmware completion notices.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl CompletionNotifier {
    /// Report a finished job. Returns false once the engine has stopped.
    pub fn notify(&self, handle: JobHandle, status: FirmwareStatus) -> bool {
        let sent = self
            .tx
            .send(EngineEvent::Notice(CompletionNotice { handle, status }))
            .is_ok();
        if !sent {
            warn!(job = %handle, "completion notice after engine shutdown");
        }
        sent
    }
}

/// Receiving end of [`completion_channel`], consumed by `Engine::start`.
#[derive(Debug)]
pub struct EventReceiver {
    pub(crate) rx: mpsc::UnboundedReceiver<EngineEvent>,
    pub(crate) tx: mpsc::UnboundedSender<EngineEvent>,
}

/// Create the notifier handed to the firmware link and the matching receiver.
pub fn completion_channel() -> (CompletionNotifier, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (CompletionNotifier { tx: tx.clone() }, EventReceiver { rx, tx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_arrive_in_order() {
        let (notifier, mut events) = completion_channel();
        assert!(notifier.notify(JobHandle(1), FirmwareStatus::Success));
        assert!(notifier.clone().notify(JobHandle(2), FirmwareStatus::Error(-5)));

        let first = events.rx.try_recv().unwrap();
        assert_eq!(
            first,
            EngineEvent::Notice(CompletionNotice {
                handle: JobHandle(1),
                status: FirmwareStatus::Success
            })
        );
        assert!(matches!(
            events.rx.try_recv().unwrap(),
            EngineEvent::Notice(CompletionNotice { status: FirmwareStatus::Error(-5), .. })
        ));
    }

    #[test]
    fn notify_fails_after_receiver_dropped() {
        let (notifier, events) = completion_channel();
        drop(events);
        assert!(!notifier.notify(JobHandle(1), FirmwareStatus::Success));
    }
}
