//! Command objects: the runtime record of one submitted job.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::manifest::{GroupRequirements, ProcessGroup};
use crate::resource::Grant;
use crate::scheduler::Priority;

/// Opaque engine-assigned job handle. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobHandle(pub u64);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job#{}", self.0)
    }
}

/// Client session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// Lifecycle state of a command object.
///
/// ```text
/// NEW -> RUN_PREPARED -> RUNNING -> COMPLETE
/// NEW -> START_PREPARED -> STARTED -> RUN_PREPARED
/// any non-terminal state -> COMPLETE
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KcmdState {
    New,
    StartPrepared,
    Started,
    RunPrepared,
    Running,
    Complete,
}

impl KcmdState {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: KcmdState) -> bool {
        use KcmdState::*;
        matches!(
            (self, next),
            (New, RunPrepared)
                | (New, StartPrepared)
                | (New, Complete)
                | (StartPrepared, Started)
                | (StartPrepared, Complete)
                | (Started, RunPrepared)
                | (Started, Complete)
                | (RunPrepared, Running)
                | (RunPrepared, Complete)
                | (Running, Complete)
        )
    }

    /// The firmware has accepted the job in some stage.
    pub fn is_dispatched(self) -> bool {
        matches!(self, KcmdState::Started | KcmdState::Running)
    }

    pub fn is_terminal(self) -> bool {
        self == KcmdState::Complete
    }
}

impl fmt::Display for KcmdState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KcmdState::New => "NEW",
            KcmdState::StartPrepared => "START_PREPARED",
            KcmdState::Started => "STARTED",
            KcmdState::RunPrepared => "RUN_PREPARED",
            KcmdState::Running => "RUNNING",
            KcmdState::Complete => "COMPLETE",
        };
        f.write_str(s)
    }
}

/// One submitted job. Owned by the scheduler from submission until reaped.
#[derive(Debug)]
pub(crate) struct Kcmd {
    pub handle: JobHandle,
    pub session: SessionId,
    pub token: u64,
    /// Global submission sequence number.
    pub issue_id: u64,
    pub priority: Priority,
    state: KcmdState,
    pub group: Arc<ProcessGroup>,
    pub requirements: GroupRequirements,
    pub min_throughput: Option<u32>,
    /// Empty until admission; taken exactly once on completion.
    pub grant: Option<Grant>,
    pub promoted: bool,
    pub submitted_at: Instant,
    pub running_since: Option<Instant>,
    pub deadline: Option<Instant>,
}

impl Kcmd {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        handle: JobHandle,
        session: SessionId,
        token: u64,
        issue_id: u64,
        priority: Priority,
        group: Arc<ProcessGroup>,
        requirements: GroupRequirements,
        min_throughput: Option<u32>,
    ) -> Self {
        Self {
            handle,
            session,
            token,
            issue_id,
            priority,
            state: KcmdState::New,
            group,
            requirements,
            min_throughput,
            grant: None,
            promoted: false,
            submitted_at: Instant::now(),
            running_since: None,
            deadline: None,
        }
    }

    pub fn state(&self) -> KcmdState {
        self.state
    }

    /// Move to `next`. Illegal transitions are scheduler bugs.
    pub fn advance(&mut self, next: KcmdState) {
        debug_assert!(
            self.state.can_advance_to(next),
            "{}: illegal transition {} -> {}",
            self.handle,
            self.state,
            next
        );
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use KcmdState::*;

    const ALL: [KcmdState; 6] = [New, StartPrepared, Started, RunPrepared, Running, Complete];

    #[test]
    fn complete_is_terminal() {
        for next in ALL {
            assert!(!Complete.can_advance_to(next), "COMPLETE -> {next}");
        }
    }

    #[test]
    fn every_live_state_can_complete() {
        for state in ALL.into_iter().filter(|s| !s.is_terminal()) {
            assert!(state.can_advance_to(Complete), "{state} -> COMPLETE");
        }
    }

    #[test]
    fn running_is_only_reached_through_run_prepared() {
        for state in ALL {
            assert_eq!(state.can_advance_to(Running), state == RunPrepared);
        }
    }

    #[test]
    fn promotion_path() {
        assert!(New.can_advance_to(StartPrepared));
        assert!(StartPrepared.can_advance_to(Started));
        assert!(Started.can_advance_to(RunPrepared));
        assert!(!Started.can_advance_to(Running));
        assert!(!New.can_advance_to(Started));
        assert!(!Running.can_advance_to(Started));
    }

    #[test]
    fn dispatched_states() {
        let dispatched: Vec<_> = ALL.into_iter().filter(|s| s.is_dispatched()).collect();
        assert_eq!(dispatched, vec![Started, Running]);
    }

    #[test]
    fn display_names() {
        assert_eq!(JobHandle(7).to_string(), "job#7");
        assert_eq!(SessionId(2).to_string(), "session#2");
        assert_eq!(RunPrepared.to_string(), "RUN_PREPARED");
    }
}
