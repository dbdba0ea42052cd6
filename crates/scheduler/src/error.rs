use std::time::Duration;

use thiserror::Error;

use crate::kcmd::{JobHandle, SessionId};
use crate::manifest::{Demand, ManifestError};
use crate::resource::{ResourceClass, Tier};

/// A single pool operation failed. Never leaves a bitmap modified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("{class} exhausted in {tier} pool ({requested} units requested)")]
    Exhausted {
        tier: Tier,
        class: ResourceClass,
        requested: u32,
    },

    #[error("move into {target} pool conflicts on {class} unit {index}")]
    Conflict {
        target: Tier,
        class: ResourceClass,
        index: u32,
    },

    #[error("{0} is not described by the hardware table")]
    UnknownResource(ResourceClass),
}

/// Errors raised by the firmware link when handing over a job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("firmware link busy")]
    Busy,

    #[error("firmware link down")]
    LinkDown,

    #[error("firmware rejected job: {0}")]
    Rejected(String),
}

/// Errors raised by the firmware link for a best-effort cancel.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelError {
    #[error("firmware does not know the job")]
    NotFound,

    #[error("firmware link down")]
    LinkDown,

    #[error("firmware refused cancel: {0}")]
    Rejected(String),
}

/// Terminal error outcome of an accepted job, delivered in its completion event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    #[error("firmware reported error code {0}")]
    Firmware(i32),

    #[error("watchdog expired after {0:?}")]
    Timeout(Duration),

    #[error("cancelled by client")]
    Cancelled,

    #[error("aborted: session closed")]
    Aborted,

    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("resources exhausted with no active job to free them")]
    Exhausted,
}

/// Rejections returned synchronously by `submit`.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("session {session} already has {limit} live jobs")]
    SessionFull { session: SessionId, limit: usize },

    #[error("session {session} has {pending} unreaped completions")]
    CompletionBacklog { session: SessionId, pending: usize },

    #[error("{handle} can never run: {demand} needs {requested}, total capacity {capacity}")]
    Impossible {
        handle: JobHandle,
        demand: Demand,
        requested: u32,
        capacity: u32,
    },

    #[error("{handle} has an invalid manifest: {source}")]
    InvalidManifest {
        handle: JobHandle,
        #[source]
        source: ManifestError,
    },

    #[error("{handle} rejected: {source} and no job is active")]
    Exhausted {
        handle: JobHandle,
        #[source]
        source: AllocError,
    },

    #[error("engine state lock poisoned")]
    LockPoisoned,

    #[error("engine is shut down")]
    Shutdown,
}

impl SubmitError {
    /// Handle of the rejected job, when one was assigned.
    pub fn handle(&self) -> Option<JobHandle> {
        match self {
            SubmitError::Impossible { handle, .. }
            | SubmitError::InvalidManifest { handle, .. }
            | SubmitError::Exhausted { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// True if retrying the same request later can never succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SubmitError::Impossible { .. } | SubmitError::InvalidManifest { .. }
        )
    }
}

/// Errors from engine operations other than submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown session {0}")]
    UnknownSession(SessionId),

    #[error("session limit of {0} reached")]
    SessionLimit(usize),

    #[error("unknown job {0}")]
    UnknownJob(JobHandle),

    #[error("{handle} does not belong to session {session}")]
    NotOwner { handle: JobHandle, session: SessionId },

    #[error("{0} already completed")]
    AlreadyComplete(JobHandle),

    #[error("engine state lock poisoned")]
    LockPoisoned,

    #[error("engine is shut down")]
    Shutdown,
}
