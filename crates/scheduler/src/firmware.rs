//! Boundary to the accelerator firmware.

use serde::Serialize;

use crate::error::{CancelError, DispatchError};
use crate::kcmd::JobHandle;
use crate::manifest::ProcessGroup;
use crate::resource::Extent;
use crate::scheduler::Priority;

/// Which tier a dispatch hands the job over for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DispatchStage {
    /// Resources reserved in the started tier; the firmware may stage the job.
    Start,
    /// Resources in the running tier; the firmware executes the job.
    Run,
}

/// A fully resourced job handed to the firmware.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    pub handle: JobHandle,
    pub token: u64,
    pub priority: Priority,
    pub stage: DispatchStage,
    pub extents: &'a [Extent],
    pub group: &'a ProcessGroup,
}

/// Outcome reported by the firmware for a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FirmwareStatus {
    Success,
    Error(i32),
}

/// Asynchronous "job finished" notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionNotice {
    pub handle: JobHandle,
    pub status: FirmwareStatus,
}

/// Command side of the firmware link.
///
/// Both calls run inside the engine's serialization domain and must return
/// promptly. Completions come back through a
/// [`CompletionNotifier`](crate::completion::CompletionNotifier).
pub trait FirmwareLink: Send + Sync {
    fn dispatch(&self, request: &DispatchRequest<'_>) -> Result<(), DispatchError>;

    /// Best-effort cancel. Failure never blocks the engine's abort path.
    fn cancel(&self, handle: JobHandle) -> Result<(), CancelError>;
}
