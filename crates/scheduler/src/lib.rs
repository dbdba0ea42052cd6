//! Admission, resource allocation and scheduling for the processing system.
//!
//! Process groups are interpreted into per-node resource requests, reserved
//! against a two-tier pair of bitmap pools, dispatched to the firmware link,
//! and driven to exactly one completion event each.

pub mod completion;
pub mod engine;
pub mod error;
pub mod firmware;
pub mod kcmd;
pub mod manifest;
pub mod resource;
pub mod scheduler;
pub mod sim;
pub mod watchdog;

pub use completion::{completion_channel, CompletionNotifier, EventReceiver};
pub use engine::Engine;
pub use error::{AllocError, CancelError, DispatchError, EngineError, JobError, SubmitError};
pub use firmware::{CompletionNotice, DispatchRequest, DispatchStage, FirmwareLink, FirmwareStatus};
pub use kcmd::{JobHandle, KcmdState, SessionId};
pub use manifest::{Demand, GroupRequirements, ManifestError, ManifestInterpreter, ProcessGroup, ProcessNode};
pub use resource::{Grant, ResourceClass, ResourcePools, Tier};
pub use scheduler::{
    Admission, CompletionEvent, JobRequest, JobSummary, Priority, Scheduler, SchedulerMetrics, Submission,
};
pub use sim::SimulatedFirmware;
pub use watchdog::WatchdogTimer;
