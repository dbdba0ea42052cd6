//! Scheduler runner: admission, promotion and completion over one state value.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, sessions, and accessor methods
//! - `scheduling`: submission, tier admission, promotion and deferred admission
//! - `execution`: dispatch, completion, watchdog expiry and client operations

mod core;
mod execution;
mod scheduling;

pub use self::core::Scheduler;
