//! Manifest interpreter: turns a process group's declared needs into pool requests.

pub mod interpreter;
pub mod types;

pub use interpreter::{Demand, GroupRequirements, ManifestError, ManifestInterpreter};
pub use types::{BufferRef, ProcessGroup, ProcessNode};
