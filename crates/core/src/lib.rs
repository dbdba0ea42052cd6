pub mod config;
pub mod error;
pub mod hardware;

pub use config::{CellConfig, EngineConfig, HardwareConfig, NamedCapacity, PsysConfig};
pub use error::*;
pub use hardware::*;
