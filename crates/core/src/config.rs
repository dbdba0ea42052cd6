//! Engine and hardware configuration.
//!
//! Parsed from `psys.toml` with support for environment variable overrides.
//! The `[hardware]` section is the hardware description table: it is read
//! once at engine start and never changes afterwards.

mod loading;
mod types;
mod validation;

#[cfg(test)]
mod tests;

pub use types::{CellConfig, EngineConfig, HardwareConfig, NamedCapacity, PsysConfig};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}
