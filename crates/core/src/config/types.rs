use std::time::Duration;

use serde::{Deserialize, Serialize};

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration for one engine instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PsysConfig {
    /// Scheduling knobs (watchdog, limits).
    #[serde(default)]
    pub engine: EngineConfig,

    /// Hardware description table.
    #[serde(default)]
    pub hardware: HardwareConfig,
}

// ── Engine section ──────────────────────────────────────────────────

/// Engine section: watchdog timeout and per-client limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deadline for a RUNNING job before the watchdog aborts it.
    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,

    /// Maximum number of concurrently open client sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Maximum number of jobs per session that have not completed.
    #[serde(default = "default_max_jobs_per_session")]
    pub max_jobs_per_session: usize,

    /// Maximum number of unreaped completion events per session.
    #[serde(default = "default_completion_queue_depth")]
    pub completion_queue_depth: usize,
}

fn default_watchdog_timeout_ms() -> u64 { 2000 }
fn default_max_sessions() -> usize { 64 }
fn default_max_jobs_per_session() -> usize { 256 }
fn default_completion_queue_depth() -> usize { 1024 }

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: default_watchdog_timeout_ms(),
            max_sessions: default_max_sessions(),
            max_jobs_per_session: default_max_jobs_per_session(),
            completion_queue_depth: default_completion_queue_depth(),
        }
    }
}

impl EngineConfig {
    /// Watchdog timeout as a [`Duration`].
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }
}

// ── Hardware section ────────────────────────────────────────────────

/// Hardware section: the cells, device-channel classes and memory banks of
/// the processing system. Table order defines the resource ids.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareConfig {
    #[serde(default)]
    pub cells: Vec<CellConfig>,

    #[serde(default)]
    pub channels: Vec<NamedCapacity>,

    #[serde(default)]
    pub memory_banks: Vec<NamedCapacity>,
}

/// One execution cell and its declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub cell_type: String,
}

/// A named resource with a fixed number of units (channel class or memory bank).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedCapacity {
    pub name: String,
    pub capacity: u32,
}

impl HardwareConfig {
    /// Append a cell of the given type.
    pub fn with_cell(mut self, name: impl Into<String>, cell_type: impl Into<String>) -> Self {
        self.cells.push(CellConfig {
            name: name.into(),
            cell_type: cell_type.into(),
        });
        self
    }

    /// Append a device-channel class.
    pub fn with_channel(mut self, name: impl Into<String>, capacity: u32) -> Self {
        self.channels.push(NamedCapacity {
            name: name.into(),
            capacity,
        });
        self
    }

    /// Append a memory bank.
    pub fn with_memory_bank(mut self, name: impl Into<String>, capacity: u32) -> Self {
        self.memory_banks.push(NamedCapacity {
            name: name.into(),
            capacity,
        });
        self
    }
}
