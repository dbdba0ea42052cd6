use std::collections::HashSet;

use super::types::{EngineConfig, HardwareConfig, NamedCapacity, PsysConfig};
use crate::error::CoreError;

impl PsysConfig {
    /// Validate both sections.
    pub fn validate(&self) -> Result<(), CoreError> {
        self.engine.validate()?;
        self.hardware.validate()?;
        Ok(())
    }
}

impl EngineConfig {
    /// Reject zero timeouts and zero limits.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.watchdog_timeout_ms == 0 {
            return Err(CoreError::Config(
                "engine.watchdog_timeout_ms must be greater than zero".into(),
            ));
        }
        for (key, value) in [
            ("max_sessions", self.max_sessions),
            ("max_jobs_per_session", self.max_jobs_per_session),
            ("completion_queue_depth", self.completion_queue_depth),
        ] {
            if value == 0 {
                return Err(CoreError::Config(format!(
                    "engine.{key} must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

impl HardwareConfig {
    /// Validate the hardware table: at least one cell, unique names, non-zero capacities.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.cells.is_empty() {
            return Err(CoreError::Config(
                "hardware.cells must declare at least one cell".into(),
            ));
        }
        // Cell ids are u16 and channel/bank ids are u8.
        if self.cells.len() > u16::MAX as usize {
            return Err(CoreError::Config(format!(
                "hardware.cells declares {} cells, at most {} supported",
                self.cells.len(),
                u16::MAX
            )));
        }

        let mut seen = HashSet::new();
        for cell in &self.cells {
            if cell.name.is_empty() || cell.cell_type.is_empty() {
                return Err(CoreError::Config(
                    "hardware.cells entries need a non-empty name and type".into(),
                ));
            }
            if !seen.insert(cell.name.as_str()) {
                return Err(CoreError::Config(format!(
                    "duplicate cell name '{}'",
                    cell.name
                )));
            }
        }

        validate_named("channels", &self.channels)?;
        validate_named("memory_banks", &self.memory_banks)?;
        Ok(())
    }
}

fn validate_named(section: &str, entries: &[NamedCapacity]) -> Result<(), CoreError> {
    if entries.len() > u8::MAX as usize + 1 {
        return Err(CoreError::Config(format!(
            "hardware.{section} declares {} entries, at most 256 supported",
            entries.len()
        )));
    }
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.name.is_empty() {
            return Err(CoreError::Config(format!(
                "hardware.{section} entries need a non-empty name"
            )));
        }
        if entry.capacity == 0 {
            return Err(CoreError::Config(format!(
                "hardware.{section}.{} has zero capacity",
                entry.name
            )));
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(CoreError::Config(format!(
                "duplicate name '{}' in hardware.{section}",
                entry.name
            )));
        }
    }
    Ok(())
}
