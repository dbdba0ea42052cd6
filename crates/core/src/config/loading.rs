use std::path::Path;

use crate::error::CoreError;

use super::types::PsysConfig;

impl PsysConfig {
    /// Parse config from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!(
            watchdog_ms = self.engine.watchdog_timeout_ms,
            max_sessions = self.engine.max_sessions,
            max_jobs_per_session = self.engine.max_jobs_per_session,
            "engine config loaded"
        );
        tracing::info!(
            cells = self.hardware.cells.len(),
            channels = self.hardware.channels.len(),
            memory_banks = self.hardware.memory_banks.len(),
            "hardware description loaded"
        );
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply environment variable overrides.
    ///
    /// Convention: `PSYS_KEY` overrides `engine.key`. The hardware table
    /// cannot be overridden from the environment.
    /// - `PSYS_WATCHDOG_TIMEOUT_MS` -> `engine.watchdog_timeout_ms`
    /// - `PSYS_MAX_SESSIONS` -> `engine.max_sessions`
    /// - `PSYS_MAX_JOBS_PER_SESSION` -> `engine.max_jobs_per_session`
    /// - `PSYS_COMPLETION_QUEUE_DEPTH` -> `engine.completion_queue_depth`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse("PSYS_WATCHDOG_TIMEOUT_MS") {
            self.engine.watchdog_timeout_ms = v;
        }
        if let Some(v) = env_parse("PSYS_MAX_SESSIONS") {
            self.engine.max_sessions = v;
        }
        if let Some(v) = env_parse("PSYS_MAX_JOBS_PER_SESSION") {
            self.engine.max_jobs_per_session = v;
        }
        if let Some(v) = env_parse("PSYS_COMPLETION_QUEUE_DEPTH") {
            self.engine.completion_queue_depth = v;
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}
