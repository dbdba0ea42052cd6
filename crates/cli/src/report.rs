//! Job file loading and JSON rendering of engine output.

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::{json, Value};

use psys_scheduler::{CompletionEvent, JobRequest, SubmitError};

/// Read a JSON array of job requests.
pub fn load_jobs(path: &Path) -> Result<Vec<JobRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read job file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid job file {}", path.display()))
}

pub fn event_json(event: &CompletionEvent) -> Value {
    match &event.outcome {
        Ok(summary) => json!({
            "handle": event.handle,
            "token": event.token,
            "status": "success",
            "cells": summary.cells,
            "promoted": summary.promoted,
            "queued_ms": summary.queued.as_millis() as u64,
            "run_ms": summary.run_time.as_millis() as u64,
        }),
        Err(e) => json!({
            "handle": event.handle,
            "token": event.token,
            "status": "error",
            "error": e.to_string(),
        }),
    }
}

pub fn rejection_json(token: u64, err: &SubmitError) -> Value {
    json!({
        "handle": err.handle(),
        "token": token,
        "status": "rejected",
        "permanent": err.is_permanent(),
        "error": err.to_string(),
    })
}
