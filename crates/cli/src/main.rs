mod cli;
mod report;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use psys_core::{HardwareDescription, PsysConfig};
use psys_scheduler::{completion_channel, Engine, SimulatedFirmware};

use crate::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    psys_core::config::load_dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let config = PsysConfig::from_file(&args.config)
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    config.log_summary();

    let hw = Arc::new(
        HardwareDescription::from_config(&config.hardware).context("invalid hardware table")?,
    );
    let jobs = report::load_jobs(&args.jobs)?;
    info!(jobs = jobs.len(), "job file loaded");

    let (notifier, events) = completion_channel();
    let mut firmware = SimulatedFirmware::new(notifier, Duration::from_millis(args.latency_ms));
    for &token in &args.hang {
        firmware = firmware.with_hang(token);
    }
    for &(token, code) in &args.failures {
        firmware = firmware.with_failure(token, code);
    }

    let engine = Engine::start(config.engine.clone(), hw, Arc::new(firmware), events);
    let session = engine.open_session()?;

    let mut accepted = 0usize;
    for job in jobs {
        let token = job.token;
        match engine.submit(session, job) {
            Ok(submission) => {
                info!(job = %submission.handle, token, admission = ?submission.admission, "submitted");
                accepted += 1;
            }
            Err(e) => {
                warn!(token, error = %e, "submission rejected");
                println!("{}", report::rejection_json(token, &e));
            }
        }
    }

    for _ in 0..accepted {
        let event = engine.next_completion(session).await?;
        println!("{}", report::event_json(&event));
    }

    let metrics = engine.metrics()?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);

    engine.close_session(session)?;
    engine.shutdown().await;
    info!("Done");
    Ok(())
}
