//! Integration tests for the async engine against the simulated firmware.
//!
//! Time is paused, so latencies and watchdog deadlines advance instantly
//! and deterministically once every task is idle.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use psys_core::{EngineConfig, HardwareConfig, HardwareDescription};
use psys_scheduler::{
    completion_channel, Admission, Demand, Engine, EngineError, JobError, JobRequest, KcmdState, ProcessGroup,
    ProcessNode, SimulatedFirmware, SubmitError,
};

const LATENCY: Duration = Duration::from_millis(100);
const WATCHDOG: Duration = Duration::from_millis(500);

fn hardware(x_cells: usize) -> Arc<HardwareDescription> {
    let mut config = HardwareConfig::default()
        .with_channel("dma_ext", 8)
        .with_channel("dma_int", 2)
        .with_memory_bank("vmem", 16);
    for i in 0..x_cells {
        config = config.with_cell(format!("x{i}"), "x");
    }
    Arc::new(HardwareDescription::from_config(&config).unwrap())
}

fn engine_config() -> EngineConfig {
    EngineConfig {
        watchdog_timeout_ms: WATCHDOG.as_millis() as u64,
        ..EngineConfig::default()
    }
}

fn start(x_cells: usize, script: impl FnOnce(SimulatedFirmware) -> SimulatedFirmware) -> Engine {
    let (notifier, events) = completion_channel();
    let firmware = script(SimulatedFirmware::new(notifier, LATENCY));
    Engine::start(engine_config(), hardware(x_cells), Arc::new(firmware), events)
}

fn cell_job(token: u64) -> JobRequest {
    JobRequest::new(ProcessGroup::new(vec![ProcessNode::on_type("x")])).with_token(token)
}

#[tokio::test(start_paused = true)]
async fn started_job_runs_after_first_completion() {
    let engine = start(4, |fw| fw);
    let session = engine.open_session().unwrap();

    let submissions: Vec<_> = (0..5)
        .map(|i| engine.submit(session, cell_job(i)).unwrap())
        .collect();
    assert_eq!(submissions[3].admission, Admission::Running);
    assert_eq!(submissions[4].admission, Admission::Started);

    let mut events = Vec::new();
    for _ in 0..5 {
        events.push(engine.next_completion(session).await.unwrap());
    }
    assert!(events.iter().all(|e| e.is_success()));

    let last = events.iter().find(|e| e.handle == submissions[4].handle).unwrap();
    assert!(last.outcome.as_ref().unwrap().promoted);
    assert_eq!(last.token, 4);

    let m = engine.metrics().unwrap();
    assert_eq!(m.promotions, 1);
    assert_eq!(m.completed_ok, 5);
    assert_eq!(m.running_occupancy.cells, 0);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn watchdog_reaps_hung_job() {
    let engine = start(1, |fw| fw.with_hang(42));
    let session = engine.open_session().unwrap();
    let began = tokio::time::Instant::now();

    let hung = engine.submit(session, cell_job(42)).unwrap();
    let event = engine.next_completion(session).await.unwrap();

    assert_eq!(event.handle, hung.handle);
    assert_eq!(event.outcome, Err(JobError::Timeout(WATCHDOG)));
    assert!(began.elapsed() >= WATCHDOG);

    // The released cell is immediately usable again.
    let next = engine.submit(session, cell_job(1)).unwrap();
    assert_eq!(next.admission, Admission::Running);
    assert!(engine.next_completion(session).await.unwrap().is_success());
    assert_eq!(engine.metrics().unwrap().timeouts, 1);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn firmware_error_code_reaches_client() {
    let engine = start(1, |fw| fw.with_failure(9, -71));
    let session = engine.open_session().unwrap();

    engine.submit(session, cell_job(9)).unwrap();
    let event = engine.next_completion(session).await.unwrap();
    assert_eq!(event.outcome, Err(JobError::Firmware(-71)));
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cancel_releases_before_returning() -> anyhow::Result<()> {
    let engine = start(1, |fw| fw.with_hang(5));
    let session = engine.open_session()?;

    let job = engine.submit(session, cell_job(5))?;
    assert_eq!(engine.metrics()?.running_occupancy.cells, 1);

    engine.cancel(session, job.handle)?;
    assert_eq!(engine.metrics()?.running_occupancy.cells, 0);
    assert_eq!(engine.job_state(job.handle)?, Some(KcmdState::Complete));

    let event = engine.poll_completion(session)?.expect("cancel publishes an event");
    assert_eq!(event.outcome, Err(JobError::Cancelled));
    assert_eq!(engine.job_state(job.handle)?, None);
    engine.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn impossible_job_is_rejected_with_its_handle() {
    let engine = start(2, |fw| fw);
    let session = engine.open_session().unwrap();

    let request = JobRequest::new(ProcessGroup::new(vec![
        ProcessNode::on_type("x").with_channel("dma_int", 2),
        ProcessNode::on_type("x").with_channel("dma_int", 1),
    ]));
    let err = engine.submit(session, request).unwrap_err();
    let SubmitError::Impossible { handle, demand, .. } = err else {
        panic!("expected an Impossible rejection");
    };
    assert!(matches!(demand, Demand::Channel(_)));
    assert_eq!(engine.job_state(handle).unwrap(), None);
    assert!(engine.poll_completion(session).unwrap().is_none());
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn every_accepted_job_completes_exactly_once() {
    let engine = start(2, |fw| fw);
    let session = engine.open_session().unwrap();

    let mut accepted = HashSet::new();
    for i in 0..12 {
        let s = engine.submit(session, cell_job(i)).unwrap();
        accepted.insert(s.handle);
    }
    let m = engine.metrics().unwrap();
    assert_eq!(m.running_jobs, 2);
    assert_eq!(m.started_queue_depth, 2);
    assert_eq!(m.deferred, 8);

    let mut seen = HashSet::new();
    for _ in 0..12 {
        let event = engine.next_completion(session).await.unwrap();
        assert!(event.is_success(), "{:?}", event.outcome);
        assert!(seen.insert(event.handle), "duplicate completion for {}", event.handle);
    }
    assert_eq!(seen, accepted);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(engine.poll_completion(session).unwrap().is_none());
    let m = engine.metrics().unwrap();
    assert!(m.started_occupancy.cells == 0 && m.running_occupancy.cells == 0);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn closing_a_session_aborts_its_jobs() {
    let engine = start(1, |fw| fw.with_hang(1));
    let session = engine.open_session().unwrap();
    let other = engine.open_session().unwrap();

    let job = engine.submit(session, cell_job(1)).unwrap();
    engine.close_session(session).unwrap();

    assert_eq!(engine.job_state(job.handle).unwrap(), None);
    assert_eq!(
        engine.next_completion(session).await,
        Err(EngineError::UnknownSession(session))
    );

    let fresh = engine.submit(other, cell_job(2)).unwrap();
    assert_eq!(fresh.admission, Admission::Running);
    engine.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn throughput_demand_follows_running_jobs() {
    let engine = start(2, |fw| fw.with_hang(1));
    let session = engine.open_session().unwrap();

    let slow = engine
        .submit(session, cell_job(1).with_min_throughput(30))
        .unwrap();
    engine
        .submit(session, cell_job(2).with_min_throughput(60))
        .unwrap();
    assert_eq!(engine.throughput_demand().unwrap(), Some(60));

    // Job 2 completes after the simulated latency; the hung job keeps its hint.
    engine.next_completion(session).await.unwrap();
    assert_eq!(engine.throughput_demand().unwrap(), Some(30));

    engine.cancel(session, slow.handle).unwrap();
    assert_eq!(engine.throughput_demand().unwrap(), None);
    engine.shutdown().await;
}
