use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

use psys_core::{EngineConfig, HardwareDescription};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::info;

use crate::error::EngineError;
use crate::firmware::FirmwareLink;
use crate::kcmd::{JobHandle, Kcmd, KcmdState, SessionId};
use crate::manifest::ManifestInterpreter;
use crate::resource::{ResourcePools, Tier};
use crate::scheduler::metrics::SchedulerMetrics;
use crate::scheduler::types::{CompletionEvent, Priority};
use crate::watchdog::WatchdogTimer;

/// Per-client queues.
pub(crate) struct Session {
    /// NEW jobs waiting for admission, one FIFO per priority.
    pub(super) pending: [VecDeque<JobHandle>; 4],
    /// Handles of jobs that have not reached COMPLETE.
    pub(super) live: BTreeSet<JobHandle>,
    /// Finished jobs waiting to be reaped.
    pub(super) completions: VecDeque<CompletionEvent>,
    pub(super) notify: Arc<Notify>,
    /// Per-session submission counter.
    pub(super) issued: u64,
}

impl Session {
    fn new() -> Self {
        Self {
            pending: Default::default(),
            live: BTreeSet::new(),
            completions: VecDeque::new(),
            notify: Arc::new(Notify::new()),
            issued: 0,
        }
    }

    /// Whether a job at `priority` or higher is already waiting.
    pub(super) fn has_pending_at_or_above(&self, priority: Priority) -> bool {
        self.pending[..=priority.index()].iter().any(|q| !q.is_empty())
    }

    pub(super) fn pending_len(&self) -> usize {
        self.pending.iter().map(VecDeque::len).sum()
    }
}

/// The admission and scheduling state machine.
///
/// Owns the resource pools, every command object and every queue. All
/// methods take `&mut self`; the engine serializes access behind one lock.
pub struct Scheduler {
    pub(super) config: EngineConfig,
    pub(super) interpreter: ManifestInterpreter,
    pub(super) pools: ResourcePools,
    pub(super) jobs: HashMap<JobHandle, Kcmd>,
    pub(super) sessions: BTreeMap<SessionId, Session>,
    /// Global FIFO of STARTED jobs awaiting promotion.
    pub(super) started_queue: VecDeque<JobHandle>,
    pub(super) firmware: Arc<dyn FirmwareLink>,
    pub(super) watchdog: Box<dyn WatchdogTimer>,
    pub(super) metrics: SchedulerMetrics,
    pub(super) next_handle: u64,
    pub(super) next_session: u32,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        hw: Arc<HardwareDescription>,
        firmware: Arc<dyn FirmwareLink>,
        watchdog: Box<dyn WatchdogTimer>,
    ) -> Self {
        info!(
            cells = hw.cell_count(),
            channels = hw.channels().len(),
            memory_banks = hw.memory_banks().len(),
            watchdog_ms = config.watchdog_timeout_ms,
            "Scheduler created"
        );
        Self {
            config,
            interpreter: ManifestInterpreter::new(Arc::clone(&hw)),
            pools: ResourcePools::new(hw),
            jobs: HashMap::new(),
            sessions: BTreeMap::new(),
            started_queue: VecDeque::new(),
            firmware,
            watchdog,
            metrics: SchedulerMetrics::default(),
            next_handle: 1,
            next_session: 1,
        }
    }

    // ── Sessions ──────────────────────────────────────────────

    pub fn open_session(&mut self) -> Result<SessionId, EngineError> {
        if self.sessions.len() >= self.config.max_sessions {
            return Err(EngineError::SessionLimit(self.config.max_sessions));
        }
        let id = SessionId(self.next_session);
        self.next_session += 1;
        self.sessions.insert(id, Session::new());
        info!(session = %id, "session opened");
        Ok(id)
    }

    pub(super) fn session(&self, id: SessionId) -> Result<&Session, EngineError> {
        self.sessions.get(&id).ok_or(EngineError::UnknownSession(id))
    }

    pub(super) fn session_mut(&mut self, id: SessionId) -> Result<&mut Session, EngineError> {
        self.sessions.get_mut(&id).ok_or(EngineError::UnknownSession(id))
    }

    /// Wakeup handle signalled whenever a completion lands in the session.
    pub fn session_notify(&self, id: SessionId) -> Result<Arc<Notify>, EngineError> {
        Ok(Arc::clone(&self.session(id)?.notify))
    }

    // ── Accessors ─────────────────────────────────────────────

    /// Look up a job owned by `session`.
    pub(super) fn owned_job(&self, session: SessionId, handle: JobHandle) -> Result<&Kcmd, EngineError> {
        self.session(session)?;
        let kcmd = self.jobs.get(&handle).ok_or(EngineError::UnknownJob(handle))?;
        if kcmd.session != session {
            return Err(EngineError::NotOwner { handle, session });
        }
        Ok(kcmd)
    }

    /// Current state of a job that has not been reaped yet.
    pub fn job_state(&self, handle: JobHandle) -> Option<KcmdState> {
        self.jobs.get(&handle).map(Kcmd::state)
    }

    /// Watchdog deadline of a RUNNING job.
    pub fn deadline(&self, handle: JobHandle) -> Option<Instant> {
        self.jobs.get(&handle).and_then(|k| k.deadline)
    }

    pub fn pools(&self) -> &ResourcePools {
        &self.pools
    }

    /// Handles in the STARTED queue, head first.
    pub fn started_queue(&self) -> impl Iterator<Item = JobHandle> + '_ {
        self.started_queue.iter().copied()
    }

    /// Snapshot of the counters plus current gauges.
    pub fn metrics(&self) -> SchedulerMetrics {
        let mut m = self.metrics.clone();
        m.running_jobs = self
            .jobs
            .values()
            .filter(|k| k.state() == KcmdState::Running)
            .count();
        m.started_queue_depth = self.started_queue.len();
        m.deferred_by_priority = Priority::ALL
            .into_iter()
            .map(|p| {
                let depth: usize = self.sessions.values().map(|s| s.pending[p.index()].len()).sum();
                (p, depth)
            })
            .collect();
        m.started_occupancy = self.pools.pool(Tier::Started).occupancy();
        m.running_occupancy = self.pools.pool(Tier::Running).occupancy();
        m
    }
}
