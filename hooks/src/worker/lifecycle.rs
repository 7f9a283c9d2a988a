//! Hook worker lifecycle
//!
//! Tracks the worker state machine and the restart budget.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::error;
use tracing::info;
use tracing::warn;

/// Worker process state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    NotStarted,
    /// Spawned, waiting for the handshake reply
    Starting,
    /// Idle between requests
    Ready,
    /// A request is in flight
    Running,
    /// The process went away; the next request may restart it
    Crashed,
    /// Restarts exhausted, every request fails
    Failed,
    Stopping,
    Stopped,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::NotStarted => write!(f, "not started"),
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Ready => write!(f, "ready"),
            WorkerState::Running => write!(f, "running"),
            WorkerState::Crashed => write!(f, "crashed"),
            WorkerState::Failed => write!(f, "failed"),
            WorkerState::Stopping => write!(f, "stopping"),
            WorkerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Worker lifecycle statistics
#[derive(Debug, Clone, Default)]
pub struct WorkerStats {
    /// Crashes since the worker was first started
    pub crashes: u32,
    /// Start time of the current process
    pub started_at: Option<Instant>,
    /// Completion time of the last successful request
    pub last_reply: Option<Instant>,
}

pub struct WorkerLifecycle {
    worker_id: String,
    max_restarts: u32,
    state: RwLock<WorkerState>,
    stats: RwLock<WorkerStats>,
    restart_count: AtomicU32,
}

impl WorkerLifecycle {
    pub fn new(worker_id: String, max_restarts: u32) -> Self {
        Self {
            worker_id,
            max_restarts,
            state: RwLock::new(WorkerState::NotStarted),
            stats: RwLock::new(WorkerStats::default()),
            restart_count: AtomicU32::new(0),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Whether a crashed worker may be started again
    pub fn should_restart(&self) -> bool {
        self.restart_count.load(Ordering::SeqCst) < self.max_restarts
    }

    /// Record a crash. Returns true if a restart may follow.
    pub async fn record_crash(&self) -> bool {
        self.stats.write().await.crashes += 1;

        if self.should_restart() {
            *self.state.write().await = WorkerState::Crashed;
            warn!(
                "Hook worker {} crashed (restart {}/{} available)",
                self.worker_id,
                self.restart_count.load(Ordering::SeqCst) + 1,
                self.max_restarts
            );
            true
        } else {
            *self.state.write().await = WorkerState::Failed;
            error!(
                "Hook worker {} exceeded max restarts ({}), giving up",
                self.worker_id, self.max_restarts
            );
            false
        }
    }

    /// Record a completed handshake
    pub async fn record_started(&self) {
        self.stats.write().await.started_at = Some(Instant::now());
        *self.state.write().await = WorkerState::Ready;

        info!(
            "Hook worker {} ready (restart count: {})",
            self.worker_id,
            self.restart_count.load(Ordering::SeqCst)
        );
    }

    pub async fn record_reply(&self) {
        self.stats.write().await.last_reply = Some(Instant::now());
    }

    /// Increment restart counter and return new value
    pub fn increment_restart_count(&self) -> u32 {
        self.restart_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn restart_count(&self) -> u32 {
        self.restart_count.load(Ordering::SeqCst)
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    pub async fn set_state(&self, state: WorkerState) {
        *self.state.write().await = state;
    }

    pub async fn stats(&self) -> WorkerStats {
        self.stats.read().await.clone()
    }
}

impl std::fmt::Debug for WorkerLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerLifecycle")
            .field("worker_id", &self.worker_id)
            .field("max_restarts", &self.max_restarts)
            .field("restart_count", &self.restart_count.load(Ordering::SeqCst))
            .finish()
    }
}
