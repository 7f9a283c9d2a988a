//! Hook worker client
//!
//! Hooks written in a language other than Starlark run inside a worker
//! process. The client starts the worker with the resolved hook files as
//! arguments, waits for its handshake and then forwards every lifecycle
//! event as a request over the worker's stdio (see
//! [`contract_hooks_protocol::WorkerMessage`]).

mod connection;
mod hook;
pub mod lifecycle;

pub use hook::WorkerHook;
pub use lifecycle::WorkerLifecycle;
pub use lifecycle::WorkerState;

use crate::config::HookLanguage;
use crate::config::WorkerConfig;
use crate::registry::HookSet;
use crate::types::HookPhase;
use connection::WorkerConnection;
use contract_hooks_protocol::WorkerEvent;
use contract_hooks_protocol::WorkerMessage;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use tracing::warn;

/// Worker errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("failed to spawn hook worker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("hook worker did not complete the handshake within {0}ms")]
    StartTimeout(u64),

    #[error("hook worker did not answer the {event} request within {timeout_ms}ms")]
    RequestTimeout { event: WorkerEvent, timeout_ms: u64 },

    #[error("hook worker crashed: {0}")]
    Crashed(String),

    #[error("hook worker unavailable: {0}")]
    Unavailable(String),

    #[error("malformed message from hook worker: {0}")]
    Malformed(String),

    #[error("hook worker {event} hook failed: {message}")]
    Reported { event: WorkerEvent, message: String },

    #[error("hook worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode worker message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Client for one hook worker process
///
/// Requests are serialized: the connection lock is held for a whole
/// request/reply exchange, so at most one request is outstanding.
pub struct WorkerClient {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
    config: WorkerConfig,
    lifecycle: WorkerLifecycle,
    connection: Mutex<Option<WorkerConnection>>,
}

impl WorkerClient {
    pub fn new(
        language: &HookLanguage,
        config: WorkerConfig,
        hookfiles: &[PathBuf],
        working_dir: &Path,
    ) -> Self {
        let command = config.command_for(language);
        let args = config
            .args
            .iter()
            .cloned()
            .chain(hookfiles.iter().map(|path| path.display().to_string()))
            .collect();
        let lifecycle = WorkerLifecycle::new(command.clone(), config.max_restarts);
        Self {
            command,
            args,
            working_dir: working_dir.to_path_buf(),
            config,
            lifecycle,
            connection: Mutex::new(None),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Arguments the worker is spawned with: configured args, then hook files
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub async fn state(&self) -> WorkerState {
        self.lifecycle.state().await
    }

    pub fn lifecycle(&self) -> &WorkerLifecycle {
        &self.lifecycle
    }

    /// Spawn the worker and wait for its handshake.
    pub async fn start(&self) -> Result<(), WorkerError> {
        let mut connection = self.connection.lock().await;
        *connection = Some(self.launch().await?);
        Ok(())
    }

    async fn launch(&self) -> Result<WorkerConnection, WorkerError> {
        self.lifecycle.set_state(WorkerState::Starting).await;
        info!("Starting hook worker {}", self.command);

        let mut connection = WorkerConnection::spawn(&self.command, &self.args, &self.working_dir)?;
        let timeout = Duration::from_millis(self.config.startup_timeout_ms);
        match connection
            .exchange(WorkerMessage::request(WorkerEvent::Handshake), timeout)
            .await
        {
            Ok(_) => {
                tracing::debug!("Hook worker pid {:?} completed handshake", connection.id());
                self.lifecycle.record_started().await;
                Ok(connection)
            }
            Err(WorkerError::RequestTimeout { timeout_ms, .. }) => {
                let _ = connection.shutdown(Duration::from_millis(100)).await;
                Err(WorkerError::StartTimeout(timeout_ms))
            }
            Err(err) => {
                let _ = connection.shutdown(Duration::from_millis(100)).await;
                Err(err)
            }
        }
    }

    /// Send a request and wait for the matching reply.
    ///
    /// A crashed worker is restarted first while the restart budget lasts.
    pub async fn request(&self, message: WorkerMessage) -> Result<WorkerMessage, WorkerError> {
        let mut slot = self.connection.lock().await;
        self.ensure_running(&mut slot).await?;
        let connection = slot
            .as_mut()
            .ok_or_else(|| WorkerError::Unavailable("worker is not running".to_string()))?;

        self.lifecycle.set_state(WorkerState::Running).await;
        let timeout = Duration::from_millis(self.config.request_timeout_ms);
        let result = connection.exchange(message, timeout).await;

        match &result {
            Err(WorkerError::Crashed(reason)) => {
                warn!("Hook worker {} crashed: {}", self.command, reason);
                slot.take();
                self.lifecycle.record_crash().await;
            }
            Ok(_) => {
                self.lifecycle.record_reply().await;
                self.lifecycle.set_state(WorkerState::Ready).await;
            }
            Err(_) => self.lifecycle.set_state(WorkerState::Ready).await,
        }
        result
    }

    async fn ensure_running(&self, slot: &mut Option<WorkerConnection>) -> Result<(), WorkerError> {
        if slot.as_ref().is_some_and(WorkerConnection::is_closed) {
            slot.take();
            self.lifecycle.record_crash().await;
        }

        match self.lifecycle.state().await {
            WorkerState::Ready | WorkerState::Running => Ok(()),
            WorkerState::Crashed => {
                let attempt = self.lifecycle.increment_restart_count();
                info!("Restarting hook worker {} (attempt {})", self.command, attempt);
                match self.launch().await {
                    Ok(connection) => {
                        *slot = Some(connection);
                        Ok(())
                    }
                    Err(err) => {
                        self.lifecycle.record_crash().await;
                        Err(err)
                    }
                }
            }
            WorkerState::Failed => Err(WorkerError::Unavailable(format!(
                "worker failed after {} restart(s)",
                self.lifecycle.restart_count()
            ))),
            state => Err(WorkerError::Unavailable(format!("worker is {state}"))),
        }
    }

    /// Close the worker's stdin and wait for it to exit.
    pub async fn stop(&self) -> Result<(), WorkerError> {
        let mut slot = self.connection.lock().await;
        let Some(connection) = slot.take() else {
            self.lifecycle.set_state(WorkerState::Stopped).await;
            return Ok(());
        };

        self.lifecycle.set_state(WorkerState::Stopping).await;
        info!("Stopping hook worker {}", self.command);
        let result = connection
            .shutdown(Duration::from_millis(self.config.shutdown_timeout_ms))
            .await;
        self.lifecycle.set_state(WorkerState::Stopped).await;
        result
    }

    /// Register delegating hooks for every lifecycle event workers handle.
    pub fn register_hooks(self: &Arc<Self>, hooks: &mut HookSet) {
        for phase in [
            HookPhase::BeforeAll,
            HookPhase::BeforeEach,
            HookPhase::BeforeEachValidation,
            HookPhase::AfterEach,
            HookPhase::AfterAll,
        ] {
            if let Some(event) = phase.worker_event() {
                hooks.register(phase, None, Box::new(WorkerHook::new(Arc::clone(self), event)));
            }
        }
    }
}

impl std::fmt::Debug for WorkerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerClient")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("lifecycle", &self.lifecycle)
            .finish()
    }
}
