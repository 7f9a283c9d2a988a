//! Stdio transport to one worker process

use super::WorkerError;
use contract_hooks_protocol::WorkerMessage;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::trace;
use tracing::warn;

type Reply = Result<WorkerMessage, WorkerError>;
type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Reply>>>>;

/// Spawned worker process with its reader tasks
///
/// Replies are routed to the waiting request by `uuid`. Callers must not
/// issue a request before the previous one returned.
pub(crate) struct WorkerConnection {
    child: Child,
    stdin: Option<ChildStdin>,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
}

impl WorkerConnection {
    pub(crate) fn spawn(
        command: &str,
        args: &[String],
        working_dir: &Path,
    ) -> Result<Self, WorkerError> {
        debug!("Spawning hook worker: {} {}", command, args.join(" "));
        let mut child = Command::new(command)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Unavailable("worker stdout is not piped".to_string()))?;
        let stdin = child.stdin.take();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_replies(
            stdout,
            Arc::clone(&pending),
            Arc::clone(&closed),
        ));
        let stderr = child.stderr.take().map(|stderr| {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "worker", "{}", line);
                }
            })
        });

        Ok(Self {
            child,
            stdin,
            pending,
            closed,
            reader,
            stderr,
        })
    }

    /// Whether the worker closed its stdout
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Send one message and wait for the reply carrying the same `uuid`.
    pub(crate) async fn exchange(
        &mut self,
        message: WorkerMessage,
        timeout: Duration,
    ) -> Result<WorkerMessage, WorkerError> {
        let line = message.encode()?;
        let uuid = message.uuid.clone();
        let event = message.event;

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uuid.clone(), tx);

        if let Err(err) = self.write_line(&line).await {
            self.forget(&uuid);
            return Err(err);
        }
        trace!("Sent {} request {}", event, uuid);

        let reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply?,
            Ok(Err(_)) => {
                return Err(WorkerError::Crashed(
                    "worker connection closed while waiting for a reply".to_string(),
                ));
            }
            Err(_) => {
                self.forget(&uuid);
                return Err(WorkerError::RequestTimeout {
                    event,
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        if reply.event != event {
            return Err(WorkerError::Malformed(format!(
                "reply to {event} request {uuid} is a {} message",
                reply.event
            )));
        }
        if let Some(message) = reply.error {
            return Err(WorkerError::Reported { event, message });
        }
        Ok(reply)
    }

    async fn write_line(&mut self, line: &str) -> Result<(), WorkerError> {
        if self.is_closed() {
            return Err(WorkerError::Crashed("worker is not running".to_string()));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| WorkerError::Unavailable("worker stdin is closed".to_string()))?;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    fn forget(&self, uuid: &str) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(uuid);
    }

    /// Close stdin and wait for the process to exit, killing it after
    /// `timeout`.
    pub(crate) async fn shutdown(mut self, timeout: Duration) -> Result<(), WorkerError> {
        drop(self.stdin.take());

        let result = match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Hook worker exited with {}", status);
                Ok(())
            }
            Ok(Err(err)) => Err(WorkerError::Io(err)),
            Err(_) => {
                warn!(
                    "Hook worker did not exit within {}ms, killing it",
                    timeout.as_millis()
                );
                self.child.kill().await.map_err(WorkerError::Io)
            }
        };

        self.reader.abort();
        if let Some(stderr) = self.stderr.take() {
            let _ = tokio::time::timeout(Duration::from_millis(100), stderr).await;
        }
        result
    }
}

impl Drop for WorkerConnection {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(stderr) = &self.stderr {
            stderr.abort();
        }
    }
}

async fn read_replies(stdout: ChildStdout, pending: PendingMap, closed: Arc<AtomicBool>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => route_reply(&line, &pending),
            Ok(None) => break,
            Err(err) => {
                warn!("Failed to read from hook worker: {}", err);
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    let waiting: Vec<_> = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    if !waiting.is_empty() {
        warn!(
            "Hook worker closed its output with {} request(s) pending",
            waiting.len()
        );
    }
    for (_, tx) in waiting {
        let _ = tx.send(Err(WorkerError::Crashed(
            "worker exited before replying".to_string(),
        )));
    }
}

fn route_reply(line: &str, pending: &PendingMap) {
    if line.trim().is_empty() {
        return;
    }

    let (uuid, reply) = match WorkerMessage::decode(line) {
        Ok(message) => (message.uuid.clone(), Ok(message)),
        Err(err) => {
            warn!("Malformed message from hook worker: {} ({})", err, line);
            match WorkerMessage::peek_uuid(line) {
                Some(uuid) => (uuid, Err(WorkerError::Malformed(err.to_string()))),
                None => return,
            }
        }
    };

    let waiting = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&uuid);
    match waiting {
        Some(tx) => {
            let _ = tx.send(reply);
        }
        None => warn!("Dropping hook worker message with unknown or duplicate uuid {}", uuid),
    }
}
