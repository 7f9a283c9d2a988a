//! Hook worker wire protocol
//!
//! Workers are external processes implementing hooks in a language other
//! than the host one. The client and the worker exchange newline-delimited
//! JSON objects over the worker's stdin/stdout:
//!
//! ```text
//! -> {"version":1,"uuid":"…","event":"beforeEach","transaction":{…}}
//! <- {"version":1,"uuid":"…","event":"beforeEach","transaction":{…mutated…}}
//! ```
//!
//! Every request carries a fresh `uuid`; the worker must answer each request
//! exactly once with the same `uuid`. `beforeAll`/`afterAll` carry the whole
//! `transactions` list instead of a single `transaction`. A worker may answer
//! with `error` set to report that its hook failed.

use crate::transaction::Transaction;
use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Wire schema version. Messages carrying any other version are rejected.
pub const PROTOCOL_VERSION: u32 = 1;

/// Lifecycle point a worker message refers to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum WorkerEvent {
    /// Start-up handshake, answered once the worker has loaded its hooks
    Handshake,
    BeforeAll,
    BeforeEach,
    BeforeEachValidation,
    AfterEach,
    AfterAll,
}

impl WorkerEvent {
    /// Whether the event operates on the whole transaction list.
    pub fn is_run_wide(&self) -> bool {
        matches!(self, WorkerEvent::BeforeAll | WorkerEvent::AfterAll)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerEvent::Handshake => "handshake",
            WorkerEvent::BeforeAll => "beforeAll",
            WorkerEvent::BeforeEach => "beforeEach",
            WorkerEvent::BeforeEachValidation => "beforeEachValidation",
            WorkerEvent::AfterEach => "afterEach",
            WorkerEvent::AfterAll => "afterAll",
        }
    }
}

impl std::fmt::Display for WorkerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope exchanged with the worker in both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerMessage {
    pub version: u32,

    /// Correlation token, unique per request within a run
    pub uuid: String,

    pub event: WorkerEvent,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Transaction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Transaction>>,

    /// Set by the worker when its hook failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerMessage {
    /// Build an outbound request with a freshly generated correlation id.
    pub fn request(event: WorkerEvent) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            uuid: Uuid::new_v4().to_string(),
            event,
            transaction: None,
            transactions: None,
            error: None,
        }
    }

    pub fn with_transaction(mut self, transaction: Transaction) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    /// Serialize as a single protocol line, terminated by `\n`.
    pub fn encode(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Strictly parse one inbound line.
    pub fn decode(line: &str) -> Result<Self, DecodeError> {
        let message: WorkerMessage = serde_json::from_str(line.trim_end())?;
        if message.version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion(message.version));
        }
        if message.uuid.is_empty() {
            return Err(DecodeError::MissingUuid);
        }
        Ok(message)
    }

    /// Best-effort extraction of the correlation id from a line that failed
    /// [`WorkerMessage::decode`], so the matching request can be failed
    /// instead of waiting for its timeout.
    pub fn peek_uuid(line: &str) -> Option<String> {
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).ok()?;
        value
            .get("uuid")
            .and_then(serde_json::Value::as_str)
            .filter(|uuid| !uuid.is_empty())
            .map(str::to_string)
    }
}

/// Reasons an inbound line is rejected
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported protocol version {0} (expected {expected})", expected = PROTOCOL_VERSION)]
    UnsupportedVersion(u32),

    #[error("message has an empty uuid")]
    MissingUuid,
}
