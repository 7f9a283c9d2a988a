//! Shared data model for contract-hooks.
//!
//! The [`Transaction`] record is what hooks observe and mutate; the
//! [`worker`] module defines the line-delimited JSON envelope spoken with
//! hook workers written in other languages.

pub mod transaction;
pub mod worker;

pub use transaction::DEFAULT_FAIL_MESSAGE;
pub use transaction::Transaction;
pub use worker::DecodeError;
pub use worker::PROTOCOL_VERSION;
pub use worker::WorkerEvent;
pub use worker::WorkerMessage;
