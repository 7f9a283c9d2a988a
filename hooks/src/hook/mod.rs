//! Hook callbacks
//!
//! A hook is anything that can run against a transaction: a Rust closure
//! ([`native::NativeHook`]), a function defined in a hook script
//! ([`crate::script::ScriptHook`]) or a call into a hook worker process
//! ([`crate::worker::WorkerHook`]).

pub mod native;

use crate::worker::WorkerError;
use async_trait::async_trait;
use contract_hooks_protocol::Transaction;
use std::fmt::Debug;

/// A registered hook, owned by exactly one registry slot.
pub type HookCallback = Box<dyn Hook>;

/// Hook callback trait
///
/// The signature is async because worker hooks wait on another process,
/// but dispatch is strictly sequential: the next hook starts only after the
/// previous one returned.
#[async_trait]
pub trait Hook: Send + Sync + Debug {
    /// Run the hook against one transaction, mutating it in place.
    async fn run(&self, transaction: &mut Transaction) -> Result<(), HookRunError>;

    /// Run the hook against the whole transaction list (`before_all` /
    /// `after_all`). Defaults to running it on each transaction in turn.
    async fn run_all(&self, transactions: &mut [Transaction]) -> Result<(), HookRunError> {
        for transaction in transactions.iter_mut() {
            self.run(transaction).await?;
        }
        Ok(())
    }

    /// Human-readable description (for logging and failure messages)
    fn description(&self) -> String;
}

/// Errors raised while running a single hook
#[derive(Debug, thiserror::Error)]
pub enum HookRunError {
    #[error("{0}")]
    Failed(String),

    #[error("hook left the transaction in an invalid state: {0}")]
    InvalidTransaction(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),
}
