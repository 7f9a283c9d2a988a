//! Hook dispatch
//!
//! The test runner drives a run through [`HookRunner`]. For every
//! transaction hooks run in this order:
//!
//! ```text
//! before_each -> before[name] -> (HTTP exchange)
//!   -> before_each_validation -> before_validation[name]
//!   -> after[name] -> after_each
//! ```
//!
//! with `before_all` once before the first transaction and `after_all` once
//! after the last. Hooks run one at a time. A failing hook marks the
//! transaction failed and the remaining hooks still run.

use crate::hook::HookCallback;
use crate::registry::HookRegistry;
use crate::registry::HookSet;
use crate::types::HookPhase;
use async_trait::async_trait;
use contract_hooks_protocol::Transaction;
use tracing::debug;
use tracing::warn;

/// The request/response exchange performed between the `before` and the
/// validation phases
#[async_trait]
pub trait TransactionExchange: Send + Sync {
    async fn exchange(&self, transaction: &mut Transaction) -> anyhow::Result<()>;
}

/// Exchange that leaves the transaction untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExchange;

#[async_trait]
impl TransactionExchange for NoExchange {
    async fn exchange(&self, _transaction: &mut Transaction) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Runs registered hooks against transactions
#[derive(Debug, Clone, Copy)]
pub struct HookRunner<'a> {
    hooks: &'a HookSet,
}

impl<'a> HookRunner<'a> {
    pub fn new(registry: &'a HookRegistry) -> Self {
        Self {
            hooks: &registry.hooks,
        }
    }

    pub fn from_set(hooks: &'a HookSet) -> Self {
        Self { hooks }
    }

    /// Run every callback of a per-transaction phase. Returns the number of
    /// callbacks that failed.
    pub async fn run_phase(&self, phase: HookPhase, transaction: &mut Transaction) -> usize {
        let name = transaction.name.clone();
        let mut failures = 0;
        for hook in self.hooks.hooks_for(phase, &name) {
            debug!("Running {} hook {} for '{}'", phase, hook.description(), name);
            if let Err(err) = hook.run(transaction).await {
                let reason = failure_reason(phase, hook, &err);
                warn!("{} (transaction '{}')", reason, name);
                transaction.mark_failed(reason);
                failures += 1;
            }
        }
        failures
    }

    async fn run_wide(&self, phase: HookPhase, transactions: &mut [Transaction]) -> usize {
        let mut failures = 0;
        for hook in self.hooks.hooks_for(phase, "") {
            debug!(
                "Running {} hook {} over {} transaction(s)",
                phase,
                hook.description(),
                transactions.len()
            );
            if let Err(err) = hook.run_all(transactions).await {
                let reason = failure_reason(phase, hook, &err);
                warn!("{}", reason);
                for transaction in transactions.iter_mut() {
                    transaction.mark_failed(reason.clone());
                }
                failures += 1;
            }
        }
        failures
    }

    pub async fn run_before_all(&self, transactions: &mut [Transaction]) -> usize {
        self.run_wide(HookPhase::BeforeAll, transactions).await
    }

    pub async fn run_after_all(&self, transactions: &mut [Transaction]) -> usize {
        self.run_wide(HookPhase::AfterAll, transactions).await
    }

    /// `before_each`, then `before` hooks for the transaction's name
    pub async fn run_before(&self, transaction: &mut Transaction) -> usize {
        self.run_phase(HookPhase::BeforeEach, transaction).await
            + self.run_phase(HookPhase::Before, transaction).await
    }

    /// `before_each_validation`, then `before_validation` hooks for the name
    pub async fn run_before_validation(&self, transaction: &mut Transaction) -> usize {
        self.run_phase(HookPhase::BeforeEachValidation, transaction)
            .await
            + self.run_phase(HookPhase::BeforeValidation, transaction).await
    }

    /// `after` hooks for the name, then `after_each`
    pub async fn run_after(&self, transaction: &mut Transaction) -> usize {
        self.run_phase(HookPhase::After, transaction).await
            + self.run_phase(HookPhase::AfterEach, transaction).await
    }

    /// All per-transaction phases around one exchange
    pub async fn run_transaction(
        &self,
        transaction: &mut Transaction,
        exchange: &dyn TransactionExchange,
    ) -> usize {
        let mut failures = self.run_before(transaction).await;
        if let Err(err) = exchange.exchange(transaction).await {
            warn!("Exchange for '{}' failed: {:#}", transaction.name, err);
            transaction.mark_failed(format!("exchange failed: {err:#}"));
        }
        failures += self.run_before_validation(transaction).await;
        failures + self.run_after(transaction).await
    }

    /// A whole run: `before_all`, every transaction in order, `after_all`.
    /// Returns the number of failed hook calls.
    pub async fn run(
        &self,
        transactions: &mut [Transaction],
        exchange: &dyn TransactionExchange,
    ) -> usize {
        let mut failures = self.run_before_all(transactions).await;
        for transaction in transactions.iter_mut() {
            failures += self.run_transaction(transaction, exchange).await;
        }
        failures + self.run_after_all(transactions).await
    }
}

fn failure_reason(phase: HookPhase, hook: &HookCallback, err: &dyn std::fmt::Display) -> String {
    format!("{} hook {} failed: {}", phase, hook.description(), err)
}
