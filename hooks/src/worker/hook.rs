use super::WorkerClient;
use super::WorkerError;
use crate::hook::Hook;
use crate::hook::HookRunError;
use async_trait::async_trait;
use contract_hooks_protocol::Transaction;
use contract_hooks_protocol::WorkerEvent;
use contract_hooks_protocol::WorkerMessage;
use std::sync::Arc;

/// Hook that forwards its event to the worker and adopts the worker's copy
/// of the transaction(s).
#[derive(Debug)]
pub struct WorkerHook {
    client: Arc<WorkerClient>,
    event: WorkerEvent,
}

impl WorkerHook {
    pub fn new(client: Arc<WorkerClient>, event: WorkerEvent) -> Self {
        Self { client, event }
    }
}

fn missing(field: &str, event: WorkerEvent) -> HookRunError {
    HookRunError::Worker(WorkerError::Malformed(format!(
        "{event} reply carries no {field}"
    )))
}

#[async_trait]
impl Hook for WorkerHook {
    async fn run(&self, transaction: &mut Transaction) -> Result<(), HookRunError> {
        if self.event.is_run_wide() {
            return self.run_all(std::slice::from_mut(transaction)).await;
        }
        let request = WorkerMessage::request(self.event).with_transaction(transaction.clone());
        let reply = self.client.request(request).await?;
        *transaction = reply
            .transaction
            .ok_or_else(|| missing("transaction", self.event))?;
        Ok(())
    }

    async fn run_all(&self, transactions: &mut [Transaction]) -> Result<(), HookRunError> {
        if !self.event.is_run_wide() {
            for transaction in transactions.iter_mut() {
                self.run(transaction).await?;
            }
            return Ok(());
        }

        let request = WorkerMessage::request(self.event).with_transactions(transactions.to_vec());
        let reply = self.client.request(request).await?;
        let updated = reply
            .transactions
            .ok_or_else(|| missing("transactions", self.event))?;
        if updated.len() != transactions.len() {
            return Err(HookRunError::InvalidTransaction(format!(
                "worker returned {} transactions for {}",
                updated.len(),
                transactions.len()
            )));
        }
        for (slot, transaction) in transactions.iter_mut().zip(updated) {
            *slot = transaction;
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("worker: {} {}", self.client.command(), self.event)
    }
}
