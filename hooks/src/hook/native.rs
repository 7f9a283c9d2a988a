//! Native Rust closures as hooks

use super::Hook;
use super::HookRunError;
use async_trait::async_trait;
use contract_hooks_protocol::Transaction;
use std::fmt;

/// Closure run against a single transaction
pub type TransactionHookFn = Box<dyn Fn(&mut Transaction) -> anyhow::Result<()> + Send + Sync>;

/// Closure run against the whole transaction list
pub type TransactionsHookFn =
    Box<dyn Fn(&mut [Transaction]) -> anyhow::Result<()> + Send + Sync>;

enum NativeFn {
    Transaction(TransactionHookFn),
    Transactions(TransactionsHookFn),
}

/// Hook backed by a Rust closure, registered by in-process callers.
pub struct NativeHook {
    id: String,
    function: NativeFn,
}

impl NativeHook {
    /// Hook taking one transaction. Used for per-transaction phases; when
    /// registered for `before_all`/`after_all` it runs once per transaction.
    pub fn new<F>(id: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut Transaction) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            function: NativeFn::Transaction(Box::new(function)),
        }
    }

    /// Hook taking the transaction list in one call.
    pub fn for_transactions<F>(id: impl Into<String>, function: F) -> Self
    where
        F: Fn(&mut [Transaction]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            function: NativeFn::Transactions(Box::new(function)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Debug for NativeHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHook").field("id", &self.id).finish()
    }
}

fn failed(err: anyhow::Error) -> HookRunError {
    HookRunError::Failed(format!("{err:#}"))
}

#[async_trait]
impl Hook for NativeHook {
    async fn run(&self, transaction: &mut Transaction) -> Result<(), HookRunError> {
        match &self.function {
            NativeFn::Transaction(function) => function(transaction).map_err(failed),
            NativeFn::Transactions(function) => {
                function(std::slice::from_mut(transaction)).map_err(failed)
            }
        }
    }

    async fn run_all(&self, transactions: &mut [Transaction]) -> Result<(), HookRunError> {
        match &self.function {
            NativeFn::Transaction(function) => {
                for transaction in transactions.iter_mut() {
                    function(transaction).map_err(failed)?;
                }
                Ok(())
            }
            NativeFn::Transactions(function) => function(transactions).map_err(failed),
        }
    }

    fn description(&self) -> String {
        format!("native: {}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_native_hook_mutates_transaction() {
        let hook = NativeHook::new("fail_it", |transaction| {
            transaction.fail = Some("nope".to_string());
            Ok(())
        });

        let mut transaction = Transaction::new("A");
        hook.run(&mut transaction).await.unwrap();

        assert_eq!(transaction.fail.as_deref(), Some("nope"));
        assert_eq!(hook.description(), "native: fail_it");
    }

    #[tokio::test]
    async fn test_native_hook_error_is_reported() {
        let hook = NativeHook::new("broken", |_| anyhow::bail!("database unavailable"));

        let err = hook.run(&mut Transaction::new("A")).await.unwrap_err();
        assert_eq!(err.to_string(), "database unavailable");
    }

    #[tokio::test]
    async fn test_transactions_hook_sees_whole_list() {
        let hook = NativeHook::for_transactions("count", |transactions| {
            let total = transactions.len();
            for transaction in transactions.iter_mut() {
                transaction
                    .extra
                    .insert("total".to_string(), serde_json::json!(total));
            }
            Ok(())
        });

        let mut transactions = vec![Transaction::new("A"), Transaction::new("B")];
        hook.run_all(&mut transactions).await.unwrap();

        assert_eq!(transactions[1].extra.get("total"), Some(&serde_json::json!(2)));
    }
}
