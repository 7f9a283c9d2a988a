use super::ScriptContext;
use super::value::json_to_value;
use super::value::value_to_json;
use crate::hook::Hook;
use crate::hook::HookRunError;
use crate::loader::trusted::HostCapabilities;
use crate::registry::HookLogs;
use crate::types::HookPhase;
use async_trait::async_trait;
use contract_hooks_protocol::Transaction;
use starlark::environment::Module;
use starlark::eval::Evaluator;
use starlark::values::OwnedFrozenValue;
use std::fmt;
use std::sync::Arc;

/// Function defined by a hook script, frozen after the script was loaded
///
/// Each call runs in a fresh evaluator. The transaction is handed to the
/// function as a dict (`before_all`/`after_all` get a list of dicts) and read
/// back once the function returns; its return value is ignored.
pub struct ScriptHook {
    function: OwnedFrozenValue,
    phase: HookPhase,
    label: String,
    logs: HookLogs,
    host: Option<Arc<dyn HostCapabilities>>,
}

impl ScriptHook {
    pub(crate) fn new(
        function: OwnedFrozenValue,
        phase: HookPhase,
        transaction_name: Option<&str>,
        source: String,
        logs: HookLogs,
        host: Option<Arc<dyn HostCapabilities>>,
    ) -> Self {
        let label = match transaction_name {
            Some(name) => format!("{phase}('{name}') from {source}"),
            None => format!("{phase} from {source}"),
        };
        Self {
            function,
            phase,
            label,
            logs,
            host,
        }
    }

    fn call(&self, argument: serde_json::Value) -> Result<serde_json::Value, HookRunError> {
        let module = Module::new();
        let context = ScriptContext::running(self.logs.clone(), self.host.clone());
        let mut eval = Evaluator::new(&module);
        eval.extra = Some(&context);

        let function = self.function.owned_value(module.frozen_heap());
        let argument = json_to_value(module.heap(), &argument);
        eval.eval_function(function, &[argument], &[])
            .map_err(|err| HookRunError::Failed(err.to_string()))?;

        value_to_json(argument).map_err(HookRunError::InvalidTransaction)
    }

    fn encode<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, HookRunError> {
        serde_json::to_value(value).map_err(|err| HookRunError::InvalidTransaction(err.to_string()))
    }

    fn decode<T: serde::de::DeserializeOwned>(
        value: serde_json::Value,
    ) -> Result<T, HookRunError> {
        serde_json::from_value(value).map_err(|err| HookRunError::InvalidTransaction(err.to_string()))
    }
}

impl fmt::Debug for ScriptHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHook")
            .field("label", &self.label)
            .field("trusted", &self.host.is_some())
            .finish()
    }
}

#[async_trait]
impl Hook for ScriptHook {
    async fn run(&self, transaction: &mut Transaction) -> Result<(), HookRunError> {
        let result = self.call(Self::encode(transaction)?)?;
        *transaction = Self::decode(result)?;
        Ok(())
    }

    async fn run_all(&self, transactions: &mut [Transaction]) -> Result<(), HookRunError> {
        if !self.phase.is_run_wide() {
            for transaction in transactions.iter_mut() {
                self.run(transaction).await?;
            }
            return Ok(());
        }

        let result: Vec<Transaction> = Self::decode(self.call(Self::encode(&transactions)?)?)?;
        if result.len() != transactions.len() {
            return Err(HookRunError::InvalidTransaction(format!(
                "expected {} transactions, hook left {}",
                transactions.len(),
                result.len()
            )));
        }
        for (slot, transaction) in transactions.iter_mut().zip(result) {
            *slot = transaction;
        }
        Ok(())
    }

    fn description(&self) -> String {
        format!("script: {}", self.label)
    }
}
