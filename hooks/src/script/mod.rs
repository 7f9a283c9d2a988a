//! Starlark hook scripts
//!
//! A hook script is evaluated once while hooks are loaded. Every call to a
//! registration function (`before`, `after_each`, ...) stores the passed
//! function in a hidden module slot; once evaluation ends the module is
//! frozen and each stored function becomes a [`ScriptHook`].
//!
//! ```python
//! def add_token(transaction):
//!     transaction["request"]["headers"]["Authorization"] = "Bearer abc"
//!
//! before("Machines > Machines collection > Get Machines", add_token)
//! after_each(lambda transaction: log("done: " + transaction["name"]))
//! ```

mod builtins;
mod hook;
mod value;

pub use hook::ScriptHook;

use crate::config::HookLanguage;
use crate::loader::SourceUnit;
use crate::loader::trusted::HostCapabilities;
use crate::registry::HookLogs;
use crate::registry::HookSet;
use crate::types::HookPhase;
use starlark::any::ProvidesStaticType;
use starlark::environment::Globals;
use starlark::environment::GlobalsBuilder;
use starlark::environment::Module;
use starlark::eval::Evaluator;
use starlark::syntax::AstModule;
use starlark::syntax::Dialect;
use std::cell::Cell;
use std::cell::RefCell;
use std::sync::Arc;

/// Parser dialect for hook files of a language.
///
/// `load()` is never accepted: hook scripts are self-contained.
pub fn dialect_for(language: &HookLanguage) -> Dialect {
    let mut dialect = if language.is_standard_dialect() {
        Dialect::Standard
    } else {
        Dialect::Extended
    };
    dialect.enable_load = false;
    dialect
}

/// Evaluation environment for one kind of loader
pub(crate) struct ScriptEnv {
    pub dialect: Dialect,
    pub globals: Globals,
    pub logs: HookLogs,
    pub host: Option<Arc<dyn HostCapabilities>>,
    /// Extra module variables, set before the script runs
    pub bindings: Vec<(&'static str, serde_json::Value)>,
}

impl ScriptEnv {
    /// Standard library and registration functions only
    pub fn sandboxed(language: &HookLanguage, logs: HookLogs) -> Self {
        Self {
            dialect: dialect_for(language),
            globals: GlobalsBuilder::standard()
                .with(builtins::registration_builtins)
                .build(),
            logs,
            host: None,
            bindings: Vec::new(),
        }
    }

    /// Registration functions plus host access
    pub fn trusted(
        language: &HookLanguage,
        logs: HookLogs,
        host: Arc<dyn HostCapabilities>,
        bindings: Vec<(&'static str, serde_json::Value)>,
    ) -> Self {
        Self {
            dialect: dialect_for(language),
            globals: GlobalsBuilder::standard()
                .with(builtins::registration_builtins)
                .with(builtins::host_builtins)
                .build(),
            logs,
            host: Some(host),
            bindings,
        }
    }
}

struct PendingHook {
    phase: HookPhase,
    transaction_name: Option<String>,
    slot: String,
}

/// State reachable from builtins through `Evaluator::extra`
#[derive(ProvidesStaticType)]
pub(crate) struct ScriptContext {
    logs: HookLogs,
    host: Option<Arc<dyn HostCapabilities>>,
    /// `None` once loading is over; hooks cannot register hooks.
    pending: Option<RefCell<Vec<PendingHook>>>,
    next_slot: Cell<usize>,
}

impl ScriptContext {
    fn loading(logs: HookLogs, host: Option<Arc<dyn HostCapabilities>>) -> Self {
        Self {
            logs,
            host,
            pending: Some(RefCell::new(Vec::new())),
            next_slot: Cell::new(0),
        }
    }

    fn running(logs: HookLogs, host: Option<Arc<dyn HostCapabilities>>) -> Self {
        Self {
            logs,
            host,
            pending: None,
            next_slot: Cell::new(0),
        }
    }

    fn reserve_slot(
        &self,
        phase: HookPhase,
        transaction_name: Option<&str>,
    ) -> anyhow::Result<String> {
        let pending = self
            .pending
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("{phase}() can only be called while hooks are loaded"))?;
        let index = self.next_slot.get();
        self.next_slot.set(index + 1);
        let slot = format!("hook#{index}");
        pending.borrow_mut().push(PendingHook {
            phase,
            transaction_name: transaction_name.map(str::to_string),
            slot: slot.clone(),
        });
        Ok(slot)
    }

    fn into_pending(self) -> Vec<PendingHook> {
        self.pending.map(RefCell::into_inner).unwrap_or_default()
    }
}

/// Outcome of evaluating one source unit
pub(crate) struct UnitEvaluation {
    /// Hooks registered before evaluation ended
    pub hooks: HookSet,
    /// Parse or runtime error that ended evaluation early
    pub error: Option<String>,
}

/// Parse and run one unit, collecting its registrations into a private set.
pub(crate) fn evaluate_unit(unit: &SourceUnit, env: &ScriptEnv) -> UnitEvaluation {
    let mut hooks = HookSet::new();

    let ast = match AstModule::parse(&unit.name, unit.code.clone(), &env.dialect) {
        Ok(ast) => ast,
        Err(err) => {
            return UnitEvaluation {
                hooks,
                error: Some(err.to_string()),
            };
        }
    };

    let module = Module::new();
    for (name, value) in &env.bindings {
        module.set(name, value::json_to_value(module.heap(), value));
    }

    let context = ScriptContext::loading(env.logs.clone(), env.host.clone());
    let mut error = {
        let mut eval = Evaluator::new(&module);
        eval.extra = Some(&context);
        eval.eval_module(ast, &env.globals)
            .err()
            .map(|err| err.to_string())
    };

    let pending = context.into_pending();
    if pending.is_empty() {
        return UnitEvaluation { hooks, error };
    }

    let frozen = match module.freeze() {
        Ok(frozen) => frozen,
        Err(err) => {
            return UnitEvaluation {
                hooks,
                error: error.or_else(|| Some(anyhow::Error::from(err).to_string())),
            };
        }
    };

    for (index, pending) in pending.into_iter().enumerate() {
        match frozen.get(&pending.slot) {
            Ok(function) => {
                let hook = ScriptHook::new(
                    function,
                    pending.phase,
                    pending.transaction_name.as_deref(),
                    format!("{}#{}", unit.name, index),
                    env.logs.clone(),
                    env.host.clone(),
                );
                hooks.register(
                    pending.phase,
                    pending.transaction_name.as_deref(),
                    Box::new(hook),
                );
            }
            Err(err) => {
                error.get_or_insert_with(|| err.to_string());
                break;
            }
        }
    }

    tracing::debug!(
        "Evaluated hook unit {} ({} hook(s), {})",
        unit.name,
        hooks.len(),
        if error.is_some() { "failed" } else { "ok" }
    );
    UnitEvaluation { hooks, error }
}
