//! Hook registry
//!
//! One [`HookRegistry`] is created per test run. Loaders fill it during the
//! load phase; afterwards the test runner only reads it through
//! [`crate::dispatch::HookRunner`].

use crate::config::HooksConfig;
use crate::hook::Hook;
use crate::hook::HookCallback;
use crate::names::normalize_transaction_name;
use crate::types::HookPhase;
use crate::worker::WorkerClient;
use crate::worker::WorkerError;
use contract_hooks_protocol::Transaction;
use indexmap::IndexMap;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Hook callbacks grouped by phase
///
/// Named phases are keyed by the normalized transaction name. Keys keep
/// their first-insertion order and callbacks under one key keep their
/// registration order; nothing is ever overwritten.
#[derive(Debug, Default)]
pub struct HookSet {
    pub before_all: Vec<HookCallback>,
    pub before_each: Vec<HookCallback>,
    pub before: IndexMap<String, Vec<HookCallback>>,
    pub before_each_validation: Vec<HookCallback>,
    pub before_validation: IndexMap<String, Vec<HookCallback>>,
    pub after: IndexMap<String, Vec<HookCallback>>,
    pub after_each: Vec<HookCallback>,
    pub after_all: Vec<HookCallback>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_all(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.register(HookPhase::BeforeAll, None, Box::new(hook));
        self
    }

    pub fn after_all(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.register(HookPhase::AfterAll, None, Box::new(hook));
        self
    }

    pub fn before_each(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.register(HookPhase::BeforeEach, None, Box::new(hook));
        self
    }

    pub fn before_each_validation(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.register(HookPhase::BeforeEachValidation, None, Box::new(hook));
        self
    }

    pub fn after_each(&mut self, hook: impl Hook + 'static) -> &mut Self {
        self.register(HookPhase::AfterEach, None, Box::new(hook));
        self
    }

    pub fn before(&mut self, transaction_name: &str, hook: impl Hook + 'static) -> &mut Self {
        self.register(HookPhase::Before, Some(transaction_name), Box::new(hook));
        self
    }

    pub fn before_validation(
        &mut self,
        transaction_name: &str,
        hook: impl Hook + 'static,
    ) -> &mut Self {
        self.register(
            HookPhase::BeforeValidation,
            Some(transaction_name),
            Box::new(hook),
        );
        self
    }

    pub fn after(&mut self, transaction_name: &str, hook: impl Hook + 'static) -> &mut Self {
        self.register(HookPhase::After, Some(transaction_name), Box::new(hook));
        self
    }

    /// Append a callback to a phase. `transaction_name` is normalized and
    /// used as the key for named phases; it is ignored for the others.
    pub fn register(
        &mut self,
        phase: HookPhase,
        transaction_name: Option<&str>,
        hook: HookCallback,
    ) {
        let name = transaction_name.map(normalize_transaction_name);
        tracing::trace!(
            "Registering {} hook: {} (transaction={:?})",
            phase,
            hook.description(),
            name
        );
        match phase {
            HookPhase::BeforeAll => self.before_all.push(hook),
            HookPhase::BeforeEach => self.before_each.push(hook),
            HookPhase::BeforeEachValidation => self.before_each_validation.push(hook),
            HookPhase::AfterEach => self.after_each.push(hook),
            HookPhase::AfterAll => self.after_all.push(hook),
            HookPhase::Before => push_named(&mut self.before, name, hook),
            HookPhase::BeforeValidation => push_named(&mut self.before_validation, name, hook),
            HookPhase::After => push_named(&mut self.after, name, hook),
        }
    }

    /// Callbacks to run for a phase, in registration order. For named phases
    /// the lookup uses the normalized transaction name.
    pub fn hooks_for(&self, phase: HookPhase, transaction_name: &str) -> &[HookCallback] {
        let named = match phase {
            HookPhase::BeforeAll => return &self.before_all,
            HookPhase::BeforeEach => return &self.before_each,
            HookPhase::BeforeEachValidation => return &self.before_each_validation,
            HookPhase::AfterEach => return &self.after_each,
            HookPhase::AfterAll => return &self.after_all,
            HookPhase::Before => &self.before,
            HookPhase::BeforeValidation => &self.before_validation,
            HookPhase::After => &self.after,
        };
        named
            .get(&normalize_transaction_name(transaction_name))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append every callback of `other` after the ones already present.
    pub fn merge(&mut self, other: HookSet) {
        self.before_all.extend(other.before_all);
        self.before_each.extend(other.before_each);
        self.before_each_validation
            .extend(other.before_each_validation);
        self.after_each.extend(other.after_each);
        self.after_all.extend(other.after_all);
        merge_named(&mut self.before, other.before);
        merge_named(&mut self.before_validation, other.before_validation);
        merge_named(&mut self.after, other.after);
    }

    /// Total number of registered callbacks
    pub fn len(&self) -> usize {
        let named = |map: &IndexMap<String, Vec<HookCallback>>| -> usize {
            map.values().map(Vec::len).sum()
        };
        self.before_all.len()
            + self.before_each.len()
            + self.before_each_validation.len()
            + self.after_each.len()
            + self.after_all.len()
            + named(&self.before)
            + named(&self.before_validation)
            + named(&self.after)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn push_named(
    map: &mut IndexMap<String, Vec<HookCallback>>,
    name: Option<String>,
    hook: HookCallback,
) {
    map.entry(name.unwrap_or_default()).or_default().push(hook);
}

fn merge_named(
    target: &mut IndexMap<String, Vec<HookCallback>>,
    source: IndexMap<String, Vec<HookCallback>>,
) {
    for (name, hooks) in source {
        target.entry(name).or_default().extend(hooks);
    }
}

/// One message logged by hook code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookLogEntry {
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    pub content: String,
}

/// Log list shared between the runner context and its hook registry
///
/// Cloning yields another handle to the same list.
#[derive(Debug, Clone, Default)]
pub struct HookLogs(Arc<Mutex<Vec<HookLogEntry>>>);

impl HookLogs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, content: impl Into<String>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis() as u64)
            .unwrap_or_default();
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(HookLogEntry {
                timestamp,
                content: content.into(),
            });
    }

    pub fn entries(&self) -> Vec<HookLogEntry> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether both handles point at the same list
    pub fn ptr_eq(&self, other: &HookLogs) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Per-run hook state attached to the runner context
#[derive(Debug)]
pub struct HookRegistry {
    pub hooks: HookSet,

    /// Shared with the runner context that created the registry
    pub logs: HookLogs,

    /// Read-only snapshot of the run configuration
    pub configuration: Arc<HooksConfig>,

    /// Hook files resolved from the configured patterns, in load order
    pub hookfiles: Vec<PathBuf>,

    /// Transactions of the run keyed by name
    pub transactions: IndexMap<String, Transaction>,

    worker: Option<Arc<WorkerClient>>,
}

impl HookRegistry {
    pub fn new(configuration: Arc<HooksConfig>, logs: HookLogs) -> Self {
        Self {
            hooks: HookSet::new(),
            logs,
            configuration,
            hookfiles: Vec::new(),
            transactions: IndexMap::new(),
            worker: None,
        }
    }

    pub fn with_transactions(mut self, transactions: &[Transaction]) -> Self {
        self.transactions = transactions
            .iter()
            .map(|transaction| (transaction.name.clone(), transaction.clone()))
            .collect();
        self
    }

    /// Worker client driving delegated hooks, if the run uses one
    pub fn worker(&self) -> Option<&Arc<WorkerClient>> {
        self.worker.as_ref()
    }

    pub(crate) fn set_worker(&mut self, worker: Arc<WorkerClient>) {
        self.worker = Some(worker);
    }

    /// Stop the hook worker, if any. Call once after `after_all` hooks ran.
    pub async fn shutdown(&self) -> Result<(), WorkerError> {
        match &self.worker {
            Some(worker) => worker.stop().await,
            None => Ok(()),
        }
    }
}
