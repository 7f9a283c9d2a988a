//! Core types for the hook system

use contract_hooks_protocol::WorkerEvent;

/// Lifecycle point a hook is attached to
///
/// Declared in dispatch order, so `Ord` follows the order hooks run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookPhase {
    /// Once, before the first transaction
    BeforeAll,
    /// Before every transaction
    BeforeEach,
    /// Before one named transaction
    Before,
    /// Before validating every transaction's response
    BeforeEachValidation,
    /// Before validating one named transaction's response
    BeforeValidation,
    /// After one named transaction
    After,
    /// After every transaction
    AfterEach,
    /// Once, after the last transaction
    AfterAll,
}

impl HookPhase {
    /// Phases keyed by transaction name
    pub fn is_named(&self) -> bool {
        matches!(
            self,
            HookPhase::Before | HookPhase::BeforeValidation | HookPhase::After
        )
    }

    /// Phases that run once per run over the whole transaction list
    pub fn is_run_wide(&self) -> bool {
        matches!(self, HookPhase::BeforeAll | HookPhase::AfterAll)
    }

    /// Name used in the hook script DSL
    pub fn dsl_name(&self) -> &'static str {
        match self {
            HookPhase::BeforeAll => "before_all",
            HookPhase::BeforeEach => "before_each",
            HookPhase::Before => "before",
            HookPhase::BeforeEachValidation => "before_each_validation",
            HookPhase::BeforeValidation => "before_validation",
            HookPhase::After => "after",
            HookPhase::AfterEach => "after_each",
            HookPhase::AfterAll => "after_all",
        }
    }
}

impl std::fmt::Display for HookPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dsl_name())
    }
}

impl HookPhase {
    /// Worker event a delegated hook of this phase is sent as. Named phases
    /// have no event: workers match transaction names on their side.
    pub fn worker_event(&self) -> Option<WorkerEvent> {
        match self {
            HookPhase::BeforeAll => Some(WorkerEvent::BeforeAll),
            HookPhase::BeforeEach => Some(WorkerEvent::BeforeEach),
            HookPhase::BeforeEachValidation => Some(WorkerEvent::BeforeEachValidation),
            HookPhase::AfterEach => Some(WorkerEvent::AfterEach),
            HookPhase::AfterAll => Some(WorkerEvent::AfterAll),
            HookPhase::Before | HookPhase::BeforeValidation | HookPhase::After => None,
        }
    }
}
