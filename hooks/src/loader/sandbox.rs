//! All-or-nothing loading in a restricted environment

use super::HookLoader;
use super::SourceUnit;
use super::UnitState;
use crate::error::HooksError;
use crate::registry::HookRegistry;
use crate::script::ScriptEnv;
use crate::script::evaluate_unit;

/// Evaluates each unit with only the standard library and the registration
/// functions in scope. A unit's hooks reach the registry only if the whole
/// unit evaluated successfully.
#[derive(Debug, Default, Clone)]
pub struct SandboxLoader;

impl SandboxLoader {
    pub fn new() -> Self {
        Self
    }

    /// Evaluate `unit` and report the state it ended in.
    pub fn evaluate(
        &self,
        unit: &SourceUnit,
        registry: &mut HookRegistry,
    ) -> (UnitState, Result<(), HooksError>) {
        tracing::trace!("Sandboxed unit {} {}", unit.name, UnitState::Loaded);
        let env = ScriptEnv::sandboxed(&registry.configuration.language, registry.logs.clone());

        tracing::trace!("Sandboxed unit {} {}", unit.name, UnitState::Evaluating);
        let evaluation = evaluate_unit(unit, &env);

        match evaluation.error {
            Some(message) => {
                tracing::warn!(
                    "Sandboxed unit {} {}, discarding {} hook(s): {}",
                    unit.name,
                    UnitState::Rejected,
                    evaluation.hooks.len(),
                    message
                );
                (
                    UnitState::Rejected,
                    Err(HooksError::evaluation(&unit.name, message)),
                )
            }
            None => {
                tracing::debug!(
                    "Sandboxed unit {} {} with {} hook(s)",
                    unit.name,
                    UnitState::Committed,
                    evaluation.hooks.len()
                );
                registry.hooks.merge(evaluation.hooks);
                (UnitState::Committed, Ok(()))
            }
        }
    }
}

impl HookLoader for SandboxLoader {
    fn load(&self, unit: &SourceUnit, registry: &mut HookRegistry) -> Result<(), HooksError> {
        self.evaluate(unit, registry).1
    }
}
