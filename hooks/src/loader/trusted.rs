//! In-process loading with host access

use super::HookLoader;
use super::SourceUnit;
use crate::error::HooksError;
use crate::registry::HookRegistry;
use crate::script::ScriptEnv;
use crate::script::evaluate_unit;
use std::fmt::Debug;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

/// Host services reachable from trusted hook scripts
pub trait HostCapabilities: Send + Sync + Debug {
    fn read_file(&self, path: &str) -> std::io::Result<String>;

    fn env_var(&self, name: &str) -> Option<String>;
}

/// Real filesystem and process environment. Relative paths are read from
/// `base_dir`.
#[derive(Debug, Clone)]
pub struct SystemHost {
    base_dir: PathBuf,
}

impl SystemHost {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }
}

impl HostCapabilities for SystemHost {
    fn read_file(&self, path: &str) -> std::io::Result<String> {
        std::fs::read_to_string(self.base_dir.join(Path::new(path)))
    }

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Evaluates units with host access, registering straight into the registry
///
/// Scripts additionally see `read_file`, `getenv`, the run `configuration`
/// and the run's `transactions` keyed by name. When a unit fails midway, the
/// hooks it registered before failing stay registered and the error is
/// returned.
#[derive(Debug, Clone)]
pub struct TrustedLoader {
    host: Arc<dyn HostCapabilities>,
}

impl TrustedLoader {
    pub fn new(host: Arc<dyn HostCapabilities>) -> Self {
        Self { host }
    }

    fn bindings(
        registry: &HookRegistry,
    ) -> Result<Vec<(&'static str, serde_json::Value)>, serde_json::Error> {
        Ok(vec![
            ("configuration", serde_json::to_value(&*registry.configuration)?),
            ("transactions", serde_json::to_value(&registry.transactions)?),
        ])
    }
}

impl HookLoader for TrustedLoader {
    fn load(&self, unit: &SourceUnit, registry: &mut HookRegistry) -> Result<(), HooksError> {
        let bindings =
            Self::bindings(registry).map_err(|err| HooksError::evaluation(&unit.name, err))?;
        let env = ScriptEnv::trusted(
            &registry.configuration.language,
            registry.logs.clone(),
            Arc::clone(&self.host),
            bindings,
        );

        let evaluation = evaluate_unit(unit, &env);
        tracing::debug!(
            "Loaded {} hook(s) from {}",
            evaluation.hooks.len(),
            unit.name
        );
        registry.hooks.merge(evaluation.hooks);

        match evaluation.error {
            Some(message) => Err(HooksError::evaluation(&unit.name, message)),
            None => Ok(()),
        }
    }
}
