//! Hook source loaders
//!
//! A loader turns one [`SourceUnit`] into registrations on a
//! [`HookRegistry`]. The orchestrator picks the [`trusted::TrustedLoader`] or
//! the [`sandbox::SandboxLoader`] from the run configuration; both can be
//! replaced through [`crate::orchestrator::HookOrchestrator`].

pub mod sandbox;
pub mod trusted;

use crate::error::HooksError;
use crate::registry::HookRegistry;
use std::fmt::Debug;
use std::path::Path;
use std::path::PathBuf;

/// Where a source unit came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOrigin {
    File(PathBuf),
    /// Inline `hooks_data` entry
    Inline,
}

/// One piece of hook source code, loaded as a whole
#[derive(Debug, Clone)]
pub struct SourceUnit {
    /// File path or virtual file name, used in error messages
    pub name: String,
    pub origin: UnitOrigin,
    pub code: String,
}

impl SourceUnit {
    pub fn inline(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: UnitOrigin::Inline,
            code: code.into(),
        }
    }

    /// Read a hook file
    pub async fn read(path: &Path) -> Result<Self, HooksError> {
        let code = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| HooksError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            name: path.display().to_string(),
            origin: UnitOrigin::File(path.to_path_buf()),
            code,
        })
    }
}

/// Evaluation state of a source unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Loaded,
    Evaluating,
    /// Registrations were merged into the registry
    Committed,
    /// Evaluation failed; nothing from the unit was kept
    Rejected,
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitState::Loaded => write!(f, "loaded"),
            UnitState::Evaluating => write!(f, "evaluating"),
            UnitState::Committed => write!(f, "committed"),
            UnitState::Rejected => write!(f, "rejected"),
        }
    }
}

/// Evaluates source units into a registry
pub trait HookLoader: Send + Sync + Debug {
    fn load(&self, unit: &SourceUnit, registry: &mut HookRegistry) -> Result<(), HooksError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_read_hook_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hooks.star");
        std::fs::write(&path, "before_each(lambda t: None)").unwrap();

        let unit = SourceUnit::read(&path).await.unwrap();

        assert_eq!(unit.origin, UnitOrigin::File(path.clone()));
        assert_eq!(unit.name, path.display().to_string());
        assert_eq!(unit.code, "before_each(lambda t: None)");
    }

    #[tokio::test]
    async fn test_missing_file_is_a_read_error() {
        let dir = TempDir::new().unwrap();
        let err = SourceUnit::read(&dir.path().join("missing.star"))
            .await
            .unwrap_err();
        assert!(matches!(err, HooksError::Read { .. }));
    }
}
