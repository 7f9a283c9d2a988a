//! Load phase of a test run
//!
//! [`add_hooks`] attaches a fresh [`HookRegistry`] to the runner context and
//! fills it from the configured hook files, inline hook sources or a hook
//! worker.

use crate::config::HooksConfig;
use crate::error::HooksError;
use crate::loader::HookLoader;
use crate::loader::SourceUnit;
use crate::loader::sandbox::SandboxLoader;
use crate::loader::trusted::SystemHost;
use crate::loader::trusted::TrustedLoader;
use crate::registry::HookLogs;
use crate::registry::HookRegistry;
use crate::resolver::resolve_hookfiles;
use crate::worker::WorkerClient;
use contract_hooks_protocol::Transaction;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// State the test runner shares with the hook layer
#[derive(Debug)]
pub struct RunnerContext {
    pub configuration: Arc<HooksConfig>,

    /// Hook log, shared with the registry once hooks are added
    pub logs: HookLogs,

    /// Set by [`add_hooks`]
    pub hooks: Option<HookRegistry>,

    /// Base directory for relative hookfiles patterns
    pub working_dir: PathBuf,
}

impl RunnerContext {
    pub fn new(configuration: HooksConfig, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            configuration: Arc::new(configuration),
            logs: HookLogs::new(),
            hooks: None,
            working_dir: working_dir.into(),
        }
    }
}

/// Hook loading with replaceable loaders
#[derive(Debug, Clone)]
pub struct HookOrchestrator {
    trusted: Option<Arc<dyn HookLoader>>,
    sandboxed: Arc<dyn HookLoader>,
}

impl Default for HookOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl HookOrchestrator {
    /// Trusted loads use the real filesystem and environment, rooted at the
    /// runner's working directory.
    pub fn new() -> Self {
        Self {
            trusted: None,
            sandboxed: Arc::new(SandboxLoader::new()),
        }
    }

    pub fn with_trusted_loader(mut self, loader: Arc<dyn HookLoader>) -> Self {
        self.trusted = Some(loader);
        self
    }

    pub fn with_sandboxed_loader(mut self, loader: Arc<dyn HookLoader>) -> Self {
        self.sandboxed = loader;
        self
    }

    /// Build the run's hook registry and attach it to `runner`.
    ///
    /// The registry is attached before anything is loaded, so on error the
    /// runner still holds whatever was registered up to that point.
    pub async fn add_hooks(
        &self,
        runner: &mut RunnerContext,
        transactions: &[Transaction],
    ) -> Result<(), HooksError> {
        let configuration = Arc::clone(&runner.configuration);
        configuration.validate()?;

        let registry = runner.hooks.insert(
            HookRegistry::new(Arc::clone(&configuration), runner.logs.clone())
                .with_transactions(transactions),
        );

        let hookfiles = resolve_hookfiles(configuration.hookfiles.as_ref(), &runner.working_dir)?;
        registry.hookfiles = hookfiles.clone();

        if !configuration.language.is_direct() {
            info!(
                "Delegating hooks in {} to a worker ({} file(s))",
                configuration.language,
                hookfiles.len()
            );
            let client = Arc::new(WorkerClient::new(
                &configuration.language,
                configuration.worker.clone(),
                &hookfiles,
                &runner.working_dir,
            ));
            client.start().await?;
            client.register_hooks(&mut registry.hooks);
            registry.set_worker(client);
            return Ok(());
        }

        let pattern_given = configuration
            .hookfiles
            .as_ref()
            .is_some_and(|pattern| !pattern.is_empty());
        if !pattern_given {
            return match &configuration.hooks_data {
                Some(units) if configuration.sandbox => {
                    for (name, code) in units {
                        self.sandboxed
                            .load(&SourceUnit::inline(name.as_str(), code.as_str()), registry)?;
                    }
                    info!("Loaded {} inline hook source(s)", units.len());
                    Ok(())
                }
                Some(_) => Err(HooksError::NotImplemented(
                    "loading inline hooks outside the sandbox".to_string(),
                )),
                None => Ok(()),
            };
        }

        let loader: Arc<dyn HookLoader> = if configuration.sandbox {
            Arc::clone(&self.sandboxed)
        } else {
            match &self.trusted {
                Some(loader) => Arc::clone(loader),
                None => Arc::new(TrustedLoader::new(Arc::new(SystemHost::new(
                    runner.working_dir.clone(),
                )))),
            }
        };

        for path in &hookfiles {
            let unit = SourceUnit::read(path).await?;
            loader.load(&unit, registry)?;
        }
        info!(
            "Loaded {} hook(s) from {} file(s)",
            registry.hooks.len(),
            hookfiles.len()
        );
        Ok(())
    }
}

/// Load hooks with the default loaders. See [`HookOrchestrator::add_hooks`].
pub async fn add_hooks(
    runner: &mut RunnerContext,
    transactions: &[Transaction],
) -> Result<(), HooksError> {
    HookOrchestrator::new().add_hooks(runner, transactions).await
}
