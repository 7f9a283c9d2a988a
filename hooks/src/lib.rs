//! # Contract Hooks
//!
//! Hook loading and dispatch for API contract test runs.
//!
//! ## Overview
//!
//! Hooks are callbacks run around each HTTP transaction of a test run. They
//! can rewrite requests, stash values between transactions or fail a
//! transaction outright. Hooks come from three places:
//! - Starlark hook files, evaluated in-process (trusted or sandboxed)
//! - Inline hook sources from the configuration, always sandboxed
//! - A hook worker process, for hook files written in any other language
//!
//! ## Architecture
//!
//! - **Registry**: per-run [`HookRegistry`] holding callbacks by phase and
//!   transaction name
//! - **Loaders**: [`loader::trusted::TrustedLoader`] and
//!   [`loader::sandbox::SandboxLoader`] evaluate [`loader::SourceUnit`]s
//! - **Worker**: [`worker::WorkerClient`] drives a worker over stdio
//! - **Orchestrator**: [`add_hooks`] picks the right path for a run
//! - **Dispatch**: [`HookRunner`] runs hooks in lifecycle order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use contract_hooks::{add_hooks, HookRunner, NoExchange, RunnerContext};
//!
//! let mut runner = RunnerContext::new(config, std::env::current_dir()?);
//! add_hooks(&mut runner, &transactions).await?;
//!
//! if let Some(registry) = &runner.hooks {
//!     HookRunner::new(registry).run(&mut transactions, &NoExchange).await;
//!     registry.shutdown().await?;
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hook;
pub mod loader;
pub mod names;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod script;
pub mod types;
pub mod worker;

// Re-export commonly used types
pub use config::{ConfigError, HookLanguage, HookfilesPattern, HooksConfig, WorkerConfig};
pub use dispatch::{HookRunner, NoExchange, TransactionExchange};
pub use error::HooksError;
pub use hook::{Hook, HookCallback, HookRunError};
pub use names::normalize_transaction_name;
pub use orchestrator::{add_hooks, HookOrchestrator, RunnerContext};
pub use registry::{HookLogEntry, HookLogs, HookRegistry, HookSet};
pub use types::HookPhase;
pub use worker::{WorkerClient, WorkerError, WorkerState};
