//! Configuration loading for hooks

use indexmap::IndexMap;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;

/// Language used when none is configured
pub const DEFAULT_LANGUAGE: &str = "starlark";

/// Hook settings of one test run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HooksConfig {
    /// Glob pattern(s) locating hook files, relative to the working directory
    pub hookfiles: Option<HookfilesPattern>,

    pub language: HookLanguage,

    /// Evaluate hook sources in the restricted sandbox
    pub sandbox: bool,

    /// Inline hook sources keyed by virtual file name
    #[serde(alias = "hooksData")]
    pub hooks_data: Option<IndexMap<String, String>>,

    /// Free-form values visible to trusted hook scripts as `configuration`
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub custom: serde_json::Value,

    pub worker: WorkerConfig,
}

impl HooksConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.language.as_str().trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "language".to_string(),
                cause: "must not be empty".to_string(),
            });
        }
        if self
            .hookfiles
            .as_ref()
            .is_some_and(|patterns| patterns.iter().any(|pattern| pattern.trim().is_empty()))
        {
            return Err(ConfigError::Invalid {
                field: "hookfiles".to_string(),
                cause: "patterns must not be empty".to_string(),
            });
        }
        self.worker.validate()
    }
}

/// One pattern or a list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HookfilesPattern {
    One(String),
    Many(Vec<String>),
}

impl HookfilesPattern {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let patterns: &[String] = match self {
            HookfilesPattern::One(pattern) => std::slice::from_ref(pattern),
            HookfilesPattern::Many(patterns) => patterns,
        };
        patterns.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl From<&str> for HookfilesPattern {
    fn from(pattern: &str) -> Self {
        HookfilesPattern::One(pattern.to_string())
    }
}

impl From<Vec<String>> for HookfilesPattern {
    fn from(patterns: Vec<String>) -> Self {
        HookfilesPattern::Many(patterns)
    }
}

/// Language hook files are written in
///
/// `starlark` and `starlark-standard` are evaluated in-process; any other
/// value is handed to a hook worker process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HookLanguage(String);

impl HookLanguage {
    pub const STARLARK: &str = "starlark";
    pub const STARLARK_STANDARD: &str = "starlark-standard";

    pub fn new(language: impl Into<String>) -> Self {
        Self(language.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hook files in this language are loaded without a worker.
    pub fn is_direct(&self) -> bool {
        matches!(self.0.as_str(), Self::STARLARK | Self::STARLARK_STANDARD)
    }

    /// Only the standard dialect is accepted (no `lambda`, f-strings or
    /// top-level control flow).
    pub fn is_standard_dialect(&self) -> bool {
        self.0 == Self::STARLARK_STANDARD
    }
}

impl Default for HookLanguage {
    fn default() -> Self {
        Self(DEFAULT_LANGUAGE.to_string())
    }
}

impl std::fmt::Display for HookLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hook worker process settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Executable to spawn. Defaults to `hooks-<language>` on `PATH`.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments placed before the hook file paths
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,

    /// Restarts allowed after the worker crashed
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,
}

fn default_startup_timeout_ms() -> u64 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_shutdown_timeout_ms() -> u64 {
    3000
}

fn default_max_restarts() -> u32 {
    2
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            startup_timeout_ms: default_startup_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            max_restarts: default_max_restarts(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("worker.startup_timeout_ms", self.startup_timeout_ms),
            ("worker.request_timeout_ms", self.request_timeout_ms),
            ("worker.shutdown_timeout_ms", self.shutdown_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    cause: "must be positive, got 0".to_string(),
                });
            }
        }
        if self
            .command
            .as_ref()
            .is_some_and(|command| command.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "worker.command".to_string(),
                cause: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Executable for a worker of the given language
    pub fn command_for(&self, language: &HookLanguage) -> String {
        self.command
            .clone()
            .unwrap_or_else(|| format!("hooks-{language}"))
    }
}

/// Load hooks configuration from a TOML file
pub fn load_config_from_file(path: impl AsRef<Path>) -> Result<HooksConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: HooksConfig = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {cause}")]
    Invalid { field: String, cause: String },
}
