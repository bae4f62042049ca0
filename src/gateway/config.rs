//! Gateway Configuration
//!
//! The fixed safety parameters shared read-only by every call: which
//! collections and operations are addressable, which operator keys are
//! rejected, the row cap, and the store timeout.
//!
//! Loaded from a JSON file; every field has a default so an empty object
//! is a valid configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::operation::OperationKind;

/// Hard ceiling for returned rows
pub const MAX_LIMIT: i64 = 100;

/// Store wall-clock bound in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Addressable collections
    #[serde(default = "default_collections")]
    pub collections: Vec<String>,

    /// Permitted operations (default: all)
    #[serde(default = "default_operations")]
    pub operations: Vec<OperationKind>,

    /// Keys rejected at any depth of a request payload
    #[serde(default = "default_forbidden_operators")]
    pub forbidden_operators: Vec<String>,

    /// Row cap for find and aggregate (default: 100)
    #[serde(default = "default_max_limit")]
    pub max_limit: i64,

    /// Store timeout in milliseconds (default: 10000)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_collections() -> Vec<String> {
    [
        "users",
        "children",
        "groups",
        "staff",
        "staffshifts",
        "childattendances",
        "staffattendances",
        "payrolls",
        "payments",
        "rents",
        "menus",
        "fooditems",
        "foodstockrecords",
        "medicaljournals",
        "somaticjournals",
        "healthpassports",
        "schedules",
        "holidays",
        "documents",
        "settings",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_operations() -> Vec<OperationKind> {
    OperationKind::ALL.to_vec()
}

fn default_forbidden_operators() -> Vec<String> {
    ["$where", "$function", "$accumulator", "$expr"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_limit() -> i64 {
    MAX_LIMIT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            collections: default_collections(),
            operations: default_operations(),
            forbidden_operators: default_forbidden_operators(),
            max_limit: default_max_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: GatewayConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read-only deployment: only the non-mutating operations
    pub fn read_only() -> Self {
        Self {
            operations: OperationKind::ALL
                .into_iter()
                .filter(|k| !k.is_write())
                .collect(),
            ..Self::default()
        }
    }

    /// Override the store timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Store timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collections.is_empty() {
            return Err(ConfigError::Invalid("collections must not be empty".into()));
        }
        if self.operations.is_empty() {
            return Err(ConfigError::Invalid("operations must not be empty".into()));
        }
        if self.max_limit <= 0 {
            return Err(ConfigError::Invalid("maxLimit must be > 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeoutMs must be > 0".into()));
        }
        if let Some(op) = self.forbidden_operators.iter().find(|op| !op.starts_with('$')) {
            return Err(ConfigError::Invalid(format!(
                "forbidden operator '{}' must start with '$'",
                op
            )));
        }
        Ok(())
    }
}
