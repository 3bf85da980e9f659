use crate::activation::ActivationContext;
use crate::types::DependencyCategory;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("cannot read agent source root {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed agent file {}: {reason}", .path.display())]
    MetadataExtraction { path: PathBuf, reason: String },

    #[error("duplicate agent id '{id}' declared by {} and {}", .first.display(), .second.display())]
    DuplicateAgent {
        id: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("rule '{rule}' failed during {phase} of agent '{agent_id}': {reason}")]
    Transformation {
        agent_id: String,
        rule: String,
        phase: String,
        reason: String,
    },

    #[error("agent '{agent_id}' depends on missing {category} '{name}'")]
    Dependency {
        agent_id: String,
        category: DependencyCategory,
        name: String,
    },

    #[error("registration of agent '{agent_id}' failed after {retry_count} retries: {reason}")]
    Registration {
        agent_id: String,
        retry_count: u32,
        reason: String,
    },

    #[error("activation of agent '{agent_id}' failed: {reason}")]
    Activation {
        agent_id: String,
        context: Box<ActivationContext>,
        reason: ActivationFailure,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdapterError>;

impl AdapterError {
    /// Failure category, taken from the variant's structured data where there
    /// is any and from [`ErrorCategory::classify`] otherwise.
    pub fn category(&self) -> ErrorCategory {
        match self {
            AdapterError::Activation { reason, .. } => reason.category(),
            AdapterError::Dependency { .. } => ErrorCategory::Dependency,
            AdapterError::DuplicateAgent { .. } => ErrorCategory::Conflict,
            AdapterError::Discovery { source, .. } | AdapterError::Io(source) => {
                match source.kind() {
                    std::io::ErrorKind::NotFound => ErrorCategory::NotFound,
                    std::io::ErrorKind::PermissionDenied => ErrorCategory::Permission,
                    _ => ErrorCategory::classify(&source.to_string()),
                }
            }
            other => ErrorCategory::classify(&other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// ActivationFailure
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActivationFailure {
    #[error("agent is not registered")]
    NotRegistered,

    #[error("agent is already active")]
    AlreadyActive,

    #[error("concurrent activation limit of {max} reached")]
    ConcurrencyLimit { max: usize },

    #[error("activation handler '{handler}' not found")]
    HandlerMissing { handler: String },

    #[error("activation handler failed: {message}")]
    HandlerFailed { message: String },

    #[error("activation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl ActivationFailure {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ActivationFailure::NotRegistered | ActivationFailure::HandlerMissing { .. } => {
                ErrorCategory::NotFound
            }
            ActivationFailure::AlreadyActive | ActivationFailure::ConcurrencyLimit { .. } => {
                ErrorCategory::Conflict
            }
            ActivationFailure::Timeout { .. } => ErrorCategory::Performance,
            ActivationFailure::HandlerFailed { message } => ErrorCategory::classify(message),
        }
    }
}

// ---------------------------------------------------------------------------
// ErrorCategory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    NotFound,
    Conflict,
    Performance,
    Dependency,
    Permission,
    Unknown,
}

impl ErrorCategory {
    pub fn all() -> &'static [ErrorCategory] {
        &[
            ErrorCategory::NotFound,
            ErrorCategory::Conflict,
            ErrorCategory::Performance,
            ErrorCategory::Dependency,
            ErrorCategory::Permission,
            ErrorCategory::Unknown,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Performance => "performance",
            ErrorCategory::Dependency => "dependency",
            ErrorCategory::Permission => "permission",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Best-effort substring classification of a free-text error message.
    ///
    /// Buckets are tried in a fixed order, so "dependency not found" lands in
    /// `dependency` rather than `not_found`. Anything unrecognised is
    /// `unknown`. Prefer [`AdapterError::category`] when the error value is
    /// still at hand.
    pub fn classify(message: &str) -> ErrorCategory {
        const BUCKETS: &[(ErrorCategory, &[&str])] = &[
            (
                ErrorCategory::Permission,
                &["permission", "denied", "unauthorized", "forbidden"],
            ),
            (
                ErrorCategory::Dependency,
                &["dependency", "dependencies", "requires"],
            ),
            (
                ErrorCategory::Performance,
                &["timeout", "timed out", "slow", "memory"],
            ),
            (
                ErrorCategory::Conflict,
                &["conflict", "already", "duplicate", "limit"],
            ),
            (
                ErrorCategory::NotFound,
                &["not found", "not registered", "no such", "does not exist", "missing"],
            ),
        ];

        let lower = message.to_lowercase();
        BUCKETS
            .iter()
            .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
            .map(|(category, _)| *category)
            .unwrap_or(ErrorCategory::Unknown)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
