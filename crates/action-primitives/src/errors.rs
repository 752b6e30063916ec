//! Error types for document-level operations

use crate::types::WaitDiagnostics;
use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised while inspecting or driving the live document
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// No locator matched within the wait budget
    #[error("Element not found: {0}")]
    NotFound(Box<WaitDiagnostics>),

    /// A locator matched but the element failed one or more actionability checks
    #[error("Element not actionable: {0}")]
    NotActionable(Box<WaitDiagnostics>),

    /// An operation-level wait (e.g. completion) ran out of time
    #[error("{operation} timed out after {elapsed_ms}ms")]
    Timeout {
        operation: String,
        elapsed_ms: u64,
        evidence: Option<Value>,
    },

    /// Locator expression could not be parsed
    #[error("Invalid locator: {0}")]
    InvalidLocator(String),

    /// Node handle no longer refers to anything
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// The owning run was cancelled
    #[error("Operation interrupted: {0}")]
    Interrupted(String),
}

impl ActionError {
    /// Transient failure classes worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::NotFound(_) | ActionError::NotActionable(_) | ActionError::Timeout { .. }
        )
    }

    /// Machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ActionError::NotFound(_) => "NOT_FOUND",
            ActionError::NotActionable(_) => "NOT_ACTIONABLE",
            ActionError::Timeout { .. } => "TIMEOUT",
            ActionError::InvalidLocator(_) => "INVALID_LOCATOR",
            ActionError::UnknownNode(_) => "UNKNOWN_NODE",
            ActionError::Interrupted(_) => "INTERRUPTED",
        }
    }

    /// Record how many whole waits produced this failure
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        if let ActionError::NotFound(diag) | ActionError::NotActionable(diag) = &mut self {
            diag.attempts = attempts;
        }
        self
    }

    pub fn wait_diagnostics(&self) -> Option<&WaitDiagnostics> {
        match self {
            ActionError::NotFound(diag) | ActionError::NotActionable(diag) => Some(diag),
            _ => None,
        }
    }

    /// Diagnostic bundle suitable for an outward failure payload
    pub fn diagnostics(&self) -> Value {
        match self {
            ActionError::NotFound(diag) | ActionError::NotActionable(diag) => {
                serde_json::to_value(diag.as_ref()).unwrap_or(Value::Null)
            }
            ActionError::Timeout {
                operation,
                elapsed_ms,
                evidence,
            } => json!({
                "operation": operation,
                "elapsed_ms": elapsed_ms,
                "evidence": evidence,
            }),
            other => json!({ "message": other.to_string() }),
        }
    }
}
