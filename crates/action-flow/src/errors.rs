//! Flow execution error types

use crate::{adapter::Capability, types::Phase};
use action_extract::ExtractError;
use action_primitives::ActionError;
use extensions_bridge::BridgeError;
use promptrelay_core_types::LivenessSnapshot;
use serde_json::{json, Value};
use thiserror::Error;

/// Flow execution errors
#[derive(Debug, Error)]
pub enum FlowError {
    /// Orchestrator-level wrapper naming the phase that failed
    #[error("Phase {phase} failed after {elapsed_ms}ms: {source}")]
    PhaseFailure {
        phase: Phase,
        elapsed_ms: u64,
        liveness: LivenessSnapshot,
        source: Box<FlowError>,
    },

    /// The provider wants a signed-in session; not a malfunction
    #[error("Login required: {0}")]
    LoginRequired(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid run settings: {0}")]
    InvalidSettings(String),

    /// Optional capability invoked on an adapter that lacks it
    #[error("Capability not supported: {0:?}")]
    Unsupported(Capability),

    /// `extract` called before any run started
    #[error("No active run")]
    NoActiveRun,

    #[error("Profile error: {0}")]
    Profile(String),

    /// Domain error raised by adapter code
    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl FlowError {
    /// Only element-level transient failures are worth repeating.
    pub fn is_retryable(&self) -> bool {
        match self {
            FlowError::Action(err) => err.is_retryable(),
            FlowError::Extract(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FlowError::PhaseFailure { phase, .. } => phase.failure_code(),
            FlowError::LoginRequired(_) => "LOGIN_REQUIRED",
            FlowError::UnknownProvider(_) => "UNKNOWN_PROVIDER",
            FlowError::InvalidSettings(_) => "INVALID_SETTINGS",
            FlowError::Unsupported(_) => "UNSUPPORTED",
            FlowError::NoActiveRun => "NO_ACTIVE_RUN",
            FlowError::Profile(_) => "PROFILE",
            FlowError::Adapter(_) => "ADAPTER",
            FlowError::Action(err) => err.code(),
            FlowError::Extract(err) => err.code(),
            FlowError::Bridge(err) => err.code(),
        }
    }

    /// Innermost error, looking through phase wrappers
    pub fn root_cause(&self) -> &FlowError {
        match self {
            FlowError::PhaseFailure { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn is_login_required(&self) -> bool {
        matches!(self.root_cause(), FlowError::LoginRequired(_))
    }

    pub fn phase(&self) -> Option<Phase> {
        match self {
            FlowError::PhaseFailure { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Machine-readable bundle attached to the outward failure signal
    pub fn diagnostics(&self) -> Value {
        match self {
            FlowError::PhaseFailure {
                phase,
                elapsed_ms,
                liveness,
                source,
            } => json!({
                "phase": phase,
                "elapsed_ms": elapsed_ms,
                "liveness": liveness,
                "cause_code": source.code(),
                "cause": source.diagnostics(),
            }),
            FlowError::Action(err) => err.diagnostics(),
            FlowError::Extract(err) => err.diagnostics(),
            other => json!({ "message": other.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrapped(cause: FlowError) -> FlowError {
        FlowError::PhaseFailure {
            phase: Phase::ApplySettings,
            elapsed_ms: 42,
            liveness: LivenessSnapshot {
                url: Some("https://chat.example/".into()),
                ready_state: Some("complete".into()),
                node_count: 17,
            },
            source: Box::new(cause),
        }
    }

    #[test]
    fn phase_failure_code_and_diagnostics() {
        let err = wrapped(FlowError::Adapter("model picker missing".into()));
        assert_eq!(err.code(), "APPLY_SETTINGS_FAILED");
        assert_eq!(err.phase(), Some(Phase::ApplySettings));

        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics["phase"], "apply_settings");
        assert_eq!(diagnostics["elapsed_ms"], 42);
        assert_eq!(diagnostics["liveness"]["node_count"], 17);
        assert_eq!(diagnostics["cause_code"], "ADAPTER");
    }

    #[test]
    fn adapter_domain_errors_are_not_retryable() {
        assert!(!FlowError::Adapter("nope".into()).is_retryable());
        assert!(FlowError::Action(ActionError::Timeout {
            operation: "finalization".into(),
            elapsed_ms: 10,
            evidence: None,
        })
        .is_retryable());
    }

    #[test]
    fn login_required_is_found_through_wrapper() {
        let err = wrapped(FlowError::LoginRequired("sign-in button".into()));
        assert!(err.is_login_required());
        assert!(!wrapped(FlowError::NoActiveRun).is_login_required());
    }
}
