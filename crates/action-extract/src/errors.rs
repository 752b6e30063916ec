//! Error types for response extraction

use action_primitives::ActionError;
use extensions_bridge::BridgeError;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ExtractError {
    /// Host offers no clipboard capability
    #[error("Clipboard unavailable")]
    ClipboardUnavailable,

    /// Writing the verification token failed; never retried
    #[error("Clipboard write failed: {0}")]
    ClipboardWrite(String),

    /// Both direct read and clipboard protocol came up empty
    #[error("Extraction failed after {attempts} clipboard poll(s): {reason}")]
    ExtractionFailed {
        attempts: u32,
        reason: String,
        /// Truncated final clipboard content
        snapshot: String,
    },

    /// Resolving or clicking the copy affordance failed
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ExtractError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ExtractError::Action(err) => err.is_retryable(),
            ExtractError::Bridge(err) => err.is_retryable(),
            _ => false,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ExtractError::ClipboardUnavailable => "CLIPBOARD_UNAVAILABLE",
            ExtractError::ClipboardWrite(_) => "CLIPBOARD_WRITE",
            ExtractError::ExtractionFailed { .. } => "EXTRACTION_FAILED",
            ExtractError::Action(err) => err.code(),
            ExtractError::Bridge(err) => err.code(),
        }
    }

    pub fn diagnostics(&self) -> Value {
        match self {
            ExtractError::ExtractionFailed {
                attempts,
                reason,
                snapshot,
            } => json!({
                "attempts": attempts,
                "reason": reason,
                "clipboard_snapshot": snapshot,
            }),
            ExtractError::Action(err) => err.diagnostics(),
            other => json!({ "message": other.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipboard_failures_are_terminal() {
        assert!(!ExtractError::ClipboardUnavailable.is_retryable());
        assert!(!ExtractError::ClipboardWrite("denied".into()).is_retryable());
        assert_eq!(ExtractError::ClipboardUnavailable.code(), "CLIPBOARD_UNAVAILABLE");
    }

    #[test]
    fn extraction_failure_carries_snapshot() {
        let err = ExtractError::ExtractionFailed {
            attempts: 20,
            reason: "clipboard still holds the token".into(),
            snapshot: "__promptrelay_token_abc".into(),
        };
        let diagnostics = err.diagnostics();
        assert_eq!(diagnostics["attempts"], 20);
        assert_eq!(diagnostics["clipboard_snapshot"], "__promptrelay_token_abc");
    }
}
