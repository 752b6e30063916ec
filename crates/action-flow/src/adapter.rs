//! Provider adapter contract

use crate::{context::AdapterContext, errors::FlowError, types::RunSettings};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Optional adapter operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ResetState,
    ApplyAllSettings,
    SetSystemPrompt,
}

/// Per-site automation contract
///
/// `wait_for_ready`, `send_prompt` and `extract_response` are required. The
/// optional operations are only invoked when listed in
/// [`ProviderAdapter::capabilities`]; their default bodies report
/// [`FlowError::Unsupported`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn capabilities(&self) -> &[Capability] {
        &[]
    }

    fn supports(&self, capability: Capability) -> bool {
        self.capabilities().contains(&capability)
    }

    async fn reset_state(&self, _ctx: &AdapterContext) -> Result<(), FlowError> {
        Err(FlowError::Unsupported(Capability::ResetState))
    }

    async fn wait_for_ready(&self, ctx: &AdapterContext) -> Result<(), FlowError>;

    async fn apply_all_settings(
        &self,
        _ctx: &AdapterContext,
        _settings: &RunSettings,
    ) -> Result<(), FlowError> {
        Err(FlowError::Unsupported(Capability::ApplyAllSettings))
    }

    async fn set_system_prompt(&self, _ctx: &AdapterContext, _text: &str) -> Result<(), FlowError> {
        Err(FlowError::Unsupported(Capability::SetSystemPrompt))
    }

    /// Submit `prompt`; returns only once the response is finalized.
    async fn send_prompt(&self, ctx: &AdapterContext, prompt: &str) -> Result<(), FlowError>;

    async fn extract_response(&self, ctx: &AdapterContext) -> Result<String, FlowError>;
}
