//! Direct read first, clipboard protocol second

use crate::{
    clipboard::{ClipboardExtractor, ClipboardSettings},
    errors::ExtractError,
    sanitize::sanitize_response,
};
use action_locator::{ElementResolver, LocatorSet, WaitRequest};
use action_primitives::{ActionError, DomPort, Scope};
use extensions_bridge::HostBridge;
use promptrelay_core_types::RunContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where the response lives and how to copy it
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionPlan {
    /// Rendered response containers; the last match of the first hit wins
    pub response: LocatorSet,
    /// Native copy affordance
    pub copy: LocatorSet,
    pub scope: Scope,
    pub copy_timeout: Duration,
}

impl ExtractionPlan {
    pub fn new(response: LocatorSet, copy: LocatorSet) -> Self {
        Self {
            response,
            copy,
            scope: Scope::Document,
            copy_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    Direct,
    Clipboard,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub text: String,
    pub method: ExtractionMethod,
}

pub struct ResponseExtractor {
    dom: Arc<dyn DomPort>,
    clipboard: ClipboardExtractor,
}

impl ResponseExtractor {
    pub fn new(
        dom: Arc<dyn DomPort>,
        resolver: Arc<dyn ElementResolver>,
        settings: ClipboardSettings,
    ) -> Self {
        Self {
            clipboard: ClipboardExtractor::new(dom.clone(), resolver, settings),
            dom,
        }
    }

    pub async fn extract(
        &self,
        ctx: &RunContext,
        plan: &ExtractionPlan,
        host: &dyn HostBridge,
    ) -> Result<Extraction, ExtractError> {
        match self.read_direct(plan).await {
            Ok(Some(text)) => {
                info!(run_id = %ctx.run_id, len = text.len(), "response read directly");
                return Ok(Extraction {
                    text,
                    method: ExtractionMethod::Direct,
                });
            }
            Ok(None) => debug!(run_id = %ctx.run_id, "direct read empty, trying clipboard"),
            Err(err) => warn!(run_id = %ctx.run_id, error = %err, "direct read failed, trying clipboard"),
        }

        let request = WaitRequest::new("copy affordance", plan.copy.clone())
            .within(plan.scope)
            .timeout(plan.copy_timeout);
        let copied = self
            .clipboard
            .extract(ctx, host.clipboard(), &request)
            .await?;
        let text = sanitize_response(&copied.content);
        if text.is_empty() {
            return Err(ExtractError::ExtractionFailed {
                attempts: copied.polls,
                reason: "clipboard content was empty after sanitising".to_string(),
                snapshot: copied.content.chars().take(200).collect(),
            });
        }
        Ok(Extraction {
            text,
            method: ExtractionMethod::Clipboard,
        })
    }

    async fn read_direct(&self, plan: &ExtractionPlan) -> Result<Option<String>, ActionError> {
        for locator in plan.response.iter() {
            let nodes = self.dom.query_all(plan.scope, locator).await?;
            let Some(last) = nodes.last() else {
                continue;
            };
            let text = sanitize_response(&self.dom.text_content(*last).await?);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
        Ok(None)
    }
}
