//! Clipboard round-trip extraction
//!
//! 1. write a fresh token, 2. activate the page's copy affordance with a full
//! pointer gesture, 3. poll the clipboard until it holds something other than
//! the token.

use crate::{errors::ExtractError, token::ExtractionToken};
use action_locator::{ElementResolver, WaitRequest};
use action_primitives::{pointer_click, DomPort};
use extensions_bridge::Clipboard;
use promptrelay_core_types::RunContext;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipboardSettings {
    pub poll_interval_ms: u64,
    pub max_polls: u32,
    /// Characters of the final clipboard content kept in diagnostics
    pub snapshot_chars: usize,
}

impl Default for ClipboardSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            max_polls: 20,
            snapshot_chars: 200,
        }
    }
}

/// Clipboard content that replaced the token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedText {
    pub content: String,
    /// Polls it took to see the change
    pub polls: u32,
}

pub struct ClipboardExtractor {
    dom: Arc<dyn DomPort>,
    resolver: Arc<dyn ElementResolver>,
    settings: ClipboardSettings,
}

impl ClipboardExtractor {
    pub fn new(
        dom: Arc<dyn DomPort>,
        resolver: Arc<dyn ElementResolver>,
        settings: ClipboardSettings,
    ) -> Self {
        Self {
            dom,
            resolver,
            settings,
        }
    }

    pub async fn extract(
        &self,
        ctx: &RunContext,
        clipboard: Option<Arc<dyn Clipboard>>,
        copy_affordance: &WaitRequest,
    ) -> Result<CopiedText, ExtractError> {
        let clipboard = clipboard.ok_or(ExtractError::ClipboardUnavailable)?;

        let token = ExtractionToken::generate();
        clipboard
            .write_text(token.as_str())
            .await
            .map_err(|err| ExtractError::ClipboardWrite(err.to_string()))?;
        let witness = token.into_witness();

        let copy = self.resolver.resolve(ctx, copy_affordance).await?;
        pointer_click(self.dom.as_ref(), copy.node).await?;
        debug!(run_id = %ctx.run_id, node = %copy.node, "copy affordance activated");

        let interval = Duration::from_millis(self.settings.poll_interval_ms);
        let mut last = String::new();
        for attempt in 1..=self.settings.max_polls {
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return Err(ExtractError::Action(action_primitives::ActionError::Interrupted(
                        "run cancelled during clipboard polling".to_string(),
                    )));
                }
                _ = sleep(interval) => {}
            }
            match clipboard.read_text().await {
                Ok(content) if witness.accepts(&content) => {
                    info!(run_id = %ctx.run_id, attempt, len = content.len(), "clipboard extraction succeeded");
                    return Ok(CopiedText {
                        content,
                        polls: attempt,
                    });
                }
                Ok(content) => last = content,
                Err(err) if err.is_retryable() => {
                    debug!(attempt, error = %err, "clipboard read failed, polling again");
                }
                Err(err) => return Err(err.into()),
            }
        }

        let snapshot: String = last.chars().take(self.settings.snapshot_chars).collect();
        warn!(
            run_id = %ctx.run_id,
            attempts = self.settings.max_polls,
            "clipboard never changed from the verification token"
        );
        Err(ExtractError::ExtractionFailed {
            attempts: self.settings.max_polls,
            reason: "clipboard content never replaced the verification token".to_string(),
            snapshot,
        })
    }
}
