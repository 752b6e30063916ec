//! Five-point actionability check
//!
//! attached -> visible -> stable -> enabled -> unoccluded, cheapest first.
//! The first failing check stops evaluation for the cycle.

use crate::{dom::DomPort, errors::ActionError, types::NodeProbe};
use promptrelay_core_types::{NodeRef, RunContext};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::trace;

pub const DEFAULT_SETTLE_BUDGET: Duration = Duration::from_millis(300);
pub const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionabilityCheck {
    Attached,
    Visible,
    Stable,
    Enabled,
    Unoccluded,
}

impl ActionabilityCheck {
    pub fn name(&self) -> &'static str {
        match self {
            ActionabilityCheck::Attached => "attached",
            ActionabilityCheck::Visible => "visible",
            ActionabilityCheck::Stable => "stable",
            ActionabilityCheck::Enabled => "enabled",
            ActionabilityCheck::Unoccluded => "unoccluded",
        }
    }
}

impl fmt::Display for ActionabilityCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one actionability pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionabilityVerdict {
    pub attached: bool,
    pub visible: bool,
    pub stable: bool,
    pub enabled: bool,
    pub unoccluded: bool,
    /// First check that failed; later checks were not evaluated
    pub failed: Option<ActionabilityCheck>,
    pub detail: Option<String>,
}

impl ActionabilityVerdict {
    pub fn is_actionable(&self) -> bool {
        self.attached && self.visible && self.stable && self.enabled && self.unoccluded
    }

    pub fn failed_checks(&self) -> Vec<String> {
        self.failed
            .iter()
            .map(|check| check.name().to_string())
            .collect()
    }

    fn fail(mut self, check: ActionabilityCheck, detail: impl Into<String>) -> Self {
        self.failed = Some(check);
        self.detail = Some(detail.into());
        self
    }
}

fn visibility_failure(probe: &NodeProbe) -> Option<&'static str> {
    if probe.display_none {
        Some("display:none")
    } else if probe.visibility_hidden {
        Some("visibility:hidden")
    } else if probe.opacity <= 0.0 {
        Some("opacity:0")
    } else if probe.check_visibility == Some(false) {
        Some("visibility probe failed")
    } else if probe.rect.is_empty() {
        Some("zero-size")
    } else {
        None
    }
}

fn enabled_failure(probe: &NodeProbe) -> Option<&'static str> {
    if probe.disabled {
        Some("disabled")
    } else if probe.aria_disabled {
        Some("aria-disabled")
    } else if probe.inert {
        Some("inert")
    } else if probe.inert_ancestor {
        Some("inert ancestor")
    } else {
        None
    }
}

/// Runs the five checks against the live document
#[derive(Clone)]
pub struct ActionabilityChecker {
    dom: Arc<dyn DomPort>,
    settle_budget: Duration,
    frame: Duration,
}

impl ActionabilityChecker {
    pub fn new(dom: Arc<dyn DomPort>) -> Self {
        Self {
            dom,
            settle_budget: DEFAULT_SETTLE_BUDGET,
            frame: FRAME_INTERVAL,
        }
    }

    pub async fn check(
        &self,
        ctx: &RunContext,
        node: NodeRef,
    ) -> Result<ActionabilityVerdict, ActionError> {
        let verdict = ActionabilityVerdict::default();

        let probe = match self.dom.probe(node).await {
            Ok(probe) => probe,
            Err(ActionError::UnknownNode(_)) => {
                return Ok(verdict.fail(ActionabilityCheck::Attached, "detached"))
            }
            Err(err) => return Err(err),
        };
        if !probe.connected {
            return Ok(verdict.fail(ActionabilityCheck::Attached, "detached"));
        }
        let verdict = ActionabilityVerdict {
            attached: true,
            ..verdict
        };

        if let Some(reason) = visibility_failure(&probe) {
            return Ok(verdict.fail(ActionabilityCheck::Visible, reason));
        }
        let verdict = ActionabilityVerdict {
            visible: true,
            ..verdict
        };

        let probe = match self.settle(ctx, node, probe).await? {
            Ok(probe) => probe,
            Err(reason) => return Ok(verdict.fail(ActionabilityCheck::Stable, reason)),
        };
        let verdict = ActionabilityVerdict {
            stable: true,
            ..verdict
        };

        if let Some(reason) = enabled_failure(&probe) {
            return Ok(verdict.fail(ActionabilityCheck::Enabled, reason));
        }
        let verdict = ActionabilityVerdict {
            enabled: true,
            ..verdict
        };

        let center = probe.rect.center();
        let occluded_by = match self.dom.hit_test(center).await? {
            None => Some("no hit target at center".to_string()),
            Some(top) if top == node => None,
            Some(top) => {
                if self.dom.contains(node, top).await? {
                    None
                } else {
                    Some(format!("occluded by node {}", top.0))
                }
            }
        };
        if let Some(reason) = occluded_by {
            return Ok(verdict.fail(ActionabilityCheck::Unoccluded, reason));
        }

        Ok(ActionabilityVerdict {
            unoccluded: true,
            ..verdict
        })
    }

    /// Wait for transitions to settle. The outer `Result` carries port
    /// errors, the inner one the unstable reason.
    async fn settle(
        &self,
        ctx: &RunContext,
        node: NodeRef,
        first: NodeProbe,
    ) -> Result<Result<NodeProbe, String>, ActionError> {
        if !first.animating {
            return Ok(Ok(first));
        }

        let deadline = Instant::now() + ctx.scaled(self.settle_budget);
        let mut previous = first;
        loop {
            if Instant::now() + self.frame > deadline {
                return Ok(Err("animating".to_string()));
            }
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return Err(ActionError::Interrupted("run cancelled while settling".to_string()));
                }
                _ = sleep(self.frame) => {}
            }
            let current = self.dom.probe(node).await?;
            if !current.connected {
                return Ok(Err("detached while settling".to_string()));
            }
            if !current.animating && current.rect == previous.rect {
                trace!(%node, "element settled");
                return Ok(Ok(current));
            }
            previous = current;
        }
    }
}
