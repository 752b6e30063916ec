//! Core data types shared by the document port and its consumers

use promptrelay_core_types::{NodeRef, Point, Rect};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Root of a query or of a change subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scope {
    /// The whole live document
    Document,

    /// Descendants of one node
    Subtree(NodeRef),
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Document
    }
}

impl Scope {
    /// Whether a mutation record touches this scope.
    pub fn covers(&self, mutation: &DomMutation) -> bool {
        match self {
            Scope::Document => true,
            Scope::Subtree(root) => mutation.lineage.contains(root),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Document => f.write_str("document"),
            Scope::Subtree(node) => write!(f, "subtree({})", node),
        }
    }
}

/// Everything the actionability checker needs to know about one node,
/// captured in a single round trip to the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeProbe {
    /// Lower-cased tag name
    pub tag: String,

    /// Node is connected to the live document
    pub connected: bool,

    /// Layout box; empty when the node is not rendered
    pub rect: Rect,

    /// `display: none` on the node or an ancestor
    pub display_none: bool,

    /// Computed `visibility: hidden`
    pub visibility_hidden: bool,

    /// Computed opacity
    pub opacity: f64,

    /// Result of the host visibility capability probe, when the host has one
    pub check_visibility: Option<bool>,

    /// A visual transition or animation is currently running on the node
    pub animating: bool,

    /// `disabled` attribute present
    pub disabled: bool,

    /// `aria-disabled="true"`
    pub aria_disabled: bool,

    /// `inert` attribute on the node itself
    pub inert: bool,

    /// `inert` attribute on some ancestor
    pub inert_ancestor: bool,
}

/// Synthetic input dispatched at a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyntheticEvent {
    PointerDown { point: Point },
    PointerUp { point: Point },
    MouseDown { point: Point },
    MouseUp { point: Point },
    Click { point: Point },
    Focus,
    Input { data: String },
    KeyDown { key: String },
    KeyUp { key: String },
}

impl SyntheticEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SyntheticEvent::PointerDown { .. } => "pointerdown",
            SyntheticEvent::PointerUp { .. } => "pointerup",
            SyntheticEvent::MouseDown { .. } => "mousedown",
            SyntheticEvent::MouseUp { .. } => "mouseup",
            SyntheticEvent::Click { .. } => "click",
            SyntheticEvent::Focus => "focus",
            SyntheticEvent::Input { .. } => "input",
            SyntheticEvent::KeyDown { .. } => "keydown",
            SyntheticEvent::KeyUp { .. } => "keyup",
        }
    }
}

/// Kind of structural or attribute change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    ChildList,
    Attribute(String),
    CharacterData,
    Layout,
}

/// One observed change in the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomMutation {
    /// Node the change happened on
    pub target: NodeRef,

    /// What changed
    pub kind: MutationKind,

    /// `target` followed by its ancestors at the time of the change
    pub lineage: Vec<NodeRef>,
}

/// Diagnostic bundle attached to every failed wait.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaitDiagnostics {
    /// Human-readable target name
    pub target: String,

    /// Every locator that was tried, in priority order
    pub locators: Vec<String>,

    /// Scope the locators were evaluated against
    pub scope: String,

    /// Time spent waiting
    pub elapsed_ms: u64,

    /// First locator that matched an element, if any
    pub matched_locator: Option<String>,

    /// Checks the matched element failed on the final pass
    pub failed_checks: Vec<String>,

    /// Free-form reason from the final pass
    pub detail: Option<String>,

    /// Whole waits made, retries included
    #[serde(default)]
    pub attempts: u32,
}

impl fmt::Display for WaitDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' after {}ms in {} (tried: {})",
            self.target,
            self.elapsed_ms,
            self.scope,
            self.locators.join(", ")
        )?;
        if let Some(matched) = &self.matched_locator {
            write!(f, "; matched '{}'", matched)?;
        }
        if !self.failed_checks.is_empty() {
            write!(f, "; failed checks: {}", self.failed_checks.join(", "))?;
        }
        if let Some(detail) = &self.detail {
            write!(f, " ({})", detail)?;
        }
        if self.attempts > 1 {
            write!(f, " after {} attempts", self.attempts)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_scope_filters_by_lineage() {
        let mutation = DomMutation {
            target: NodeRef(7),
            kind: MutationKind::ChildList,
            lineage: vec![NodeRef(7), NodeRef(3), NodeRef(1)],
        };
        assert!(Scope::Document.covers(&mutation));
        assert!(Scope::Subtree(NodeRef(3)).covers(&mutation));
        assert!(!Scope::Subtree(NodeRef(4)).covers(&mutation));
    }

    #[test]
    fn diagnostics_display_names_locators_and_checks() {
        let diagnostics = WaitDiagnostics {
            target: "send button".to_string(),
            locators: vec!["#send".to_string(), "button.send".to_string()],
            scope: "document".to_string(),
            elapsed_ms: 1200,
            matched_locator: Some("#send".to_string()),
            failed_checks: vec!["enabled".to_string()],
            detail: Some("disabled".to_string()),
            attempts: 3,
        };
        let rendered = diagnostics.to_string();
        assert!(rendered.contains("#send, button.send"));
        assert!(rendered.contains("failed checks: enabled"));
        assert!(rendered.contains("(disabled) after 3 attempts"));
    }
}
