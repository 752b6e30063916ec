//! The seam between the engine and the live document

use crate::{
    errors::ActionError,
    types::{DomMutation, NodeProbe, Scope, SyntheticEvent},
};
use async_trait::async_trait;
use promptrelay_core_types::{LivenessSnapshot, NodeRef, Point};
use tokio::sync::broadcast;

/// Live document port
///
/// Everything the engine knows about the page goes through this trait. A
/// browser-backed implementation evaluates against the real document; the
/// in-tree [`MemoryDom`](crate::MemoryDom) serves tests and fixture runs.
#[async_trait]
pub trait DomPort: Send + Sync {
    /// All nodes under `scope` matching `locator`, in document order
    async fn query_all(&self, scope: Scope, locator: &str) -> Result<Vec<NodeRef>, ActionError>;

    /// Snapshot of the node's actionability-relevant state
    async fn probe(&self, node: NodeRef) -> Result<NodeProbe, ActionError>;

    /// Top-most hit-test target at a viewport point
    async fn hit_test(&self, point: Point) -> Result<Option<NodeRef>, ActionError>;

    /// Whether `node` is `ancestor` or one of its descendants
    async fn contains(&self, ancestor: NodeRef, node: NodeRef) -> Result<bool, ActionError>;

    /// Dispatch one synthetic event at `node`
    async fn dispatch(&self, node: NodeRef, event: SyntheticEvent) -> Result<(), ActionError>;

    /// Replace the editable value (or text) of `node`
    async fn set_value(&self, node: NodeRef, value: &str) -> Result<(), ActionError>;

    /// Rendered text of `node` and its descendants
    async fn text_content(&self, node: NodeRef) -> Result<String, ActionError>;

    /// Attribute value, `None` when absent
    async fn attribute(&self, node: NodeRef, name: &str) -> Result<Option<String>, ActionError>;

    /// Navigation target, load state and live-node count
    async fn liveness(&self) -> Result<LivenessSnapshot, ActionError>;

    /// Push-style change feed; `None` when only polling is possible
    fn subscribe(&self) -> Option<broadcast::Receiver<DomMutation>>;
}
