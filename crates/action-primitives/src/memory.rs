//! In-memory live document
//!
//! A mutable element tree that implements [`DomPort`]. Layout is explicit
//! (every element carries its own rect and a handful of computed-style flags),
//! which is enough to exercise the actionability checks deterministically.
//! Mutations are broadcast the way a mutation observer would report them, and
//! event reactions let tests and fixtures script how the page responds to
//! input.

use crate::{
    dom::DomPort,
    errors::ActionError,
    selector::{SelectorList, SelectorTarget},
    types::{DomMutation, MutationKind, NodeProbe, Scope, SyntheticEvent},
};
use async_trait::async_trait;
use parking_lot::RwLock;
use promptrelay_core_types::{LivenessSnapshot, NodeRef, Point, Rect};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::trace;

const MUTATION_CAPACITY: usize = 512;
const VIEWPORT: Rect = Rect {
    x: 0.0,
    y: 0.0,
    width: 1280.0,
    height: 800.0,
};

/// Computed-style subset relevant to actionability
#[derive(Debug, Clone, PartialEq)]
pub struct NodeStyle {
    pub display_none: bool,
    pub visibility_hidden: bool,
    pub opacity: f64,
    pub animating: bool,
    pub z_index: i32,
    pub pointer_events_none: bool,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            display_none: false,
            visibility_hidden: false,
            opacity: 1.0,
            animating: false,
            z_index: 0,
            pointer_events_none: false,
        }
    }
}

/// Declarative description of an element to insert
#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub rect: Rect,
    pub style: NodeStyle,
}

impl ElementSpec {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            rect: Rect::new(0.0, 0.0, 100.0, 30.0),
            style: NodeStyle::default(),
        }
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    pub fn class(mut self, class: impl Into<String>) -> Self {
        let class = class.into();
        let merged = match self.attrs.remove("class") {
            Some(existing) => format!("{} {}", existing, class),
            None => class,
        };
        self.attrs.insert("class".to_string(), merged);
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = Rect::new(x, y, width, height);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.style.display_none = true;
        self
    }

    pub fn z_index(mut self, z_index: i32) -> Self {
        self.style.z_index = z_index;
        self
    }

    pub fn style(mut self, style: NodeStyle) -> Self {
        self.style = style;
        self
    }
}

/// One event received by the document, in dispatch order
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedEvent {
    pub node: NodeRef,
    pub event: SyntheticEvent,
}

type Reaction = Arc<dyn Fn(&Arc<MemoryDom>, NodeRef) + Send + Sync>;

#[derive(Debug, Clone)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    value: Option<String>,
    rect: Rect,
    style: NodeStyle,
    parent: Option<u64>,
    children: Vec<u64>,
}

impl NodeData {
    fn from_spec(spec: ElementSpec, parent: Option<u64>) -> Self {
        let value = matches!(spec.tag.as_str(), "input" | "textarea")
            .then(|| spec.attrs.get("value").cloned().unwrap_or_default());
        Self {
            tag: spec.tag,
            attrs: spec.attrs,
            text: spec.text,
            value,
            rect: spec.rect,
            style: spec.style,
            parent,
            children: Vec::new(),
        }
    }
}

struct DomState {
    nodes: HashMap<u64, NodeData>,
    root: u64,
    body: u64,
    next_id: u64,
    url: String,
    ready_state: String,
    focused: Option<u64>,
    events: Vec<DispatchedEvent>,
}

impl DomState {
    fn node(&self, node: NodeRef) -> Result<&NodeData, ActionError> {
        self.nodes
            .get(&node.0)
            .ok_or_else(|| ActionError::UnknownNode(node.to_string()))
    }

    fn node_mut(&mut self, node: NodeRef) -> Result<&mut NodeData, ActionError> {
        self.nodes
            .get_mut(&node.0)
            .ok_or_else(|| ActionError::UnknownNode(node.to_string()))
    }

    fn ancestors(&self, id: u64) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|n| n.parent);
        while let Some(parent) = current {
            chain.push(parent);
            current = self.nodes.get(&parent).and_then(|n| n.parent);
        }
        chain
    }

    fn lineage(&self, id: u64) -> Vec<NodeRef> {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .map(NodeRef)
            .collect()
    }

    fn is_connected(&self, id: u64) -> bool {
        id == self.root || self.ancestors(id).last() == Some(&self.root)
    }

    fn display_none(&self, id: u64) -> bool {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .any(|n| self.nodes.get(&n).map(|d| d.style.display_none).unwrap_or(false))
    }

    fn visibility_hidden(&self, id: u64) -> bool {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .any(|n| self.nodes.get(&n).map(|d| d.style.visibility_hidden).unwrap_or(false))
    }

    /// Opacity composes down the tree
    fn effective_opacity(&self, id: u64) -> f64 {
        std::iter::once(id)
            .chain(self.ancestors(id))
            .filter_map(|n| self.nodes.get(&n))
            .map(|d| d.style.opacity)
            .product()
    }

    /// Depth-first, document order.
    fn descendants(&self, id: u64, include_self: bool) -> Vec<u64> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if current != id || include_self {
                out.push(current);
            }
            if let Some(node) = self.nodes.get(&current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    fn text_content(&self, id: u64) -> String {
        self.descendants(id, true)
            .into_iter()
            .filter_map(|n| self.nodes.get(&n))
            .map(|n| n.text.as_str())
            .collect()
    }
}

impl SelectorTarget for DomState {
    fn tag(&self, node: NodeRef) -> Option<&str> {
        self.nodes.get(&node.0).map(|n| n.tag.as_str())
    }

    fn attr(&self, node: NodeRef, name: &str) -> Option<&str> {
        self.nodes
            .get(&node.0)
            .and_then(|n| n.attrs.get(name))
            .map(|v| v.as_str())
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.nodes.get(&node.0).and_then(|n| n.parent).map(NodeRef)
    }
}

/// In-memory implementation of [`DomPort`]
pub struct MemoryDom {
    state: RwLock<DomState>,
    sender: broadcast::Sender<DomMutation>,
    push: bool,
    reactions: RwLock<HashMap<(u64, String), Vec<Reaction>>>,
    this: Weak<MemoryDom>,
}

impl MemoryDom {
    /// Document with `<html><body>` and a mutation feed
    pub fn new() -> Arc<Self> {
        Self::build(true)
    }

    /// Document that offers no mutation feed, forcing polling
    pub fn polling_only() -> Arc<Self> {
        Self::build(false)
    }

    fn build(push: bool) -> Arc<Self> {
        let mut nodes = HashMap::new();
        let mut html = NodeData::from_spec(
            ElementSpec::new("html").rect(VIEWPORT.x, VIEWPORT.y, VIEWPORT.width, VIEWPORT.height),
            None,
        );
        let body = NodeData::from_spec(
            ElementSpec::new("body").rect(VIEWPORT.x, VIEWPORT.y, VIEWPORT.width, VIEWPORT.height),
            Some(1),
        );
        html.children.push(2);
        nodes.insert(1, html);
        nodes.insert(2, body);

        let (sender, _) = broadcast::channel(MUTATION_CAPACITY);
        Arc::new_cyclic(|this| Self {
            state: RwLock::new(DomState {
                nodes,
                root: 1,
                body: 2,
                next_id: 3,
                url: "about:blank".to_string(),
                ready_state: "complete".to_string(),
                focused: None,
                events: Vec::new(),
            }),
            sender,
            push,
            reactions: RwLock::new(HashMap::new()),
            this: this.clone(),
        })
    }

    pub fn root(&self) -> NodeRef {
        NodeRef(self.state.read().root)
    }

    pub fn body(&self) -> NodeRef {
        NodeRef(self.state.read().body)
    }

    fn emit(&self, mutation: DomMutation) {
        trace!(node = %mutation.target, kind = ?mutation.kind, "document mutation");
        // No receivers is fine: nobody is waiting.
        let _ = self.sender.send(mutation);
    }

    fn mutate<F>(&self, node: NodeRef, kind: MutationKind, apply: F) -> Result<(), ActionError>
    where
        F: FnOnce(&mut NodeData),
    {
        let lineage = {
            let mut state = self.state.write();
            apply(state.node_mut(node)?);
            state.lineage(node.0)
        };
        self.emit(DomMutation {
            target: node,
            kind,
            lineage,
        });
        Ok(())
    }

    /// Append a new element as the last child of `parent`
    pub fn append(&self, parent: NodeRef, spec: ElementSpec) -> Result<NodeRef, ActionError> {
        let (id, lineage) = {
            let mut state = self.state.write();
            state.node(parent)?;
            let id = state.next_id;
            state.next_id += 1;
            state
                .nodes
                .insert(id, NodeData::from_spec(spec, Some(parent.0)));
            state.node_mut(parent)?.children.push(id);
            (id, state.lineage(id))
        };
        self.emit(DomMutation {
            target: parent,
            kind: MutationKind::ChildList,
            lineage,
        });
        Ok(NodeRef(id))
    }

    /// Detach `node` (and its subtree) from the document
    pub fn remove(&self, node: NodeRef) -> Result<(), ActionError> {
        let (parent, lineage) = {
            let mut state = self.state.write();
            let lineage = state.lineage(node.0);
            let parent = state.node_mut(node)?.parent.take();
            if let Some(parent) = parent {
                if let Some(data) = state.nodes.get_mut(&parent) {
                    data.children.retain(|child| *child != node.0);
                }
            }
            (parent, lineage)
        };
        if let Some(parent) = parent {
            self.emit(DomMutation {
                target: NodeRef(parent),
                kind: MutationKind::ChildList,
                lineage,
            });
        }
        Ok(())
    }

    pub fn set_attribute(
        &self,
        node: NodeRef,
        name: &str,
        value: impl Into<String>,
    ) -> Result<(), ActionError> {
        let name = name.to_ascii_lowercase();
        let value = value.into();
        self.mutate(node, MutationKind::Attribute(name.clone()), move |data| {
            data.attrs.insert(name, value);
        })
    }

    pub fn remove_attribute(&self, node: NodeRef, name: &str) -> Result<(), ActionError> {
        let name = name.to_ascii_lowercase();
        self.mutate(node, MutationKind::Attribute(name.clone()), move |data| {
            data.attrs.remove(&name);
        })
    }

    pub fn set_text(&self, node: NodeRef, text: impl Into<String>) -> Result<(), ActionError> {
        let text = text.into();
        self.mutate(node, MutationKind::CharacterData, move |data| {
            data.text = text;
        })
    }

    pub fn set_rect(&self, node: NodeRef, rect: Rect) -> Result<(), ActionError> {
        self.mutate(node, MutationKind::Layout, move |data| data.rect = rect)
    }

    pub fn set_style(&self, node: NodeRef, style: NodeStyle) -> Result<(), ActionError> {
        self.mutate(node, MutationKind::Attribute("style".to_string()), move |data| {
            data.style = style
        })
    }

    pub fn set_animating(&self, node: NodeRef, animating: bool) -> Result<(), ActionError> {
        self.mutate(node, MutationKind::Attribute("style".to_string()), move |data| {
            data.style.animating = animating
        })
    }

    pub fn set_display_none(&self, node: NodeRef, hidden: bool) -> Result<(), ActionError> {
        self.mutate(node, MutationKind::Attribute("style".to_string()), move |data| {
            data.style.display_none = hidden
        })
    }

    pub fn set_location(&self, url: impl Into<String>, ready_state: impl Into<String>) {
        let mut state = self.state.write();
        state.url = url.into();
        state.ready_state = ready_state.into();
    }

    /// Run `reaction` whenever `event` (e.g. `"click"`) reaches `node`,
    /// including when it bubbles up from a descendant.
    pub fn on<F>(&self, node: NodeRef, event: &str, reaction: F)
    where
        F: Fn(&Arc<MemoryDom>, NodeRef) + Send + Sync + 'static,
    {
        self.reactions
            .write()
            .entry((node.0, event.to_string()))
            .or_default()
            .push(Arc::new(reaction));
    }

    /// First match for `selector` in the whole document
    pub fn find(&self, selector: &str) -> Option<NodeRef> {
        let list = SelectorList::parse(selector).ok()?;
        let state = self.state.read();
        state
            .descendants(state.root, true)
            .into_iter()
            .map(NodeRef)
            .find(|node| list.matches(&*state, *node))
    }

    pub fn value(&self, node: NodeRef) -> Option<String> {
        self.state
            .read()
            .nodes
            .get(&node.0)
            .and_then(|data| data.value.clone().or_else(|| Some(data.text.clone())))
    }

    pub fn focused(&self) -> Option<NodeRef> {
        self.state.read().focused.map(NodeRef)
    }

    /// Names of the events dispatched at `node`, in order
    pub fn event_names(&self, node: NodeRef) -> Vec<&'static str> {
        self.state
            .read()
            .events
            .iter()
            .filter(|record| record.node == node)
            .map(|record| record.event.name())
            .collect()
    }

    fn fire_reactions(&self, node: NodeRef, event: &str) {
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let targets = self.state.read().lineage(node.0);
        let handlers: Vec<Reaction> = {
            let reactions = self.reactions.read();
            targets
                .iter()
                .filter_map(|target| reactions.get(&(target.0, event.to_string())))
                .flat_map(|list| list.iter().cloned())
                .collect()
        };
        for handler in handlers {
            handler(&this, node);
        }
    }
}

#[async_trait]
impl DomPort for MemoryDom {
    async fn query_all(&self, scope: Scope, locator: &str) -> Result<Vec<NodeRef>, ActionError> {
        let list = SelectorList::parse(locator)?;
        let state = self.state.read();
        let candidates = match scope {
            Scope::Document => state.descendants(state.root, true),
            Scope::Subtree(root) => {
                state.node(root)?;
                state.descendants(root.0, false)
            }
        };
        Ok(candidates
            .into_iter()
            .map(NodeRef)
            .filter(|node| list.matches(&*state, *node))
            .collect())
    }

    async fn probe(&self, node: NodeRef) -> Result<NodeProbe, ActionError> {
        let state = self.state.read();
        let data = state.node(node)?;
        let connected = state.is_connected(node.0);
        let display_none = state.display_none(node.0);
        let visibility_hidden = state.visibility_hidden(node.0);
        let opacity = state.effective_opacity(node.0);
        let inert_ancestor = state
            .ancestors(node.0)
            .iter()
            .any(|a| state.nodes.get(a).map(|d| d.attrs.contains_key("inert")).unwrap_or(false));
        let rendered = connected && !display_none;

        Ok(NodeProbe {
            tag: data.tag.clone(),
            connected,
            rect: if rendered { data.rect } else { Rect::default() },
            display_none,
            visibility_hidden,
            opacity,
            check_visibility: Some(rendered && !visibility_hidden && opacity > 0.0),
            animating: data.style.animating,
            disabled: data.attrs.contains_key("disabled"),
            aria_disabled: data
                .attrs
                .get("aria-disabled")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            inert: data.attrs.contains_key("inert"),
            inert_ancestor,
        })
    }

    async fn hit_test(&self, point: Point) -> Result<Option<NodeRef>, ActionError> {
        let state = self.state.read();
        let hit = state
            .descendants(state.root, true)
            .into_iter()
            .enumerate()
            .filter(|(_, id)| {
                let Some(data) = state.nodes.get(id) else {
                    return false;
                };
                !data.style.pointer_events_none
                    && !state.visibility_hidden(*id)
                    && !data.rect.is_empty()
                    && data.rect.contains(point)
                    && !state.display_none(*id)
            })
            .max_by_key(|(order, id)| {
                let z = state.nodes.get(id).map(|d| d.style.z_index).unwrap_or(0);
                (z, *order)
            })
            .map(|(_, id)| NodeRef(id));
        Ok(hit)
    }

    async fn contains(&self, ancestor: NodeRef, node: NodeRef) -> Result<bool, ActionError> {
        let state = self.state.read();
        state.node(node)?;
        Ok(node == ancestor || state.ancestors(node.0).contains(&ancestor.0))
    }

    async fn dispatch(&self, node: NodeRef, event: SyntheticEvent) -> Result<(), ActionError> {
        let name = event.name();
        {
            let mut state = self.state.write();
            state.node(node)?;
            if matches!(event, SyntheticEvent::Focus) {
                state.focused = Some(node.0);
            }
            state.events.push(DispatchedEvent { node, event });
        }
        self.fire_reactions(node, name);
        Ok(())
    }

    async fn set_value(&self, node: NodeRef, value: &str) -> Result<(), ActionError> {
        let value = value.to_string();
        let has_value = self.state.read().node(node)?.value.is_some();
        if has_value {
            self.mutate(node, MutationKind::Attribute("value".to_string()), move |data| {
                data.value = Some(value)
            })
        } else {
            self.mutate(node, MutationKind::CharacterData, move |data| {
                data.text = value
            })
        }
    }

    async fn text_content(&self, node: NodeRef) -> Result<String, ActionError> {
        let state = self.state.read();
        let data = state.node(node)?;
        if let Some(value) = &data.value {
            return Ok(value.clone());
        }
        Ok(state.text_content(node.0))
    }

    async fn attribute(&self, node: NodeRef, name: &str) -> Result<Option<String>, ActionError> {
        let state = self.state.read();
        Ok(state.node(node)?.attrs.get(&name.to_ascii_lowercase()).cloned())
    }

    async fn liveness(&self) -> Result<LivenessSnapshot, ActionError> {
        let state = self.state.read();
        let node_count = state
            .nodes
            .keys()
            .filter(|id| state.is_connected(**id))
            .count();
        Ok(LivenessSnapshot {
            url: Some(state.url.clone()),
            ready_state: Some(state.ready_state.clone()),
            node_count,
        })
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<DomMutation>> {
        self.push.then(|| self.sender.subscribe())
    }
}
