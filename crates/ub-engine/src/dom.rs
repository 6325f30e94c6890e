//! Arena document model with mutation observation
//!
//! Nodes live in an arena indexed by [`NodeId`]; removal detaches a subtree
//! but never frees its slot, so stale ids degrade to no-ops instead of
//! panics - the engine must survive a tree that changes under it.
//!
//! Observers receive the ids of subtree roots added under an attached
//! parent, the shape a browser MutationObserver delivers. The document also
//! keeps a monotonic mutation counter; tests assert idempotence as zero
//! counter movement.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Index of a node in the document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Identifies a registered observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserverId(u32);

#[derive(Debug)]
struct NodeData {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Inline display override; `None` means the stylesheet default.
    display: Option<String>,
    attached: bool,
}

/// Handle a reconciler holds onto its observer registration.
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    id: ObserverId,
    buffer: Rc<RefCell<Vec<NodeId>>>,
}

impl ObserverHandle {
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Drain the ids of subtree roots added since the last call.
    pub fn take_added(&self) -> Vec<NodeId> {
        std::mem::take(&mut *self.buffer.borrow_mut())
    }
}

// =============================================================================
// Document
// =============================================================================

/// A live node tree mutated by the host and observed by the engine.
#[derive(Debug)]
pub struct Document {
    nodes: Vec<NodeData>,
    observers: Vec<(ObserverId, Rc<RefCell<Vec<NodeId>>>)>,
    next_observer: u32,
    mutations: u64,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// A new document with an attached root.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            observers: Vec::new(),
            next_observer: 0,
            mutations: 0,
        };
        let root = doc.alloc("document");
        doc.nodes[root.0 as usize].attached = true;
        doc
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Create a detached element.
    pub fn create(&mut self, tag: &str) -> NodeId {
        self.alloc(tag)
    }

    fn alloc(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            text: String::new(),
            parent: None,
            children: Vec::new(),
            display: None,
            attached: false,
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0 as usize)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        self.nodes.get_mut(id.0 as usize)
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    pub fn tag(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |n| n.tag.as_str())
    }

    pub fn text(&self, id: NodeId) -> &str {
        self.node(id).map_or("", |n| n.text.as_str())
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.node(id)?.attrs.get(name).map(String::as_str)
    }

    pub fn display(&self, id: NodeId) -> Option<&str> {
        self.node(id)?.display.as_deref()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.node(id).map_or(&[], |n| n.children.as_slice())
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.attached)
    }

    /// Preorder walk of `id` and everything below it.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if self.node(current).is_none() {
                continue;
            }
            out.push(current);
            for &child in self.children(current).iter().rev() {
                stack.push(child);
            }
        }
        out
    }

    /// Total structural, attribute, text, and style writes so far.
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    // -------------------------------------------------------------------------
    // Writes
    // -------------------------------------------------------------------------

    pub fn set_text(&mut self, id: NodeId, text: &str) {
        if let Some(node) = self.node_mut(id) {
            if node.text != text {
                node.text = text.to_string();
                self.mutations += 1;
            }
        }
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        if let Some(node) = self.node_mut(id) {
            if node.attrs.get(name).map(String::as_str) != Some(value) {
                node.attrs.insert(name.to_string(), value.to_string());
                self.mutations += 1;
            }
        }
    }

    /// Write the inline display override. Writing the current value is not
    /// a mutation.
    pub fn set_display(&mut self, id: NodeId, display: Option<&str>) {
        if let Some(node) = self.node_mut(id) {
            let next = display.map(String::from);
            if node.display != next {
                node.display = next;
                self.mutations += 1;
            }
        }
    }

    /// Append `child` under `parent`, moving it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    /// Insert `child` under `parent` before `reference`; append if the
    /// reference is absent or not a child of `parent`.
    pub fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if self.node(parent).is_none() || self.node(child).is_none() || parent == child {
            return;
        }

        self.detach_from_parent(child);

        let position = reference
            .and_then(|r| self.children(parent).iter().position(|&c| c == r))
            .unwrap_or(self.children(parent).len());

        if let Some(node) = self.node_mut(parent) {
            node.children.insert(position, child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent = Some(parent);
        }
        self.mutations += 1;

        let parent_attached = self.is_attached(parent);
        self.propagate_attached(child, parent_attached);
        if parent_attached {
            self.deliver_added(child);
        }
    }

    /// Detach `id` (and its subtree) from the document.
    pub fn remove(&mut self, id: NodeId) {
        if self.node(id).is_none() {
            return;
        }
        let was_attached = self.is_attached(id);
        let had_parent = self.parent(id).is_some();
        self.detach_from_parent(id);
        self.propagate_attached(id, false);
        if was_attached || had_parent {
            self.mutations += 1;
        }
    }

    fn detach_from_parent(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(node) = self.node_mut(parent) {
            node.children.retain(|&c| c != id);
        }
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
    }

    fn propagate_attached(&mut self, id: NodeId, attached: bool) {
        for node_id in self.descendants(id) {
            if let Some(node) = self.node_mut(node_id) {
                node.attached = attached;
            }
        }
    }

    // -------------------------------------------------------------------------
    // Observation
    // -------------------------------------------------------------------------

    /// Register an observer for subtree roots added under an attached
    /// parent.
    pub fn observe(&mut self) -> ObserverHandle {
        let id = ObserverId(self.next_observer);
        self.next_observer += 1;
        let buffer = Rc::new(RefCell::new(Vec::new()));
        self.observers.push((id, buffer.clone()));
        ObserverHandle { id, buffer }
    }

    /// Stop delivery to an observer. Unknown ids are ignored.
    pub fn disconnect(&mut self, id: ObserverId) {
        self.observers.retain(|(observer, _)| *observer != id);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    fn deliver_added(&mut self, id: NodeId) {
        for (_, buffer) in &self.observers {
            buffer.borrow_mut().push(id);
        }
    }
}
