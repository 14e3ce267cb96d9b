//! Arena-based DOM tree storage
//!
//! Every node of a context lives in one `Vec` of slots and links to its
//! relatives by `NodeId`. This removes:
//! - Rc/Weak cycles between parents and children
//! - per-node allocations for the link structure
//! - any way for two trees to share a node
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<Slot>                       free: [2, ...]
//!        [Document][Node1][ vacant ][Node3]...
//!         ↑ slot 0 is always the document root
//! ```
//!
//! Detached nodes stay in their slot as parentless roots until re-inserted
//! or released. Releasing a slot bumps its generation, so stale `NodeId`s
//! resolve to nothing rather than to whatever reuses the slot.

use ahash::AHashSet;
use markup_tokenizer::RawNode;
use smallvec::SmallVec;

use crate::error::{DomError, Result};
use crate::types::{Attributes, DomNode, ElementData, NodeData, NodeId};

/// Position of a node: its tree root, then child indices from that root.
type OrderKey = (NodeId, SmallVec<[u32; 16]>);

/// Pre-order copy of a subtree: parent slot within the copy, plus payload.
type Snapshot = Vec<(Option<usize>, NodeData)>;

#[derive(Debug, Clone)]
struct Slot {
    generation: u32,
    node: Option<DomNode>,
}

/// Arena allocator for DOM nodes
#[derive(Debug, Clone)]
pub struct DomArena {
    slots: Vec<Slot>,
    /// Vacant slot indices, reused before the vector grows
    free: Vec<u32>,
}

impl DomArena {
    /// Create an arena holding only the document node
    pub fn new() -> Self {
        Self::with_capacity(64)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity.max(1));
        slots.push(Slot {
            generation: 0,
            node: Some(DomNode::new(NodeId::new(0, 0), NodeData::Document)),
        });
        Self {
            slots,
            free: Vec::new(),
        }
    }

    /// The document root
    #[inline]
    pub fn document(&self) -> NodeId {
        NodeId::new(0, 0)
    }

    /// Add a parentless node, returns its ID
    pub fn add_node(&mut self, data: NodeData) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            let node_id = NodeId::new(index, slot.generation);
            slot.node = Some(DomNode::new(node_id, data));
            return node_id;
        }
        let node_id = NodeId::new(self.slots.len() as u32, 0);
        self.slots.push(Slot {
            generation: 0,
            node: Some(DomNode::new(node_id, data)),
        });
        node_id
    }

    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.add_node(NodeData::Element(ElementData::new(name)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.add_node(NodeData::Text(text.to_string()))
    }

    pub fn create_comment(&mut self, text: &str) -> NodeId {
        self.add_node(NodeData::Comment(text.to_string()))
    }

    /// Get node by ID
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.node(node_id).ok_or(DomError::NodeNotFound(node_id))
    }

    /// Total lookup: unknown and released IDs are simply absent
    #[inline]
    pub fn node(&self, node_id: NodeId) -> Option<&DomNode> {
        self.slots
            .get(node_id.index())
            .filter(|slot| slot.generation == node_id.generation())
            .and_then(|slot| slot.node.as_ref())
    }

    #[inline]
    pub fn node_mut(&mut self, node_id: NodeId) -> Option<&mut DomNode> {
        self.slots
            .get_mut(node_id.index())
            .filter(|slot| slot.generation == node_id.generation())
            .and_then(|slot| slot.node.as_mut())
    }

    #[inline]
    pub fn contains_id(&self, node_id: NodeId) -> bool {
        self.node(node_id).is_some()
    }

    /// Number of live nodes, detached ones included
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Never true: the document node is always present
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Slots allocated so far, vacant ones included
    pub fn allocated(&self) -> usize {
        self.slots.len()
    }

    /// Iterator over all live nodes
    pub fn iter(&self) -> impl Iterator<Item = &DomNode> {
        self.slots.iter().filter_map(|slot| slot.node.as_ref())
    }

    /// Children of a node, in order
    pub fn children(&self, node_id: NodeId) -> &[NodeId] {
        self.node(node_id)
            .map(|n| n.children_ids.as_slice())
            .unwrap_or(&[])
    }

    /// Element children only
    pub fn element_children(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.children(node_id)
            .iter()
            .copied()
            .filter(move |&c| self.is_element(c))
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.node(node_id).and_then(|n| n.parent_id)
    }

    pub fn prev_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        self.node(node_id).and_then(|n| n.prev_sibling)
    }

    pub fn next_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        self.node(node_id).and_then(|n| n.next_sibling)
    }

    pub fn prev_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let mut current = self.prev_sibling(node_id);
        while let Some(id) = current {
            if self.is_element(id) {
                return Some(id);
            }
            current = self.prev_sibling(id);
        }
        None
    }

    pub fn next_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let mut current = self.next_sibling(node_id);
        while let Some(id) = current {
            if self.is_element(id) {
                return Some(id);
            }
            current = self.next_sibling(id);
        }
        None
    }

    #[inline]
    pub fn is_element(&self, node_id: NodeId) -> bool {
        self.node(node_id).is_some_and(|n| n.is_element())
    }

    /// Element with the given tag, compared case-insensitively
    pub fn is_element_named(&self, node_id: NodeId, name: &str) -> bool {
        self.node(node_id).is_some_and(|n| n.is_named(name))
    }

    /// Ancestors from the parent upwards
    pub fn ancestors(&self, node_id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(node_id), move |&id| self.parent(id))
    }

    /// Topmost ancestor, or the node itself when parentless
    pub fn root_of(&self, node_id: NodeId) -> NodeId {
        self.ancestors(node_id).last().unwrap_or(node_id)
    }

    /// Position among the parent's children
    pub fn index_in_parent(&self, node_id: NodeId) -> Option<usize> {
        let parent = self.parent(node_id)?;
        self.children(parent).iter().position(|&c| c == node_id)
    }

    /// True iff `candidate` is a strict descendant of `container`.
    ///
    /// Walks upward from `candidate`, so the cost is its depth.
    pub fn contains(&self, container: NodeId, candidate: NodeId) -> bool {
        if !self.contains_id(container) {
            return false;
        }
        self.ancestors(candidate).any(|a| a == container)
    }

    /// All descendants in pre-order, excluding `node_id` itself
    pub fn descendants(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(node_id).iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        out
    }

    /// Concatenated data of every text node in the subtree
    pub fn text_content(&self, node_id: NodeId) -> String {
        let mut text = String::new();
        let mut stack = vec![node_id];
        while let Some(id) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            if let NodeData::Text(data) = &node.data {
                text.push_str(data);
            }
            stack.extend(node.children_ids.iter().rev().copied());
        }
        text
    }

    fn order_key(&self, node_id: NodeId) -> OrderKey {
        let mut path: SmallVec<[u32; 16]> = SmallVec::new();
        let mut current = node_id;
        while let Some(parent) = self.parent(current) {
            let idx = self
                .children(parent)
                .iter()
                .position(|&c| c == current)
                .unwrap_or(0);
            path.push(idx as u32);
            current = parent;
        }
        path.reverse();
        (current, path)
    }

    /// Drop unknown IDs and duplicates, then sort into document order.
    /// Nodes of separate trees order by their roots.
    pub fn sort_unique(&self, nodes: &mut Vec<NodeId>) {
        let mut seen = AHashSet::with_capacity(nodes.len());
        nodes.retain(|&id| self.contains_id(id) && seen.insert(id));
        nodes.sort_by_cached_key(|&id| self.order_key(id));
    }

    fn relink(&mut self, parent: NodeId) {
        let children = self.children(parent).to_vec();
        for (i, &child) in children.iter().enumerate() {
            if let Some(node) = self.node_mut(child) {
                node.parent_id = Some(parent);
                node.prev_sibling = i.checked_sub(1).map(|j| children[j]);
                node.next_sibling = children.get(i + 1).copied();
            }
        }
    }

    /// Link a parentless `child` after the last child of `parent`
    fn push_child(&mut self, parent: NodeId, child: NodeId) {
        let prev = self.children(parent).last().copied();
        if let Some(node) = self.node_mut(parent) {
            node.children_ids.push(child);
        }
        if let Some(node) = prev.and_then(|prev| self.node_mut(prev)) {
            node.next_sibling = Some(child);
        }
        if let Some(node) = self.node_mut(child) {
            node.parent_id = Some(parent);
            node.prev_sibling = prev;
        }
    }

    /// Unlink a node from its parent. The node keeps its own subtree.
    pub fn detach(&mut self, node_id: NodeId) {
        let Some(node) = self.node(node_id) else {
            return;
        };
        let (parent, prev, next) = (node.parent_id, node.prev_sibling, node.next_sibling);
        let Some(parent) = parent else {
            return;
        };

        if let Some(parent) = self.node_mut(parent) {
            parent.children_ids.retain(|c| *c != node_id);
        }
        if let Some(prev) = prev.and_then(|prev| self.node_mut(prev)) {
            prev.next_sibling = next;
        }
        if let Some(next) = next.and_then(|next| self.node_mut(next)) {
            next.prev_sibling = prev;
        }
        if let Some(node) = self.node_mut(node_id) {
            node.parent_id = None;
            node.prev_sibling = None;
            node.next_sibling = None;
        }
    }

    /// Detach every child of `node_id`
    pub fn clear_children(&mut self, node_id: NodeId) {
        for child in self.children(node_id).to_vec() {
            self.detach(child);
        }
    }

    /// Move `nodes` under `parent`, starting at child position `index`.
    ///
    /// Each node is detached from wherever it was first. Nodes that would
    /// close a cycle (`parent` itself or one of its ancestors), unknown IDs
    /// and repeats are skipped. Returns the number of nodes inserted.
    pub fn insert_children(&mut self, parent: NodeId, index: usize, nodes: &[NodeId]) -> usize {
        if !self.node(parent).is_some_and(|p| p.is_container()) {
            return 0;
        }

        let mut accepted: SmallVec<[NodeId; 8]> = SmallVec::new();
        for &id in nodes {
            if !self.contains_id(id) || accepted.contains(&id) {
                continue;
            }
            if id == parent || self.contains(id, parent) {
                tracing::warn!(
                    "[Arena] Refusing to insert {} under {}: it would contain itself",
                    id,
                    parent
                );
                continue;
            }
            if id == self.document() {
                continue;
            }
            accepted.push(id);
        }

        let mut index = index;
        for &id in &accepted {
            if self.parent(id) == Some(parent) {
                if let Some(pos) = self.index_in_parent(id) {
                    if pos < index {
                        index -= 1;
                    }
                }
            }
            self.detach(id);
        }

        let count = accepted.len();
        let Some(node) = self.node_mut(parent) else {
            return 0;
        };
        let index = index.min(node.children_ids.len());
        node.children_ids.insert_many(index, accepted);
        self.relink(parent);
        count
    }

    /// Append nodes as the last children of `parent`
    pub fn append_children(&mut self, parent: NodeId, nodes: &[NodeId]) -> usize {
        let len = self.children(parent).len();
        self.insert_children(parent, len, nodes)
    }

    fn snapshot(&self, node_id: NodeId, deep: bool) -> Snapshot {
        let mut out = Vec::new();
        let Some(node) = self.node(node_id) else {
            return out;
        };
        out.push((None, node.data.clone()));
        if !deep {
            return out;
        }

        let mut stack: Vec<(NodeId, usize)> = node
            .children_ids
            .iter()
            .rev()
            .map(|&c| (c, 0))
            .collect();
        while let Some((id, parent_slot)) = stack.pop() {
            let Some(node) = self.node(id) else {
                continue;
            };
            let slot = out.len();
            out.push((Some(parent_slot), node.data.clone()));
            stack.extend(node.children_ids.iter().rev().map(|&c| (c, slot)));
        }
        out
    }

    fn materialize(&mut self, snapshot: Snapshot) -> Option<NodeId> {
        let mut created: Vec<NodeId> = Vec::with_capacity(snapshot.len());
        for (parent_slot, data) in snapshot {
            let id = self.add_node(data);
            if let Some(&parent) = parent_slot.and_then(|slot| created.get(slot)) {
                self.push_child(parent, id);
            }
            created.push(id);
        }
        created.first().copied()
    }

    /// Copy a node (and, when `deep`, its subtree) into fresh parentless
    /// nodes. The copy shares nothing with the source.
    pub fn clone_node(&mut self, node_id: NodeId, deep: bool) -> Option<NodeId> {
        let snapshot = self.snapshot(node_id, deep);
        self.materialize(snapshot)
    }

    /// Deep-copy a subtree owned by another arena into this one
    pub fn import(&mut self, source: &DomArena, node_id: NodeId) -> Option<NodeId> {
        let snapshot = source.snapshot(node_id, true);
        self.materialize(snapshot)
    }

    /// Materialize tokenizer output as a parentless subtree.
    ///
    /// Iterative: every raw element is taken apart as it is visited, so
    /// neither building nor dropping the input recurses on nesting depth.
    pub fn build(&mut self, raw: RawNode) -> NodeId {
        let (data, children) = split_raw(raw);
        let root = self.add_node(data);

        let mut work: Vec<(RawNode, NodeId)> =
            children.into_iter().rev().map(|child| (child, root)).collect();
        while let Some((raw, parent)) = work.pop() {
            let (data, children) = split_raw(raw);
            let id = self.add_node(data);
            self.push_child(parent, id);
            work.extend(children.into_iter().rev().map(|child| (child, id)));
        }
        root
    }

    fn free_slot(&mut self, node_id: NodeId) -> bool {
        let Some(slot) = self.slots.get_mut(node_id.index()) else {
            return false;
        };
        if slot.generation != node_id.generation() || slot.node.is_none() {
            return false;
        }
        slot.node = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(node_id.index() as u32);
        true
    }

    /// Free a parentless subtree. Its slots are reused by later nodes and
    /// every `NodeId` into it stops resolving. Attached nodes and the
    /// document are left alone. Returns the number of nodes freed.
    pub fn release(&mut self, root: NodeId) -> usize {
        if root == self.document() || !self.contains_id(root) || self.parent(root).is_some() {
            return 0;
        }
        let mut doomed = self.descendants(root);
        doomed.push(root);
        doomed.into_iter().filter(|&id| self.free_slot(id)).count()
    }

    /// Free every node outside the document tree and outside the trees
    /// holding one of `keep`. Returns the number of nodes freed.
    pub fn retain_trees(&mut self, keep: impl IntoIterator<Item = NodeId>) -> usize {
        let document = self.document();
        let mut live: AHashSet<NodeId> = AHashSet::with_capacity(self.len());
        live.insert(document);
        live.extend(self.descendants(document));
        for id in keep {
            if !self.contains_id(id) {
                continue;
            }
            let root = self.root_of(id);
            if live.insert(root) {
                live.extend(self.descendants(root));
            }
        }

        let doomed: Vec<NodeId> = self
            .iter()
            .map(|node| node.node_id)
            .filter(|id| !live.contains(id))
            .collect();
        doomed.into_iter().filter(|&id| self.free_slot(id)).count()
    }
}

/// Payload and children of a raw node, taking it apart
fn split_raw(raw: RawNode) -> (NodeData, Vec<RawNode>) {
    match raw {
        RawNode::Element {
            name,
            attrs,
            children,
        } => (
            NodeData::Element(ElementData {
                name,
                attrs: Attributes::from(attrs),
            }),
            children,
        ),
        RawNode::Text(text) => (NodeData::Text(text), Vec::new()),
        RawNode::Comment(text) => (NodeData::Comment(text), Vec::new()),
        RawNode::Directive(text) => (NodeData::Directive(text), Vec::new()),
    }
}

impl Default for DomArena {
    fn default() -> Self {
        Self::new()
    }
}
