//! Selection - an ordered list of node handles bound to a context
//!
//! Selections never own or copy nodes. Several selections may alias the
//! same nodes, and every read goes through the live arena, so edits made
//! through one selection are visible through all of them.
//!
//! The handle list is shared (`Rc`) and registered with the context: while
//! any clone of a selection is alive, the trees its nodes belong to are
//! never reclaimed.

use std::ops::{Bound, RangeBounds};
use std::rc::Rc;

use crate::context::Context;
use crate::types::{NodeId, NodeType};

#[derive(Debug, Clone)]
pub struct Selection {
    context: Context,
    nodes: Rc<[NodeId]>,
}

impl Selection {
    pub(crate) fn new(context: Context, nodes: Vec<NodeId>) -> Self {
        let nodes = context.pin(nodes);
        Self { context, nodes }
    }

    /// New selection over the same context
    pub(crate) fn with_nodes(&self, nodes: Vec<NodeId>) -> Self {
        Self::new(self.context.clone(), nodes)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.nodes.get(index).copied()
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Each node as its own single-node selection
    pub fn iter(&self) -> impl Iterator<Item = Selection> + '_ {
        self.nodes.iter().map(|&id| self.with_nodes(vec![id]))
    }

    /// Node at `index`; negative indices count from the end
    pub fn eq(&self, index: isize) -> Selection {
        let len = self.nodes.len() as isize;
        let index = if index < 0 { len + index } else { index };
        let nodes = usize::try_from(index)
            .ok()
            .and_then(|i| self.get(i))
            .into_iter()
            .collect();
        self.with_nodes(nodes)
    }

    pub fn first(&self) -> Selection {
        self.eq(0)
    }

    pub fn last(&self) -> Selection {
        self.eq(-1)
    }

    /// Sub-range of this selection; out-of-range bounds are clamped
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Selection {
        let len = self.nodes.len();
        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        }
        .min(len);
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        }
        .min(len);
        let nodes = if start < end {
            self.nodes[start..end].to_vec()
        } else {
            Vec::new()
        };
        self.with_nodes(nodes)
    }

    /// Tag name of the first node, if it is an element
    pub fn tag_name(&self) -> Option<String> {
        self.get(0).and_then(|id| self.context.tag_name(id))
    }

    pub fn node_type(&self) -> Option<NodeType> {
        self.get(0).and_then(|id| self.context.node_type(id))
    }
}

impl IntoIterator for Selection {
    type Item = NodeId;
    type IntoIter = std::vec::IntoIter<NodeId>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.to_vec().into_iter()
    }
}

#[cfg(test)]
mod tests {
    use crate::{Context, LoadOptions};

    fn fruits() -> Context {
        Context::load(
            r#"<ul><li class="apple">Apple</li><li class="orange">Orange</li><li class="pear">Pear</li></ul>"#,
            LoadOptions::default(),
        )
    }

    #[test]
    fn test_eq_first_last() {
        let ctx = fruits();
        let items = ctx.select("li").unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items.first().text(), "Apple");
        assert_eq!(items.last().text(), "Pear");
        assert_eq!(items.eq(1).text(), "Orange");
        assert_eq!(items.eq(-2).text(), "Orange");
        assert!(items.eq(3).is_empty());
        assert!(items.eq(-4).is_empty());
    }

    #[test]
    fn test_slice() {
        let ctx = fruits();
        let items = ctx.select("li").unwrap();
        assert_eq!(items.slice(1..).text(), "OrangePear");
        assert_eq!(items.slice(..1).text(), "Apple");
        assert_eq!(items.slice(0..=1).len(), 2);
        assert!(items.slice(5..9).is_empty());
        assert!(items.slice(2..1).is_empty());
    }

    #[test]
    fn test_iter_and_accessors() {
        let ctx = fruits();
        let items = ctx.select("li").unwrap();
        let texts: Vec<String> = items.iter().map(|li| li.text()).collect();
        assert_eq!(texts, vec!["Apple", "Orange", "Pear"]);
        assert_eq!(items.tag_name().as_deref(), Some("li"));
        assert_eq!(items.node_type(), Some(crate::NodeType::Element));
        assert_eq!(items.get(0), items.nodes().first().copied());
        assert_eq!(items.clone().into_iter().count(), 3);
    }
}
