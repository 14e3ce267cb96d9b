//! Querying, filtering and structural navigation
//!
//! Navigation (`children`, `siblings`, `next`, `parents`, ...) only ever
//! yields element nodes, de-duplicated and in document order. `filter`
//! and friends keep the subject order untouched.

use crate::arena::DomArena;
use crate::error::Result;
use crate::selection::Selection;
use crate::selector::CompiledSelector;
use crate::types::NodeId;

impl Selection {
    fn compile(&self, selector: &str) -> Result<CompiledSelector> {
        CompiledSelector::compile(selector)
    }

    fn xml_mode(&self) -> bool {
        self.context().options().xml_mode
    }

    /// Collect nodes produced per subject, then sort and de-duplicate
    fn navigate<F>(&self, mut step: F) -> Selection
    where
        F: FnMut(&DomArena, NodeId, &mut Vec<NodeId>),
    {
        let arena = self.context().arena();
        let mut out = Vec::new();
        for &id in self.nodes() {
            step(&arena, id, &mut out);
        }
        arena.sort_unique(&mut out);
        drop(arena);
        self.with_nodes(out)
    }

    /// Matching descendants of every subject; the subjects themselves are
    /// never included
    pub fn find(&self, selector: &str) -> Result<Selection> {
        let compiled = self.compile(selector)?;
        let nodes = compiled.query(&self.context().arena(), self.nodes(), self.xml_mode());
        Ok(self.with_nodes(nodes))
    }

    /// Subjects matching `selector`, order preserved
    pub fn filter(&self, selector: &str) -> Result<Selection> {
        let compiled = self.compile(selector)?;
        let arena = self.context().arena();
        let nodes = self
            .nodes()
            .iter()
            .copied()
            .filter(|&id| compiled.matches(&arena, id, self.xml_mode()))
            .collect();
        drop(arena);
        Ok(self.with_nodes(nodes))
    }

    /// Subjects for which `predicate(index, node)` holds
    pub fn filter_fn<F>(&self, mut predicate: F) -> Selection
    where
        F: FnMut(usize, &Selection) -> bool,
    {
        let nodes = self
            .iter()
            .enumerate()
            .filter(|(i, node)| predicate(*i, node))
            .filter_map(|(_, node)| node.get(0))
            .collect();
        self.with_nodes(nodes)
    }

    /// Subjects not matching `selector`
    pub fn not(&self, selector: &str) -> Result<Selection> {
        let compiled = self.compile(selector)?;
        let arena = self.context().arena();
        let nodes = self
            .nodes()
            .iter()
            .copied()
            .filter(|&id| !compiled.matches(&arena, id, self.xml_mode()))
            .collect();
        drop(arena);
        Ok(self.with_nodes(nodes))
    }

    /// Does any subject match?
    pub fn is(&self, selector: &str) -> Result<bool> {
        let compiled = self.compile(selector)?;
        let arena = self.context().arena();
        let matched = self
            .nodes()
            .iter()
            .any(|&id| compiled.matches(&arena, id, self.xml_mode()));
        Ok(matched)
    }

    /// Subjects with at least one matching descendant
    pub fn has(&self, selector: &str) -> Result<Selection> {
        let compiled = self.compile(selector)?;
        let arena = self.context().arena();
        let nodes = self
            .nodes()
            .iter()
            .copied()
            .filter(|&id| !compiled.query(&arena, &[id], self.xml_mode()).is_empty())
            .collect();
        drop(arena);
        Ok(self.with_nodes(nodes))
    }

    /// Nearest ancestor-or-self of each subject matching `selector`
    pub fn closest(&self, selector: &str) -> Result<Selection> {
        self.closest_bounded(selector, None)
    }

    /// Like [`closest`](Self::closest), but the walk stops before `root`
    pub fn closest_within(&self, selector: &str, root: NodeId) -> Result<Selection> {
        self.closest_bounded(selector, Some(root))
    }

    fn closest_bounded(&self, selector: &str, root: Option<NodeId>) -> Result<Selection> {
        let compiled = self.compile(selector)?;
        let xml_mode = self.xml_mode();
        Ok(self.navigate(|arena, id, out| {
            let found = std::iter::once(id)
                .chain(arena.ancestors(id))
                .take_while(|&n| Some(n) != root)
                .find(|&n| arena.is_element(n) && compiled.matches(arena, n, xml_mode));
            out.extend(found);
        }))
    }

    /// Parent element of each subject
    pub fn parent(&self) -> Selection {
        self.navigate(|arena, id, out| {
            out.extend(arena.parent(id).filter(|&p| arena.is_element(p)));
        })
    }

    /// All ancestor elements, in document order
    pub fn parents(&self) -> Selection {
        self.navigate(|arena, id, out| {
            out.extend(arena.ancestors(id).filter(|&a| arena.is_element(a)));
        })
    }

    /// Ancestor elements up to, not including, the first one matching
    /// `selector`
    pub fn parents_until(&self, selector: &str) -> Result<Selection> {
        let compiled = self.compile(selector)?;
        let xml_mode = self.xml_mode();
        Ok(self.navigate(|arena, id, out| {
            out.extend(
                arena
                    .ancestors(id)
                    .filter(|&a| arena.is_element(a))
                    .take_while(|&a| !compiled.matches(arena, a, xml_mode)),
            );
        }))
    }

    /// Element children
    pub fn children(&self) -> Selection {
        self.navigate(|arena, id, out| out.extend(arena.element_children(id)))
    }

    /// All child nodes, text and comments included
    pub fn contents(&self) -> Selection {
        self.navigate(|arena, id, out| out.extend_from_slice(arena.children(id)))
    }

    /// Element siblings of each subject. A subject only appears in the
    /// result as the sibling of another subject.
    pub fn siblings(&self) -> Selection {
        self.navigate(|arena, id, out| {
            if let Some(parent) = arena.parent(id) {
                out.extend(arena.element_children(parent).filter(|&s| s != id));
            }
        })
    }

    pub fn next(&self) -> Selection {
        self.navigate(|arena, id, out| out.extend(arena.next_element_sibling(id)))
    }

    pub fn next_all(&self) -> Selection {
        self.navigate(|arena, id, out| {
            out.extend(std::iter::successors(arena.next_element_sibling(id), |&s| {
                arena.next_element_sibling(s)
            }));
        })
    }

    pub fn prev(&self) -> Selection {
        self.navigate(|arena, id, out| out.extend(arena.prev_element_sibling(id)))
    }

    pub fn prev_all(&self) -> Selection {
        self.navigate(|arena, id, out| {
            out.extend(std::iter::successors(arena.prev_element_sibling(id), |&s| {
                arena.prev_element_sibling(s)
            }));
        })
    }

    /// Union with `other`, in document order. Nodes of another context are
    /// ignored.
    pub fn add(&self, other: &Selection) -> Selection {
        let mut nodes = self.nodes().to_vec();
        if other.context().ptr_eq(self.context()) {
            nodes.extend_from_slice(other.nodes());
        } else {
            tracing::debug!("[Selection] Ignoring nodes from another context in add()");
        }
        let arena = self.context().arena();
        arena.sort_unique(&mut nodes);
        drop(arena);
        self.with_nodes(nodes)
    }

    /// Position of `node` within this selection
    pub fn index_of(&self, node: NodeId) -> Option<usize> {
        self.nodes().iter().position(|&n| n == node)
    }
}
