//! Core node types
//!
//! Key design principles:
//! 1. Use generational u32 handles for every tree link (parent, siblings, children)
//! 2. Use SmallVec for child lists (most nodes have <4 children)
//! 3. Attributes keep insertion order; lookups are exact, callers fold case

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Node identifier: arena slot plus the slot's generation
///
/// Only meaningful for the [`Context`](crate::Context) that produced it.
/// Once a slot is reclaimed and reused, handles to the old node stop
/// resolving instead of aliasing the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    #[inline]
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.generation == 0 {
            write!(f, "#{}", self.index)
        } else {
            write!(f, "#{}v{}", self.index, self.generation)
        }
    }
}

/// Node type, numbered like the DOM specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Comment = 8,
    Document = 9,
    /// Doctype and processing instructions
    Directive = 10,
}

/// Ordered attribute list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    entries: Vec<(String, String)>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Overwrite in place, or append at the end when absent.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, v)) => {
                v.clear();
                v.push_str(value);
            }
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let idx = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<(String, String)>> for Attributes {
    fn from(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }
}

/// Element payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementData {
    pub name: String,
    pub attrs: Attributes,
}

impl ElementData {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attrs: Attributes::new(),
        }
    }

    /// Whitespace-separated tokens of the `class` attribute
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.attrs.get("class").unwrap_or("").split_ascii_whitespace()
    }
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeData {
    Document,
    Element(ElementData),
    Text(String),
    Comment(String),
    Directive(String),
}

/// A node in the arena
///
/// Links are handles into the same arena, never owning pointers. The arena
/// keeps `parent_id`, the sibling links and the parent's `children_ids` in
/// agreement after every edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomNode {
    pub node_id: NodeId,

    pub parent_id: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
    pub children_ids: SmallVec<[NodeId; 4]>,

    pub data: NodeData,
}

impl DomNode {
    pub fn new(node_id: NodeId, data: NodeData) -> Self {
        Self {
            node_id,
            parent_id: None,
            prev_sibling: None,
            next_sibling: None,
            children_ids: SmallVec::new(),
            data,
        }
    }

    pub fn node_type(&self) -> NodeType {
        match self.data {
            NodeData::Document => NodeType::Document,
            NodeData::Element(_) => NodeType::Element,
            NodeData::Text(_) => NodeType::Text,
            NodeData::Comment(_) => NodeType::Comment,
            NodeData::Directive(_) => NodeType::Directive,
        }
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        self.as_element().map(|e| e.name.as_str())
    }

    /// Check if node is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Check if node is text
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    /// Elements and documents hold children; nothing else does.
    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self.data, NodeData::Element(_) | NodeData::Document)
    }

    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.as_element().and_then(|e| e.attrs.get(name))
    }

    /// Character data of text, comment and directive nodes
    pub fn data(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(s) | NodeData::Comment(s) | NodeData::Directive(s) => Some(s),
            _ => None,
        }
    }

    /// Case-insensitive tag comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.tag_name().is_some_and(|t| t.eq_ignore_ascii_case(name))
    }
}

/// Elements whose descendants never contribute to extracted text
pub const TEXT_EXCLUDED_ELEMENTS: &[&str] = &["script", "style"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_keep_insertion_order() {
        let mut attrs = Attributes::new();
        attrs.set("id", "a");
        attrs.set("class", "x y");
        attrs.set("id", "b");

        let collected: Vec<_> = attrs.iter().collect();
        assert_eq!(collected, vec![("id", "b"), ("class", "x y")]);
        assert_eq!(attrs.remove("id").as_deref(), Some("b"));
        assert_eq!(attrs.get("id"), None);
        assert_eq!(attrs.get_ignore_case("CLASS"), Some("x y"));
    }

    #[test]
    fn test_node_accessors() {
        let mut element = ElementData::new("div");
        element.attrs.set("class", " a  b ");
        let node = DomNode::new(NodeId::new(3, 0), NodeData::Element(element));

        assert_eq!(node.node_type(), NodeType::Element);
        assert_eq!(node.tag_name(), Some("div"));
        assert!(node.is_named("DIV"));
        assert!(node.is_container());
        assert_eq!(
            node.as_element().unwrap().classes().collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        let text = DomNode::new(NodeId::new(4, 0), NodeData::Text("hi".into()));
        assert_eq!(text.data(), Some("hi"));
        assert!(!text.is_container());
        assert_eq!(text.attr("id"), None);
    }

    #[test]
    fn test_node_serializes_to_json() {
        let node = DomNode::new(NodeId::new(1, 2), NodeData::Comment("note".into()));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["node_id"]["index"], 1);
        assert_eq!(json["node_id"]["generation"], 2);
        assert_eq!(json["data"]["Comment"], "note");
    }

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::new(7, 0).to_string(), "#7");
        assert_eq!(NodeId::new(7, 3).to_string(), "#7v3");
        assert_ne!(NodeId::new(7, 0), NodeId::new(7, 1));
    }
}
