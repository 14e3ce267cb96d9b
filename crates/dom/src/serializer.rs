//! DOM Serializer - Convert arena subtrees back to markup or plain text
//!
//! This module handles:
//! - Outer and inner markup rendering
//! - Void / raw-text element rules (HTML mode only)
//! - Entity escaping gated by the context's `decode_entities` option
//! - Text extraction that skips comments and script/style content

use markup_tokenizer::entities::{escape_attribute, escape_attribute_quotes, escape_text};
use markup_tokenizer::{is_raw_text_element, is_void_element};
use serde::{Deserialize, Serialize};

use crate::arena::DomArena;
use crate::types::*;

/// Serializer configuration
///
/// Fixed when the context is created; never recomputed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Entities were decoded at parse time, so text must be re-escaped.
    pub decode_entities: bool,
    pub xml_mode: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            decode_entities: true,
            xml_mode: false,
        }
    }
}

/// Pending work while rendering: a node to open (with whether it sits in
/// raw text) or an element whose end tag is due
enum Frame {
    Open(NodeId, bool),
    Close(NodeId),
}

/// Markup serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct DomSerializer {
    config: RenderOptions,
}

impl DomSerializer {
    pub fn new() -> Self {
        Self::with_config(RenderOptions::default())
    }

    pub fn with_config(config: RenderOptions) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderOptions {
        &self.config
    }

    /// Render a node including its own tag
    pub fn serialize_outer(&self, arena: &DomArena, node_id: NodeId) -> String {
        let mut output = String::with_capacity(256);
        self.write(arena, vec![Frame::Open(node_id, false)], &mut output);
        output
    }

    /// Render only a node's children
    pub fn serialize_inner(&self, arena: &DomArena, node_id: NodeId) -> String {
        let mut output = String::with_capacity(256);
        let raw = self.is_raw_text_parent(arena, node_id);
        let frames = arena
            .children(node_id)
            .iter()
            .rev()
            .map(|&child| Frame::Open(child, raw))
            .collect();
        self.write(arena, frames, &mut output);
        output
    }

    /// Render several nodes back to back
    pub fn serialize_all(&self, arena: &DomArena, nodes: &[NodeId]) -> String {
        let mut output = String::with_capacity(256);
        let frames = nodes.iter().rev().map(|&id| Frame::Open(id, false)).collect();
        self.write(arena, frames, &mut output);
        output
    }

    fn is_raw_text_parent(&self, arena: &DomArena, node_id: NodeId) -> bool {
        !self.config.xml_mode
            && arena
                .node(node_id)
                .and_then(|n| n.tag_name())
                .is_some_and(is_raw_text_element)
    }

    fn in_raw_text(&self, arena: &DomArena, node_id: NodeId) -> bool {
        arena
            .parent(node_id)
            .is_some_and(|p| self.is_raw_text_parent(arena, p))
    }

    /// Drain `stack` (top = next to render) into `output`.
    ///
    /// Explicit open/close frames instead of recursion, so nesting depth
    /// is bounded by memory rather than by the call stack.
    fn write(&self, arena: &DomArena, mut stack: Vec<Frame>, output: &mut String) {
        while let Some(frame) = stack.pop() {
            let (node_id, raw) = match frame {
                Frame::Open(node_id, raw) => (node_id, raw),
                Frame::Close(node_id) => {
                    if let Some(name) = arena.node(node_id).and_then(|n| n.tag_name()) {
                        output.push_str("</");
                        output.push_str(name);
                        output.push('>');
                    }
                    continue;
                }
            };
            let Some(node) = arena.node(node_id) else {
                continue;
            };

            match &node.data {
                NodeData::Document => {
                    stack.extend(node.children_ids.iter().rev().map(|&c| Frame::Open(c, false)));
                }
                NodeData::Element(element) => {
                    output.push('<');
                    output.push_str(&element.name);
                    for (name, value) in element.attrs.iter() {
                        output.push(' ');
                        output.push_str(name);
                        output.push_str("=\"");
                        if self.config.decode_entities {
                            escape_attribute(value, output);
                        } else {
                            escape_attribute_quotes(value, output);
                        }
                        output.push('"');
                    }

                    if self.config.xml_mode {
                        if node.children_ids.is_empty() {
                            output.push_str("/>");
                            continue;
                        }
                    } else if is_void_element(&element.name) {
                        output.push('>');
                        continue;
                    }

                    output.push('>');
                    stack.push(Frame::Close(node_id));
                    let raw_children = !self.config.xml_mode && is_raw_text_element(&element.name);
                    stack.extend(
                        node.children_ids
                            .iter()
                            .rev()
                            .map(|&c| Frame::Open(c, raw_children)),
                    );
                }
                NodeData::Text(text) => {
                    let raw = raw || self.in_raw_text(arena, node_id);
                    if raw || !self.config.decode_entities {
                        output.push_str(text);
                    } else {
                        escape_text(text, output);
                    }
                }
                NodeData::Comment(text) => {
                    output.push_str("<!--");
                    output.push_str(text);
                    output.push_str("-->");
                }
                NodeData::Directive(text) => {
                    output.push('<');
                    output.push_str(text);
                    output.push('>');
                }
            }
        }
    }

    /// Plain text of a subtree
    ///
    /// Comments contribute nothing, and neither does anything inside
    /// `script`/`style` (the subject included).
    pub fn extract_text(&self, arena: &DomArena, node_id: NodeId, output: &mut String) {
        let mut stack = vec![node_id];
        while let Some(id) = stack.pop() {
            let Some(node) = arena.node(id) else {
                continue;
            };
            match &node.data {
                NodeData::Text(text) => output.push_str(text),
                NodeData::Element(element)
                    if TEXT_EXCLUDED_ELEMENTS
                        .iter()
                        .any(|t| t.eq_ignore_ascii_case(&element.name)) => {}
                NodeData::Element(_) | NodeData::Document => {
                    stack.extend(node.children_ids.iter().rev().copied());
                }
                NodeData::Comment(_) | NodeData::Directive(_) => {}
            }
        }
    }

    pub fn text_of(&self, arena: &DomArena, nodes: &[NodeId]) -> String {
        let mut output = String::new();
        for &node_id in nodes {
            self.extract_text(arena, node_id, &mut output);
        }
        output
    }
}
