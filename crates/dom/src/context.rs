//! Context - Main entry point for document operations
//!
//! A context owns one arena, the options it was loaded with and the
//! tokenizer used for every later markup argument. It handles:
//! - Loading markup (text or bytes) into a document tree
//! - Building parentless fragments for mutation arguments
//! - Document-scope queries, markup and text
//! - `parse_html` snapshots
//! - Reclaiming nodes no longer reachable from the document or from a
//!   live selection
//!
//! Contexts are cheap to clone (`Rc`) and deliberately `!Send`: each thread
//! builds its own.

use std::borrow::Cow;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashSet;
use markup_tokenizer::{decode_bytes, HtmlTokenizer, ParseOptions, TreeSource};
use serde::{Deserialize, Serialize};

use crate::arena::DomArena;
use crate::error::Result;
use crate::selection::Selection;
use crate::selector::CompiledSelector;
use crate::serializer::{DomSerializer, RenderOptions};
use crate::types::*;

/// Configuration for loading documents
///
/// Fixed for the lifetime of the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoadOptions {
    pub xml_mode: bool,
    pub lower_case_tags: bool,
    pub lower_case_attribute_names: bool,
    pub normalize_whitespace: bool,
    pub decode_entities: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            xml_mode: false,
            lower_case_tags: true,
            lower_case_attribute_names: true,
            normalize_whitespace: false,
            decode_entities: true,
        }
    }
}

impl LoadOptions {
    /// XML defaults: names keep their case, empty elements self-close
    pub fn xml() -> Self {
        Self {
            xml_mode: true,
            lower_case_tags: false,
            lower_case_attribute_names: false,
            ..Self::default()
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            xml_mode: self.xml_mode,
            lower_case_tags: self.lower_case_tags,
            lower_case_attribute_names: self.lower_case_attribute_names,
            decode_entities: self.decode_entities,
            normalize_whitespace: self.normalize_whitespace,
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            decode_entities: self.decode_entities,
            xml_mode: self.xml_mode,
        }
    }

    /// Attribute name as stored under these options
    pub(crate) fn fold_attribute_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.lower_case_attribute_names && name.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(name.to_ascii_lowercase())
        } else {
            Cow::Borrowed(name)
        }
    }

    pub(crate) fn fold_tag_name<'a>(&self, name: &'a str) -> Cow<'a, str> {
        if self.lower_case_tags && name.bytes().any(|b| b.is_ascii_uppercase()) {
            Cow::Owned(name.to_ascii_lowercase())
        } else {
            Cow::Borrowed(name)
        }
    }
}

/// Markup input: a string or a raw byte buffer (decoded as UTF-8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Markup<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
}

impl<'a> Markup<'a> {
    pub fn decode(&self) -> Cow<'a, str> {
        match *self {
            Markup::Text(text) => Cow::Borrowed(text),
            Markup::Bytes(bytes) => decode_bytes(bytes),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Markup::Text(text) => text.is_empty(),
            Markup::Bytes(bytes) => bytes.is_empty(),
        }
    }
}

impl<'a> From<&'a str> for Markup<'a> {
    fn from(text: &'a str) -> Self {
        Markup::Text(text)
    }
}

impl<'a> From<&'a String> for Markup<'a> {
    fn from(text: &'a String) -> Self {
        Markup::Text(text)
    }
}

impl<'a> From<&'a [u8]> for Markup<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Markup::Bytes(bytes)
    }
}

impl<'a, const N: usize> From<&'a [u8; N]> for Markup<'a> {
    fn from(bytes: &'a [u8; N]) -> Self {
        Markup::Bytes(bytes)
    }
}

impl<'a> From<&'a Vec<u8>> for Markup<'a> {
    fn from(bytes: &'a Vec<u8>) -> Self {
        Markup::Bytes(bytes)
    }
}

/// Absent input behaves like empty input
impl<'a> From<Option<&'a str>> for Markup<'a> {
    fn from(text: Option<&'a str>) -> Self {
        Markup::Text(text.unwrap_or(""))
    }
}

struct ContextInner {
    options: LoadOptions,
    serializer: DomSerializer,
    arena: RefCell<DomArena>,
    source: Box<dyn TreeSource>,
    /// Handle lists of selections; live ones keep their trees allocated
    pins: RefCell<Vec<Weak<[NodeId]>>>,
}

/// Dead pins are pruned whenever the list reaches a power of two past this
const PIN_PRUNE_THRESHOLD: usize = 64;

/// A loaded document bound to fixed options
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// Load a document with the built-in tokenizer
    pub fn load<'a>(input: impl Into<Markup<'a>>, options: LoadOptions) -> Self {
        Self::load_with(input, options, HtmlTokenizer::new())
    }

    /// Load a document with a custom [`TreeSource`]
    pub fn load_with<'a, S>(input: impl Into<Markup<'a>>, options: LoadOptions, source: S) -> Self
    where
        S: TreeSource + 'static,
    {
        let context = Self {
            inner: Rc::new(ContextInner {
                options,
                serializer: DomSerializer::with_config(options.render_options()),
                arena: RefCell::new(DomArena::new()),
                source: Box::new(source),
                pins: RefCell::new(Vec::new()),
            }),
        };

        let input = input.into().decode();
        let top_level = context.parse_fragment(&input);
        {
            let mut arena = context.arena_mut();
            let document = arena.document();
            arena.append_children(document, &top_level);
            tracing::debug!(
                "[Context] Loaded document: {} top-level nodes, {} total, xml_mode={}",
                top_level.len(),
                arena.len(),
                options.xml_mode
            );
        }
        context
    }

    pub fn options(&self) -> &LoadOptions {
        &self.inner.options
    }

    pub(crate) fn serializer(&self) -> &DomSerializer {
        &self.inner.serializer
    }

    pub(crate) fn arena(&self) -> Ref<'_, DomArena> {
        self.inner.arena.borrow()
    }

    pub(crate) fn arena_mut(&self) -> RefMut<'_, DomArena> {
        self.inner.arena.borrow_mut()
    }

    /// Register a selection's handle list
    pub(crate) fn pin(&self, nodes: Vec<NodeId>) -> Rc<[NodeId]> {
        let nodes: Rc<[NodeId]> = Rc::from(nodes);
        if nodes.is_empty() {
            return nodes;
        }
        let mut pins = self.inner.pins.borrow_mut();
        if pins.len() >= PIN_PRUNE_THRESHOLD && pins.len().is_power_of_two() {
            pins.retain(|pin| pin.strong_count() > 0);
        }
        pins.push(Rc::downgrade(&nodes));
        nodes
    }

    /// Roots of every tree a live selection points into
    fn pinned_roots(&self, arena: &DomArena) -> AHashSet<NodeId> {
        let mut pins = self.inner.pins.borrow_mut();
        pins.retain(|pin| pin.strong_count() > 0);
        let mut roots = AHashSet::new();
        for nodes in pins.iter().filter_map(Weak::upgrade) {
            roots.extend(
                nodes
                    .iter()
                    .filter(|&&id| arena.contains_id(id))
                    .map(|&id| arena.root_of(id)),
            );
        }
        roots
    }

    /// Free those of `candidates` that are parentless and not pinned by a
    /// live selection, subtrees included
    pub(crate) fn release_detached(&self, candidates: &[NodeId]) {
        let mut arena = self.arena_mut();
        let pinned = self.pinned_roots(&arena);
        let freed: usize = candidates
            .iter()
            .filter(|&&id| !pinned.contains(&id))
            .map(|&id| arena.release(id))
            .sum();
        if freed > 0 {
            tracing::trace!("[Context] Released {} detached nodes", freed);
        }
    }

    /// Free every node that is neither in the document nor in a tree some
    /// live [`Selection`] points into. Returns the number of nodes freed.
    ///
    /// Bare `NodeId`s are not tracked: a detached node held only as a
    /// `NodeId` (from [`create_element`](Self::create_element) or
    /// [`parse_html`](Self::parse_html), say) is freed too, and its handle
    /// stops resolving.
    pub fn collect_garbage(&self) -> usize {
        let mut arena = self.arena_mut();
        let pinned = self.pinned_roots(&arena);
        let freed = arena.retain_trees(pinned);
        tracing::debug!(
            "[Context] Collected {} unreachable nodes, {} still live",
            freed,
            arena.len()
        );
        freed
    }

    /// Number of live nodes, document included
    pub fn node_count(&self) -> usize {
        self.arena().len()
    }

    /// Same underlying document?
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The document node
    pub fn document(&self) -> NodeId {
        self.arena().document()
    }

    /// Tokenize `markup` into fresh parentless nodes of this arena
    pub(crate) fn parse_fragment(&self, markup: &str) -> Vec<NodeId> {
        if markup.is_empty() {
            return Vec::new();
        }
        let raw = self
            .inner
            .source
            .parse(markup, &self.inner.options.parse_options());
        let mut arena = self.arena_mut();
        let nodes: Vec<NodeId> = raw.into_iter().map(|node| arena.build(node)).collect();
        tracing::trace!("[Context] Parsed fragment into {} nodes", nodes.len());
        nodes
    }

    /// Query the whole document
    pub fn select(&self, selector: &str) -> Result<Selection> {
        self.root().find(selector)
    }

    /// Query below the nodes of `scope`
    pub fn select_in(&self, selector: &str, scope: &Selection) -> Result<Selection> {
        let compiled = CompiledSelector::compile(selector)?;
        let roots = if scope.context().ptr_eq(self) {
            scope.nodes().to_vec()
        } else {
            Vec::new()
        };
        let nodes = compiled.query(&self.arena(), &roots, self.options().xml_mode);
        Ok(Selection::new(self.clone(), nodes))
    }

    /// Parse markup into a parentless fragment
    pub fn create<'a>(&self, markup: impl Into<Markup<'a>>) -> Selection {
        let markup = markup.into().decode();
        let nodes = self.parse_fragment(&markup);
        Selection::new(self.clone(), nodes)
    }

    /// Wrap existing nodes of this context
    pub fn wrap(&self, nodes: impl IntoIterator<Item = NodeId>) -> Selection {
        let arena = self.arena();
        let nodes = nodes
            .into_iter()
            .filter(|&id| arena.contains_id(id))
            .collect();
        drop(arena);
        Selection::new(self.clone(), nodes)
    }

    /// Selection holding the document node
    pub fn root(&self) -> Selection {
        Selection::new(self.clone(), vec![self.document()])
    }

    /// Create a parentless element; the name is folded like parsed tags
    pub fn create_element(&self, name: &str) -> NodeId {
        let name = self.options().fold_tag_name(name);
        self.arena_mut().create_element(&name)
    }

    pub fn create_text(&self, text: &str) -> NodeId {
        self.arena_mut().create_text(text)
    }

    pub fn create_comment(&self, text: &str) -> NodeId {
        self.arena_mut().create_comment(text)
    }

    /// Copy a node (deep: with its subtree) into a new parentless node
    pub fn clone_node(&self, node_id: NodeId, deep: bool) -> Option<NodeId> {
        self.arena_mut().clone_node(node_id, deep)
    }

    /// Run `f` against a node, if it exists
    pub fn with_node<R>(&self, node_id: NodeId, f: impl FnOnce(&DomNode) -> R) -> Option<R> {
        self.arena().node(node_id).map(f)
    }

    pub fn node_type(&self, node_id: NodeId) -> Option<NodeType> {
        self.with_node(node_id, DomNode::node_type)
    }

    pub fn tag_name(&self, node_id: NodeId) -> Option<String> {
        self.with_node(node_id, |n| n.tag_name().map(str::to_string))
            .flatten()
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.arena().parent(node_id)
    }

    pub fn prev_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        self.arena().prev_sibling(node_id)
    }

    pub fn next_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        self.arena().next_sibling(node_id)
    }

    pub fn children(&self, node_id: NodeId) -> Vec<NodeId> {
        self.arena().children(node_id).to_vec()
    }

    /// Character data of a text, comment or directive node
    pub fn node_data(&self, node_id: NodeId) -> Option<String> {
        self.with_node(node_id, |n| n.data().map(str::to_string))
            .flatten()
    }

    /// True iff `candidate` is a strict descendant of `container`
    pub fn contains(&self, container: NodeId, candidate: NodeId) -> bool {
        self.arena().contains(container, candidate)
    }

    /// Markup of the whole document
    pub fn html(&self) -> String {
        let arena = self.arena();
        self.serializer().serialize_outer(&arena, arena.document())
    }

    /// Outer markup of the first node of `selection`
    pub fn outer_html(&self, selection: &Selection) -> Option<String> {
        selection.outer_html()
    }

    /// Text of the whole document
    pub fn text(&self) -> String {
        let arena = self.arena();
        self.serializer().text_of(&arena, &[arena.document()])
    }

    pub fn text_of(&self, selection: &Selection) -> String {
        selection.text()
    }

    /// Parse markup into a standalone list of top-level nodes.
    ///
    /// Returns `None` for empty input. Unless `keep_scripts` is set, every
    /// `script` element (nested ones included) is dropped.
    pub fn parse_html<'a>(
        &self,
        input: impl Into<Markup<'a>>,
        keep_scripts: bool,
    ) -> Option<Vec<NodeId>> {
        let input = input.into();
        if input.is_empty() {
            return None;
        }
        let mut nodes = self.parse_fragment(&input.decode());

        if !keep_scripts {
            let mut arena = self.arena_mut();
            let (scripts, kept): (Vec<NodeId>, Vec<NodeId>) = nodes
                .into_iter()
                .partition(|&id| arena.is_element_named(id, "script"));
            nodes = kept;
            for script in scripts {
                arena.release(script);
            }
            for &top in &nodes {
                let scripts: Vec<NodeId> = arena
                    .descendants(top)
                    .into_iter()
                    .filter(|&id| arena.is_element_named(id, "script"))
                    .collect();
                for script in scripts {
                    arena.detach(script);
                    arena.release(script);
                }
            }
        }
        Some(nodes)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("options", &self.inner.options)
            .field("nodes", &self.inner.arena.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_renders_back() {
        let ctx = Context::load("<ul id=fruits><li>Apple</li></ul>", LoadOptions::default());
        assert_eq!(ctx.html(), r#"<ul id="fruits"><li>Apple</li></ul>"#);
        assert_eq!(ctx.text(), "Apple");
    }

    #[test]
    fn test_load_bytes() {
        let ctx = Context::load(b"\xEF\xBB\xBF<div>foo</div>", LoadOptions::default());
        assert_eq!(ctx.html(), "<div>foo</div>");
    }

    #[test]
    fn test_options_from_json() {
        let options: LoadOptions =
            serde_json::from_str(r#"{"lowerCaseTags": false, "xmlMode": true}"#).unwrap();
        assert!(options.xml_mode);
        assert!(!options.lower_case_tags);
        assert!(options.decode_entities);
        assert!(options.render_options().xml_mode);
    }

    #[test]
    fn test_parse_html_empty_is_none() {
        let ctx = Context::load("", LoadOptions::default());
        assert_eq!(ctx.parse_html("", false), None);
        assert_eq!(ctx.parse_html(None::<&str>, false), None);
        assert_eq!(ctx.parse_html(&b""[..], false), None);
    }

    #[test]
    fn test_parse_html_strips_nested_scripts() {
        let ctx = Context::load("", LoadOptions::default());
        let nodes = ctx
            .parse_html("<div><script>x()</script><p></p></div>", false)
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(ctx.wrap(nodes).html().as_deref(), Some("<p></p>"));
    }

    #[test]
    fn test_create_leaves_document_alone() {
        let ctx = Context::load("<p>a</p>", LoadOptions::default());
        let fragment = ctx.create("<b>x</b><i>y</i>");
        assert_eq!(fragment.len(), 2);
        assert_eq!(ctx.parent(fragment.nodes()[0]), None);
        assert_eq!(ctx.html(), "<p>a</p>");
    }

    #[test]
    fn test_node_accessors() {
        let ctx = Context::load("<p>hi<!--c--></p>", LoadOptions::default());
        let p = ctx.children(ctx.document())[0];
        let children = ctx.children(p);
        assert_eq!(children.len(), 2);
        let (text, comment) = (children[0], children[1]);
        assert_eq!(ctx.tag_name(p).as_deref(), Some("p"));
        assert_eq!(ctx.node_type(comment), Some(NodeType::Comment));
        assert_eq!(ctx.node_data(text).as_deref(), Some("hi"));
        assert_eq!(ctx.next_sibling(text), Some(comment));
        assert_eq!(ctx.prev_sibling(comment), Some(text));
        assert!(ctx.contains(ctx.document(), text));

        let div = ctx.create_element("DIV");
        assert_eq!(ctx.tag_name(div).as_deref(), Some("div"));
        assert_eq!(ctx.parent(div), None);
    }

    #[test]
    fn test_contexts_are_independent() {
        let a = Context::load("<p>a</p>", LoadOptions::default());
        let b = Context::load("<p>b</p>", LoadOptions::default());
        a.root().append("<i></i>");
        assert_eq!(a.html(), "<p>a</p><i></i>");
        assert_eq!(b.html(), "<p>b</p>");
        assert!(!a.ptr_eq(&b));
        assert!(a.ptr_eq(&a.clone()));
    }

    #[test]
    fn test_collect_garbage_keeps_reachable_trees() {
        let ctx = Context::load("<p>a</p>", LoadOptions::default());
        let loose = ctx.create_element("i");
        let fragment = ctx.parse_html("<b>x</b><u>y</u>", false).unwrap();
        let kept = ctx.create("<em><s>z</s></em>");
        let inner = kept.find("s").unwrap();
        drop(kept);
        assert_eq!(ctx.node_count(), 3 + 1 + 4 + 3);

        assert_eq!(ctx.collect_garbage(), 5);
        assert_eq!(ctx.node_count(), 6);
        assert_eq!(ctx.tag_name(loose), None);
        assert_eq!(ctx.node_type(fragment[0]), None);
        assert_eq!(inner.parent().tag_name().as_deref(), Some("em"));
        assert_eq!(ctx.html(), "<p>a</p>");

        drop(inner);
        assert_eq!(ctx.collect_garbage(), 3);
        assert_eq!(ctx.collect_garbage(), 0);
        assert_eq!(ctx.node_count(), 3);
    }

    #[test]
    fn test_dropped_scripts_are_released() {
        let ctx = Context::load("", LoadOptions::default());
        let before = ctx.node_count();
        let nodes = ctx
            .parse_html("<script>a()</script><div><script>b()</script></div>", false)
            .unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(ctx.node_count(), before + 1);
    }
}

