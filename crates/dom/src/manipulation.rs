//! Structural edits, markup and text accessors
//!
//! Every insertion detaches its content from wherever it was first, so a
//! node never ends up with two parents. When a verb targets several nodes,
//! the last target receives the content itself and each earlier target a
//! deep copy of it.
//!
//! Children replaced by `empty`, `set_html` or `set_text` go back to the
//! arena unless a live [`Selection`] still points into them. `remove`
//! never releases anything: removed nodes stay usable.

use crate::arena::DomArena;
use crate::context::{Context, Markup};
use crate::selection::Selection;
use crate::types::NodeId;

/// Anything that can be inserted into a tree
#[derive(Debug, Clone)]
pub enum Content<'a> {
    Node(NodeId),
    Nodes(Vec<NodeId>),
    /// Nodes of this or another context; foreign nodes are deep-copied
    Selection(&'a Selection),
    /// Parsed into a fresh fragment with the target context's options
    Markup(Markup<'a>),
}

impl Content<'_> {
    /// Will resolving create nodes nobody else holds (parsed markup, or
    /// copies imported from another context)?
    fn is_fresh(&self, context: &Context) -> bool {
        match self {
            Content::Markup(_) => true,
            Content::Selection(selection) => !selection.context().ptr_eq(context),
            Content::Node(_) | Content::Nodes(_) => false,
        }
    }

    /// Turn the argument into parentless-or-movable nodes of `context`
    fn resolve(self, context: &Context) -> Vec<NodeId> {
        let ids = match self {
            Content::Node(id) => vec![id],
            Content::Nodes(ids) => ids,
            Content::Selection(selection) if selection.context().ptr_eq(context) => {
                selection.nodes().to_vec()
            }
            Content::Selection(selection) => {
                let source = selection.context().arena();
                let mut arena = context.arena_mut();
                let mut imported = Vec::new();
                for &id in selection.nodes() {
                    if id == source.document() {
                        imported.extend(
                            source
                                .children(id)
                                .iter()
                                .filter_map(|&child| arena.import(&source, child)),
                        );
                    } else {
                        imported.extend(arena.import(&source, id));
                    }
                }
                tracing::debug!("[Content] Imported {} nodes from another context", imported.len());
                return imported;
            }
            Content::Markup(markup) => return context.parse_fragment(&markup.decode()),
        };

        let arena = context.arena();
        let document = arena.document();
        let mut nodes = Vec::with_capacity(ids.len());
        for id in ids {
            if id == document {
                nodes.extend_from_slice(arena.children(id));
            } else if arena.contains_id(id) {
                nodes.push(id);
            }
        }
        nodes
    }
}

impl From<NodeId> for Content<'_> {
    fn from(id: NodeId) -> Self {
        Content::Node(id)
    }
}

impl From<Vec<NodeId>> for Content<'_> {
    fn from(ids: Vec<NodeId>) -> Self {
        Content::Nodes(ids)
    }
}

impl From<&[NodeId]> for Content<'_> {
    fn from(ids: &[NodeId]) -> Self {
        Content::Nodes(ids.to_vec())
    }
}

impl<'a> From<&'a Selection> for Content<'a> {
    fn from(selection: &'a Selection) -> Self {
        Content::Selection(selection)
    }
}

impl<'a> From<&'a str> for Content<'a> {
    fn from(markup: &'a str) -> Self {
        Content::Markup(Markup::Text(markup))
    }
}

impl<'a> From<&'a String> for Content<'a> {
    fn from(markup: &'a String) -> Self {
        Content::Markup(Markup::Text(markup))
    }
}

impl<'a> From<Markup<'a>> for Content<'a> {
    fn from(markup: Markup<'a>) -> Self {
        Content::Markup(markup)
    }
}

impl Selection {
    fn containers(&self) -> Vec<NodeId> {
        let arena = self.context().arena();
        let targets = self
            .nodes()
            .iter()
            .copied()
            .filter(|&id| arena.node(id).is_some_and(|n| n.is_container()))
            .collect();
        targets
    }

    fn attached(&self) -> Vec<NodeId> {
        let arena = self.context().arena();
        let targets = self
            .nodes()
            .iter()
            .copied()
            .filter(|&id| arena.parent(id).is_some())
            .collect();
        targets
    }

    /// Hand `content` to each target: copies for all but the last one.
    /// Fresh content that ends up nowhere is released straight away.
    fn distribute<'a, F>(&self, targets: &[NodeId], content: Content<'a>, mut place: F)
    where
        F: FnMut(&mut DomArena, NodeId, &[NodeId]),
    {
        let context = self.context();
        let fresh = content.is_fresh(context);
        let content = content.resolve(context);

        let mut arena = context.arena_mut();
        let last = targets.len().saturating_sub(1);
        for (i, &target) in targets.iter().enumerate() {
            if i == last {
                place(&mut arena, target, &content);
            } else {
                let copies: Vec<NodeId> = content
                    .iter()
                    .filter_map(|&id| arena.clone_node(id, true))
                    .collect();
                place(&mut arena, target, &copies);
            }
        }
        drop(arena);

        if fresh {
            context.release_detached(&content);
        }
    }

    /// Current children of `targets`, to be released once replaced
    fn children_of(&self, targets: &[NodeId]) -> Vec<NodeId> {
        let arena = self.context().arena();
        let children = targets
            .iter()
            .flat_map(|&id| arena.children(id).iter().copied())
            .collect();
        children
    }

    /// Insert content as the last children of every element
    pub fn append<'a>(&self, content: impl Into<Content<'a>>) -> &Self {
        self.distribute(&self.containers(), content.into(), |arena, target, nodes| {
            arena.append_children(target, nodes);
        });
        self
    }

    /// Insert content as the first children of every element
    pub fn prepend<'a>(&self, content: impl Into<Content<'a>>) -> &Self {
        self.distribute(&self.containers(), content.into(), |arena, target, nodes| {
            arena.insert_children(target, 0, nodes);
        });
        self
    }

    /// Insert content right before every node; parentless nodes are skipped
    pub fn before<'a>(&self, content: impl Into<Content<'a>>) -> &Self {
        self.distribute(&self.attached(), content.into(), |arena, target, nodes| {
            if let (Some(parent), Some(index)) = (arena.parent(target), arena.index_in_parent(target)) {
                arena.insert_children(parent, index, nodes);
            }
        });
        self
    }

    /// Insert content right after every node; parentless nodes are skipped
    pub fn after<'a>(&self, content: impl Into<Content<'a>>) -> &Self {
        self.distribute(&self.attached(), content.into(), |arena, target, nodes| {
            if let (Some(parent), Some(index)) = (arena.parent(target), arena.index_in_parent(target)) {
                arena.insert_children(parent, index + 1, nodes);
            }
        });
        self
    }

    /// Detach every node from its parent. The nodes stay usable.
    pub fn remove(&self) -> &Self {
        let mut arena = self.context().arena_mut();
        for &id in self.nodes() {
            arena.detach(id);
        }
        drop(arena);
        self
    }

    /// Put content where each node was, detaching the node
    pub fn replace_with<'a>(&self, content: impl Into<Content<'a>>) -> &Self {
        self.distribute(&self.attached(), content.into(), |arena, target, nodes| {
            if let (Some(parent), Some(index)) = (arena.parent(target), arena.index_in_parent(target)) {
                arena.detach(target);
                arena.insert_children(parent, index, nodes);
            }
        });
        self
    }

    /// Wrap every node in a copy of the first element of `content`; the
    /// node goes into the wrapper's innermost first element
    pub fn wrap<'a>(&self, content: impl Into<Content<'a>>) -> &Self {
        let context = self.context();
        let content = content.into();
        let fresh = content.is_fresh(context);
        let nodes = content.resolve(context);
        let wrapper = {
            let arena = context.arena();
            nodes.iter().copied().find(|&id| arena.is_element(id))
        };

        if let Some(wrapper) = wrapper {
            let targets = self.attached();
            self.distribute(&targets, Content::Node(wrapper), |arena, target, wrappers| {
                let (Some(parent), Some(index), Some(&wrapper)) = (
                    arena.parent(target),
                    arena.index_in_parent(target),
                    wrappers.first(),
                ) else {
                    return;
                };
                if arena.insert_children(parent, index, &[wrapper]) == 0 {
                    return;
                }
                let mut innermost = wrapper;
                while let Some(child) = arena.element_children(innermost).next() {
                    innermost = child;
                }
                arena.append_children(innermost, &[target]);
            });
        }

        if fresh {
            context.release_detached(&nodes);
        }
        self
    }

    /// Detach all children of every node. Children no selection refers to
    /// are released.
    pub fn empty(&self) -> &Self {
        let cleared = self.children_of(self.nodes());
        let mut arena = self.context().arena_mut();
        for &id in self.nodes() {
            arena.clear_children(id);
        }
        drop(arena);
        self.context().release_detached(&cleared);
        self
    }

    /// Inner markup of the first node; `None` for an empty selection
    pub fn html(&self) -> Option<String> {
        let id = self.get(0)?;
        let arena = self.context().arena();
        let html = self.context().serializer().serialize_inner(&arena, id);
        Some(html)
    }

    /// Replace the children of every element with `content`. The elements
    /// keep their own tag and attributes.
    pub fn set_html<'a>(&self, content: impl Into<Content<'a>>) -> &Self {
        let targets = self.containers();
        let cleared = self.children_of(&targets);
        self.distribute(&targets, content.into(), |arena, target, nodes| {
            arena.clear_children(target);
            arena.append_children(target, nodes);
        });
        self.context().release_detached(&cleared);
        self
    }

    /// Markup of the first node including its own tag
    pub fn outer_html(&self) -> Option<String> {
        let id = self.get(0)?;
        let arena = self.context().arena();
        let html = self.context().serializer().serialize_outer(&arena, id);
        Some(html)
    }

    /// Combined text of every node, comments and script/style excluded
    pub fn text(&self) -> String {
        let arena = self.context().arena();
        let text = self.context().serializer().text_of(&arena, self.nodes());
        text
    }

    /// Replace the children of every element with one text node
    pub fn set_text(&self, value: &str) -> &Self {
        let targets = self.containers();
        let cleared = self.children_of(&targets);
        let mut arena = self.context().arena_mut();
        for target in targets {
            arena.clear_children(target);
            let text = arena.create_text(value);
            arena.append_children(target, &[text]);
        }
        drop(arena);
        self.context().release_detached(&cleared);
        self
    }

    /// Deep copies of every node, parentless and independent of the source
    pub fn clone_deep(&self) -> Selection {
        let mut arena = self.context().arena_mut();
        let copies = self
            .nodes()
            .iter()
            .filter_map(|&id| arena.clone_node(id, true))
            .collect();
        drop(arena);
        self.with_nodes(copies)
    }

    pub fn append_to(&self, target: &Selection) -> &Self {
        target.append(self);
        self
    }

    pub fn prepend_to(&self, target: &Selection) -> &Self {
        target.prepend(self);
        self
    }

    pub fn insert_before(&self, target: &Selection) -> &Self {
        target.before(self);
        self
    }

    pub fn insert_after(&self, target: &Selection) -> &Self {
        target.after(self);
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::{Context, LoadOptions};

    const FRUITS: &str = r#"<ul id="fruits"><li class="apple">Apple</li><li class="orange">Orange</li><li class="pear">Pear</li></ul>"#;

    fn fruits() -> Context {
        Context::load(FRUITS, LoadOptions::default())
    }

    #[test]
    fn test_append_and_prepend_markup() {
        let ctx = fruits();
        let ul = ctx.select("ul").unwrap();
        ul.append(r#"<li class="plum">Plum</li>"#)
            .prepend(r#"<li class="kiwi">Kiwi</li>"#);
        assert_eq!(
            ul.children().iter().map(|li| li.text()).collect::<Vec<_>>(),
            vec!["Kiwi", "Apple", "Orange", "Pear", "Plum"]
        );
    }

    #[test]
    fn test_append_moves_existing_nodes() {
        let ctx = fruits();
        let ul = ctx.select("ul").unwrap();
        let apple = ctx.select(".apple").unwrap();
        ul.append(&apple);
        assert_eq!(ul.text(), "OrangePearApple");
        assert_eq!(ul.children().len(), 3);
        assert_eq!(apple.prev().attr("class").as_deref(), Some("pear"));
    }

    #[test]
    fn test_multiple_targets_get_copies() {
        let ctx = Context::load("<p></p><p></p><b>x</b>", LoadOptions::default());
        let ps = ctx.select("p").unwrap();
        let b = ctx.select("b").unwrap();
        ps.append(&b);
        assert_eq!(ctx.html(), "<p><b>x</b></p><p><b>x</b></p>");
        assert_eq!(b.parent().get(0), ps.get(1));
    }

    #[test]
    fn test_cyclic_insertion_is_skipped() {
        let ctx = fruits();
        let ul = ctx.select("ul").unwrap();
        ctx.select(".apple").unwrap().append(&ul);
        assert_eq!(ctx.html(), FRUITS);
        ul.append(&ul);
        assert_eq!(ctx.html(), FRUITS);
    }

    #[test]
    fn test_before_and_after() {
        let ctx = fruits();
        let orange = ctx.select(".orange").unwrap();
        orange.before("<li>b</li>").after("<li>a</li>");
        assert_eq!(ctx.select("li").unwrap().text(), "ApplebOrangeaPear");

        let loose = ctx.create("<i></i>");
        loose.before("<b></b>").after("<b></b>");
        assert_eq!(ctx.select("b").unwrap().len(), 0);
    }

    #[test]
    fn test_insert_before_after_to() {
        let ctx = fruits();
        let pear = ctx.select(".pear").unwrap();
        let apple = ctx.select(".apple").unwrap();
        pear.insert_before(&apple);
        assert_eq!(ctx.select("li").unwrap().text(), "PearAppleOrange");

        let ul = ctx.select("ul").unwrap();
        let copy = pear.clone_deep();
        copy.append_to(&ul);
        apple.insert_after(&copy);
        assert_eq!(ctx.select("li").unwrap().text(), "PearOrangePearApple");

        ctx.create("<li>First</li>").prepend_to(&ul);
        assert_eq!(ctx.select("li").unwrap().first().text(), "First");
    }

    #[test]
    fn test_remove_and_empty() {
        let ctx = fruits();
        let orange = ctx.select(".orange").unwrap();
        orange.remove();
        assert_eq!(ctx.select("li").unwrap().len(), 2);
        assert_eq!(orange.text(), "Orange");
        assert!(orange.parent().is_empty());

        ctx.select("ul").unwrap().empty();
        assert_eq!(ctx.html(), r#"<ul id="fruits"></ul>"#);
    }

    #[test]
    fn test_replace_with() {
        let ctx = fruits();
        ctx.select(".pear").unwrap().replace_with("<li class=plum>Plum</li>");
        assert_eq!(ctx.select("li").unwrap().text(), "AppleOrangePlum");
        assert!(ctx.select(".pear").unwrap().is_empty());
    }

    #[test]
    fn test_wrap() {
        let ctx = Context::load("<p>a</p><p>b</p>", LoadOptions::default());
        ctx.select("p").unwrap().wrap("<div><section></section></div>");
        assert_eq!(
            ctx.html(),
            "<div><section><p>a</p></section></div><div><section><p>b</p></section></div>"
        );
    }

    #[test]
    fn test_html_getter_and_setter() {
        let ctx = fruits();
        let ul = ctx.select("ul").unwrap();
        assert!(ul.html().unwrap().starts_with(r#"<li class="apple">"#));
        assert_eq!(ctx.select("table").unwrap().html(), None);

        ul.set_html("");
        assert_eq!(ul.outer_html().as_deref(), Some(r#"<ul id="fruits"></ul>"#));
        assert_eq!(ul.html().as_deref(), Some(""));

        ul.set_html("<li>x</li>");
        assert_eq!(ctx.html(), r#"<ul id="fruits"><li>x</li></ul>"#);
    }

    #[test]
    fn test_text_setter() {
        let ctx = fruits();
        ctx.select("li").unwrap().set_text("<fruit>");
        assert_eq!(ctx.select("li").unwrap().text(), "<fruit><fruit><fruit>");
        assert!(ctx.html().contains("<li class=\"apple\">&lt;fruit&gt;</li>"));
    }

    #[test]
    fn test_clone_is_independent() {
        let ctx = fruits();
        let ul = ctx.select("ul").unwrap();
        let copy = ul.clone_deep();
        assert_eq!(copy.outer_html(), ul.outer_html());

        ul.find(".apple").unwrap().set_text("Crab");
        assert_eq!(copy.find(".apple").unwrap().text(), "Apple");
        copy.find(".pear").unwrap().remove();
        assert_eq!(ul.children().len(), 3);
    }

    #[test]
    fn test_cross_context_content_is_copied() {
        let target = fruits();
        let source = Context::load("<li class=plum>Plum</li>", LoadOptions::default());
        let plum = source.select("li").unwrap();
        target.select("ul").unwrap().append(&plum);
        assert_eq!(target.select(".plum").unwrap().text(), "Plum");
        assert_eq!(source.html(), r#"<li class="plum">Plum</li>"#);

        target.select("ul").unwrap().append(&source.root());
        assert_eq!(target.select(".plum").unwrap().len(), 2);
    }

    #[test]
    fn test_root_append_is_visible_everywhere() {
        let ctx = Context::load(
            "<div><span>foo</span><span>bar</span></div>",
            LoadOptions::default(),
        );
        let spans = ctx.select("span").unwrap();
        ctx.root().append(r#"<div id="test"></div>"#);
        assert_eq!(
            ctx.html(),
            r#"<div><span>foo</span><span>bar</span></div><div id="test"></div>"#
        );
        assert_eq!(ctx.root().children().len(), 2);
        assert_eq!(spans.parent().next().attr("id").as_deref(), Some("test"));
    }

    #[test]
    fn test_replaced_children_are_reused() {
        let ctx = Context::load("<p>x</p>", LoadOptions::default());
        let p = ctx.select("p").unwrap();
        let allocated = ctx.arena().allocated();
        for _ in 0..10_000 {
            p.set_text("y");
        }
        assert_eq!(p.text(), "y");
        assert_eq!(ctx.node_count(), 3);
        assert!(ctx.arena().allocated() <= allocated + 1);

        for _ in 0..1_000 {
            p.set_html("<b>z</b>");
        }
        assert_eq!(ctx.html(), "<p><b>z</b></p>");
        assert_eq!(ctx.node_count(), 4);
    }

    #[test]
    fn test_selected_nodes_survive_empty() {
        let ctx = fruits();
        let apple = ctx.select(".apple").unwrap();
        let before = ctx.node_count();
        ctx.select("ul").unwrap().empty();

        assert_eq!(apple.text(), "Apple");
        assert_eq!(apple.parent().len(), 0);
        // orange and pear with their text nodes
        assert_eq!(ctx.node_count(), before - 4);

        ctx.select("ul").unwrap().append(&apple);
        assert_eq!(ctx.html(), r#"<ul id="fruits"><li class="apple">Apple</li></ul>"#);
    }

    #[test]
    fn test_unplaced_markup_is_released() {
        let ctx = fruits();
        let before = ctx.node_count();
        ctx.select("table").unwrap().append("<li>x</li>");
        ctx.select("table").unwrap().wrap("<div></div>");
        assert_eq!(ctx.node_count(), before);

        let removed = ctx.select(".pear").unwrap().remove().attr("class");
        assert_eq!(removed.as_deref(), Some("pear"));
        assert_eq!(ctx.node_count(), before);
    }
}
