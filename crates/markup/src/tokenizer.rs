//! Tolerant markup tokenizer and tree builder
//!
//! Single pass over the input. Tags are recognised only when `<` is followed
//! by a tag-name start, `/`, `!` or `?`; every other `<` is text. Recovery
//! rules:
//! - elements still open at end of input are closed there
//! - an end tag closes the nearest open element with that name (and anything
//!   opened inside it); end tags with no open match are dropped
//! - opening some elements implicitly closes an open sibling (`li`, `p`, ...)
//! - void elements never take children, raw-text elements swallow everything
//!   up to their own end tag

use std::borrow::Cow;

use memchr::memchr;
use serde::{Deserialize, Serialize};

use crate::{entities, is_raw_text_element, is_void_element, ESCAPABLE_RAW_TEXT_ELEMENTS};

/// Options applied while building the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParseOptions {
    /// No HTML special cases: case preserved, `<x/>` self-closes, no void
    /// or raw-text elements.
    pub xml_mode: bool,
    pub lower_case_tags: bool,
    pub lower_case_attribute_names: bool,
    /// Decode character references in text and attribute values.
    pub decode_entities: bool,
    /// Collapse whitespace runs in text to a single space.
    pub normalize_whitespace: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            xml_mode: false,
            lower_case_tags: true,
            lower_case_attribute_names: true,
            decode_entities: true,
            normalize_whitespace: false,
        }
    }
}

impl ParseOptions {
    /// XML defaults: names keep their case
    pub fn xml() -> Self {
        Self {
            xml_mode: true,
            lower_case_tags: false,
            lower_case_attribute_names: false,
            ..Self::default()
        }
    }
}

/// Owned node produced by a [`TreeSource`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawNode {
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<RawNode>,
    },
    Text(String),
    Comment(String),
    /// `<!DOCTYPE ...>` and `<?...?>`; data is everything between `<` and `>`.
    Directive(String),
}

impl RawNode {
    pub fn element(name: &str) -> Self {
        RawNode::Element {
            name: name.to_string(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Tag name for element nodes
    pub fn name(&self) -> Option<&str> {
        match self {
            RawNode::Element { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Anything that can turn markup into a list of top-level nodes.
///
/// Implementations must not fail: malformed input is repaired, never rejected.
pub trait TreeSource {
    fn parse(&self, input: &str, options: &ParseOptions) -> Vec<RawNode>;
}

/// Decode a byte buffer as UTF-8, dropping a BOM and replacing invalid
/// sequences.
pub fn decode_bytes(bytes: &[u8]) -> Cow<'_, str> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    String::from_utf8_lossy(bytes)
}

/// Default [`TreeSource`]
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlTokenizer;

impl HtmlTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl TreeSource for HtmlTokenizer {
    fn parse(&self, input: &str, options: &ParseOptions) -> Vec<RawNode> {
        let roots = TreeBuilder::new(input, options).run();
        tracing::trace!(
            "[Tokenizer] Tokenized {} bytes into {} top-level nodes",
            input.len(),
            roots.len()
        );
        roots
    }
}

/// Elements whose start tag closes an open `p`.
const P_CLOSERS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "details",
    "div",
    "dl",
    "fieldset",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "ul",
];

fn closes_implicitly(opening: &str, open: &str) -> bool {
    match opening {
        "li" => open == "li",
        "dt" | "dd" => matches!(open, "dt" | "dd"),
        "tr" => matches!(open, "tr" | "td" | "th"),
        "td" | "th" => matches!(open, "td" | "th"),
        "option" => open == "option",
        "optgroup" => matches!(open, "optgroup" | "option"),
        "thead" | "tbody" | "tfoot" => matches!(open, "thead" | "tbody" | "tr" | "td" | "th"),
        _ => open == "p" && P_CLOSERS.contains(&opening),
    }
}

fn is_html_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C')
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
                in_whitespace = true;
            }
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

/// Find `</name` followed by whitespace, `/` or `>`. Returns the offset of
/// `<` and the offset just past the closing `>`.
fn find_raw_close(haystack: &str, name: &str) -> Option<(usize, usize)> {
    let bytes = haystack.as_bytes();
    let name = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        i += memchr(b'<', &bytes[i..])?;
        let name_start = i + 2;
        let name_end = name_start + name.len();
        let is_close = bytes.get(i + 1) == Some(&b'/')
            && bytes
                .get(name_start..name_end)
                .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
            && bytes
                .get(name_end)
                .map_or(true, |b| is_html_whitespace(*b) || *b == b'/' || *b == b'>');
        if is_close {
            let end = memchr(b'>', &bytes[name_end..])
                .map(|off| name_end + off + 1)
                .unwrap_or(bytes.len());
            return Some((i, end));
        }
        i += 1;
    }
    None
}

struct StartTag<'a> {
    name: &'a str,
    attrs: Vec<(&'a str, &'a str)>,
    self_closing: bool,
}

/// Parse a start tag at the beginning of `rest` (which starts with `<`).
/// Returns `None` when the tag is never terminated.
fn parse_start_tag(rest: &str) -> Option<(StartTag<'_>, usize)> {
    let bytes = rest.as_bytes();
    let len = bytes.len();
    let mut i = 1;
    while i < len && !is_html_whitespace(bytes[i]) && bytes[i] != b'/' && bytes[i] != b'>' {
        i += 1;
    }
    let name = &rest[1..i];
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while i < len && is_html_whitespace(bytes[i]) {
            i += 1;
        }
        match bytes.get(i) {
            None => return None,
            Some(b'>') => {
                i += 1;
                break;
            }
            Some(b'/') => {
                if bytes.get(i + 1) == Some(&b'>') {
                    self_closing = true;
                    i += 2;
                    break;
                }
                i += 1;
                continue;
            }
            Some(_) => {}
        }

        // A leading `=` belongs to the name.
        let name_start = i;
        i += 1;
        while i < len
            && !is_html_whitespace(bytes[i])
            && !matches!(bytes[i], b'/' | b'>' | b'=')
        {
            i += 1;
        }
        let attr_name = &rest[name_start..i];

        while i < len && is_html_whitespace(bytes[i]) {
            i += 1;
        }
        let mut value = "";
        if bytes.get(i) == Some(&b'=') {
            i += 1;
            while i < len && is_html_whitespace(bytes[i]) {
                i += 1;
            }
            match bytes.get(i) {
                Some(&quote @ (b'"' | b'\'')) => {
                    let value_start = i + 1;
                    let off = memchr(quote, &bytes[value_start..])?;
                    value = &rest[value_start..value_start + off];
                    i = value_start + off + 1;
                }
                _ => {
                    let value_start = i;
                    while i < len && !is_html_whitespace(bytes[i]) && bytes[i] != b'>' {
                        i += 1;
                    }
                    value = &rest[value_start..i];
                }
            }
        }
        attrs.push((attr_name, value));
    }

    Some((
        StartTag {
            name,
            attrs,
            self_closing,
        },
        i,
    ))
}

struct OpenElement {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<RawNode>,
}

impl OpenElement {
    fn into_node(self) -> RawNode {
        RawNode::Element {
            name: self.name,
            attrs: self.attrs,
            children: self.children,
        }
    }
}

struct TreeBuilder<'a> {
    input: &'a str,
    pos: usize,
    options: &'a ParseOptions,
    open: Vec<OpenElement>,
    roots: Vec<RawNode>,
    text: String,
}

impl<'a> TreeBuilder<'a> {
    fn new(input: &'a str, options: &'a ParseOptions) -> Self {
        Self {
            input,
            pos: 0,
            options,
            open: Vec::new(),
            roots: Vec::new(),
            text: String::new(),
        }
    }

    fn run(mut self) -> Vec<RawNode> {
        let input = self.input;
        while self.pos < input.len() {
            let rest = &input[self.pos..];
            match memchr(b'<', rest.as_bytes()) {
                None => {
                    self.push_text(rest);
                    self.pos = input.len();
                }
                Some(offset) => {
                    self.push_text(&rest[..offset]);
                    self.pos += offset;
                    if !self.consume_markup() {
                        self.text.push('<');
                        self.pos += 1;
                    }
                }
            }
        }
        self.flush_text();
        while !self.open.is_empty() {
            self.close_top();
        }
        self.roots
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        if self.options.decode_entities {
            self.text.push_str(&entities::decode(raw));
        } else {
            self.text.push_str(raw);
        }
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        let text = if self.options.normalize_whitespace {
            collapse_whitespace(&text)
        } else {
            text
        };
        self.append(RawNode::Text(text));
    }

    /// Add a node to the innermost open element. Text following a text
    /// sibling (left behind by a dropped end tag) joins it.
    fn append(&mut self, node: RawNode) {
        let normalize = self.options.normalize_whitespace;
        let siblings = match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.roots,
        };
        if let RawNode::Text(text) = &node {
            if let Some(RawNode::Text(previous)) = siblings.last_mut() {
                previous.push_str(text);
                if normalize {
                    *previous = collapse_whitespace(previous);
                }
                return;
            }
        }
        siblings.push(node);
    }

    fn close_top(&mut self) {
        if let Some(element) = self.open.pop() {
            self.append(element.into_node());
        }
    }

    /// Try to consume a tag, comment or directive at `self.pos`. Returns
    /// false when the `<` there is plain text.
    fn consume_markup(&mut self) -> bool {
        let input = self.input;
        let rest = &input[self.pos..];
        let Some(next) = rest[1..].chars().next() else {
            return false;
        };

        match next {
            '!' => self.consume_bang(rest),
            '?' => match memchr(b'>', rest.as_bytes()) {
                Some(gt) => {
                    self.flush_text();
                    self.append(RawNode::Directive(rest[1..gt].to_string()));
                    self.pos += gt + 1;
                    true
                }
                None => false,
            },
            '/' => self.consume_end_tag(rest),
            c if c.is_ascii_alphabetic() || (self.options.xml_mode && matches!(c, '_' | ':')) => {
                self.consume_start_tag(rest)
            }
            _ => false,
        }
    }

    fn consume_bang(&mut self, rest: &'a str) -> bool {
        if let Some(body) = rest.strip_prefix("<!--") {
            let (data, consumed) = match body.find("-->") {
                Some(end) => (&body[..end], 4 + end + 3),
                None => (body, rest.len()),
            };
            self.flush_text();
            self.append(RawNode::Comment(data.to_string()));
            self.pos += consumed;
            return true;
        }

        if let Some(body) = rest.strip_prefix("<![CDATA[") {
            let (data, consumed) = match body.find("]]>") {
                Some(end) => (&body[..end], 9 + end + 3),
                None => (body, rest.len()),
            };
            if self.options.xml_mode {
                self.text.push_str(data);
            } else {
                self.flush_text();
                self.append(RawNode::Comment(format!("[CDATA[{}]]", data)));
            }
            self.pos += consumed;
            return true;
        }

        match memchr(b'>', rest.as_bytes()) {
            Some(gt) => {
                self.flush_text();
                self.append(RawNode::Directive(rest[1..gt].to_string()));
                self.pos += gt + 1;
                true
            }
            None => false,
        }
    }

    fn consume_end_tag(&mut self, rest: &'a str) -> bool {
        let bytes = rest.as_bytes();
        let mut name_end = 2;
        while name_end < bytes.len()
            && !is_html_whitespace(bytes[name_end])
            && !matches!(bytes[name_end], b'/' | b'>')
        {
            name_end += 1;
        }
        let Some(gt) = memchr(b'>', &bytes[name_end..]).map(|off| name_end + off) else {
            return false;
        };
        if name_end == 2 && gt != 2 {
            // `</ foo>` is not an end tag
            return false;
        }

        self.flush_text();
        self.close_element(&rest[2..name_end]);
        self.pos += gt + 1;
        true
    }

    fn close_element(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        let xml = self.options.xml_mode;
        let found = self.open.iter().rposition(|open| {
            if xml {
                open.name == name
            } else {
                open.name.eq_ignore_ascii_case(name)
            }
        });
        match found {
            Some(idx) => {
                while self.open.len() > idx {
                    self.close_top();
                }
            }
            None => tracing::trace!("[Tokenizer] Dropping unmatched end tag </{}>", name),
        }
    }

    fn consume_start_tag(&mut self, rest: &'a str) -> bool {
        let Some((tag, consumed)) = parse_start_tag(rest) else {
            return false;
        };
        self.flush_text();
        self.pos += consumed;

        let options = self.options;
        let name = if options.lower_case_tags {
            tag.name.to_ascii_lowercase()
        } else {
            tag.name.to_string()
        };

        let mut attrs: Vec<(String, String)> = Vec::with_capacity(tag.attrs.len());
        for (attr_name, value) in tag.attrs {
            let attr_name = if options.lower_case_attribute_names {
                attr_name.to_ascii_lowercase()
            } else {
                attr_name.to_string()
            };
            if attrs.iter().any(|(existing, _)| *existing == attr_name) {
                continue;
            }
            let value = if options.decode_entities {
                entities::decode(value).into_owned()
            } else {
                value.to_string()
            };
            attrs.push((attr_name, value));
        }

        if options.xml_mode {
            let element = OpenElement {
                name,
                attrs,
                children: Vec::new(),
            };
            if tag.self_closing {
                self.append(element.into_node());
            } else {
                self.open.push(element);
            }
            return true;
        }

        let lower = name.to_ascii_lowercase();
        while self
            .open
            .last()
            .is_some_and(|top| closes_implicitly(&lower, &top.name.to_ascii_lowercase()))
        {
            self.close_top();
        }

        let mut element = OpenElement {
            name,
            attrs,
            children: Vec::new(),
        };

        if is_void_element(&lower) {
            self.append(element.into_node());
        } else if is_raw_text_element(&lower) || ESCAPABLE_RAW_TEXT_ELEMENTS.contains(&lower.as_str())
        {
            let input = self.input;
            let body = &input[self.pos..];
            let (content, consumed) = match find_raw_close(body, &lower) {
                Some((start, end)) => (&body[..start], end),
                None => (body, body.len()),
            };
            if !content.is_empty() {
                let text = if options.decode_entities && !is_raw_text_element(&lower) {
                    entities::decode(content).into_owned()
                } else {
                    content.to_string()
                };
                element.children.push(RawNode::Text(text));
            }
            self.pos += consumed;
            self.append(element.into_node());
        } else {
            self.open.push(element);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Vec<RawNode> {
        HtmlTokenizer::new().parse(input, &ParseOptions::default())
    }

    fn text(s: &str) -> RawNode {
        RawNode::Text(s.to_string())
    }

    #[test]
    fn test_nested_elements_and_text() {
        let nodes = parse("<div class=\"a\">Hi <b>there</b></div>");
        assert_eq!(
            nodes,
            vec![RawNode::Element {
                name: "div".into(),
                attrs: vec![("class".into(), "a".into())],
                children: vec![
                    text("Hi "),
                    RawNode::Element {
                        name: "b".into(),
                        attrs: vec![],
                        children: vec![text("there")],
                    },
                ],
            }]
        );
    }

    #[test]
    fn test_unclosed_tags_close_at_eof() {
        let nodes = parse("<span><span>");
        assert_eq!(nodes.len(), 1);
        let RawNode::Element { children, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_garbage_is_text() {
        let nodes = parse("<#if><tr><p>This is a test.</p></tr><#/if>");
        assert_eq!(nodes[0], text("<#if>"));
        assert_eq!(nodes[1].name(), Some("tr"));
    }

    #[test]
    fn test_leading_whitespace_is_kept() {
        let nodes = parse("\t<div></div>");
        assert_eq!(nodes[0], text("\t"));
        assert_eq!(nodes[1].name(), Some("div"));
    }

    #[test]
    fn test_script_is_raw_text() {
        let nodes = parse("<script>if (a < b) { x(\"</div>\") }</script><p>after</p>");
        assert_eq!(
            nodes[0],
            RawNode::Element {
                name: "script".into(),
                attrs: vec![],
                children: vec![text("if (a < b) { x(\"</div>\") }")],
            }
        );
        assert_eq!(nodes[1].name(), Some("p"));
    }

    #[test]
    fn test_void_elements_take_no_children() {
        let nodes = parse("<p>a<br>b</p>");
        let RawNode::Element { children, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(children, &vec![text("a"), RawNode::element("br"), text("b")]);
    }

    #[test]
    fn test_implied_end_tags() {
        let nodes = parse("<ul><li>one<li>two</ul>");
        let RawNode::Element { children, .. } = &nodes[0] else {
            panic!("expected element");
        };
        assert_eq!(children.len(), 2);
        assert!(children.iter().all(|c| c.name() == Some("li")));
    }

    #[test]
    fn test_stray_end_tag_dropped() {
        let nodes = parse("a</b>c");
        assert_eq!(nodes, vec![text("ac")]);

        let nodes = parse("<p>a</b>c</p>");
        assert_eq!(
            nodes,
            vec![RawNode::Element {
                name: "p".into(),
                attrs: vec![],
                children: vec![text("ac")],
            }]
        );
    }

    #[test]
    fn test_case_options() {
        let upper = parse("<BODY ID=x></BODY>");
        assert_eq!(
            upper[0],
            RawNode::Element {
                name: "body".into(),
                attrs: vec![("id".into(), "x".into())],
                children: vec![],
            }
        );

        let options = ParseOptions {
            lower_case_tags: false,
            lower_case_attribute_names: false,
            ..ParseOptions::default()
        };
        let kept = HtmlTokenizer::new().parse("<BODY ID=x></body>", &options);
        assert_eq!(kept[0].name(), Some("BODY"));
    }

    #[test]
    fn test_entities_and_whitespace_options() {
        let decoded = parse("<p title=\"a &amp; b\">&lt;x&gt;</p>");
        assert_eq!(
            decoded[0],
            RawNode::Element {
                name: "p".into(),
                attrs: vec![("title".into(), "a & b".into())],
                children: vec![text("<x>")],
            }
        );

        let options = ParseOptions {
            decode_entities: false,
            normalize_whitespace: true,
            ..ParseOptions::default()
        };
        let literal = HtmlTokenizer::new().parse("&amp;  \n x", &options);
        assert_eq!(literal, vec![text("&amp; x")]);

        let joined = HtmlTokenizer::new().parse("a </i> b", &options);
        assert_eq!(joined, vec![text("a b")]);
    }

    #[test]
    fn test_comments_and_directives() {
        let nodes = parse("<!DOCTYPE html><!-- note --><?xml version=\"1.0\"?>");
        assert_eq!(
            nodes,
            vec![
                RawNode::Directive("!DOCTYPE html".into()),
                RawNode::Comment(" note ".into()),
                RawNode::Directive("?xml version=\"1.0\"?".into()),
            ]
        );
    }

    #[test]
    fn test_xml_mode_self_closing() {
        let options = ParseOptions {
            xml_mode: true,
            lower_case_tags: false,
            lower_case_attribute_names: false,
            ..ParseOptions::default()
        };
        let nodes = HtmlTokenizer::new().parse("<Item/><script><b/></script>", &options);
        assert_eq!(nodes[0], RawNode::element("Item"));
        let RawNode::Element { children, .. } = &nodes[1] else {
            panic!("expected element");
        };
        assert_eq!(children, &vec![RawNode::element("b")]);
    }

    #[test]
    fn test_decode_bytes_strips_bom() {
        assert_eq!(decode_bytes(b"\xEF\xBB\xBF<div>"), "<div>");
        assert_eq!(decode_bytes(b"<div>foo</div>"), "<div>foo</div>");
    }
}
