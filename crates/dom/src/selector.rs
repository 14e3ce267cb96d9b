//! CSS selector compiler and matcher
//!
//! ```text
//! "ul > li.ripe, :has(> p)" → parse → CompiledSelector → match right-to-left
//! ```
//!
//! A compiled selector is a list of groups. Each group is a chain of
//! compound steps joined by combinators; matching starts at the rightmost
//! compound (which must match the candidate itself) and walks ancestors or
//! preceding siblings for the rest.

use std::fmt;
use std::str::FromStr;

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::{DomNode, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    /// whitespace
    Descendant,
    /// `>`
    Child,
    /// `+`
    Adjacent,
    /// `~`
    Sibling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
    NotEquals,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttributeSelector {
    name: String,
    op: AttrOp,
    value: String,
    ignore_case: bool,
}

/// `An+B`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Nth {
    a: i64,
    b: i64,
}

impl Nth {
    /// Is there an `n >= 0` with `a*n + b == position`? Widened to `i128`
    /// so extreme coefficients cannot overflow.
    fn matches(self, position: i64) -> bool {
        let (a, b) = (i128::from(self.a), i128::from(self.b));
        let diff = i128::from(position) - b;
        if a == 0 {
            return diff == 0;
        }
        diff % a == 0 && diff / a >= 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Simple {
    Universal,
    Type(String),
    Id(String),
    Class(String),
    Attribute(AttributeSelector),
    FirstChild,
    LastChild,
    OnlyChild,
    NthChild(Nth),
    NthLastChild(Nth),
    FirstOfType,
    LastOfType,
    Empty,
    Not(Vec<Complex>),
    Has(Vec<Complex>),
    Contains(String),
    /// The node a relative selector is anchored to
    Scope,
}

type Compound = Vec<Simple>;

/// Compounds left to right; `steps[i].0` joins compound `i - 1` to `i`
/// (ignored for the first step).
#[derive(Debug, Clone, PartialEq, Eq)]
struct Complex {
    steps: Vec<(Combinator, Compound)>,
}

impl Complex {
    /// Combinator leading a relative selector (`:has(> p)`)
    fn relative_combinator(&self) -> Option<Combinator> {
        match self.steps.first() {
            Some((_, compound)) if compound.as_slice() == [Simple::Scope] => {
                self.steps.get(1).map(|(c, _)| *c)
            }
            _ => None,
        }
    }
}

/// A validated selector, ready to be matched any number of times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSelector {
    groups: Vec<Complex>,
    source: String,
}

impl CompiledSelector {
    /// Parse and validate a selector string
    pub fn compile(selector: &str) -> Result<Self> {
        let groups = Parser::new(selector).parse().map_err(|err| {
            tracing::debug!("[Selector] Rejected selector: {}", err);
            err
        })?;
        Ok(Self {
            groups,
            source: selector.to_string(),
        })
    }

    /// The string this selector was compiled from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Does `node` itself match any group?
    pub fn matches(&self, arena: &DomArena, node: NodeId, xml_mode: bool) -> bool {
        let cx = MatchContext {
            arena,
            xml_mode,
            scope: None,
        };
        cx.matches_any(&self.groups, node)
    }

    /// Every matching descendant of `roots`, in document order and without
    /// duplicates. The roots themselves never match.
    pub fn query(&self, arena: &DomArena, roots: &[NodeId], xml_mode: bool) -> Vec<NodeId> {
        let mut roots = roots.to_vec();
        arena.sort_unique(&mut roots);

        let mut results = Vec::new();
        let mut last_kept: Option<NodeId> = None;
        for root in roots {
            // Already covered by an enclosing root
            if last_kept.is_some_and(|kept| arena.contains(kept, root)) {
                continue;
            }
            last_kept = Some(root);

            let cx = MatchContext {
                arena,
                xml_mode,
                scope: Some(root),
            };
            results.extend(
                arena
                    .descendants(root)
                    .into_iter()
                    .filter(|&id| arena.is_element(id) && cx.matches_any(&self.groups, id)),
            );
        }
        results
    }
}

impl FromStr for CompiledSelector {
    type Err = DomError;

    fn from_str(s: &str) -> Result<Self> {
        Self::compile(s)
    }
}

impl fmt::Display for CompiledSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct MatchContext<'a> {
    arena: &'a DomArena,
    xml_mode: bool,
    scope: Option<NodeId>,
}

impl MatchContext<'_> {
    fn matches_any(&self, groups: &[Complex], node: NodeId) -> bool {
        groups
            .iter()
            .any(|complex| self.match_step(complex, complex.steps.len() - 1, node))
    }

    fn match_step(&self, complex: &Complex, idx: usize, node: NodeId) -> bool {
        let (combinator, compound) = &complex.steps[idx];
        if !self.match_compound(compound, node) {
            return false;
        }
        if idx == 0 {
            return true;
        }

        let arena = self.arena;
        match combinator {
            Combinator::Child => arena
                .parent(node)
                .is_some_and(|p| self.match_step(complex, idx - 1, p)),
            Combinator::Descendant => arena
                .ancestors(node)
                .any(|a| self.match_step(complex, idx - 1, a)),
            Combinator::Adjacent => arena
                .prev_element_sibling(node)
                .is_some_and(|s| self.match_step(complex, idx - 1, s)),
            Combinator::Sibling => {
                let mut current = arena.prev_element_sibling(node);
                while let Some(sibling) = current {
                    if self.match_step(complex, idx - 1, sibling) {
                        return true;
                    }
                    current = arena.prev_element_sibling(sibling);
                }
                false
            }
        }
    }

    fn match_compound(&self, compound: &Compound, node_id: NodeId) -> bool {
        let Some(node) = self.arena.node(node_id) else {
            return false;
        };
        if !node.is_element() && !compound.contains(&Simple::Scope) {
            return false;
        }
        compound.iter().all(|simple| self.match_simple(simple, node))
    }

    fn names_equal(&self, a: &str, b: &str) -> bool {
        if self.xml_mode {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    /// 1-based position among element siblings, and the sibling count
    fn element_position(&self, node: &DomNode, same_type: bool) -> (i64, i64) {
        let arena = self.arena;
        let Some(parent) = node.parent_id else {
            return (1, 1);
        };
        let mut position = 0;
        let mut count = 0;
        for sibling in arena.element_children(parent) {
            if same_type {
                let same = arena
                    .node(sibling)
                    .and_then(|s| s.tag_name())
                    .zip(node.tag_name())
                    .is_some_and(|(a, b)| self.names_equal(a, b));
                if !same {
                    continue;
                }
            }
            count += 1;
            if sibling == node.node_id {
                position = count;
            }
        }
        (position, count)
    }

    fn match_simple(&self, simple: &Simple, node: &DomNode) -> bool {
        let arena = self.arena;
        match simple {
            Simple::Scope => self.scope == Some(node.node_id),
            Simple::Universal => node.is_element(),
            Simple::Type(name) => node.tag_name().is_some_and(|t| self.names_equal(t, name)),
            Simple::Id(id) => node.attr("id") == Some(id.as_str()),
            Simple::Class(class) => node
                .as_element()
                .is_some_and(|e| e.classes().any(|c| c == class)),
            Simple::Attribute(attr) => self.match_attribute(attr, node),
            Simple::FirstChild => arena.prev_element_sibling(node.node_id).is_none(),
            Simple::LastChild => arena.next_element_sibling(node.node_id).is_none(),
            Simple::OnlyChild => {
                arena.prev_element_sibling(node.node_id).is_none()
                    && arena.next_element_sibling(node.node_id).is_none()
            }
            Simple::NthChild(nth) => {
                let (position, _) = self.element_position(node, false);
                nth.matches(position)
            }
            Simple::NthLastChild(nth) => {
                let (position, count) = self.element_position(node, false);
                nth.matches(count - position + 1)
            }
            Simple::FirstOfType => self.element_position(node, true).0 == 1,
            Simple::LastOfType => {
                let (position, count) = self.element_position(node, true);
                position == count
            }
            Simple::Empty => node.children_ids.iter().all(|&c| {
                arena
                    .node(c)
                    .is_some_and(|child| match child.data() {
                        Some(text) if child.is_text() => text.is_empty(),
                        _ => !child.is_element(),
                    })
            }),
            Simple::Not(groups) => !self.matches_any(groups, node.node_id),
            Simple::Has(groups) => self.match_has(groups, node.node_id),
            Simple::Contains(text) => arena.text_content(node.node_id).contains(text.as_str()),
        }
    }

    fn match_attribute(&self, attr: &AttributeSelector, node: &DomNode) -> bool {
        let Some(element) = node.as_element() else {
            return false;
        };
        let actual = if self.xml_mode {
            element.attrs.get(&attr.name)
        } else {
            element.attrs.get_ignore_case(&attr.name)
        };

        let Some(actual) = actual else {
            return attr.op == AttrOp::NotEquals;
        };
        if attr.op == AttrOp::Exists {
            return true;
        }

        let (actual, expected) = if attr.ignore_case {
            (actual.to_ascii_lowercase(), attr.value.to_ascii_lowercase())
        } else {
            (actual.to_string(), attr.value.clone())
        };

        match attr.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == expected,
            AttrOp::NotEquals => actual != expected,
            AttrOp::Includes => {
                !expected.is_empty()
                    && !expected.contains(char::is_whitespace)
                    && actual.split_ascii_whitespace().any(|w| w == expected)
            }
            AttrOp::DashMatch => {
                actual == expected
                    || (actual.starts_with(&expected)
                        && actual.as_bytes().get(expected.len()) == Some(&b'-'))
            }
            AttrOp::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOp::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOp::Substring => !expected.is_empty() && actual.contains(&expected),
        }
    }

    /// Relative selectors anchored at `node`
    fn match_has(&self, groups: &[Complex], node: NodeId) -> bool {
        let arena = self.arena;
        let inner = MatchContext {
            arena,
            xml_mode: self.xml_mode,
            scope: Some(node),
        };

        groups.iter().any(|complex| {
            let candidates = match complex.relative_combinator() {
                Some(Combinator::Adjacent | Combinator::Sibling) => {
                    let mut out = Vec::new();
                    let mut current = arena.next_element_sibling(node);
                    while let Some(sibling) = current {
                        out.push(sibling);
                        out.extend(arena.descendants(sibling));
                        current = arena.next_element_sibling(sibling);
                    }
                    out
                }
                _ => arena.descendants(node),
            };
            let last = complex.steps.len() - 1;
            candidates
                .into_iter()
                .any(|c| arena.is_element(c) && inner.match_step(complex, last, c))
        })
    }
}

/// Recursive-descent parser over the selector's characters
struct Parser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.chars().collect(),
            pos: 0,
        }
    }

    fn error<T>(&self, reason: impl Into<String>) -> Result<T> {
        Err(DomError::Syntax {
            selector: self.source.to_string(),
            position: self.pos,
            reason: reason.into(),
        })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn parse(mut self) -> Result<Vec<Complex>> {
        let groups = self.parse_list(false)?;
        if self.peek().is_some() {
            return self.error(format!("unexpected character `{}`", self.chars[self.pos]));
        }
        Ok(groups)
    }

    /// Comma-separated groups, up to end of input or a closing `)`
    fn parse_list(&mut self, relative: bool) -> Result<Vec<Complex>> {
        let mut groups = Vec::new();
        loop {
            self.skip_whitespace();
            groups.push(self.parse_complex(relative)?);
            self.skip_whitespace();
            if !self.eat(',') {
                break;
            }
        }
        Ok(groups)
    }

    fn parse_combinator(&mut self) -> Option<Combinator> {
        let combinator = match self.peek()? {
            '>' => Combinator::Child,
            '+' => Combinator::Adjacent,
            '~' => Combinator::Sibling,
            _ => return None,
        };
        self.pos += 1;
        Some(combinator)
    }

    fn parse_complex(&mut self, relative: bool) -> Result<Complex> {
        let mut steps = Vec::new();
        let mut combinator = Combinator::Descendant;

        if relative {
            steps.push((Combinator::Descendant, vec![Simple::Scope]));
            if let Some(leading) = self.parse_combinator() {
                combinator = leading;
                self.skip_whitespace();
            }
        }

        loop {
            match self.parse_compound()? {
                Some(compound) => steps.push((combinator, compound)),
                None if self.peek().is_none() && !steps.is_empty() => {
                    return self.error("selector ends with a combinator");
                }
                None => return self.error("expected a selector"),
            }

            let had_space = self.skip_whitespace();
            combinator = match self.parse_combinator() {
                Some(c) => {
                    self.skip_whitespace();
                    c
                }
                None if had_space && self.at_compound_start() => Combinator::Descendant,
                None => break,
            };
        }

        Ok(Complex { steps })
    }

    fn at_compound_start(&self) -> bool {
        match self.peek() {
            Some(c) => matches!(c, '*' | '#' | '.' | '[' | ':') || is_ident_start(c) || c == '\\',
            None => false,
        }
    }

    fn parse_compound(&mut self) -> Result<Option<Compound>> {
        let mut compound = Vec::new();
        loop {
            match self.peek() {
                Some('*') => {
                    self.pos += 1;
                    compound.push(Simple::Universal);
                }
                Some('#') => {
                    self.pos += 1;
                    compound.push(Simple::Id(self.parse_name()?));
                }
                Some('.') => {
                    self.pos += 1;
                    compound.push(Simple::Class(self.parse_name()?));
                }
                Some('[') => {
                    self.pos += 1;
                    compound.push(Simple::Attribute(self.parse_attribute()?));
                }
                Some(':') => {
                    self.pos += 1;
                    compound.push(self.parse_pseudo()?);
                }
                Some(c) if compound.is_empty() && (is_ident_start(c) || c == '\\') => {
                    compound.push(Simple::Type(self.parse_name()?));
                }
                _ => break,
            }
        }
        Ok((!compound.is_empty()).then_some(compound))
    }

    /// Identifier with CSS escapes (`\:`, `\31 `)
    fn parse_name(&mut self) -> Result<String> {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                name.push(self.parse_escape()?);
            } else if is_ident_char(c) {
                name.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if name.is_empty() {
            return self.error("expected a name");
        }
        Ok(name)
    }

    fn parse_escape(&mut self) -> Result<char> {
        let start = self.pos;
        while self.pos - start < 6 && self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.pos += 1;
        }
        if self.pos > start {
            let hex: String = self.chars[start..self.pos].iter().collect();
            let value = u32::from_str_radix(&hex, 16).unwrap_or(0xFFFD);
            // one whitespace terminates a hex escape
            if self.peek().is_some_and(char::is_whitespace) {
                self.pos += 1;
            }
            return Ok(char::from_u32(value)
                .filter(|&c| c != '\0')
                .unwrap_or('\u{FFFD}'));
        }
        match self.bump() {
            Some(c) => Ok(c),
            None => self.error("unterminated escape"),
        }
    }

    fn parse_quoted(&mut self, quote: char) -> Result<String> {
        let mut value = String::new();
        loop {
            match self.bump() {
                Some(c) if c == quote => return Ok(value),
                Some('\\') => value.push(self.parse_escape()?),
                Some(c) => value.push(c),
                None => return self.error("unclosed string"),
            }
        }
    }

    fn parse_attribute(&mut self) -> Result<AttributeSelector> {
        self.skip_whitespace();
        let name = self.parse_name()?;
        self.skip_whitespace();

        let op = match (self.peek(), self.peek_at(1)) {
            (Some(']'), _) => {
                self.pos += 1;
                return Ok(AttributeSelector {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                    ignore_case: false,
                });
            }
            (Some('='), _) => AttrOp::Equals,
            (Some('~'), Some('=')) => AttrOp::Includes,
            (Some('|'), Some('=')) => AttrOp::DashMatch,
            (Some('^'), Some('=')) => AttrOp::Prefix,
            (Some('$'), Some('=')) => AttrOp::Suffix,
            (Some('*'), Some('=')) => AttrOp::Substring,
            (Some('!'), Some('=')) => AttrOp::NotEquals,
            (None, _) => return self.error("unclosed `[`"),
            _ => return self.error("expected an attribute operator"),
        };
        self.pos += if op == AttrOp::Equals { 1 } else { 2 };
        self.skip_whitespace();

        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.pos += 1;
                self.parse_quoted(q)?
            }
            Some(_) => self.parse_name()?,
            None => return self.error("unclosed `[`"),
        };

        let had_space = self.skip_whitespace();
        let mut ignore_case = false;
        if had_space {
            match self.peek() {
                Some('i' | 'I') => {
                    self.pos += 1;
                    ignore_case = true;
                }
                Some('s' | 'S') => self.pos += 1,
                _ => {}
            }
            self.skip_whitespace();
        }

        match self.bump() {
            Some(']') => Ok(AttributeSelector {
                name,
                op,
                value,
                ignore_case,
            }),
            Some(_) => {
                self.pos -= 1;
                self.error("expected `]`")
            }
            None => self.error("unclosed `[`"),
        }
    }

    fn expect_close_paren(&mut self) -> Result<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(')') => {
                self.pos += 1;
                Ok(())
            }
            Some(_) => self.error("expected `)`"),
            None => self.error("unclosed `(`"),
        }
    }

    /// Raw argument text up to the closing `)`
    fn parse_raw_argument(&mut self) -> Result<String> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == ')' {
                let arg: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                return Ok(arg);
            }
            self.pos += 1;
        }
        self.error("unclosed `(`")
    }

    fn parse_pseudo(&mut self) -> Result<Simple> {
        if self.peek() == Some(':') {
            return self.error("pseudo-elements are not supported");
        }
        let name = self.parse_name()?.to_ascii_lowercase();
        let functional = self.eat('(');

        let simple = match (name.as_str(), functional) {
            ("first-child", false) => Simple::FirstChild,
            ("last-child", false) => Simple::LastChild,
            ("only-child", false) => Simple::OnlyChild,
            ("first-of-type", false) => Simple::FirstOfType,
            ("last-of-type", false) => Simple::LastOfType,
            ("empty", false) => Simple::Empty,
            ("scope", false) => Simple::Scope,
            ("nth-child", true) => {
                let arg = self.parse_raw_argument()?;
                Simple::NthChild(self.parse_nth(&arg)?)
            }
            ("nth-last-child", true) => {
                let arg = self.parse_raw_argument()?;
                Simple::NthLastChild(self.parse_nth(&arg)?)
            }
            ("not", true) => {
                let groups = self.parse_list(false)?;
                self.expect_close_paren()?;
                Simple::Not(groups)
            }
            ("has", true) => {
                let groups = self.parse_list(true)?;
                self.expect_close_paren()?;
                Simple::Has(groups)
            }
            ("contains", true) => {
                self.skip_whitespace();
                let text = match self.peek() {
                    Some(q @ ('"' | '\'')) => {
                        self.pos += 1;
                        let text = self.parse_quoted(q)?;
                        self.expect_close_paren()?;
                        text
                    }
                    _ => self.parse_raw_argument()?.trim_end().to_string(),
                };
                Simple::Contains(text)
            }
            (
                "first-child" | "last-child" | "only-child" | "first-of-type" | "last-of-type"
                | "empty" | "scope",
                true,
            ) => return self.error(format!(":{name} takes no arguments")),
            ("nth-child" | "nth-last-child" | "not" | "has" | "contains", false) => {
                return self.error(format!(":{name} requires an argument"))
            }
            _ => return self.error(format!("unknown pseudo-class `:{name}`")),
        };
        Ok(simple)
    }

    fn parse_nth(&self, arg: &str) -> Result<Nth> {
        let expr: String = arg
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        let parse_int = |s: &str| -> Option<i64> {
            let digits = s.strip_prefix('+').unwrap_or(s);
            if digits.is_empty() {
                None
            } else {
                digits.parse().ok()
            }
        };

        let nth = match expr.as_str() {
            "odd" => Some(Nth { a: 2, b: 1 }),
            "even" => Some(Nth { a: 2, b: 0 }),
            _ => match expr.split_once('n') {
                Some((a, b)) => {
                    let a = match a {
                        "" | "+" => Some(1),
                        "-" => Some(-1),
                        other => parse_int(other),
                    };
                    let b = if b.is_empty() {
                        Some(0)
                    } else if b.starts_with(['+', '-']) {
                        parse_int(b)
                    } else {
                        None
                    };
                    a.zip(b).map(|(a, b)| Nth { a, b })
                }
                None => parse_int(&expr).map(|b| Nth { a: 0, b }),
            },
        };

        match nth {
            Some(nth) => Ok(nth),
            None => self.error(format!("invalid nth expression `{}`", arg.trim())),
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '-' || !c.is_ascii()
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || !c.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;
    use markup_tokenizer::{HtmlTokenizer, ParseOptions, TreeSource};

    fn load(html: &str) -> DomArena {
        load_with(html, ParseOptions::default())
    }

    fn load_with(html: &str, options: ParseOptions) -> DomArena {
        let mut arena = DomArena::new();
        let nodes: Vec<NodeId> = HtmlTokenizer
            .parse(html, &options)
            .into_iter()
            .map(|raw| arena.build(raw))
            .collect();
        let doc = arena.document();
        arena.append_children(doc, &nodes);
        arena
    }

    /// Matching elements rendered as `tag#id` / `tag.class` / `tag`
    fn select(arena: &DomArena, selector: &str) -> Vec<String> {
        let compiled = CompiledSelector::compile(selector).unwrap();
        compiled
            .query(arena, &[arena.document()], false)
            .into_iter()
            .map(|id| {
                let node = arena.node(id).unwrap();
                let tag = node.tag_name().unwrap();
                match (node.attr("id"), node.attr("class")) {
                    (Some(id), _) => format!("{tag}#{id}"),
                    (None, Some(class)) => format!("{tag}.{class}"),
                    _ => tag.to_string(),
                }
            })
            .collect()
    }

    const FRUITS: &str = r#"<ul id="fruits"><li class="apple">Apple</li><li class="orange">Orange</li><li class="pear">Pear</li></ul>"#;

    #[test]
    fn test_basic_selectors() {
        let arena = load(FRUITS);
        assert_eq!(select(&arena, "li").len(), 3);
        assert_eq!(select(&arena, "LI").len(), 3);
        assert_eq!(select(&arena, "#fruits"), vec!["ul#fruits"]);
        assert_eq!(select(&arena, ".pear"), vec!["li.pear"]);
        assert_eq!(select(&arena, "ul > .orange"), vec!["li.orange"]);
        assert_eq!(select(&arena, "*").len(), 4);
    }

    #[test]
    fn test_groups_are_document_ordered() {
        let arena = load(FRUITS);
        assert_eq!(
            select(&arena, ".pear, .apple, li.apple"),
            vec!["li.apple", "li.pear"]
        );
    }

    #[test]
    fn test_sibling_combinators() {
        let arena = load(FRUITS);
        assert_eq!(select(&arena, ".apple + li"), vec!["li.orange"]);
        assert_eq!(select(&arena, ".apple ~ li"), vec!["li.orange", "li.pear"]);
        assert!(select(&arena, ".pear + li").is_empty());
    }

    #[test]
    fn test_descendant_combinator() {
        let arena = load("<div><section><p id=a></p></section></div><p id=b></p>");
        assert_eq!(select(&arena, "div p"), vec!["p#a"]);
        assert_eq!(select(&arena, "div > p"), Vec::<String>::new());
        assert_eq!(select(&arena, "div  >  section > p"), vec!["p#a"]);
    }

    #[test]
    fn test_attribute_operators() {
        let arena = load(
            r#"<a id=1 href="https://x.org/a.pdf" lang="en-US" rel="nofollow noopener"></a><a id=2 href="/b.html" lang="en"></a><a id=3></a>"#,
        );
        assert_eq!(select(&arena, "[href]"), vec!["a#1", "a#2"]);
        assert_eq!(select(&arena, "[href^=https]"), vec!["a#1"]);
        assert_eq!(select(&arena, r#"[href$=".html"]"#), vec!["a#2"]);
        assert_eq!(select(&arena, "[href*='x.org']"), vec!["a#1"]);
        assert_eq!(select(&arena, "[rel~=noopener]"), vec!["a#1"]);
        assert_eq!(select(&arena, "[lang|=en]"), vec!["a#1", "a#2"]);
        assert_eq!(select(&arena, "[lang=EN i]"), vec!["a#2"]);
        assert_eq!(select(&arena, "[lang!=en]"), vec!["a#1", "a#3"]);
        assert!(select(&arena, "[href^='']").is_empty());
        assert_eq!(select(&arena, "[HREF=\"/b.html\"]"), vec!["a#2"]);
    }

    #[test]
    fn test_structural_pseudos() {
        let arena = load(FRUITS);
        assert_eq!(select(&arena, "li:first-child"), vec!["li.apple"]);
        assert_eq!(select(&arena, "li:last-child"), vec!["li.pear"]);
        assert_eq!(select(&arena, "li:nth-child(2)"), vec!["li.orange"]);
        assert_eq!(select(&arena, "li:nth-child(odd)"), vec!["li.apple", "li.pear"]);
        assert_eq!(select(&arena, "li:nth-child(even)"), vec!["li.orange"]);
        assert_eq!(select(&arena, "li:nth-child(-n+2)"), vec!["li.apple", "li.orange"]);
        assert_eq!(select(&arena, "li:nth-child(n)").len(), 3);
        assert_eq!(select(&arena, "li:nth-last-child(1)"), vec!["li.pear"]);
        assert_eq!(select(&arena, "ul:only-child"), vec!["ul#fruits"]);
        assert!(select(&arena, "li:only-child").is_empty());
    }

    #[test]
    fn test_type_pseudos_and_empty() {
        let arena = load("<div><p id=a></p><span id=s>x</span><p id=b><!-- c --></p></div>");
        assert_eq!(select(&arena, "p:first-of-type"), vec!["p#a"]);
        assert_eq!(select(&arena, "p:last-of-type"), vec!["p#b"]);
        assert_eq!(select(&arena, ":empty"), vec!["p#a", "p#b"]);
    }

    #[test]
    fn test_not_contains_has() {
        let arena = load(FRUITS);
        assert_eq!(select(&arena, "li:not(.apple, .pear)"), vec!["li.orange"]);
        assert_eq!(select(&arena, "li:contains(Pea)"), vec!["li.pear"]);
        assert_eq!(select(&arena, "li:contains('Orange')"), vec!["li.orange"]);
        assert_eq!(select(&arena, "ul:has(.pear)"), vec!["ul#fruits"]);
        assert_eq!(select(&arena, "ul:has(> li)"), vec!["ul#fruits"]);
        assert_eq!(select(&arena, "li:has(+ .pear)"), vec!["li.orange"]);
        assert_eq!(select(&arena, "li:has(~ .pear)"), vec!["li.apple", "li.orange"]);
        assert!(select(&arena, "ul:has(> .banana)").is_empty());
    }

    #[test]
    fn test_contains_uses_descendant_text() {
        let arena = load("<div id=d>Hello <b>World</b></div>");
        assert_eq!(select(&arena, "div:contains('Hello World')"), vec!["div#d"]);
    }

    #[test]
    fn test_escaped_identifiers() {
        let arena = load(r#"<p id="a:b"></p><p class="1st"></p>"#);
        assert_eq!(select(&arena, r"#a\:b"), vec!["p#a:b"]);
        assert_eq!(select(&arena, r".\31 st"), vec!["p.1st"]);
    }

    #[test]
    fn test_xml_mode_is_case_sensitive() {
        let arena = load_with("<Item/><item/>", ParseOptions::xml());
        let compiled = CompiledSelector::compile("Item").unwrap();
        assert_eq!(compiled.query(&arena, &[arena.document()], true).len(), 1);
        assert_eq!(compiled.query(&arena, &[arena.document()], false).len(), 2);
    }

    #[test]
    fn test_query_overlapping_roots() {
        let arena = load(FRUITS);
        let ul = arena.children(arena.document())[0];
        let compiled = CompiledSelector::compile("li").unwrap();
        let first_li = arena.children(ul)[0];
        let results = compiled.query(&arena, &[first_li, ul, ul], false);
        assert_eq!(results.len(), 3);
        assert!(compiled.query(&arena, &[first_li], false).is_empty());
    }

    #[test]
    fn test_matches_node_itself() {
        let arena = load(FRUITS);
        let ul = arena.children(arena.document())[0];
        let compiled: CompiledSelector = "ul#fruits".parse().unwrap();
        assert!(compiled.matches(&arena, ul, false));
        assert!(!compiled.matches(&arena, arena.children(ul)[0], false));
        assert_eq!(compiled.to_string(), "ul#fruits");
    }

    #[test]
    fn test_nth_extreme_coefficients() {
        let arena = load(FRUITS);
        assert_eq!(select(&arena, "li:nth-child(n-9223372036854775808)").len(), 3);
        assert_eq!(select(&arena, "li:nth-child(-n+9223372036854775807)").len(), 3);
        assert!(select(&arena, "li:nth-child(-9223372036854775808n)").is_empty());
        assert!(select(&arena, "li:nth-child(-9223372036854775808n-9223372036854775808)").is_empty());
        assert_eq!(
            select(&arena, "li:nth-last-child(9223372036854775807n+1)"),
            vec!["li.pear"]
        );
        assert!(CompiledSelector::compile("li:nth-child(9223372036854775808)")
            .unwrap_err()
            .is_syntax());
    }

    #[test]
    fn test_syntax_errors() {
        for bad in [
            "", "   ", "a,,b", ",a", "a,", "a >", "a +", "[href", "[href=", "[href=x",
            "a:nope", "li:nth-child(x)", "li:nth-child(2", ":not(a", "a)", "::before",
            "a:first-child(1)", "#", ".", "[=x]", "'a'",
        ] {
            let err = CompiledSelector::compile(bad).unwrap_err();
            assert!(err.is_syntax(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_syntax_error_reports_position() {
        match CompiledSelector::compile("li:bogus") {
            Err(DomError::Syntax {
                selector, reason, ..
            }) => {
                assert_eq!(selector, "li:bogus");
                assert!(reason.contains("bogus"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
