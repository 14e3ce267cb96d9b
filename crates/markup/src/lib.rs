//! Markup tokenizer and entity tables
//!
//! Turns raw markup (text or bytes) into an owned tree of [`RawNode`]s.
//! The tree builder never fails: unclosed tags close at end of input,
//! stray end tags are dropped and anything that does not look like a tag
//! is kept as text.
//!
//! ```text
//! &str / &[u8] → HtmlTokenizer → Vec<RawNode> → (consumer builds its own tree)
//! ```

pub mod entities;
pub mod tokenizer;

pub use tokenizer::{decode_bytes, HtmlTokenizer, ParseOptions, RawNode, TreeSource};

/// Elements that never have children or an end tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "keygen", "link", "meta",
    "param", "source", "track", "wbr",
];

/// Elements whose content is opaque text, never markup.
pub const RAW_TEXT_ELEMENTS: &[&str] = &[
    "script",
    "style",
    "xmp",
    "iframe",
    "noembed",
    "noframes",
    "plaintext",
];

/// Raw-text elements whose content still has entities decoded.
pub const ESCAPABLE_RAW_TEXT_ELEMENTS: &[&str] = &["textarea", "title"];

pub fn is_void_element(name: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}

pub fn is_raw_text_element(name: &str) -> bool {
    RAW_TEXT_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(name))
}
