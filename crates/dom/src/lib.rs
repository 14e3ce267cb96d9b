//! jQuery-style querying and editing of in-memory markup trees
//!
//! Load a document into a [`Context`], select nodes with CSS selectors, walk
//! and edit the tree through [`Selection`]s, and render it back to markup
//! or plain text.
//!
//! ## Core Design
//!
//! ```text
//! &str / &[u8] → TreeSource → RawNode (owned) → DomArena (per Context)
//!                                                   ↓
//!                                        NodeId (slot, generation)
//!                                                   ↓
//!                     Selection { Context, Rc<[NodeId]> } → DomSerializer
//! ```
//!
//! - **No reference cycles**: parent and sibling links are arena handles
//! - **Slots are recycled**: replaced content nobody selects is freed, and a
//!   stale `NodeId` resolves to nothing instead of a different node
//! - **No global state**: every document lives in its own `Context`
//! - **Options fixed at load time**: case folding and entity handling are
//!   decided once and read by the serializer
//!
//! ```
//! use dom_query::{Context, LoadOptions};
//!
//! let ctx = Context::load(
//!     r#"<ul id="fruits"><li class="apple">Apple</li><li class="pear">Pear</li></ul>"#,
//!     LoadOptions::default(),
//! );
//! let pear = ctx.select("#fruits .pear").unwrap();
//! pear.after(r#"<li class="plum">Plum</li>"#);
//!
//! assert_eq!(ctx.select("li").unwrap().len(), 3);
//! assert_eq!(ctx.text(), "ApplePearPlum");
//! ```

pub mod arena;
mod attributes;
pub mod context;
pub mod error;
pub mod manipulation;
pub mod selection;
pub mod selector;
pub mod serializer;
mod traversal;
pub mod types;

pub use arena::DomArena;
pub use context::{Context, LoadOptions, Markup};
pub use error::{DomError, Result};
pub use manipulation::Content;
pub use selection::Selection;
pub use selector::CompiledSelector;
pub use serializer::{DomSerializer, RenderOptions};
pub use types::*;

pub use markup_tokenizer::{HtmlTokenizer, ParseOptions, RawNode, TreeSource};
