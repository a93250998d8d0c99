//! Tag-aware syntax layer for LLM chat transcripts.
//!
//! Transcripts are Markdown with semantic tags mixed in (`<thinking>`,
//! `<UpdateVariable>`, `<思考>`), arriving token by token. This crate turns
//! a buffer, complete or still growing, into a tree of [`AstNode`]s:
//!
//! 1. [`protect()`] masks code so tag-like text inside it is ignored
//! 2. the [`lexer`] splits the masked buffer into tag and text tokens
//! 3. the [`parser`] matches open and close tags through the
//!    [`TagRuleTable`], including cross-alias closes like `<thinking>…</思考>`
//! 4. [`StreamingParser`] repeats that on every chunk and reports nodes once
//!    they are stable
//!
//! Every offset in the tree is a byte offset into the original buffer.

pub mod cursor;
pub mod lexer;
pub mod parser;
pub mod protect;
pub mod span;
pub mod streaming;
pub mod tag_rules;

pub use parser::ast::AstNode;
pub use parser::{ParseError, ParseOptions, ParseOutput, Parser, parse, parse_with};
pub use protect::{ProtectedText, RegionMask, protect, protect_streaming};
pub use span::Span;
pub use streaming::{StreamError, StreamFinish, StreamUpdate, StreamingParser};
pub use tag_rules::{BlockType, RuleTableError, TagGroup, TagRule, TagRuleTable};
