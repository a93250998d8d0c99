//! # Parser - Recursive Descent Over Tag Tokens
//!
//! Consumes the [`Lexer`]'s token stream and builds a forest of [`AstNode`]s.
//!
//! ## Matching Open and Close Tags
//!
//! [`Parser::parse_until_close`] is the structural core. After an opening
//! tag it consumes tokens until a close tag of the same *group* shows up,
//! where a group is every alias of one block type (`<thinking>` closes with
//! `</思考>`), or the literal name for unknown tags. On the way:
//!
//! - a nested opening tag is parsed recursively into a child node
//! - a close tag of another group is literal text
//! - text between children becomes text-leaf children at exact offsets
//!
//! ## Running Out of Input
//!
//! If the buffer ends before the close tag, the node comes back with
//! `is_complete = false`, ending at the end of the buffer. This is what lets
//! a half-streamed `<thinking>` render as an open, growing block instead of
//! hanging the parser or vanishing.
//!
//! With [`ParseOptions::finalize`] set (the input is known to be complete),
//! an *unknown* tag that never closes is taken back: its opening tag becomes
//! literal text and parsing resumes right after it. That keeps stray `<br>`
//! or `<b>` from swallowing the rest of a message. Known tags stay
//! incomplete nodes either way.
//!
//! ## Errors
//!
//! Parsing itself never fails. Malformed input always yields a tree that
//! accounts for every non-whitespace byte. [`invariants::check`] exists for
//! callers that want to verify a tree before trusting it.

pub mod ast;
pub mod invariants;

use std::collections::HashSet;

use crate::lexer::{Lexer, Token, TokenKind};
use crate::protect::{ProtectedText, protect};
use crate::span::Span;
use crate::tag_rules::{BlockType, TagRuleTable};
use ast::AstNode;

pub use invariants::ParseError;

/// Tuning for a single parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    /// The input is complete; unclosed unknown tags degrade to text.
    pub finalize: bool,
    /// Opening tags nested deeper than this are literal text.
    pub max_nesting_depth: usize,
}

impl ParseOptions {
    pub const DEFAULT_MAX_NESTING_DEPTH: usize = 64;

    /// Options for an intermediate parse of a buffer that is still growing.
    pub fn streaming() -> Self {
        Self {
            finalize: false,
            ..Self::default()
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            finalize: true,
            max_nesting_depth: Self::DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOutput {
    /// Top-level nodes in source order.
    pub nodes: Vec<AstNode>,
    /// Some node, at any depth, is incomplete.
    pub has_incomplete_tags: bool,
    /// Where the lexer stopped; the end of the parsed range.
    pub last_position: usize,
}

/// Consecutive literal pieces waiting to become one text leaf.
#[derive(Default)]
struct TextRun {
    span: Option<Span>,
}

impl TextRun {
    fn extend(&mut self, piece: Span) {
        self.span = Some(match self.span {
            Some(span) => Span::new(span.start, piece.end),
            None => piece,
        });
    }

    /// Emits the run as a text leaf unless it is only whitespace.
    fn flush(&mut self, text: &ProtectedText<'_>, out: &mut Vec<AstNode>) {
        if let Some(span) = self.span.take() {
            let content = text.restore(span);
            if !content.trim().is_empty() {
                out.push(AstNode::text(span, content, true));
            }
        }
    }
}

/// The recursive-descent parser.
pub struct Parser<'a> {
    text: &'a ProtectedText<'a>,
    lexer: Lexer<'a>,
    rules: &'a TagRuleTable,
    options: ParseOptions,
    depth: usize,
    /// Offsets of unknown opening tags already found to be unclosed.
    unclosed: HashSet<usize>,
}

impl<'a> Parser<'a> {
    /// Parses the whole of a protected buffer.
    pub fn new(text: &'a ProtectedText<'a>, rules: &'a TagRuleTable, options: ParseOptions) -> Self {
        Self::with_range(text, Span::new(0, text.len()), rules, options)
    }

    /// Parses `range` of a protected buffer. Offsets in the result are
    /// absolute.
    pub fn with_range(
        text: &'a ProtectedText<'a>,
        range: Span,
        rules: &'a TagRuleTable,
        options: ParseOptions,
    ) -> Self {
        Self {
            text,
            lexer: Lexer::with_range(text.masked(), range),
            rules,
            options,
            depth: 0,
            unclosed: HashSet::new(),
        }
    }

    pub fn parse(mut self) -> ParseOutput {
        let mut nodes = Vec::new();
        let mut run = TextRun::default();

        loop {
            let token = self.lexer.next_token();
            match token.kind {
                TokenKind::Eof => break,
                TokenKind::Text => run.extend(token.span()),
                TokenKind::TagOpen => match self.parse_tag(token) {
                    Some(node) => {
                        run.flush(self.text, &mut nodes);
                        nodes.push(node);
                    }
                    None => run.extend(token.span()),
                },
                TokenKind::TagClose => {
                    if token.torn && !self.options.finalize {
                        // may still turn out to be a close tag for nothing;
                        // hold it apart so it is not mistaken for settled text
                        run.flush(self.text, &mut nodes);
                        nodes.push(AstNode::text(
                            token.span(),
                            self.text.restore(token.span()),
                            false,
                        ));
                    } else {
                        run.extend(token.span());
                    }
                }
            }
        }
        run.flush(self.text, &mut nodes);

        let has_incomplete_tags = nodes.iter().any(AstNode::has_incomplete);
        ParseOutput {
            nodes,
            has_incomplete_tags,
            last_position: self.lexer.position(),
        }
    }

    /// Parses the element started by `open`.
    ///
    /// Returns `None` when the opening tag should be read as literal text;
    /// the lexer is then positioned right after it.
    fn parse_tag(&mut self, open: Token<'a>) -> Option<AstNode> {
        let block_type = self.rules.resolve(open.name()).block_type;
        let unknown = block_type == BlockType::Unknown;

        if open.self_closing {
            let content_span = Span::empty(open.end());
            return Some(self.element(&open, block_type, open.span(), content_span, true, Vec::new()));
        }

        if open.torn {
            if unknown && self.options.finalize {
                return None;
            }
            let content_span = Span::empty(open.end());
            return Some(self.element(&open, block_type, open.span(), content_span, false, Vec::new()));
        }

        if unknown && self.options.finalize && self.unclosed.contains(&open.offset) {
            return None;
        }

        if self.depth >= self.options.max_nesting_depth {
            log::debug!(
                "<{}> at {} nested deeper than {}, kept as text",
                open.name(),
                open.offset,
                self.options.max_nesting_depth
            );
            return None;
        }

        self.parse_until_close(open, block_type)
    }

    fn parse_until_close(&mut self, open: Token<'a>, block_type: BlockType) -> Option<AstNode> {
        let group = self.rules.group(open.name());
        let inner_start = open.end();
        let mut children = Vec::new();
        let mut run = TextRun::default();

        self.depth += 1;
        let close = loop {
            let token = self.lexer.next_token();
            match token.kind {
                TokenKind::Eof => break None,
                TokenKind::TagClose if !token.torn && self.rules.closes(&group, token.name()) => {
                    break Some(token);
                }
                TokenKind::TagOpen => match self.parse_tag(token) {
                    Some(child) => {
                        run.flush(self.text, &mut children);
                        children.push(child);
                    }
                    None => run.extend(token.span()),
                },
                TokenKind::TagClose | TokenKind::Text => run.extend(token.span()),
            }
        };
        self.depth -= 1;

        match close {
            Some(close) => {
                run.flush(self.text, &mut children);
                let span = Span::new(open.offset, close.end());
                let content_span = Span::new(inner_start, close.offset);
                Some(self.element(&open, block_type, span, content_span, true, children))
            }
            None if block_type == BlockType::Unknown && self.options.finalize => {
                log::debug!(
                    "unclosed <{}> at {} degraded to text",
                    open.name(),
                    open.offset
                );
                self.unclosed.insert(open.offset);
                self.lexer.reset_to(inner_start);
                None
            }
            None => {
                run.flush(self.text, &mut children);
                let end = self.lexer.position();
                let span = Span::new(open.offset, end);
                let content_span = Span::new(inner_start, end);
                Some(self.element(&open, block_type, span, content_span, false, children))
            }
        }
    }

    fn element(
        &self,
        open: &Token<'a>,
        block_type: BlockType,
        span: Span,
        content_span: Span,
        is_complete: bool,
        children: Vec<AstNode>,
    ) -> AstNode {
        AstNode {
            block_type,
            span,
            content_span,
            content: self.text.restore(content_span).to_string(),
            is_complete,
            children,
            raw_tag_name: open.name().to_string(),
        }
    }
}

/// Protects and parses a complete buffer.
pub fn parse(source: &str, rules: &TagRuleTable) -> ParseOutput {
    parse_with(source, rules, ParseOptions::default())
}

/// Protects and parses a buffer with explicit options.
pub fn parse_with(source: &str, rules: &TagRuleTable, options: ParseOptions) -> ParseOutput {
    let protected = protect(source);
    Parser::new(&protected, rules, options).parse()
}
