//! # Streaming Parser - Folding a Message While It Arrives
//!
//! A [`StreamingParser`] owns one growing buffer per in-flight message. Every
//! [`add_text`](StreamingParser::add_text) re-parses the *whole* buffer and
//! reports only nodes that can no longer change.
//!
//! ## The Stable Prefix
//!
//! Nodes are identified by their index in the top-level list. A node is
//! stable once it lies before the first incomplete node, except for a text
//! node directly before that point (or at the very end), which may still
//! grow or absorb a torn tag. Each call returns `nodes[emitted..stable]`
//! and moves the emitted count forward, so a node is reported exactly once
//! and only after its closing tag has arrived.
//!
//! Intermediate parses run with [`ParseOptions::streaming`] and
//! [`protect_streaming`], so an unknown tag that might still close, or a tag
//! after a backtick that might still turn into code, is held back instead
//! of being reported in a shape the final parse would contradict. A
//! [`RegionMask`] given with [`StreamingParser::with_regions`] is applied
//! open-ended for the same reason.
//!
//! ## Cost
//!
//! Re-parsing is linear in the buffer per call and quadratic over a whole
//! stream. That is fine for chat-message-sized buffers; see the
//! `streaming` benchmark in `tagfold-engine`.

use thiserror::Error;

use crate::parser::ast::AstNode;
use crate::parser::{ParseOptions, ParseOutput, Parser};
use crate::protect::{RegionMask, protect, protect_streaming};
use crate::tag_rules::TagRuleTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("stream was already marked complete")]
    AlreadyComplete,
}

/// Mutable state of one stream. Not `Clone`: a stream has one owner.
#[derive(Debug, Default)]
pub struct StreamingContext {
    buffer: String,
    emitted_node_count: usize,
    last_full_parse: Vec<AstNode>,
}

/// Result of [`StreamingParser::add_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamUpdate {
    /// Nodes that became stable with this chunk.
    pub new_nodes: Vec<AstNode>,
    /// No incomplete tag is pending and this chunk produced new nodes.
    pub has_new_complete_tags: bool,
}

/// Result of [`StreamingParser::mark_complete`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFinish {
    /// Every node of the final parse, including ones already emitted.
    pub nodes: Vec<AstNode>,
    pub has_incomplete_tags: bool,
    /// Buffer text after the last node emitted while streaming.
    pub remaining: String,
}

pub struct StreamingParser<'r> {
    rules: &'r TagRuleTable,
    options: ParseOptions,
    regions: Option<&'r dyn RegionMask>,
    context: StreamingContext,
    complete: bool,
}

impl<'r> StreamingParser<'r> {
    pub fn new(rules: &'r TagRuleTable) -> Self {
        Self::with_options(rules, ParseOptions::default())
    }

    /// `options.finalize` is ignored; it is set per parse.
    pub fn with_options(rules: &'r TagRuleTable, options: ParseOptions) -> Self {
        Self {
            rules,
            options,
            regions: None,
            context: StreamingContext::default(),
            complete: false,
        }
    }

    /// Masks `regions` before every parse, on top of code.
    #[must_use]
    pub fn with_regions(mut self, regions: &'r dyn RegionMask) -> Self {
        self.regions = Some(regions);
        self
    }

    pub fn add_text(&mut self, chunk: &str) -> Result<StreamUpdate, StreamError> {
        if self.complete {
            return Err(StreamError::AlreadyComplete);
        }
        self.context.buffer.push_str(chunk);

        let out = self.parse_buffer(false);
        let stable = stable_prefix(&out.nodes);
        let emitted = self.context.emitted_node_count;
        log::trace!(
            "re-parsed {} bytes: {} nodes, {} stable, {} emitted",
            self.context.buffer.len(),
            out.nodes.len(),
            stable,
            emitted
        );

        let new_nodes = if stable > emitted {
            out.nodes[emitted..stable].to_vec()
        } else {
            if stable < emitted {
                log::debug!("stable prefix shrank from {emitted} to {stable} nodes");
            }
            Vec::new()
        };

        self.context.emitted_node_count = emitted.max(stable);
        self.context.last_full_parse = out.nodes;

        Ok(StreamUpdate {
            has_new_complete_tags: !out.has_incomplete_tags && !new_nodes.is_empty(),
            new_nodes,
        })
    }

    /// Runs the final parse. May be called once per stream.
    pub fn mark_complete(&mut self) -> Result<StreamFinish, StreamError> {
        if self.complete {
            return Err(StreamError::AlreadyComplete);
        }
        self.complete = true;

        let emitted_end = match self.context.emitted_node_count {
            0 => 0,
            n => self
                .context
                .last_full_parse
                .get(n - 1)
                .map_or(0, AstNode::end),
        };
        let remaining = self
            .context
            .buffer
            .get(emitted_end..)
            .unwrap_or_default()
            .to_string();

        let out = self.parse_buffer(true);
        self.context.emitted_node_count = out.nodes.len();
        self.context.last_full_parse = out.nodes.clone();

        Ok(StreamFinish {
            nodes: out.nodes,
            has_incomplete_tags: out.has_incomplete_tags,
            remaining,
        })
    }

    /// Clears the buffer so the parser can take a new stream.
    pub fn reset(&mut self) {
        self.context = StreamingContext::default();
        self.complete = false;
    }

    pub fn buffer(&self) -> &str {
        &self.context.buffer
    }

    pub fn emitted_node_count(&self) -> usize {
        self.context.emitted_node_count
    }

    pub fn last_full_parse(&self) -> &[AstNode] {
        &self.context.last_full_parse
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn parse_buffer(&self, finalize: bool) -> ParseOutput {
        let buffer = self.context.buffer.as_str();
        let mut protected = if finalize {
            protect(buffer)
        } else {
            protect_streaming(buffer)
        };
        if let Some(regions) = self.regions {
            regions.mask_regions(&mut protected, !finalize);
        }
        let options = ParseOptions {
            finalize,
            ..self.options
        };
        Parser::new(&protected, self.rules, options).parse()
    }
}

/// Number of leading nodes that later input cannot change.
pub fn stable_prefix(nodes: &[AstNode]) -> usize {
    let cut = nodes
        .iter()
        .position(|node| !node.is_complete)
        .unwrap_or(nodes.len());
    match cut.checked_sub(1).map(|last| &nodes[last]) {
        Some(node) if node.is_text() => cut - 1,
        _ => cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::protect::ProtectedText;
    use crate::span::Span;
    use crate::tag_rules::BlockType;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn rules() -> &'static TagRuleTable {
        TagRuleTable::builtin()
    }

    #[test]
    fn complete_tag_is_emitted_once() {
        let mut parser = StreamingParser::new(rules());
        let update = parser.add_text("<think>a</think>").unwrap();
        assert_eq!(update.new_nodes.len(), 1);
        assert_eq!(update.new_nodes[0].block_type, BlockType::Thinking);
        assert!(update.has_new_complete_tags);

        let update = parser.add_text(" more").unwrap();
        assert!(update.new_nodes.is_empty());
        assert!(!update.has_new_complete_tags);
        assert_eq!(parser.emitted_node_count(), 1);
    }

    #[test]
    fn growing_tag_is_held_back() {
        let mut parser = StreamingParser::new(rules());
        for chunk in ["<thi", "nking>", "still ", "going"] {
            let update = parser.add_text(chunk).unwrap();
            assert!(update.new_nodes.is_empty());
            assert!(!update.has_new_complete_tags);
        }
        let update = parser.add_text("</thinking>").unwrap();
        assert_eq!(update.new_nodes.len(), 1);
        assert_eq!(update.new_nodes[0].content, "still going");
    }

    #[test]
    fn text_before_open_tag_is_held_until_tag_closes() {
        let mut parser = StreamingParser::new(rules());
        let update = parser.add_text("hello <think>x").unwrap();
        assert!(update.new_nodes.is_empty());

        let update = parser.add_text("</think>").unwrap();
        let kinds: Vec<_> = update.new_nodes.iter().map(|n| n.block_type).collect();
        assert_eq!(kinds, vec![BlockType::Text, BlockType::Thinking]);
    }

    #[test]
    fn mark_complete_returns_everything_and_remaining() {
        let mut parser = StreamingParser::new(rules());
        parser.add_text("<think>a</think> tail").unwrap();
        let finish = parser.mark_complete().unwrap();
        assert_eq!(finish.nodes.len(), 2);
        assert_eq!(finish.remaining, " tail");
        assert!(!finish.has_incomplete_tags);
    }

    #[test]
    fn mark_complete_keeps_torn_known_tag_incomplete() {
        let mut parser = StreamingParser::new(rules());
        parser.add_text("<thinking>unfinished").unwrap();
        let finish = parser.mark_complete().unwrap();
        assert_eq!(finish.nodes.len(), 1);
        assert!(!finish.nodes[0].is_complete);
        assert!(finish.has_incomplete_tags);
        assert_eq!(finish.remaining, "<thinking>unfinished");
    }

    #[test]
    fn unknown_unclosed_tag_becomes_text_on_completion() {
        let mut parser = StreamingParser::new(rules());
        let update = parser.add_text("a<br>b").unwrap();
        assert!(update.new_nodes.is_empty());
        let finish = parser.mark_complete().unwrap();
        assert_eq!(finish.nodes.len(), 1);
        assert!(finish.nodes[0].is_text());
        assert_eq!(finish.nodes[0].content, "a<br>b");
    }

    #[test]
    fn calls_after_completion_are_errors() {
        let mut parser = StreamingParser::new(rules());
        parser.add_text("x").unwrap();
        parser.mark_complete().unwrap();
        assert_eq!(parser.add_text("y"), Err(StreamError::AlreadyComplete));
        assert_eq!(parser.mark_complete(), Err(StreamError::AlreadyComplete));
        assert_eq!(parser.buffer(), "x");
    }

    #[test]
    fn reset_starts_a_new_stream() {
        let mut parser = StreamingParser::new(rules());
        parser.add_text("<think>a</think>").unwrap();
        parser.mark_complete().unwrap();
        parser.reset();
        assert!(!parser.is_complete());
        assert_eq!(parser.buffer(), "");
        assert_eq!(parser.emitted_node_count(), 0);
        assert!(parser.last_full_parse().is_empty());
        let update = parser.add_text("<summary>s</summary>").unwrap();
        assert_eq!(update.new_nodes.len(), 1);
    }

    #[test]
    fn open_backtick_holds_back_tag_that_may_become_code() {
        let mut parser = StreamingParser::new(rules());
        let update = parser.add_text("use `<think>x</think>").unwrap();
        assert!(update.new_nodes.is_empty());

        parser.add_text("` for that").unwrap();
        let finish = parser.mark_complete().unwrap();
        assert_eq!(finish.nodes.len(), 1);
        assert!(finish.nodes[0].is_text());
    }

    /// `[[ ... ]]` regions, never lexed.
    struct Brackets;

    impl RegionMask for Brackets {
        fn mask_regions(&self, text: &mut ProtectedText<'_>, open_ended: bool) {
            let original = text.original();
            let mut pos = 0;
            while let Some(start) = original[pos..].find("[[").map(|i| pos + i) {
                match original[start..].find("]]") {
                    Some(len) => {
                        pos = start + len + 2;
                        text.mask_region(Span::new(start, pos));
                    }
                    None => {
                        if open_ended {
                            text.mask_region(Span::new(start, original.len()));
                        }
                        break;
                    }
                }
            }
        }
    }

    #[test]
    fn open_region_holds_back_tags_inside_it() {
        let mut parser = StreamingParser::new(rules()).with_regions(&Brackets);
        let update = parser.add_text("[[ <think>a</think>").unwrap();
        assert!(update.new_nodes.is_empty());

        let update = parser.add_text(" ]]<summary>s</summary>").unwrap();
        let kinds: Vec<_> = update.new_nodes.iter().map(|n| n.block_type).collect();
        assert_eq!(kinds, vec![BlockType::Text, BlockType::Summary]);
        assert_eq!(update.new_nodes[0].content, "[[ <think>a</think> ]]");

        let finish = parser.mark_complete().unwrap();
        assert_eq!(finish.nodes, parser.last_full_parse());
        assert_eq!(finish.nodes.len(), 2);
    }

    #[test]
    fn unclosed_region_is_parsed_once_complete() {
        let mut parser = StreamingParser::new(rules()).with_regions(&Brackets);
        parser.add_text("[[ <think>a</think>").unwrap();
        let finish = parser.mark_complete().unwrap();
        let kinds: Vec<_> = finish.nodes.iter().map(|n| n.block_type).collect();
        assert_eq!(kinds, vec![BlockType::Text, BlockType::Thinking]);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(7)]
    fn chunked_stream_matches_one_shot_parse(#[case] size: usize) {
        let text = "intro\n<thinking>plan `<x>` <b>bold</b></思考>\nmid<br>\n<summary>s</summary><status/> end";
        let chars: Vec<char> = text.chars().collect();

        let mut parser = StreamingParser::new(rules());
        let mut emitted = Vec::new();
        for chunk in chars.chunks(size) {
            let chunk: String = chunk.iter().collect();
            emitted.extend(parser.add_text(&chunk).unwrap().new_nodes);
        }
        let finish = parser.mark_complete().unwrap();
        let one_shot = parse(text, rules());

        assert_eq!(finish.nodes, one_shot.nodes);
        // whatever was emitted early is exactly a prefix of the final list
        assert_eq!(emitted, one_shot.nodes[..emitted.len()].to_vec());
    }

    #[test]
    fn stable_prefix_rules() {
        let p = parse("<think>a</think>text", rules()).nodes;
        assert_eq!(stable_prefix(&p), 1);
        let p = parse("<think>a</think>text<think>b", rules()).nodes;
        assert_eq!(stable_prefix(&p), 1);
        let p = parse("<think>a</think><summary>b</summary>", rules()).nodes;
        assert_eq!(stable_prefix(&p), 2);
        assert_eq!(stable_prefix(&[]), 0);
    }
}
