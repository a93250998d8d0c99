//! # Fold Engine
//!
//! Orchestrates a whole fold. Code, front matter and delimited regions are
//! masked, the buffer is parsed once, and the nodes become [`Block`]s with
//! the regions carved out of the text holding them.
//!
//! The engine never fails on input. If the structural parser reports a
//! fault, the engine answers with the caller's fallback blocks, the regex
//! splitter's blocks, or one block holding the whole text, and says so with
//! `used_ast = false`.
//!
//! The structural parser sits behind [`TagParser`] so tests can inject
//! faults.

use std::time::{Duration, Instant};

use tagfold_syntax::parser::invariants;
use tagfold_syntax::{
    AstNode, ParseError, ParseOptions, ParseOutput, Parser, ProtectedText, RuleTableError, Span,
    StreamError, StreamingParser, TagRule, TagRuleTable, protect, protect_streaming,
};
use thiserror::Error;

use crate::block::{Block, blocks_from_nodes};
use crate::fallback::{
    FallbackRule, Hit, NonTagRegions, carve_regions, mask_regions, rules_for_table, split_blocks,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid tag rules: {0}")]
    Rules(#[from] RuleTableError),

    #[error("could not build fallback pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Structural parsing of one range of a protected buffer.
pub trait TagParser {
    fn parse(
        &self,
        text: &ProtectedText<'_>,
        range: Span,
        rules: &TagRuleTable,
        options: ParseOptions,
    ) -> Result<ParseOutput, ParseError>;
}

/// The recursive-descent [`Parser`], with its tree checked before use.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuralParser;

impl TagParser for StructuralParser {
    fn parse(
        &self,
        text: &ProtectedText<'_>,
        range: Span,
        rules: &TagRuleTable,
        options: ParseOptions,
    ) -> Result<ParseOutput, ParseError> {
        let out = Parser::with_range(text, range, rules, options).parse();
        invariants::check(&out.nodes, text.original())?;
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FoldStats {
    /// Parsed nodes at every depth.
    pub node_count: usize,
    /// Front matter and delimited regions found.
    pub regions: usize,
    /// Top-level blocks returned.
    pub block_count: usize,
    /// Code regions hidden from the lexer.
    pub protected_slots: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldOutput {
    pub blocks: Vec<Block>,
    pub has_incomplete_tags: bool,
    /// False when the blocks came from a fallback path.
    pub used_ast: bool,
    pub stats: FoldStats,
}

/// Blocks produced by the structural path, before fallback decisions.
#[derive(Default)]
struct Folded {
    blocks: Vec<Block>,
    node_count: usize,
    has_incomplete_tags: bool,
}

pub struct FoldEngine<P: TagParser = StructuralParser> {
    rules: TagRuleTable,
    fallback_rules: Vec<FallbackRule>,
    options: ParseOptions,
    parser: P,
}

impl FoldEngine {
    /// An engine with the built-in tag rules.
    pub fn new() -> Result<Self, EngineError> {
        Self::with_rules(TagRuleTable::builtin().clone())
    }

    pub fn with_rules(rules: TagRuleTable) -> Result<Self, EngineError> {
        Self::with_parser(rules, StructuralParser)
    }

    /// Validates `rules` into a table and builds an engine on it.
    pub fn from_tag_rules(rules: Vec<TagRule>) -> Result<Self, EngineError> {
        Self::with_rules(TagRuleTable::new(rules)?)
    }
}

impl<P: TagParser> FoldEngine<P> {
    pub fn with_parser(rules: TagRuleTable, parser: P) -> Result<Self, EngineError> {
        let fallback_rules = rules_for_table(&rules)?;
        Ok(Self {
            rules,
            fallback_rules,
            options: ParseOptions::default(),
            parser,
        })
    }

    /// `options.finalize` is ignored; one-shot folds always finalize.
    #[must_use]
    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = ParseOptions {
            finalize: true,
            ..options
        };
        self
    }

    pub fn rules(&self) -> &TagRuleTable {
        &self.rules
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    pub fn process_text(&self, text: &str) -> FoldOutput {
        self.process_text_with_fallback(text, None)
    }

    /// Folds `text`, answering with `fallback` if the structural path fails
    /// or finds nothing.
    pub fn process_text_with_fallback(&self, text: &str, fallback: Option<Vec<Block>>) -> FoldOutput {
        let started = Instant::now();
        let mut protected = protect(text);
        let regions = mask_regions(&mut protected, false);

        let (folded, used_ast) = match self.fold_structural(&protected, &regions) {
            Ok(folded) => match fallback {
                Some(blocks) if folded.blocks.is_empty() => (
                    Folded {
                        blocks,
                        ..Folded::default()
                    },
                    false,
                ),
                _ => (folded, true),
            },
            Err(err) => {
                log::warn!("structural parse failed, using fallback blocks: {err}");
                let blocks = fallback.unwrap_or_else(|| self.regex_fallback(text));
                (
                    Folded {
                        blocks,
                        ..Folded::default()
                    },
                    false,
                )
            }
        };

        let stats = FoldStats {
            node_count: folded.node_count,
            regions: regions.len(),
            block_count: folded.blocks.len(),
            protected_slots: protected.slots().len(),
            elapsed: started.elapsed(),
        };
        log::debug!(
            "folded {} bytes into {} blocks ({} nodes, {} protected) in {:?}",
            text.len(),
            stats.block_count,
            stats.node_count,
            stats.protected_slots,
            stats.elapsed
        );

        FoldOutput {
            blocks: folded.blocks,
            has_incomplete_tags: folded.has_incomplete_tags,
            used_ast,
            stats,
        }
    }

    /// Starts a streaming session on this engine.
    pub fn stream(&self) -> FoldStream<'_, P> {
        FoldStream {
            engine: self,
            parser: StreamingParser::with_options(&self.rules, self.options)
                .with_regions(&NonTagRegions),
        }
    }

    /// Parses the whole buffer, with `regions` already masked.
    fn fold_structural(
        &self,
        protected: &ProtectedText<'_>,
        regions: &[Hit],
    ) -> Result<Folded, ParseError> {
        if protected.is_empty() {
            return Ok(Folded::default());
        }
        let range = Span::new(0, protected.len());
        let out = self.parser.parse(protected, range, &self.rules, self.options)?;

        let mut node_count = 0;
        for node in &out.nodes {
            node.walk(&mut |_: &AstNode| node_count += 1);
        }
        let blocks = blocks_from_nodes(&out.nodes, &self.rules);

        Ok(Folded {
            blocks: carve_regions(blocks, regions, protected.original()),
            node_count,
            has_incomplete_tags: out.has_incomplete_tags,
        })
    }

    /// Regex splitting over every rule, or the whole text as one block.
    fn regex_fallback(&self, text: &str) -> Vec<Block> {
        let blocks = split_blocks(text, &self.fallback_rules);
        if blocks.is_empty() && !text.trim().is_empty() {
            return vec![Block::text(Span::new(0, text.len()), text)];
        }
        blocks
    }
}

/// A streaming fold of one message.
pub struct FoldStream<'e, P: TagParser = StructuralParser> {
    engine: &'e FoldEngine<P>,
    parser: StreamingParser<'e>,
}

impl<P: TagParser> FoldStream<'_, P> {
    /// Adds a chunk and returns the blocks that became stable.
    ///
    /// With `is_complete`, the whole message is folded again and every block
    /// is returned, exactly as [`FoldEngine::process_text`] would.
    pub fn process_streaming_text(
        &mut self,
        chunk: &str,
        is_complete: bool,
    ) -> Result<FoldOutput, StreamError> {
        if is_complete {
            self.parser.add_text(chunk)?;
            self.parser.mark_complete()?;
            return Ok(self.engine.process_text(self.parser.buffer()));
        }

        let started = Instant::now();
        let update = self.parser.add_text(chunk)?;

        // the same regions the parser masked, to carve out of emitted text
        let mut protected = protect_streaming(self.parser.buffer());
        let regions = mask_regions(&mut protected, true);
        let blocks = carve_regions(
            blocks_from_nodes(&update.new_nodes, self.engine.rules()),
            &regions,
            protected.original(),
        );
        let has_incomplete_tags = self
            .parser
            .last_full_parse()
            .iter()
            .any(AstNode::has_incomplete);

        let mut node_count = 0;
        for node in &update.new_nodes {
            node.walk(&mut |_: &AstNode| node_count += 1);
        }

        Ok(FoldOutput {
            stats: FoldStats {
                node_count,
                regions: regions.len(),
                block_count: blocks.len(),
                // not tracked for intermediate updates
                protected_slots: 0,
                elapsed: started.elapsed(),
            },
            blocks,
            has_incomplete_tags,
            used_ast: true,
        })
    }

    /// Drops the buffer so the session can take a new message.
    pub fn reset(&mut self) {
        self.parser.reset();
    }

    pub fn buffer(&self) -> &str {
        self.parser.buffer()
    }
}
