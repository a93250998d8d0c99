//! # Regex Fallback Splitter
//!
//! A block splitter that needs no lexer or parser: every rule's regex runs
//! over the protected text, overlapping hits are resolved, and the gaps
//! become text blocks.
//!
//! It has two jobs. Some block kinds are not tags at all (YAML front matter,
//! `<<<BEGIN>>>…<<<END>>>` regions) and are only ever found this way. And when
//! the structural parser fails, the same splitter, with one generated rule
//! per tag rule, keeps the transcript renderable.
//!
//! ## Regions Next to Tags
//!
//! Front matter and delimited regions are not cut out of the buffer before
//! parsing. [`mask_regions`] hides them from the lexer like code, so a tag
//! around a region still closes and a tag inside one is never parsed. After
//! the parse, [`carve_regions`] splits each region out of the text block
//! holding it, at any depth.
//!
//! ## Resolving Hits
//!
//! Hits are sorted by start, shorter first. A shorter hit at the same start
//! is taken to be the more specific one. Any hit that overlaps an accepted
//! hit is dropped, whether it is contained in it or only crosses its end.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use tagfold_syntax::{BlockType, ProtectedText, RegionMask, Span, TagRule, TagRuleTable, protect};

use crate::block::Block;

/// Where a rule's inner content comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentExtraction {
    /// The whole match.
    Whole,
    /// A numbered capture group.
    Group(usize),
    /// A named capture group.
    Named(&'static str),
}

#[derive(Debug, Clone)]
pub struct FallbackRule {
    pub block_type: BlockType,
    pub regex: Regex,
    pub extract: ContentExtraction,
    pub default_collapsed: bool,
}

/// A regex match, before conversion to a [`Block`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hit {
    pub block_type: BlockType,
    pub default_collapsed: bool,
    pub span: Span,
    pub content_span: Span,
    /// The `tag` capture group, for rules generated from tag rules.
    pub tag: Option<Span>,
}

const FRONT_MATTER: &str = r"(?s)\A---[ \t]*\r?\n(?P<content>.*?)\r?\n---[ \t]*(?:\r?\n|\z)";
const DELIMITED: &str = r"(?s)<<<BEGIN>>>(.*?)<<<END>>>";
const FRONT_MATTER_OPEN: &str = r"\A---[ \t]*\r?\n";
const DELIMITED_OPEN: &str = "<<<BEGIN>>>";

impl FallbackRule {
    pub fn new(
        block_type: BlockType,
        pattern: &str,
        extract: ContentExtraction,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            block_type,
            regex: Regex::new(pattern)?,
            extract,
            default_collapsed: false,
        })
    }

    #[must_use]
    pub fn collapsed(mut self) -> Self {
        self.default_collapsed = true;
        self
    }

    /// A rule matching any open alias of `rule` up to the nearest close
    /// alias, so cross-alias closes are found here too.
    pub fn for_tag_rule(rule: &TagRule) -> Result<Self, regex::Error> {
        let alternation = rule
            .names
            .iter()
            .map(|name| regex::escape(name))
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(
            r"(?is)<(?P<tag>{alternation})(?:\s[^<>/]*)?>(?P<content>.*?)</(?:{alternation})\s*>"
        );
        let mut fallback = Self::new(rule.block_type, &pattern, ContentExtraction::Named("content"))?;
        fallback.default_collapsed = rule.default_collapsed;
        Ok(fallback)
    }

    fn hits<'t>(&'t self, masked: &'t str) -> impl Iterator<Item = Hit> + 't {
        self.regex
            .captures_iter(masked)
            .filter_map(|caps| self.hit(&caps))
    }

    fn hit(&self, caps: &Captures<'_>) -> Option<Hit> {
        let whole = caps.get(0)?;
        if whole.is_empty() {
            return None;
        }
        let content = match self.extract {
            ContentExtraction::Whole => Some(whole),
            ContentExtraction::Group(index) => caps.get(index),
            ContentExtraction::Named(name) => caps.name(name),
        }
        .unwrap_or(whole);

        Some(Hit {
            block_type: self.block_type,
            default_collapsed: self.default_collapsed,
            span: whole.range().into(),
            content_span: content.range().into(),
            tag: caps.name("tag").map(|m| m.range().into()),
        })
    }
}

impl Hit {
    pub fn to_block(&self, original: &str) -> Block {
        Block {
            kind: self.block_type,
            tag_name: self.tag.map(|span| span.slice(original).to_string()),
            content: self.content_span.slice(original).to_string(),
            start: self.span.start,
            end: self.span.end,
            default_collapsed: self.default_collapsed,
            block_level: true,
            is_complete: true,
            children: None,
        }
    }
}

/// Rules for block kinds that are never tags: front matter and delimited
/// regions.
pub fn non_ast_rules() -> &'static [FallbackRule] {
    static RULES: OnceLock<Vec<FallbackRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            FallbackRule::new(
                BlockType::FrontMatter,
                FRONT_MATTER,
                ContentExtraction::Named("content"),
            )
            .expect("Invalid front matter regex")
            .collapsed(),
            FallbackRule::new(BlockType::Delimited, DELIMITED, ContentExtraction::Group(1))
                .expect("Invalid delimited region regex"),
        ]
    })
}

/// Front matter and delimited regions, as a [`RegionMask`] for streaming
/// parses.
#[derive(Debug, Clone, Copy, Default)]
pub struct NonTagRegions;

impl RegionMask for NonTagRegions {
    fn mask_regions(&self, text: &mut ProtectedText<'_>, open_ended: bool) {
        mask_regions(text, open_ended);
    }
}

/// Hides front matter and delimited regions from the lexer and returns
/// them in source order.
///
/// With `open_ended`, a region that has opened but not closed yet is masked
/// to the end of the buffer as well. It is not returned.
pub fn mask_regions(protected: &mut ProtectedText<'_>, open_ended: bool) -> Vec<Hit> {
    let hits = find_hits(protected, non_ast_rules());
    let open = if open_ended {
        open_region(protected.masked(), &hits)
    } else {
        None
    };
    for hit in &hits {
        protected.mask_region(hit.span);
    }
    if let Some(start) = open {
        protected.mask_region(Span::new(start, protected.len()));
    }
    hits
}

/// Start of the first region whose end has not arrived.
fn open_region(masked: &str, hits: &[Hit]) -> Option<usize> {
    static OPEN: OnceLock<Regex> = OnceLock::new();
    let front_matter = OPEN.get_or_init(|| {
        Regex::new(FRONT_MATTER_OPEN).expect("Invalid front matter opener regex")
    });
    let covered = |pos: usize| {
        hits.iter()
            .any(|hit| hit.span.start <= pos && pos < hit.span.end)
    };

    if front_matter.is_match(masked) && !covered(0) {
        return Some(0);
    }
    masked
        .match_indices(DELIMITED_OPEN)
        .map(|(pos, _)| pos)
        .find(|&pos| !covered(pos))
}

/// Splits every hit out of the complete text block that contains it.
///
/// The text on either side stays a text block unless it is blank. Hits
/// that do not fit inside one text block are left where they are.
pub fn carve_regions(blocks: Vec<Block>, hits: &[Hit], original: &str) -> Vec<Block> {
    if hits.is_empty() {
        return blocks;
    }
    let mut out = Vec::with_capacity(blocks.len());
    for mut block in blocks {
        if block.is_text() && block.is_complete {
            carve_text(block, hits, original, &mut out);
            continue;
        }
        block.children = block
            .children
            .take()
            .map(|children| carve_regions(children, hits, original));
        out.push(block);
    }
    out
}

fn carve_text(block: Block, hits: &[Hit], original: &str, out: &mut Vec<Block>) {
    let span = block.span();
    let mut inside = hits.iter().filter(|hit| span.contains(hit.span)).peekable();
    if inside.peek().is_none() {
        out.push(block);
        return;
    }

    let mut pos = span.start;
    for hit in inside {
        push_gap(original, Span::new(pos, hit.span.start), out);
        out.push(hit.to_block(original));
        pos = hit.span.end;
    }
    push_gap(original, Span::new(pos, span.end), out);
}

/// The non-tag rules followed by one generated rule per tag rule.
pub fn rules_for_table(table: &TagRuleTable) -> Result<Vec<FallbackRule>, regex::Error> {
    let mut rules = non_ast_rules().to_vec();
    for rule in table.rules() {
        rules.push(FallbackRule::for_tag_rule(rule)?);
    }
    Ok(rules)
}

/// Runs every rule over the masked text and keeps non-overlapping hits, in
/// source order.
pub fn find_hits(protected: &ProtectedText<'_>, rules: &[FallbackRule]) -> Vec<Hit> {
    let masked = protected.masked();
    let mut hits: Vec<Hit> = rules.iter().flat_map(|rule| rule.hits(masked)).collect();
    hits.sort_by_key(|hit| (hit.span.start, hit.span.len()));

    let mut accepted: Vec<Hit> = Vec::with_capacity(hits.len());
    for hit in hits {
        if let Some(last) = accepted.last()
            && last.span.overlaps(hit.span)
        {
            log::debug!(
                "dropping {} match at {:?}, overlaps {} match at {:?}",
                hit.block_type,
                hit.span,
                last.block_type,
                last.span
            );
            continue;
        }
        accepted.push(hit);
    }
    accepted
}

/// Splits `text` into blocks with regexes alone.
///
/// Gaps that are not only whitespace become text blocks. Neighbouring
/// blocks of the same non-text kind are merged, their contents joined by a
/// newline.
pub fn split_blocks(text: &str, rules: &[FallbackRule]) -> Vec<Block> {
    let protected = protect(text);
    let mut blocks = Vec::new();
    let mut pos = 0;

    for hit in find_hits(&protected, rules) {
        push_gap(text, Span::new(pos, hit.span.start), &mut blocks);
        push_merged(&mut blocks, hit.to_block(text));
        pos = hit.span.end;
    }
    push_gap(text, Span::new(pos, text.len()), &mut blocks);
    blocks
}

fn push_gap(text: &str, gap: Span, blocks: &mut Vec<Block>) {
    let content = gap.slice(text);
    if !content.trim().is_empty() {
        blocks.push(Block::text(gap, content));
    }
}

fn push_merged(blocks: &mut Vec<Block>, block: Block) {
    if let Some(last) = blocks.last_mut()
        && !last.is_text()
        && last.kind == block.kind
    {
        last.content.push('\n');
        last.content.push_str(&block.content);
        last.end = block.end;
        return;
    }
    blocks.push(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn builtin_rules() -> Vec<FallbackRule> {
        rules_for_table(TagRuleTable::builtin()).unwrap()
    }

    fn kinds(blocks: &[Block]) -> Vec<BlockType> {
        blocks.iter().map(|b| b.kind).collect()
    }

    #[test]
    fn splits_tags_and_text() {
        let blocks = split_blocks("a<think>x</think>b", &builtin_rules());
        assert_eq!(kinds(&blocks), vec![BlockType::Text, BlockType::Thinking, BlockType::Text]);
        assert_eq!(blocks[1].content, "x");
        assert_eq!(blocks[1].tag_name.as_deref(), Some("think"));
        assert_eq!(blocks[1].span(), Span::new(1, 17));
        assert!(blocks[1].default_collapsed);
    }

    #[rstest]
    #[case("<thinking>x</思考>")]
    #[case("<THINKING>x</thinking>")]
    #[case("<thinking mode=\"deep\">x</thinking >")]
    fn generated_rules_match_tag_variants(#[case] text: &str) {
        let blocks = split_blocks(text, &builtin_rules());
        assert_eq!(kinds(&blocks), vec![BlockType::Thinking]);
        assert_eq!(blocks[0].content, "x");
        assert_eq!(blocks[0].span(), Span::new(0, text.len()));
    }

    #[test]
    fn longer_alias_is_not_cut_short() {
        let blocks = split_blocks("<thinking>x</thinking>", &builtin_rules());
        assert_eq!(blocks[0].tag_name.as_deref(), Some("thinking"));
    }

    #[test]
    fn shorter_hit_wins_at_same_start() {
        let rules = vec![
            FallbackRule::new(BlockType::Status, "abcd", ContentExtraction::Whole).unwrap(),
            FallbackRule::new(BlockType::Options, "ab", ContentExtraction::Whole).unwrap(),
        ];
        let blocks = split_blocks("abcd", &rules);
        assert_eq!(kinds(&blocks), vec![BlockType::Options, BlockType::Text]);
        assert_eq!(blocks[1].content, "cd");
    }

    #[test]
    fn partially_overlapping_hit_is_dropped() {
        let rules = vec![
            FallbackRule::new(BlockType::Status, "abc", ContentExtraction::Whole).unwrap(),
            FallbackRule::new(BlockType::Options, "cde", ContentExtraction::Whole).unwrap(),
        ];
        let blocks = split_blocks("abcde", &rules);
        assert_eq!(kinds(&blocks), vec![BlockType::Status, BlockType::Text]);
        assert_eq!(blocks[1].content, "de");
    }

    #[test]
    fn adjacent_same_kind_blocks_merge() {
        let text = "<think>a</think>\n<think>b</think>";
        let blocks = split_blocks(text, &builtin_rules());
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "a\nb");
        assert_eq!(blocks[0].span(), Span::new(0, text.len()));
    }

    #[test]
    fn different_kinds_do_not_merge() {
        let blocks = split_blocks("<think>a</think><summary>b</summary>", &builtin_rules());
        assert_eq!(kinds(&blocks), vec![BlockType::Thinking, BlockType::Summary]);
    }

    #[test]
    fn code_is_not_split() {
        let text = "see `<think>x</think>` here";
        let blocks = split_blocks(text, &builtin_rules());
        assert_eq!(blocks, vec![Block::text(Span::new(0, text.len()), text)]);
    }

    #[test]
    fn front_matter_at_start() {
        let text = "---\ntitle: x\n---\nbody";
        let blocks = split_blocks(text, &builtin_rules());
        assert_eq!(kinds(&blocks), vec![BlockType::FrontMatter, BlockType::Text]);
        assert_eq!(blocks[0].content, "title: x");
        assert_eq!(blocks[1].content, "body");
    }

    #[test]
    fn front_matter_only_at_start() {
        let blocks = split_blocks("intro\n---\na: 1\n---\n", &builtin_rules());
        assert_eq!(kinds(&blocks), vec![BlockType::Text]);
    }

    #[test]
    fn delimited_region() {
        let blocks = split_blocks("x <<<BEGIN>>>raw<<<END>>> y", &builtin_rules());
        assert_eq!(kinds(&blocks), vec![BlockType::Text, BlockType::Delimited, BlockType::Text]);
        assert_eq!(blocks[1].content, "raw");
        assert_eq!(blocks[1].tag_name, None);
    }

    #[test]
    fn mask_regions_hides_closed_regions() {
        let text = "<<<BEGIN>>><b>x<<<END>>><i>";
        let mut protected = protect(text);
        let hits = mask_regions(&mut protected, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(0, 24));
        assert!(!protected.masked()[..24].contains('<'));
        assert_eq!(&protected.masked()[24..], "<i>");
    }

    #[rstest]
    #[case("---\ntitle: <b>x</b>\n", 0)]
    #[case("a <<<BEGIN>>>x<<<END>>> b <<<BEGIN>>><b>", 26)]
    fn open_region_masks_to_end_while_streaming(#[case] text: &str, #[case] open: usize) {
        let mut protected = protect(text);
        mask_regions(&mut protected, true);
        assert!(!protected.masked()[open..].contains('<'));

        let mut protected = protect(text);
        mask_regions(&mut protected, false);
        assert!(protected.masked()[open..].contains('<'));
    }

    #[test]
    fn carve_only_splits_text_that_holds_the_whole_region() {
        let text = "ab<<<BEGIN>>>x<<<END>>>";
        let mut protected = protect(text);
        let hits = mask_regions(&mut protected, false);

        let split = vec![
            Block::text(Span::new(0, 4), &text[..4]),
            Block::text(Span::new(4, text.len()), &text[4..]),
        ];
        assert_eq!(carve_regions(split.clone(), &hits, text), split);

        let whole = vec![Block::text(Span::new(0, text.len()), text)];
        let carved = carve_regions(whole, &hits, text);
        assert_eq!(kinds(&carved), vec![BlockType::Text, BlockType::Delimited]);
        assert_eq!(carved[0].content, "ab");
        assert_eq!(carved[1].content, "x");
    }

    #[rstest]
    #[case("")]
    #[case(" \n\t ")]
    fn blank_text_has_no_blocks(#[case] text: &str) {
        assert!(split_blocks(text, &builtin_rules()).is_empty());
    }
}
