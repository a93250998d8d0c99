//! Structural checks on a parsed tree.
//!
//! The parser is written never to violate these, so a failure here means a
//! parser bug. The fold engine runs [`check`] on every tree and falls back to
//! regex splitting when it fails.

use thiserror::Error;

use super::ast::AstNode;
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("node span {span:?} is outside the buffer (length {len})")]
    SpanOutOfBounds { span: Span, len: usize },

    #[error("content span {content:?} is not inside node span {span:?}")]
    ContentOutsideSpan { content: Span, span: Span },

    #[error("sibling spans {previous:?} and {next:?} overlap or are out of order")]
    Overlap { previous: Span, next: Span },

    #[error("child span {child:?} is not inside parent content {parent:?}")]
    ChildOutsideParent { child: Span, parent: Span },

    #[error("content of node at {span:?} differs from the source text")]
    ContentMismatch { span: Span },
}

/// Checks a parsed forest against the buffer it was parsed from.
pub fn check(nodes: &[AstNode], source: &str) -> Result<(), ParseError> {
    check_siblings(nodes, Span::new(0, source.len()), source)
}

fn check_siblings(nodes: &[AstNode], bounds: Span, source: &str) -> Result<(), ParseError> {
    let mut previous: Option<Span> = None;

    for node in nodes {
        let span = node.span;
        if span.start > span.end || span.end > source.len() {
            return Err(ParseError::SpanOutOfBounds {
                span,
                len: source.len(),
            });
        }
        if !bounds.contains(span) {
            return Err(ParseError::ChildOutsideParent {
                child: span,
                parent: bounds,
            });
        }
        let content = node.content_span;
        if content.start > content.end || !span.contains(content) {
            return Err(ParseError::ContentOutsideSpan { content, span });
        }
        if let Some(previous) = previous
            && previous.end > span.start
        {
            return Err(ParseError::Overlap {
                previous,
                next: span,
            });
        }
        if source.get(content.start..content.end) != Some(node.content.as_str()) {
            return Err(ParseError::ContentMismatch { span });
        }

        check_siblings(&node.children, content, source)?;
        previous = Some(span);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::tag_rules::TagRuleTable;
    use pretty_assertions::assert_eq;

    #[test]
    fn parsed_trees_pass() {
        let source = "a<think>b<summary>c</summary></think>`<x>`<status>";
        let out = parse(source, TagRuleTable::builtin());
        assert_eq!(check(&out.nodes, source), Ok(()));
    }

    #[test]
    fn detects_out_of_bounds() {
        let node = AstNode::text(Span::new(0, 10), "abc", true);
        assert!(matches!(
            check(&[node], "abc"),
            Err(ParseError::SpanOutOfBounds { len: 3, .. })
        ));
    }

    #[test]
    fn detects_overlap() {
        let source = "abcdef";
        let nodes = [
            AstNode::text(Span::new(0, 4), "abcd", true),
            AstNode::text(Span::new(2, 6), "cdef", true),
        ];
        assert_eq!(
            check(&nodes, source),
            Err(ParseError::Overlap {
                previous: Span::new(0, 4),
                next: Span::new(2, 6),
            })
        );
    }

    #[test]
    fn detects_content_mismatch() {
        let node = AstNode::text(Span::new(0, 3), "xyz", true);
        assert_eq!(
            check(&[node], "abc"),
            Err(ParseError::ContentMismatch {
                span: Span::new(0, 3)
            })
        );
    }

    #[test]
    fn detects_child_outside_parent() {
        let source = "<think>ab</think>cd";
        let mut out = parse(source, TagRuleTable::builtin());
        out.nodes[0].children[0] = AstNode::text(Span::new(17, 19), "cd", true);
        assert!(matches!(
            check(&out.nodes, source),
            Err(ParseError::ChildOutsideParent { .. })
        ));
    }
}
