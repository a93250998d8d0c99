use crate::span::Span;
use crate::tag_rules::BlockType;

/// A node of the annotated syntax tree.
///
/// Tag nodes have `span` covering the whole element, tags included, and
/// `content_span` covering the inner text. Text leaves have both spans equal.
/// `content` is always the verbatim original text of `content_span`, with
/// protected code restored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstNode {
    pub block_type: BlockType,
    pub span: Span,
    pub content_span: Span,
    pub content: String,
    /// False when the closing tag (or the opening tag's `>`) never arrived.
    pub is_complete: bool,
    /// Nested tags and text between them, in source order.
    pub children: Vec<AstNode>,
    /// The tag name as written in the opening tag; empty for text.
    pub raw_tag_name: String,
}

impl AstNode {
    pub fn text(span: Span, content: &str, is_complete: bool) -> Self {
        Self {
            block_type: BlockType::Text,
            span,
            content_span: span,
            content: content.to_string(),
            is_complete,
            children: Vec::new(),
            raw_tag_name: String::new(),
        }
    }

    pub fn is_text(&self) -> bool {
        self.block_type == BlockType::Text
    }

    pub fn start(&self) -> usize {
        self.span.start
    }

    pub fn end(&self) -> usize {
        self.span.end
    }

    /// True if this node or any descendant is incomplete.
    pub fn has_incomplete(&self) -> bool {
        !self.is_complete || self.children.iter().any(AstNode::has_incomplete)
    }

    /// Depth-first walk over this node and its descendants.
    pub fn walk(&self, visit: &mut impl FnMut(&AstNode)) {
        visit(self);
        for child in &self.children {
            child.walk(visit);
        }
    }
}
