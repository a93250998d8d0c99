use serde::Serialize;
use tagfold_syntax::{AstNode, BlockType, Span, TagRuleTable};

/// Render-facing projection of a parsed node.
///
/// `start..end` covers the whole element, tags included; `content` is the
/// inner text only. Renderers pick an icon and label by `kind` and must show
/// unknown kinds with a generic style instead of dropping them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    #[serde(rename = "type")]
    pub kind: BlockType,
    /// The tag name as written, when the block came from a tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_name: Option<String>,
    pub content: String,
    pub start: usize,
    pub end: usize,
    pub default_collapsed: bool,
    pub block_level: bool,
    pub is_complete: bool,
    pub children: Option<Vec<Block>>,
}

impl Block {
    pub fn text(span: Span, content: &str) -> Self {
        Self {
            kind: BlockType::Text,
            tag_name: None,
            content: content.to_string(),
            start: span.start,
            end: span.end,
            default_collapsed: false,
            block_level: true,
            is_complete: true,
            children: None,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn is_text(&self) -> bool {
        self.kind == BlockType::Text
    }

    /// Converts a node and its descendants.
    ///
    /// Variables blocks drop their text children: the command interpreter
    /// reads `content`, and only nested tags are worth rendering separately.
    pub fn from_node(node: &AstNode, rules: &TagRuleTable) -> Self {
        if node.is_text() {
            let mut block = Block::text(node.span, &node.content);
            block.is_complete = node.is_complete;
            return block;
        }

        let resolved = rules.resolve(&node.raw_tag_name);
        let children: Vec<Block> = node
            .children
            .iter()
            .filter(|child| !(node.block_type == BlockType::Variables && child.is_text()))
            .map(|child| Block::from_node(child, rules))
            .collect();

        Self {
            kind: node.block_type,
            tag_name: Some(node.raw_tag_name.clone()),
            content: node.content.clone(),
            start: node.span.start,
            end: node.span.end,
            default_collapsed: resolved.default_collapsed,
            block_level: resolved.block_level,
            is_complete: node.is_complete,
            children: (!children.is_empty()).then_some(children),
        }
    }
}

pub fn blocks_from_nodes(nodes: &[AstNode], rules: &TagRuleTable) -> Vec<Block> {
    nodes.iter().map(|node| Block::from_node(node, rules)).collect()
}
