//! The Tag Rule Table: which tag names mean what.
//!
//! Every recognized tag name (an *alias*) maps to exactly one [`BlockType`].
//! Several aliases, often in different languages, share a block type; a tag
//! opened under one alias may be closed under any other alias of the same
//! type (`<thinking>…</思考>`). Names that are in no rule still parse, as
//! [`BlockType::Unknown`].
//!
//! The table is validated once, when it is built. A broken table is a
//! configuration error and never surfaces at parse time.

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Semantic type of a parsed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockType {
    /// Free-form Markdown between tags.
    Text,
    /// Model reasoning (`<thinking>`, `<思考>`, ...).
    Thinking,
    /// Variable update commands (`<UpdateVariable>`), handed to a command parser.
    Variables,
    /// Summaries of earlier turns.
    Summary,
    /// Status bars.
    Status,
    /// Suggested follow-up choices.
    Options,
    /// YAML front matter at the start of a message. Regex rules only.
    FrontMatter,
    /// `<<<BEGIN>>>…<<<END>>>` regions. Regex rules only.
    Delimited,
    /// A tag name that is in no rule.
    Unknown,
}

impl BlockType {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockType::Text => "text",
            BlockType::Thinking => "thinking",
            BlockType::Variables => "variables",
            BlockType::Summary => "summary",
            BlockType::Status => "status",
            BlockType::Options => "options",
            BlockType::FrontMatter => "front_matter",
            BlockType::Delimited => "delimited",
            BlockType::Unknown => "unknown",
        }
    }

    /// Whether tag aliases may be bound to this type in a [`TagRule`].
    pub fn is_taggable(self) -> bool {
        !matches!(
            self,
            BlockType::Text | BlockType::FrontMatter | BlockType::Delimited | BlockType::Unknown
        )
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the table: a set of aliases and what they mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRule {
    /// Tag names, matched case-insensitively.
    pub names: Vec<String>,
    pub block_type: BlockType,
    /// Whether the renderer should start the block collapsed.
    pub default_collapsed: bool,
    /// Block-level tags render as their own widget; others render inline.
    pub block_level: bool,
}

impl TagRule {
    pub fn new(block_type: BlockType, names: &[&str]) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            block_type,
            default_collapsed: false,
            block_level: true,
        }
    }

    #[must_use]
    pub fn collapsed(mut self) -> Self {
        self.default_collapsed = true;
        self
    }

    #[must_use]
    pub fn inline(mut self) -> Self {
        self.block_level = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleTableError {
    #[error("alias `{alias}` is mapped to both {first} and {second}")]
    DuplicateAlias {
        alias: String,
        first: BlockType,
        second: BlockType,
    },

    #[error("rule for {block_type} declares no aliases")]
    EmptyRule { block_type: BlockType },

    #[error("alias `{alias}` is not a valid tag name")]
    InvalidAlias { alias: String },

    #[error("{block_type} blocks cannot be bound to tag aliases")]
    ReservedType { block_type: BlockType },
}

/// The equivalence class a tag name belongs to for open/close matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TagGroup {
    /// Any alias of this block type closes the tag.
    Known(BlockType),
    /// Only the same literal name (case-insensitive) closes the tag.
    Unknown(String),
}

/// How a tag name resolved against the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub block_type: BlockType,
    pub default_collapsed: bool,
    pub block_level: bool,
}

impl Resolved {
    const UNKNOWN: Resolved = Resolved {
        block_type: BlockType::Unknown,
        default_collapsed: false,
        block_level: true,
    };
}

/// A validated, immutable set of [`TagRule`]s with an alias index.
#[derive(Debug, Clone)]
pub struct TagRuleTable {
    rules: Vec<TagRule>,
    /// Lower-cased alias → index into `rules`.
    aliases: HashMap<String, usize>,
}

impl TagRuleTable {
    /// Builds and validates a table. Earlier rules win for repeated aliases
    /// of the same type; an alias bound to two different types is an error.
    pub fn new(rules: Vec<TagRule>) -> Result<Self, RuleTableError> {
        let mut aliases: HashMap<String, usize> = HashMap::new();

        for (index, rule) in rules.iter().enumerate() {
            if !rule.block_type.is_taggable() {
                return Err(RuleTableError::ReservedType {
                    block_type: rule.block_type,
                });
            }
            if rule.names.is_empty() {
                return Err(RuleTableError::EmptyRule {
                    block_type: rule.block_type,
                });
            }
            for name in &rule.names {
                if !is_valid_tag_name(name) {
                    return Err(RuleTableError::InvalidAlias {
                        alias: name.clone(),
                    });
                }
                let key = name.to_lowercase();
                match aliases.get(&key) {
                    Some(&existing) if rules[existing].block_type != rule.block_type => {
                        return Err(RuleTableError::DuplicateAlias {
                            alias: name.clone(),
                            first: rules[existing].block_type,
                            second: rule.block_type,
                        });
                    }
                    Some(_) => {}
                    None => {
                        aliases.insert(key, index);
                    }
                }
            }
        }

        Ok(Self { rules, aliases })
    }

    /// The table shipped with the crate.
    pub fn builtin() -> &'static TagRuleTable {
        static BUILTIN: OnceLock<TagRuleTable> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            TagRuleTable::new(builtin_rules()).expect("built-in tag rules are valid")
        })
    }

    pub fn rules(&self) -> &[TagRule] {
        &self.rules
    }

    /// Looks up the rule for a tag name, case-insensitively.
    pub fn lookup(&self, name: &str) -> Option<&TagRule> {
        self.aliases
            .get(&name.to_lowercase())
            .map(|&index| &self.rules[index])
    }

    /// Resolves a tag name, falling back to [`BlockType::Unknown`].
    pub fn resolve(&self, name: &str) -> Resolved {
        self.lookup(name)
            .map(|rule| Resolved {
                block_type: rule.block_type,
                default_collapsed: rule.default_collapsed,
                block_level: rule.block_level,
            })
            .unwrap_or(Resolved::UNKNOWN)
    }

    pub fn group(&self, name: &str) -> TagGroup {
        match self.lookup(name) {
            Some(rule) => TagGroup::Known(rule.block_type),
            None => TagGroup::Unknown(name.to_lowercase()),
        }
    }

    /// Whether a close tag named `close_name` closes a tag in `group`.
    pub fn closes(&self, group: &TagGroup, close_name: &str) -> bool {
        self.group(close_name) == *group
    }
}

/// The built-in rules, in registration order.
pub fn builtin_rules() -> Vec<TagRule> {
    vec![
        TagRule::new(
            BlockType::Thinking,
            &["thinking", "think", "思考", "ThinkingProcess", "思维链", "reasoning"],
        )
        .collapsed(),
        TagRule::new(
            BlockType::Variables,
            &["UpdateVariable", "update_variable", "变量更新"],
        )
        .collapsed(),
        TagRule::new(BlockType::Summary, &["summary", "总结", "摘要"]).collapsed(),
        TagRule::new(BlockType::Status, &["status", "StatusBar", "状态栏"]),
        TagRule::new(BlockType::Options, &["options", "choices", "选项"]),
    ]
}

/// First char of a tag name. Alphabetic covers CJK ideographs.
pub fn is_tag_name_start(c: char) -> bool {
    c.is_alphabetic()
}

/// Any later char of a tag name.
pub fn is_tag_name_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

/// Whether the lexer would read `name` as a complete tag name.
pub fn is_valid_tag_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_tag_name_start(first) => chars.all(is_tag_name_char),
        _ => false,
    }
}
