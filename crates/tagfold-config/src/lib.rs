use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tagfold_syntax::tag_rules::builtin_rules;
use tagfold_syntax::{BlockType, ParseOptions, RuleTableError, TagRule, TagRuleTable};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid tag rules: {source}")]
    InvalidRules {
        #[from]
        source: RuleTableError,
    },
}

/// Contents of `config.toml`. Every field is optional in the file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Use only the rules below instead of appending them to the built-ins.
    pub replace_builtin_rules: bool,
    pub parser: ParserConfig,
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub max_nesting_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: ParseOptions::DEFAULT_MAX_NESTING_DEPTH,
        }
    }
}

/// A `[[rules]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub names: Vec<String>,
    pub block_type: BlockType,
    #[serde(default)]
    pub default_collapsed: bool,
    #[serde(default = "default_block_level")]
    pub block_level: bool,
}

fn default_block_level() -> bool {
    true
}

impl RuleConfig {
    pub fn to_rule(&self) -> TagRule {
        TagRule {
            names: self.names.clone(),
            block_type: self.block_type,
            default_collapsed: self.default_collapsed,
            block_level: self.block_level,
        }
    }
}

impl Config {
    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        // Expand shell variables and tilde in the given path
        let config_path = Self::expand_path(config_path).unwrap_or_else(|| config_path.to_path_buf());
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.clone(),
                source,
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.clone(),
                source,
            })?;

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        let config_path = Self::config_path();
        Self::load_from_path(&config_path)
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        self.save_to_path(&config_path)
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/tagfold");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    /// Builds the tag rule table: built-ins first unless replaced, then the
    /// configured rules. Fails on conflicting or malformed aliases.
    pub fn rule_table(&self) -> Result<TagRuleTable, ConfigError> {
        let mut rules = if self.replace_builtin_rules {
            Vec::new()
        } else {
            builtin_rules()
        };
        rules.extend(self.rules.iter().map(RuleConfig::to_rule));
        Ok(TagRuleTable::new(rules)?)
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            max_nesting_depth: self.parser.max_nesting_depth,
            ..ParseOptions::default()
        }
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        match shellexpand::full(&path_str) {
            Ok(expanded) => Some(PathBuf::from(expanded.as_ref())),
            Err(_) => None,
        }
    }
}
