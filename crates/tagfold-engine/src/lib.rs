//! Folds tagged LLM transcripts into collapsible render blocks.
//!
//! ```
//! use tagfold_engine::{BlockType, FoldEngine};
//!
//! let engine = FoldEngine::new().unwrap();
//! let out = engine.process_text("<思考>plan</思考>Answer.");
//! assert_eq!(out.blocks[0].kind, BlockType::Thinking);
//! assert!(out.blocks[0].default_collapsed);
//! ```

pub mod block;
pub mod engine;
pub mod fallback;

pub use block::{Block, blocks_from_nodes};
pub use engine::{EngineError, FoldEngine, FoldOutput, FoldStats, FoldStream, StructuralParser, TagParser};
pub use fallback::{ContentExtraction, FallbackRule, split_blocks};
pub use tagfold_syntax::{BlockType, ParseOptions, StreamError, TagRule, TagRuleTable};
