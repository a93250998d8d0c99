use std::fmt::Write as _;
use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use tagfold_config::Config;
use tagfold_engine::{Block, FoldEngine, FoldOutput};

const PREVIEW_CHARS: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Indented block tree
    Tree,
    /// The block forest as JSON
    Json,
}

/// Fold a tagged LLM transcript into collapsible blocks.
#[derive(Debug, Parser)]
#[command(name = "tagfold", version)]
struct Args {
    /// Transcript to fold; reads stdin when omitted
    file: Option<PathBuf>,

    /// Config file [default: ~/.config/tagfold/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Feed the input in chunks of this many characters, like a token stream
    #[arg(long, value_name = "CHARS")]
    stream: Option<NonZeroUsize>,

    #[arg(long, value_enum, default_value_t = Format::Tree)]
    format: Format,
}

fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let engine = FoldEngine::with_rules(config.rule_table()?)?.with_options(config.parse_options());

    let text = read_input(args.file.as_deref())?;
    let output = match args.stream {
        Some(size) => stream_text(&engine, &text, size.get())?,
        None => engine.process_text(&text),
    };
    if !output.used_ast {
        log::warn!("structural parse failed, showing regex fallback blocks");
    }
    log::debug!("{:?}", output.stats);

    match args.format {
        Format::Tree => print!("{}", render_tree(&output.blocks)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&output.blocks)?),
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = path.map_or_else(Config::config_path, Path::to_path_buf);
    match Config::load_from_path(&config_path)? {
        Some(config) => {
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        }
        None if path.is_some() => bail!("config file not found: {}", config_path.display()),
        None => {
            log::debug!("No config at {}, using built-in rules", config_path.display());
            Ok(Config::default())
        }
    }
}

fn read_input(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("failed to read stdin")?;
            Ok(text)
        }
    }
}

fn stream_text(engine: &FoldEngine, text: &str, size: usize) -> Result<FoldOutput> {
    let chars: Vec<char> = text.chars().collect();
    let mut stream = engine.stream();

    for (index, chunk) in chars.chunks(size).enumerate() {
        let chunk: String = chunk.iter().collect();
        let update = stream.process_streaming_text(&chunk, false)?;
        if !update.blocks.is_empty() {
            let kinds: Vec<_> = update.blocks.iter().map(|b| b.kind.as_str()).collect();
            log::info!("chunk {index}: completed {}", kinds.join(", "));
        }
    }

    Ok(stream.process_streaming_text("", true)?)
}

fn render_tree(blocks: &[Block]) -> String {
    let mut out = String::new();
    for block in blocks {
        render_block(block, 0, &mut out);
    }
    out
}

fn render_block(block: &Block, depth: usize, out: &mut String) {
    let marker = match (block.is_text(), block.default_collapsed) {
        (true, _) => "-",
        (false, true) => "▸",
        (false, false) => "▾",
    };
    let tag = block
        .tag_name
        .as_deref()
        .map(|name| format!(" <{name}>"))
        .unwrap_or_default();
    let incomplete = if block.is_complete { "" } else { " (incomplete)" };

    let _ = writeln!(
        out,
        "{}{marker} {}{tag} {}..{}{incomplete}: {}",
        "  ".repeat(depth),
        block.kind,
        block.start,
        block.end,
        preview(&block.content)
    );
    for child in block.children.iter().flatten() {
        render_block(child, depth + 1, out);
    }
}

/// First non-blank line, shortened.
fn preview(content: &str) -> String {
    let line = content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");
    if line.chars().count() > PREVIEW_CHARS {
        let short: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{short}…")
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn parses_stream_and_format() {
        let args = Args::try_parse_from(["tagfold", "chat.md", "--stream", "4", "--format", "json"]).unwrap();
        assert_eq!(args.file, Some(PathBuf::from("chat.md")));
        assert_eq!(args.stream.map(NonZeroUsize::get), Some(4));
        assert_eq!(args.format, Format::Json);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        assert!(Args::try_parse_from(["tagfold", "--stream", "0"]).is_err());
    }

    #[test]
    fn renders_nested_tree() {
        let engine = FoldEngine::new().unwrap();
        let out = engine.process_text("Hi\n<think>a\n<status>ok</status></think><summary>cut");
        assert_eq!(
            render_tree(&out.blocks),
            "- text 0..3: Hi\n\
             ▸ thinking <think> 3..39: a\n\
             \x20 - text 10..12: a\n\
             \x20 ▾ status <status> 12..31: ok\n\
             \x20   - text 20..22: ok\n\
             ▸ summary <summary> 39..51 (incomplete): cut\n\
             \x20 - text 48..51: cut\n"
        );
    }

    #[test]
    fn preview_uses_first_non_blank_line() {
        assert_eq!(preview("\n\n  hello  \nworld"), "hello");
        assert_eq!(preview(&"x".repeat(70)), format!("{}…", "x".repeat(60)));
        assert_eq!(preview(""), "");
    }

    #[test]
    fn streamed_output_matches_one_shot() {
        let engine = FoldEngine::new().unwrap();
        let text = "<思考>plan</思考>Answer <status>ok</status>";
        let streamed = stream_text(&engine, text, 3).unwrap();
        assert_eq!(streamed.blocks, engine.process_text(text).blocks);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/tagfold.toml"))).is_err());
    }
}
