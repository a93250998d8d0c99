//! # Protection - Hiding Code From the Lexer
//!
//! Models love to explain their own markup, so transcripts are full of
//! `` `<thinking>` `` and fenced examples containing tags. None of that may
//! be parsed as structure.
//!
//! [`protect`] finds fenced code blocks (```` ``` ```` / `~~~`) and inline
//! code spans and records each one as a [`Slot`]. Inside a slot every `<`
//! is replaced by [`SLOT_MASK`], which the lexer treats as ordinary text.
//! The mask is one byte, like `<`, so the masked buffer has exactly the
//! same length and offsets as the original, and [`ProtectedText::restore`]
//! recovers the verbatim source of any span by slicing the original.
//!
//! Protection runs before lexing; restoration happens when node content is
//! materialized. Lexing the unmasked text would let tag-like text inside
//! code become markup.
//!
//! Code is not the only thing kept away from the lexer. Callers that know
//! other tagless syntaxes (front matter, delimited regions) hide them with
//! [`ProtectedText::mask_region`], or through a [`RegionMask`] when the
//! parse happens inside a [`StreamingParser`](crate::StreamingParser).

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

use crate::span::Span;

/// Stand-in for `<` inside protected regions.
pub const SLOT_MASK: char = '\u{1A}';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceSig {
    Backticks,
    Tildes,
}

/// Fence detection for a single line.
pub struct CodeFence;

impl CodeFence {
    pub const BACKTICKS: &'static str = "```";
    pub const TILDES: &'static str = "~~~";

    /// Recognizes a fence line: up to three spaces of indent, then three or
    /// more backticks or tildes. Returns the fence char kind and run length.
    pub fn sig(line: &str) -> Option<(FenceSig, usize)> {
        let t = line.trim_end_matches(['\r', '\n']);
        let indent = t.len() - t.trim_start_matches(' ').len();
        if indent > 3 {
            return None;
        }
        let t = &t[indent..];
        let (sig, ch) = if t.starts_with(Self::BACKTICKS) {
            (FenceSig::Backticks, '`')
        } else if t.starts_with(Self::TILDES) {
            (FenceSig::Tildes, '~')
        } else {
            return None;
        };
        let run = t.len() - t.trim_start_matches(ch).len();
        Some((sig, run))
    }

    /// Whether `line` closes a fence opened with `open`: same char, at least
    /// as long, nothing but whitespace after.
    pub fn closes(open: (FenceSig, usize), line: &str) -> bool {
        let Some((sig, run)) = Self::sig(line) else {
            return false;
        };
        let ch = match sig {
            FenceSig::Backticks => '`',
            FenceSig::Tildes => '~',
        };
        sig == open.0
            && run >= open.1
            && line.trim().trim_start_matches(ch).trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    FencedCode,
    InlineCode,
    /// An inline code span whose closing backtick has not arrived yet.
    OpenInlineCode,
    /// A region masked by the caller.
    Region,
}

/// A protected region of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub kind: SlotKind,
    pub span: Span,
}

/// A buffer with its code regions masked out.
#[derive(Debug, Clone)]
pub struct ProtectedText<'a> {
    original: &'a str,
    masked: Cow<'a, str>,
    slots: Vec<Slot>,
}

impl<'a> ProtectedText<'a> {
    pub fn original(&self) -> &'a str {
        self.original
    }

    /// The buffer the lexer should see.
    pub fn masked(&self) -> &str {
        &self.masked
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Verbatim original text for `span`, with any protected code restored.
    pub fn restore(&self, span: Span) -> &'a str {
        span.slice(self.original)
    }

    /// Hides `span` from the lexer. Out-of-bounds spans are clamped.
    pub fn mask_region(&mut self, span: Span) {
        let span = Span::new(span.start.min(self.len()), span.end.min(self.len()));
        if span.is_empty() {
            return;
        }
        self.slots.push(Slot {
            kind: SlotKind::Region,
            span,
        });
        self.slots.sort_by_key(|slot| slot.span.start);

        let region = span.slice(&self.masked);
        if region.contains('<') {
            let hidden = region.replace('<', SLOT_MASK.encode_utf8(&mut [0; 4]));
            self.masked.to_mut().replace_range(span.start..span.end, &hidden);
        }
    }
}

/// Regions other than code that must not be lexed, found by whoever knows
/// their syntax.
pub trait RegionMask {
    /// Masks the regions of `text` with [`ProtectedText::mask_region`].
    ///
    /// With `open_ended`, the buffer is still growing: a region that has
    /// opened but not closed yet is masked to the end of the buffer, since
    /// its end may still arrive.
    fn mask_regions(&self, text: &mut ProtectedText<'_>, open_ended: bool);
}

/// Protects a complete buffer.
pub fn protect(text: &str) -> ProtectedText<'_> {
    protect_with(text, false)
}

/// Protects a buffer that is still growing.
///
/// In addition to [`protect`], the first backtick on the final, unterminated
/// line masks everything after it. How the backticks on that line pair up is
/// not settled until the line ends, and a tag after one must not be reported
/// before then.
pub fn protect_streaming(text: &str) -> ProtectedText<'_> {
    protect_with(text, true)
}

fn protect_with(text: &str, streaming: bool) -> ProtectedText<'_> {
    let mut slots = fenced_slots(text);
    let mut inline = Vec::new();

    let mut gap_start = 0;
    for fence in &slots {
        inline_slots(text, Span::new(gap_start, fence.span.start), &mut inline);
        gap_start = fence.span.end;
    }
    inline_slots(text, Span::new(gap_start, text.len()), &mut inline);

    if streaming && let Some(open) = open_inline_slot(text, gap_start) {
        inline.retain(|slot| slot.span.end <= open.span.start);
        inline.push(open);
    }

    slots.extend(inline);
    slots.sort_by_key(|slot| slot.span.start);

    let needs_mask = slots
        .iter()
        .any(|slot| slot.span.slice(text).contains('<'));
    let masked = if needs_mask {
        Cow::Owned(mask(text, &slots))
    } else {
        Cow::Borrowed(text)
    };

    ProtectedText {
        original: text,
        masked,
        slots,
    }
}

/// Line scan for fenced code blocks. An unclosed fence runs to the end.
fn fenced_slots(text: &str) -> Vec<Slot> {
    let mut slots = Vec::new();
    let mut open: Option<((FenceSig, usize), usize)> = None;
    let mut line_start = 0;

    for line in text.split_inclusive('\n') {
        let line_end = line_start + line.len();
        match open {
            None => {
                if let Some(sig) = CodeFence::sig(line) {
                    open = Some((sig, line_start));
                }
            }
            Some((sig, start)) => {
                if CodeFence::closes(sig, line) {
                    let end = line_end - (line.len() - line.trim_end_matches(['\r', '\n']).len());
                    slots.push(Slot {
                        kind: SlotKind::FencedCode,
                        span: Span::new(start, end),
                    });
                    open = None;
                }
            }
        }
        line_start = line_end;
    }

    if let Some((_, start)) = open {
        slots.push(Slot {
            kind: SlotKind::FencedCode,
            span: Span::new(start, text.len()),
        });
    }
    slots
}

fn inline_code_regex() -> &'static Regex {
    static INLINE_CODE: OnceLock<Regex> = OnceLock::new();
    INLINE_CODE.get_or_init(|| {
        Regex::new(r"``[^\n]*?``|`[^`\n]+`").expect("Invalid inline code regex")
    })
}

fn inline_slots(text: &str, range: Span, out: &mut Vec<Slot>) {
    if range.is_empty() {
        return;
    }
    let segment = range.slice(text);
    for m in inline_code_regex().find_iter(segment) {
        out.push(Slot {
            kind: SlotKind::InlineCode,
            span: Span::from(m.range()).shifted(range.start),
        });
    }
}

/// Masks from the first backtick on the last line, after the last fence.
fn open_inline_slot(text: &str, after: usize) -> Option<Slot> {
    if text.ends_with('\n') {
        return None;
    }
    let tail = text.get(after..)?;
    let line_start = tail.rfind('\n').map_or(after, |n| after + n + 1);
    let tick = text[line_start..].find('`')?;
    Some(Slot {
        kind: SlotKind::OpenInlineCode,
        span: Span::new(line_start + tick, text.len()),
    })
}

fn mask(text: &str, slots: &[Slot]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    for slot in slots {
        out.push_str(&text[pos..slot.span.start]);
        for c in slot.span.slice(text).chars() {
            out.push(if c == '<' { SLOT_MASK } else { c });
        }
        pos = slot.span.end;
    }
    out.push_str(&text[pos..]);
    out
}
