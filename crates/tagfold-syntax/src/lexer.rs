//! # Lexer - Tokenizing Tagged Transcripts
//!
//! Breaks a transcript buffer into [`TagOpen`], [`TagClose`] and [`Text`]
//! tokens, one at a time, ending with an endless run of [`Eof`].
//!
//! [`TagOpen`]: TokenKind::TagOpen
//! [`TagClose`]: TokenKind::TagClose
//! [`Text`]: TokenKind::Text
//! [`Eof`]: TokenKind::Eof
//!
//! ## The Lossless Guarantee
//!
//! Every byte of the input appears in exactly one token. Concatenating the
//! token texts gives back the original buffer:
//!
//! ```
//! use tagfold_syntax::lexer::lex;
//!
//! let input = "before <thinking a=\"1\">inside</思考> after";
//! let tokens = lex(input);
//! let reconstructed: String = tokens.iter().map(|t| t.text).collect();
//! assert_eq!(input, reconstructed);
//! ```
//!
//! ## Torn Tags
//!
//! Model output arrives as a token stream, so the buffer often ends in the
//! middle of a tag (`<thin`, `</思`, `<thinking attr="x`). Instead of failing,
//! the lexer returns a tag token spanning to the end of the buffer with
//! `torn = true` and whatever name it managed to read. The parser turns that
//! into an incomplete node.
//!
//! ## What Is Not a Tag
//!
//! A `<` only starts a tag when a letter follows it (optionally after `/`),
//! so `a < b` and `I <3 it` stay text. If another `<` shows up before the
//! tag's `>`, the first `<` was literal text after all.
//!
//! The lexer knows nothing about which names are meaningful. Resolving names
//! against the tag rule table is the parser's job.

use crate::cursor::Cursor;
use crate::span::Span;
use crate::tag_rules::{is_tag_name_char, is_tag_name_start};

/// Kinds of tokens produced by the [`Lexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `<name ...>` or `<name/>`
    TagOpen,
    /// `</name>`
    TagClose,
    /// Everything up to the next `<`.
    Text,
    /// End of input. Repeats forever once reached.
    Eof,
}

/// A lexed token. Never mutated after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// The raw source text of the token.
    pub text: &'a str,
    /// Absolute byte offset of the first byte.
    pub offset: usize,
    /// Tag name as written, for tag tokens.
    pub tag_name: Option<&'a str>,
    /// `<name/>`
    pub self_closing: bool,
    /// The buffer ended before the tag's `>`.
    pub torn: bool,
}

impl<'a> Token<'a> {
    fn text(text: &'a str, offset: usize) -> Self {
        Self {
            kind: TokenKind::Text,
            text,
            offset,
            tag_name: None,
            self_closing: false,
            torn: false,
        }
    }

    fn eof(offset: usize) -> Self {
        Self {
            kind: TokenKind::Eof,
            text: "",
            offset,
            tag_name: None,
            self_closing: false,
            torn: false,
        }
    }

    pub fn span(&self) -> Span {
        Span::new(self.offset, self.end())
    }

    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }

    /// The tag name, or `""` for non-tag tokens and nameless torn tags.
    pub fn name(&self) -> &'a str {
        self.tag_name.unwrap_or("")
    }
}

/// On-demand tokenizer over a buffer, or over a range of one.
///
/// Holds nothing but a cursor. The parser drives it strictly forward, except
/// that it may move the cursor back with [`Lexer::reset_to`] when it decides
/// an opening tag was literal text after all.
#[derive(Clone)]
pub struct Lexer<'a> {
    cur: Cursor<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            cur: Cursor::new(input, 0),
        }
    }

    /// Lexes `input[range]`, reporting offsets against all of `input`.
    ///
    /// An out-of-bounds range lexes as empty input.
    pub fn with_range(input: &'a str, range: Span) -> Self {
        let slice = input.get(range.start..range.end).unwrap_or("");
        Self {
            cur: Cursor::new(slice, range.start),
        }
    }

    /// Absolute position of the next unread byte.
    pub fn position(&self) -> usize {
        self.cur.pos()
    }

    /// Absolute end of the lexed range.
    pub fn end(&self) -> usize {
        self.cur.end()
    }

    pub fn reset_to(&mut self, pos: usize) {
        self.cur.reset_to(pos);
    }

    /// Produces the next token.
    pub fn next_token(&mut self) -> Token<'a> {
        if self.cur.eof() {
            return Token::eof(self.cur.pos());
        }

        if self.cur.peek() == Some(b'<')
            && let Some(tag) = self.try_tag()
        {
            return tag;
        }

        let start = self.cur.pos();
        // A `<` that did not start a tag is the first byte of this text run.
        let skip = usize::from(self.cur.peek() == Some(b'<'));
        let run = self.cur.rest()[skip..]
            .find('<')
            .map_or(self.cur.rest().len(), |n| n + skip);
        self.cur.bump_n(run);
        Token::text(self.cur.text_from(start), start)
    }

    /// Attempts to read a tag at the current `<`.
    ///
    /// Returns `None`, with the cursor restored, if the `<` is literal text.
    fn try_tag(&mut self) -> Option<Token<'a>> {
        let saved = self.cur.clone();
        let start = self.cur.pos();

        self.cur.bump(); // <
        let closing = self.cur.peek() == Some(b'/');
        if closing {
            self.cur.bump();
        }
        let kind = if closing {
            TokenKind::TagClose
        } else {
            TokenKind::TagOpen
        };

        let name_start = self.cur.pos();
        if let Some(first) = self.cur.peek_char()
            && is_tag_name_start(first)
        {
            self.cur.bump_char();
            while let Some(c) = self.cur.peek_char()
                && is_tag_name_char(c)
            {
                self.cur.bump_char();
            }
        }
        let name = self.cur.text_from(name_start);

        if name.is_empty() {
            if self.cur.eof() {
                // `<` or `</` cut off by the end of the buffer
                return Some(self.tag(kind, start, None, false, true));
            }
            self.cur = saved;
            return None;
        }

        let mut after_equals = false;
        loop {
            let Some(c) = self.cur.peek_char() else {
                return Some(self.tag(kind, start, Some(name), false, true));
            };
            match c {
                '>' => {
                    self.cur.bump();
                    return Some(self.tag(kind, start, Some(name), false, false));
                }
                '/' if !closing => {
                    self.cur.bump();
                    match self.cur.peek() {
                        Some(b'>') => {
                            self.cur.bump();
                            return Some(self.tag(kind, start, Some(name), true, false));
                        }
                        None => {
                            return Some(self.tag(kind, start, Some(name), false, true));
                        }
                        Some(_) => after_equals = false,
                    }
                }
                '<' => {
                    self.cur = saved;
                    return None;
                }
                '"' | '\'' if after_equals => {
                    self.cur.bump();
                    let quote = c as u8;
                    match self.cur.rest().bytes().position(|b| b == quote) {
                        Some(n) => self.cur.bump_n(n + 1),
                        None => {
                            self.cur.bump_n(self.cur.rest().len());
                            return Some(self.tag(kind, start, Some(name), false, true));
                        }
                    }
                    after_equals = false;
                }
                '=' => {
                    self.cur.bump();
                    after_equals = true;
                }
                c if c.is_whitespace() => {
                    self.cur.bump_char();
                }
                _ => {
                    self.cur.bump_char();
                    after_equals = false;
                }
            }
        }
    }

    fn tag(
        &self,
        kind: TokenKind,
        start: usize,
        name: Option<&'a str>,
        self_closing: bool,
        torn: bool,
    ) -> Token<'a> {
        Token {
            kind,
            text: self.cur.text_from(start),
            offset: start,
            tag_name: name,
            self_closing,
            torn,
        }
    }
}

/// Lexes the whole input, excluding the trailing `Eof`.
pub fn lex(input: &str) -> Vec<Token<'_>> {
    let mut lexer = Lexer::new(input);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        if token.kind == TokenKind::Eof {
            break;
        }
        tokens.push(token);
    }
    tokens
}
