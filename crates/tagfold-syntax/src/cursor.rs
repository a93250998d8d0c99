/// A cursor for character-by-character scanning with position tracking.
///
/// Operates over a string slice while tracking the absolute byte position in
/// the full buffer (via `base` offset), so a lexer started in the middle of a
/// transcript still reports offsets against the whole transcript.
#[derive(Clone)]
pub struct Cursor<'a> {
    /// The string being scanned.
    pub s: &'a str,
    /// Base offset in the buffer (added to local index for absolute positions).
    pub base: usize,
    /// Current local index into `s`. Always on a char boundary.
    pub i: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a new cursor at the start of `s` with the given base offset.
    pub fn new(s: &'a str, base: usize) -> Self {
        Self { s, base, i: 0 }
    }

    /// Returns the current absolute byte position (base + local index).
    pub fn pos(&self) -> usize {
        self.base + self.i
    }

    /// Absolute position one past the last byte of `s`.
    pub fn end(&self) -> usize {
        self.base + self.s.len()
    }

    /// Returns true if at end of string.
    pub fn eof(&self) -> bool {
        self.i >= self.s.len()
    }

    /// Peeks at the current byte without advancing.
    pub fn peek(&self) -> Option<u8> {
        self.s.as_bytes().get(self.i).copied()
    }

    /// Peeks at the current char without advancing.
    pub fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// The unconsumed remainder of the input.
    pub fn rest(&self) -> &'a str {
        self.s.get(self.i..).unwrap_or("")
    }

    /// Advances by one byte, returning the consumed byte.
    ///
    /// Only use this for ASCII; [`Cursor::bump_char`] keeps the index on a
    /// char boundary for anything else.
    pub fn bump(&mut self) -> Option<u8> {
        let b = self.s.as_bytes().get(self.i).copied()?;
        self.i += 1;
        Some(b)
    }

    /// Advances by one char, returning it.
    pub fn bump_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.i += c.len_utf8();
        Some(c)
    }

    /// Advances by `n` bytes.
    pub fn bump_n(&mut self, n: usize) {
        self.i += n;
    }

    /// Moves the cursor to an absolute position inside `s`.
    ///
    /// Positions outside the scanned slice are clamped to its bounds.
    pub fn reset_to(&mut self, pos: usize) {
        self.i = pos.saturating_sub(self.base).min(self.s.len());
    }

    /// The text between absolute position `start` and the cursor.
    pub fn text_from(&self, start: usize) -> &'a str {
        let local = start.saturating_sub(self.base);
        self.s.get(local..self.i).unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_basics() {
        let mut cur = Cursor::new("hello", 10);
        assert_eq!(cur.pos(), 10);
        assert_eq!(cur.end(), 15);
        assert!(!cur.eof());
        assert_eq!(cur.peek(), Some(b'h'));
        assert_eq!(cur.bump(), Some(b'h'));
        assert_eq!(cur.pos(), 11);
    }

    #[test]
    fn empty_string_input() {
        let cur = Cursor::new("", 0);
        assert!(cur.eof());
        assert_eq!(cur.peek(), None);
        assert_eq!(cur.peek_char(), None);
        assert_eq!(cur.pos(), 0);
    }

    #[test]
    fn bump_char_steps_over_multibyte() {
        let mut cur = Cursor::new("思考>", 0);
        assert_eq!(cur.bump_char(), Some('思'));
        assert_eq!(cur.pos(), 3);
        assert_eq!(cur.bump_char(), Some('考'));
        assert_eq!(cur.peek(), Some(b'>'));
    }

    #[test]
    fn reset_to_is_absolute_and_clamped() {
        let mut cur = Cursor::new("abcdef", 100);
        cur.bump_n(4);
        cur.reset_to(102);
        assert_eq!(cur.pos(), 102);
        assert_eq!(cur.peek(), Some(b'c'));

        cur.reset_to(5);
        assert_eq!(cur.pos(), 100);
        cur.reset_to(1_000);
        assert!(cur.eof());
    }

    #[test]
    fn text_from_returns_consumed_slice() {
        let mut cur = Cursor::new("<tag>", 7);
        let start = cur.pos();
        cur.bump_n(4);
        assert_eq!(cur.text_from(start), "<tag");
    }

    #[test]
    fn bump_at_eof_returns_none() {
        let mut cur = Cursor::new("x", 0);
        assert_eq!(cur.bump(), Some(b'x'));
        assert_eq!(cur.bump(), None);
        assert_eq!(cur.bump_char(), None);
    }
}
