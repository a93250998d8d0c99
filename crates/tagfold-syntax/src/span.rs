/// A byte range `[start, end)` into the transcript buffer.
///
/// Nodes store spans alongside their text so that every byte of the input can
/// be traced back to exactly one place in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Span {
    /// Inclusive start byte offset.
    pub start: usize,
    /// Exclusive end byte offset.
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// An empty span positioned at `at`.
    pub fn empty(at: usize) -> Self {
        Self { start: at, end: at }
    }

    /// Returns the length in bytes. Uses saturating subtraction for safety.
    #[must_use]
    pub fn len(self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the span is empty (start >= end).
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// True if `other` lies entirely within this span.
    #[must_use]
    pub fn contains(self, other: Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True if the two spans share at least one byte.
    #[must_use]
    pub fn overlaps(self, other: Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Slices `text` with this span.
    ///
    /// Returns an empty string if the span is out of bounds or not on a char
    /// boundary, so callers never panic on a malformed span.
    pub fn slice(self, text: &str) -> &str {
        text.get(self.start..self.end).unwrap_or("")
    }

    /// Moves the span right by `delta` bytes.
    #[must_use]
    pub fn shifted(self, delta: usize) -> Span {
        Span {
            start: self.start + delta,
            end: self.end + delta,
        }
    }
}

impl From<std::ops::Range<usize>> for Span {
    fn from(range: std::ops::Range<usize>) -> Self {
        Span {
            start: range.start,
            end: range.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_and_empty() {
        assert_eq!(Span::new(3, 8).len(), 5);
        assert!(Span::empty(4).is_empty());
        // saturating: a reversed span reads as empty rather than underflowing
        assert!(Span::new(8, 3).is_empty());
    }

    #[test]
    fn containment_and_overlap() {
        let outer = Span::new(0, 10);
        assert!(outer.contains(Span::new(2, 5)));
        assert!(outer.contains(outer));
        assert!(!outer.contains(Span::new(5, 11)));

        assert!(Span::new(0, 5).overlaps(Span::new(4, 6)));
        assert!(!Span::new(0, 5).overlaps(Span::new(5, 6)));
    }

    #[test]
    fn slice_is_total() {
        let text = "思考 done";
        assert_eq!(Span::new(0, 6).slice(text), "思考");
        // mid-codepoint and out-of-range spans give an empty slice
        assert_eq!(Span::new(1, 6).slice(text), "");
        assert_eq!(Span::new(0, 100).slice(text), "");
    }
}
