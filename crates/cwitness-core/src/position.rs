//! Source coordinates and insertion patches.

use std::fmt;

/// A (line, column) position in the document the parser saw.
///
/// Both components are zero-based; columns count bytes, matching tree-sitter.
/// Ordering is lexicographic, line first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coordinate {
    pub line: usize,
    pub column: usize,
}

impl Coordinate {
    pub const ORIGIN: Coordinate = Coordinate { line: 0, column: 0 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    /// One-based line number as used by trace records
    pub fn display_line(&self) -> usize {
        self.line + 1
    }
}

impl From<tree_sitter::Point> for Coordinate {
    fn from(point: tree_sitter::Point) -> Self {
        Self::new(point.row, point.column)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A pure insertion of `text` before the original byte at `at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub at: Coordinate,
    pub text: String,
}

impl Patch {
    pub fn new(at: Coordinate, text: impl Into<String>) -> Self {
        Self {
            at,
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexicographic_order() {
        assert!(Coordinate::new(0, 10) < Coordinate::new(1, 0));
        assert!(Coordinate::new(2, 3) < Coordinate::new(2, 4));
        assert_eq!(Coordinate::ORIGIN, Coordinate::default());
    }

    #[test]
    fn test_display() {
        let at = Coordinate::new(4, 2);
        assert_eq!(at.to_string(), "4:2");
        assert_eq!(at.display_line(), 5);
    }
}
