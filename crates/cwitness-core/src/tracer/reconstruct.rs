//! Splices insertion patches into a source text.

use std::ops::Range;

use crate::errors::{InstrumentError, Result};
use crate::position::{Coordinate, Patch};

/// The rebuilt text plus where each insertion landed in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub text: String,
    /// Byte ranges of `text` that came from patches, in output order
    pub inserted: Vec<Range<usize>>,
}

impl Reconstruction {
    /// The output with every inserted range removed again.
    pub fn without_insertions(&self) -> String {
        let mut kept = String::with_capacity(self.text.len());
        let mut from = 0;
        for range in &self.inserted {
            kept.push_str(&self.text[from..range.start]);
            from = range.end;
        }
        kept.push_str(&self.text[from..]);
        kept
    }
}

/// Apply `patches` to `source`.
///
/// Patches are ordered by position; patches at the same position keep their
/// relative emission order. Every original byte is copied exactly once, so the
/// output always contains the source as a subsequence.
pub fn reconstruct(source: &str, mut patches: Vec<Patch>) -> Result<Reconstruction> {
    let line_starts = line_starts(source);
    patches.sort_by_key(|patch| patch.at);

    let mut text = String::with_capacity(source.len() + patches.iter().map(|p| p.text.len()).sum::<usize>());
    let mut inserted = Vec::with_capacity(patches.len());
    let mut copied = 0;

    for patch in patches {
        let offset = byte_offset(source, &line_starts, patch.at)?;
        text.push_str(&source[copied..offset]);
        copied = offset;

        let start = text.len();
        text.push_str(&patch.text);
        if !patch.text.is_empty() {
            inserted.push(start..text.len());
        }
    }
    text.push_str(&source[copied..]);

    Ok(Reconstruction { text, inserted })
}

/// Byte offset of the start of every line, plus one entry for the position
/// just past the end of the text.
fn line_starts(source: &str) -> Vec<usize> {
    let mut starts = vec![0];
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        offset += line.len();
        if line.ends_with('\n') {
            starts.push(offset);
        }
    }
    if starts.last() != Some(&source.len()) {
        starts.push(source.len());
    }
    starts
}

fn byte_offset(source: &str, line_starts: &[usize], at: Coordinate) -> Result<usize> {
    let out_of_range = || InstrumentError::PatchOutOfRange {
        at,
        lines: line_starts.len() - 1,
    };

    let line_start = *line_starts.get(at.line).ok_or_else(out_of_range)?;
    let line_end = line_starts.get(at.line + 1).copied().unwrap_or(source.len());
    let offset = line_start + at.column;

    if offset > line_end || !source.is_char_boundary(offset) {
        return Err(out_of_range());
    }
    Ok(offset)
}
