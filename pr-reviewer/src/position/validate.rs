//! Position validator.
//!
//! `1 <= position <= max` is the whole rule: positions are contiguous across
//! hunks, so every value in range addresses a line, removed lines included
//! (a comment may point at deleted code). On failure the caller gets the valid
//! range plus each hunk's span so it can self-correct without re-parsing.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{DiffLine, FileDiff};

/// Diagnostic rendering of one hunk's position span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkSpan {
    pub header: String,
    pub first: u32,
    pub last: u32,
}

impl fmt::Display for HunkSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} covers {}-{}", self.header, self.first, self.last)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("file `{path}` is not in the diff (files present: {})", .available.join(", "))]
    FileNotFound { path: String, available: Vec<String> },

    #[error("position {position} is out of range for `{path}` (valid {min}..={max})")]
    OutOfRange {
        path: String,
        position: i64,
        min: u32,
        max: u32,
        hunks: Vec<HunkSpan>,
    },
}

/// Per-hunk spans of a file, in diff order.
pub fn hunk_spans(file: &FileDiff) -> Vec<HunkSpan> {
    file.hunks
        .iter()
        .map(|h| HunkSpan {
            header: format!(
                "@@ -{},{} +{},{} @@",
                h.header.old_start, h.header.old_lines, h.header.new_start, h.header.new_lines
            ),
            first: h.position_range.first,
            last: h.position_range.last,
        })
        .collect()
}

/// Checks `position` against the file's position space.
pub fn validate(file: &FileDiff, position: i64) -> Result<&DiffLine, PositionError> {
    let range = file.valid_range();
    u32::try_from(position)
        .ok()
        .filter(|p| range.contains(*p))
        .and_then(|p| file.line_at(p))
        .ok_or_else(|| PositionError::OutOfRange {
            path: file.path.clone(),
            position,
            min: range.first,
            max: range.last,
            hunks: hunk_spans(file),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::LineKind;
    use pretty_assertions::assert_eq;

    fn two_hunks() -> FileDiff {
        FileDiff::parse(
            "y.ts",
            "@@ -1,4 +1,4 @@\n a\n-b\n+c\n d\n e\n@@ -30,3 +30,4 @@\n p\n+q\n r\n s\n",
        )
        .unwrap()
    }

    #[test]
    fn every_position_in_range_is_valid() {
        let f = two_hunks();
        for p in 1..=9 {
            assert!(validate(&f, p).is_ok(), "position {p}");
        }
    }

    #[test]
    fn out_of_range_reports_bounds_and_hunks() {
        let f = two_hunks();
        for p in [0, -3, 10, 1_000, i64::from(u32::MAX) + 1] {
            match validate(&f, p) {
                Err(PositionError::OutOfRange { min, max, hunks, .. }) => {
                    assert_eq!((min, max), (1, 9));
                    assert_eq!(
                        hunks,
                        vec![
                            HunkSpan {
                                header: "@@ -1,4 +1,4 @@".into(),
                                first: 1,
                                last: 5,
                            },
                            HunkSpan {
                                header: "@@ -30,3 +30,4 @@".into(),
                                first: 6,
                                last: 9,
                            },
                        ]
                    );
                }
                other => panic!("position {p}: unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn removed_lines_are_addressable() {
        let f = two_hunks();
        let line = validate(&f, 2).unwrap();
        assert_eq!(line.kind, LineKind::Removed);
        assert_eq!(line.text, "b");
    }

    #[test]
    fn first_line_of_second_hunk() {
        let f = two_hunks();
        let line = validate(&f, 6).unwrap();
        assert_eq!(line.text, "p");
    }

    #[test]
    fn span_display() {
        let s = HunkSpan {
            header: "@@ -1,3 +1,4 @@".into(),
            first: 1,
            last: 4,
        };
        assert_eq!(s.to_string(), "@@ -1,3 +1,4 @@ covers 1-4");
    }
}
