//! Diff positions: the address space inline review comments are anchored in.
//!
//! A position is a 1-based index into one file's diff line stream. Every hunk
//! line takes exactly one position whatever its kind (added, removed, context,
//! blank), and numbering runs on across hunk boundaries: the first line of
//! hunk *k+1* is the last position of hunk *k* plus one. Numbering restarts
//! with each file. Header lines (`diff --git`, `---`, `+++`, `@@`) never take
//! a position.
//!
//! The counter is a fold over the ordered hunks of a single file, so nothing
//! leaks between files or sessions.

pub mod validate;

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::errors::ParseError;
use crate::parser::{self, HunkHeader, LineKind, ParsedFile, ParsedHunk};

pub use validate::{HunkSpan, PositionError};

/// One physical line inside a hunk, with its diff position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineKind,
    pub text: String,
    pub position: u32,
}

/// Inclusive span of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionRange {
    pub first: u32,
    pub last: u32,
}

impl PositionRange {
    pub fn contains(&self, position: u32) -> bool {
        self.first <= position && position <= self.last
    }
}

/// A hunk with positions assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub header: HunkHeader,
    pub lines: Vec<DiffLine>,
    pub position_range: PositionRange,
}

/// All hunks of one file, indexed. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    pub path: String,
    pub old_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Parses and indexes the diff text of one file (full section or hunks-only).
    pub fn parse(path: &str, text: &str) -> Result<Self, ParseError> {
        let parsed = parser::extract_file(text, path)?;
        Self::from_parsed(parsed).ok_or_else(|| ParseError::FileNotInDiff {
            path: path.to_string(),
            available: Vec::new(),
        })
    }

    /// Indexes a parsed file section. `None` when it has no path or no hunks.
    pub fn from_parsed(parsed: ParsedFile) -> Option<Self> {
        let path = parsed.path?;
        if parsed.hunks.is_empty() {
            return None;
        }
        Some(Self {
            path,
            old_path: parsed.old_path,
            hunks: index_hunks(parsed.hunks),
        })
    }

    /// `1..=max` across all hunks.
    pub fn valid_range(&self) -> PositionRange {
        PositionRange {
            first: 1,
            last: self.max_position(),
        }
    }

    pub fn max_position(&self) -> u32 {
        self.hunks
            .last()
            .map(|h| h.position_range.last)
            .unwrap_or(0)
    }

    /// Hunk containing `position`.
    pub fn hunk_for(&self, position: u32) -> Option<&Hunk> {
        let i = self
            .hunks
            .partition_point(|h| h.position_range.last < position);
        self.hunks
            .get(i)
            .filter(|h| h.position_range.contains(position))
    }

    /// Line addressed by `position`.
    pub fn line_at(&self, position: u32) -> Option<&DiffLine> {
        let hunk = self.hunk_for(position)?;
        hunk.lines
            .get((position - hunk.position_range.first) as usize)
    }

    pub fn lines(&self) -> impl Iterator<Item = &DiffLine> {
        self.hunks.iter().flat_map(|h| h.lines.iter())
    }

    /// Human-readable listing: each hunk header, then `position | marker text`.
    pub fn render_positions(&self) -> String {
        let width = self.max_position().to_string().len();
        let mut out = String::new();
        for h in &self.hunks {
            let _ = writeln!(
                out,
                "{} (positions {}-{})",
                h.header, h.position_range.first, h.position_range.last
            );
            for l in &h.lines {
                let _ = writeln!(
                    out,
                    "{:>width$} | {}{}",
                    l.position,
                    l.kind.marker(),
                    l.text
                );
            }
        }
        out
    }
}

/// Assigns file-global, hunk-continuous positions starting at 1.
pub fn index_hunks(hunks: Vec<ParsedHunk>) -> Vec<Hunk> {
    let (indexed, _next) = hunks
        .into_iter()
        .fold((Vec::new(), 1u32), |(mut acc, next), h| {
            let lines: Vec<DiffLine> = h
                .lines
                .into_iter()
                .zip(next..)
                .map(|(l, position)| DiffLine {
                    kind: l.kind,
                    text: l.text,
                    position,
                })
                .collect();
            let after = next + lines.len() as u32;
            acc.push(Hunk {
                header: h.header,
                lines,
                position_range: PositionRange {
                    first: next,
                    last: after.saturating_sub(1).max(next),
                },
            });
            (acc, after)
        });
    indexed
}

/// Every commentable file of a review session, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffIndex {
    files: BTreeMap<String, FileDiff>,
}

impl DiffIndex {
    /// Parses a whole patch; files without hunks (binary, mode-only) are left out.
    pub fn from_patch(text: &str) -> Result<Self, ParseError> {
        let files = parser::parse_patch(text)?
            .into_iter()
            .filter_map(FileDiff::from_parsed);
        Ok(Self::from_files(files))
    }

    pub fn from_files(files: impl IntoIterator<Item = FileDiff>) -> Self {
        Self {
            files: files.into_iter().map(|f| (f.path.clone(), f)).collect(),
        }
    }

    /// Drops files for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.files.retain(|path, _| keep(path));
    }

    pub fn get(&self, path: &str) -> Option<&FileDiff> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = &FileDiff> {
        self.files.values()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Resolves `(path, position)` to the addressed line.
    pub fn validate(&self, path: &str, position: i64) -> Result<&DiffLine, PositionError> {
        let file = self.get(path).ok_or_else(|| PositionError::FileNotFound {
            path: path.to_string(),
            available: self.paths().map(str::to_string).collect(),
        })?;
        validate::validate(file, position)
    }
}
