//! Unified-diff hunk parser.
//!
//! Features:
//! - Works on a whole PR patch (`diff --git` sections) or on hunks-only input
//!   (the per-file `patch` text the files endpoint returns).
//! - Skips file headers (`diff --git`, `index`, `---`, `+++`, mode/rename lines).
//! - Ignores `\ No newline at end of file` marker lines.
//! - A genuinely empty line inside a hunk is kept as [`LineKind::Blank`].
//! - Binary patches heuristics (`GIT binary patch`, `Binary files ... differ`).
//!
//! Hunk boundaries come from the header counts: a hunk ends once it has seen
//! as many old/new lines as `@@ -a,b +c,d @@` declares. Positions are not
//! assigned here, see [`crate::position`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::ParseError;

/// Kind of a physical line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LineKind {
    Added,
    Removed,
    Context,
    /// Empty physical line inside a hunk (context whose leading space was lost).
    Blank,
}

impl LineKind {
    /// Diff marker used when re-rendering the line.
    pub fn marker(self) -> char {
        match self {
            LineKind::Added => '+',
            LineKind::Removed => '-',
            LineKind::Context | LineKind::Blank => ' ',
        }
    }
}

/// `@@ -old_start,old_lines +new_start,new_lines @@ section`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HunkHeader {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    /// Trailing function/section context after the closing `@@`, if any.
    pub section: Option<String>,
}

impl HunkHeader {
    /// Parses a `@@ ... @@` line.
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidHunkHeader(line.to_string());

        let rest = line.strip_prefix("@@").ok_or_else(invalid)?;
        let (ranges, section) = rest.split_once("@@").ok_or_else(invalid)?;

        let mut parts = ranges.split_whitespace();
        let old = parts
            .next()
            .and_then(|p| p.strip_prefix('-'))
            .ok_or_else(invalid)?;
        let new = parts
            .next()
            .and_then(|p| p.strip_prefix('+'))
            .ok_or_else(invalid)?;
        if parts.next().is_some() {
            return Err(invalid());
        }

        let (old_start, old_lines) = split_range(old).ok_or_else(invalid)?;
        let (new_start, new_lines) = split_range(new).ok_or_else(invalid)?;
        let section = section.trim();

        Ok(Self {
            old_start,
            old_lines,
            new_start,
            new_lines,
            section: (!section.is_empty()).then(|| section.to_string()),
        })
    }
}

impl fmt::Display for HunkHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_lines, self.new_start, self.new_lines
        )?;
        if let Some(s) = &self.section {
            write!(f, " {s}")?;
        }
        Ok(())
    }
}

/// One physical hunk line, marker stripped, no position yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub kind: LineKind,
    pub text: String,
}

/// A hunk as read from the diff text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHunk {
    pub header: HunkHeader,
    pub lines: Vec<ParsedLine>,
}

/// All hunks of one file section of a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFile {
    /// Path on the new side (old side for deletions); `None` for hunks-only input.
    pub path: Option<String>,
    pub old_path: Option<String>,
    pub is_binary: bool,
    pub hunks: Vec<ParsedHunk>,
}

/// Parses hunks out of the text of a single file.
///
/// Everything before the first `@@` (file headers) is skipped.
pub fn parse_hunks(s: &str) -> Result<Vec<ParsedHunk>, ParseError> {
    parse_hunk_lines(s.lines())
}

fn parse_hunk_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<ParsedHunk>, ParseError> {
    let mut hunks = Vec::new();
    let mut cur: Option<ParsedHunk> = None;
    let mut old_left = 0u32;
    let mut new_left = 0u32;

    for line in lines {
        if line.starts_with("@@") {
            flush(&mut hunks, cur.take());
            let header = HunkHeader::parse(line)?;
            old_left = header.old_lines;
            new_left = header.new_lines;
            cur = Some(ParsedHunk {
                header,
                lines: Vec::new(),
            });
            continue;
        }

        // Not part of the diff content.
        if line.starts_with('\\') {
            continue;
        }

        let Some(hunk) = cur.as_mut() else {
            // Prelude (file headers) until the first '@@'.
            continue;
        };

        if old_left == 0 && new_left == 0 {
            // Hunk complete: whatever follows until the next '@@' is header noise.
            if !line.is_empty() {
                debug!("parser: skipping line outside hunk: {:?}", truncate(line, 60));
            }
            continue;
        }

        let (kind, text) = match line.chars().next() {
            Some('+') => {
                new_left = new_left.saturating_sub(1);
                (LineKind::Added, &line[1..])
            }
            Some('-') => {
                old_left = old_left.saturating_sub(1);
                (LineKind::Removed, &line[1..])
            }
            Some(' ') => {
                old_left = old_left.saturating_sub(1);
                new_left = new_left.saturating_sub(1);
                (LineKind::Context, &line[1..])
            }
            None => {
                old_left = old_left.saturating_sub(1);
                new_left = new_left.saturating_sub(1);
                (LineKind::Blank, "")
            }
            // A stray unmarked line inside a hunk: assume context.
            Some(_) => {
                old_left = old_left.saturating_sub(1);
                new_left = new_left.saturating_sub(1);
                (LineKind::Context, line)
            }
        };

        hunk.lines.push(ParsedLine {
            kind,
            text: text.to_string(),
        });
    }

    flush(&mut hunks, cur);
    Ok(hunks)
}

fn flush(hunks: &mut Vec<ParsedHunk>, hunk: Option<ParsedHunk>) {
    if let Some(h) = hunk {
        if !h.lines.is_empty() {
            hunks.push(h);
        }
    }
}

/// Splits a whole patch into per-file sections and parses each of them.
///
/// Input without any `diff --git` line is treated as a single section.
pub fn parse_patch(s: &str) -> Result<Vec<ParsedFile>, ParseError> {
    split_sections(s)
        .into_iter()
        .map(|section| parse_section(&section))
        .collect()
}

/// Finds the section of `path` in a patch and parses its hunks.
///
/// Hunks-only input (no file headers at all) is taken to be the requested file.
pub fn extract_file(s: &str, path: &str) -> Result<ParsedFile, ParseError> {
    let mut files = parse_patch(s)?;
    let wanted = clean_path(path);

    let single_anonymous = files.len() == 1 && files[0].path.is_none();
    let found = files.iter().position(|f| {
        f.path.as_deref() == Some(wanted.as_str()) || (single_anonymous && f.path.is_none())
    });

    match found {
        Some(i) if !files[i].hunks.is_empty() => {
            let mut file = files.swap_remove(i);
            file.path = Some(wanted);
            Ok(file)
        }
        _ => Err(ParseError::FileNotInDiff {
            path: wanted,
            available: files
                .iter()
                .filter(|f| !f.hunks.is_empty())
                .filter_map(|f| f.path.clone())
                .collect(),
        }),
    }
}

fn split_sections(s: &str) -> Vec<Vec<&str>> {
    let mut sections: Vec<Vec<&str>> = Vec::new();
    for line in s.lines() {
        if line.starts_with("diff --git ") || sections.is_empty() {
            sections.push(Vec::new());
        }
        if let Some(cur) = sections.last_mut() {
            cur.push(line);
        }
    }
    sections
}

fn parse_section(lines: &[&str]) -> Result<ParsedFile, ParseError> {
    let mut git_path = None;
    let mut minus_path = None;
    let mut plus_path = None;
    let mut rename_from = None;

    // Header lines only: stop at the first hunk.
    for line in lines.iter().take_while(|l| !l.starts_with("@@")) {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            git_path = git_line_path(rest);
        } else if let Some(rest) = line.strip_prefix("--- ") {
            minus_path = header_path(rest);
        } else if let Some(rest) = line.strip_prefix("+++ ") {
            plus_path = header_path(rest);
        } else if let Some(rest) = line.strip_prefix("rename from ") {
            rename_from = Some(unquote_path(rest.trim()));
        }
    }

    let path = plus_path.clone().or_else(|| minus_path.clone()).or(git_path);
    let old_path = rename_from.or(minus_path).filter(|o| Some(o) != path.as_ref());

    let text = lines.join("\n");
    let is_binary = looks_like_binary_patch(&text);
    let hunks = if is_binary {
        Vec::new()
    } else {
        parse_hunk_lines(lines.iter().copied())?
    };

    Ok(ParsedFile {
        path,
        old_path,
        is_binary,
        hunks,
    })
}

/// `a/src/x.rs\t2024-01-01 ...` → `src/x.rs`; `/dev/null` → `None`.
fn header_path(rest: &str) -> Option<String> {
    let raw = rest.split('\t').next().unwrap_or(rest).trim();
    if raw == "/dev/null" {
        return None;
    }
    Some(clean_path(&unquote_path(raw)))
}

/// New-side path of `diff --git a/x b/x`, either side possibly quoted.
fn git_line_path(rest: &str) -> Option<String> {
    let rest = rest.trim();
    if rest.ends_with('"') {
        if let Some(i) = rest.rfind(" \"b/") {
            return Some(clean_path(&unquote_path(&rest[i + 1..])));
        }
    }
    rest.rsplit_once(" b/").map(|(_, b)| b.to_string())
}

/// Decodes a path git wrote in C-quoted form (`core.quotePath`):
/// `"b/caf\303\251.txt"` → `b/café.txt`. Unquoted input is returned as is.
pub fn unquote_path(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
    else {
        return raw.to_string();
    };

    let bytes = inner.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        i += 1;
        if b != b'\\' || i == bytes.len() {
            out.push(b);
            continue;
        }
        let esc = bytes[i];
        i += 1;
        match esc {
            b'0'..=b'7' => {
                let mut v = u32::from(esc - b'0');
                let mut digits = 1;
                while digits < 3 && i < bytes.len() && (b'0'..=b'7').contains(&bytes[i]) {
                    v = v * 8 + u32::from(bytes[i] - b'0');
                    i += 1;
                    digits += 1;
                }
                out.push((v & 0xff) as u8);
            }
            b'n' => out.push(b'\n'),
            b't' => out.push(b'\t'),
            b'r' => out.push(b'\r'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b'"' | b'\\' => out.push(esc),
            other => {
                out.push(b'\\');
                out.push(other);
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Removes the `a/` / `b/` prefixes of git diff output.
pub fn clean_path(path: &str) -> String {
    let path = path.trim();
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
        .to_string()
}

/// Splits "12,7" or "12" into (start, len). A missing length means one line.
fn split_range(s: &str) -> Option<(u32, u32)> {
    match s.split_once(',') {
        Some((a, b)) => Some((a.parse().ok()?, b.parse().ok()?)),
        None => Some((s.parse().ok()?, 1)),
    }
}

/// Simple heuristic to detect binary patches or messages in unified diff.
pub fn looks_like_binary_patch(s: &str) -> bool {
    s.contains("GIT binary patch")
        || s.lines().any(|l| {
            l.starts_with("Binary files ") || (l.starts_with("Files ") && l.ends_with(" differ"))
        })
}

fn truncate(s: &str, n: usize) -> String {
    if s.chars().count() <= n {
        return s.to_string();
    }
    s.chars().take(n).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TWO_FILES: &str = "diff --git a/src/main.rs b/src/main.rs
index abc123..def456 100644
--- a/src/main.rs
+++ b/src/main.rs
@@ -1,3 +1,4 @@ fn main()
 fn main() {
+    println!(\"World\");
     println!(\"Hello\");
 }
diff --git a/src/lib.rs b/src/lib.rs
index 111222..333444 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -10,4 +10,3 @@ impl Foo {
 impl Foo {
-    // old comment
     fn bar(&self) {}
 }
";

    fn kinds(h: &ParsedHunk) -> Vec<LineKind> {
        h.lines.iter().map(|l| l.kind).collect()
    }

    #[test]
    fn header_with_and_without_counts() {
        let h = HunkHeader::parse("@@ -1,3 +1,4 @@ fn main()").unwrap();
        assert_eq!((h.old_start, h.old_lines, h.new_start, h.new_lines), (1, 3, 1, 4));
        assert_eq!(h.section.as_deref(), Some("fn main()"));
        assert_eq!(h.to_string(), "@@ -1,3 +1,4 @@ fn main()");

        let h = HunkHeader::parse("@@ -7 +7 @@").unwrap();
        assert_eq!((h.old_lines, h.new_lines), (1, 1));
        assert!(h.section.is_none());
    }

    #[test]
    fn malformed_header_is_an_error() {
        assert!(matches!(
            HunkHeader::parse("@@ -a,b +c @@"),
            Err(ParseError::InvalidHunkHeader(_))
        ));
        assert!(parse_hunks("@@ nonsense\n+x\n").is_err());
    }

    #[test]
    fn file_headers_never_become_lines() {
        let files = parse_patch(TWO_FILES).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].path.as_deref(), Some("src/main.rs"));
        assert_eq!(
            kinds(&files[0].hunks[0]),
            vec![LineKind::Context, LineKind::Added, LineKind::Context, LineKind::Context]
        );
        assert_eq!(files[1].path.as_deref(), Some("src/lib.rs"));
        assert_eq!(
            kinds(&files[1].hunks[0]),
            vec![LineKind::Context, LineKind::Removed, LineKind::Context, LineKind::Context]
        );
        assert_eq!(files[1].hunks[0].lines[1].text, "    // old comment");
    }

    #[test]
    fn empty_line_inside_hunk_is_blank() {
        let hunks = parse_hunks("@@ -1,3 +1,4 @@\n a\n\n+b\n c\n").unwrap();
        assert_eq!(
            kinds(&hunks[0]),
            vec![LineKind::Context, LineKind::Blank, LineKind::Added, LineKind::Context]
        );
    }

    #[test]
    fn trailing_empty_lines_after_complete_hunk_are_dropped() {
        let hunks = parse_hunks("@@ -1,1 +1,2 @@\n a\n+b\n\n\n").unwrap();
        assert_eq!(hunks[0].lines.len(), 2);
    }

    #[test]
    fn hunk_order_is_preserved_and_markers_skipped() {
        let text = "@@ -1,2 +1,2 @@\n-x\n+y\n\\ No newline at end of file\n z\n@@ -20,1 +20,2 @@\n k\n+l\n";
        let hunks = parse_hunks(text).unwrap();
        assert_eq!(hunks.len(), 2);
        assert_eq!(hunks[0].header.old_start, 1);
        assert_eq!(hunks[0].lines.len(), 3);
        assert_eq!(hunks[1].header.old_start, 20);
    }

    #[test]
    fn extract_file_reports_available_files() {
        let err = extract_file(TWO_FILES, "missing.ts").unwrap_err();
        match err {
            ParseError::FileNotInDiff { path, available } => {
                assert_eq!(path, "missing.ts");
                assert_eq!(available, vec!["src/main.rs", "src/lib.rs"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn extract_file_accepts_hunks_only_input() {
        let f = extract_file("@@ -1 +1 @@\n-a\n+b\n", "x.ts").unwrap();
        assert_eq!(f.path.as_deref(), Some("x.ts"));
        assert_eq!(f.hunks[0].lines.len(), 2);
        assert!(extract_file("no hunks here\n", "x.ts").is_err());
    }

    #[test]
    fn deleted_renamed_and_binary_files() {
        let text = "diff --git a/old.rs b/old.rs
deleted file mode 100644
--- a/old.rs
+++ /dev/null
@@ -1,2 +0,0 @@
-fn a() {}
-fn b() {}
diff --git a/before.rs b/after.rs
similarity index 90%
rename from before.rs
rename to after.rs
--- a/before.rs
+++ b/after.rs
@@ -1 +1 @@
-x
+y
diff --git a/logo.png b/logo.png
Binary files a/logo.png and b/logo.png differ
";
        let files = parse_patch(text).unwrap();
        assert_eq!(files[0].path.as_deref(), Some("old.rs"));
        assert_eq!(files[0].hunks[0].lines.len(), 2);
        assert_eq!(files[1].path.as_deref(), Some("after.rs"));
        assert_eq!(files[1].old_path.as_deref(), Some("before.rs"));
        assert!(files[2].is_binary);
        assert!(files[2].hunks.is_empty());
    }

    #[test]
    fn quoted_non_ascii_paths_are_decoded() {
        let text = r#"diff --git "a/caf\303\251.txt" "b/caf\303\251.txt"
index 1111111..2222222 100644
--- "a/caf\303\251.txt"
+++ "b/caf\303\251.txt"
@@ -1 +1 @@
-old
+new
diff --git "a/tab\there.md" "b/tab\there.md"
deleted file mode 100644
--- "a/tab\there.md"
+++ /dev/null
@@ -1 +0,0 @@
-gone
"#;
        let files = parse_patch(text).unwrap();
        assert_eq!(files[0].path.as_deref(), Some("café.txt"));
        assert_eq!(files[0].old_path, None);
        assert_eq!(files[0].hunks[0].lines.len(), 2);
        assert_eq!(files[1].path.as_deref(), Some("tab\there.md"));
    }

    #[test]
    fn diff_git_line_alone_gives_decoded_path() {
        let text = "diff --git \"a/\\\"q\\\".rs\" \"b/\\\"q\\\".rs\"\nold mode 100644\nnew mode 100755\n";
        let files = parse_patch(text).unwrap();
        assert_eq!(files[0].path.as_deref(), Some("\"q\".rs"));
        assert_eq!(unquote_path("plain/path.rs"), "plain/path.rs");
        assert_eq!(unquote_path(r#""b\\c""#), "b\\c");
    }

    #[test]
    fn test_clean_path() {
        assert_eq!(clean_path("a/src/main.rs"), "src/main.rs");
        assert_eq!(clean_path("b/src/main.rs"), "src/main.rs");
        assert_eq!(clean_path("src/main.rs"), "src/main.rs");
    }
}
