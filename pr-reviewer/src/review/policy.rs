//! Policy utilities: severity tiers, consolidation of finding sets, dedup and
//! summary rendering.
//!
//! Merging is a pure function: concatenate every pass's findings, stable-sort
//! by severity tier then by file/position, drop exact duplicates. No shared
//! accumulator is involved, so passes can be produced concurrently.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::CommentInput;

/// Priority tier of a finding. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
    ];

    /// 0 for the most urgent tier.
    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "critical" | "blocker" => Ok(Severity::Critical),
            "high" | "major" => Ok(Severity::High),
            "medium" => Ok(Severity::Medium),
            "low" | "minor" | "info" => Ok(Severity::Low),
            other => Err(format!("unknown severity `{other}`")),
        }
    }
}

/// A candidate comment produced by one analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub severity: Severity,
    /// Which pass produced it; filled from the owning [`FindingSet`] when empty.
    #[serde(default)]
    pub source: String,
    #[serde(flatten)]
    pub comment: CommentInput,
}

impl Finding {
    /// Comment body prefixed with tier and source, e.g. `**[high]** _(security)_ ...`.
    pub fn decorated_body(&self) -> String {
        if self.source.is_empty() {
            format!("**[{}]** {}", self.severity, self.comment.body)
        } else {
            format!(
                "**[{}]** _({})_ {}",
                self.severity, self.source, self.comment.body
            )
        }
    }
}

/// Output of a single analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingSet {
    pub source: String,
    pub findings: Vec<Finding>,
}

impl FindingSet {
    pub fn new(source: impl Into<String>, findings: Vec<Finding>) -> Self {
        Self {
            source: source.into(),
            findings,
        }
    }
}

/// Merges any number of finding sets into one ordered list.
///
/// Order: severity tier, then path, then position. Ties keep their input
/// order (pass order, then order within the pass). Exact duplicates on
/// `(path, position, body)` collapse into the highest-severity copy.
pub fn consolidate(sets: Vec<FindingSet>) -> Vec<Finding> {
    let mut all: Vec<Finding> = sets
        .into_iter()
        .flat_map(|set| {
            let source = set.source;
            set.findings.into_iter().map(move |mut f| {
                if f.source.is_empty() {
                    f.source = source.clone();
                }
                f
            })
        })
        .collect();

    all.sort_by(|a, b| {
        a.severity
            .cmp(&b.severity)
            .then_with(|| a.comment.path.cmp(&b.comment.path))
            .then_with(|| a.comment.position.cmp(&b.comment.position))
    });

    dedup_in_place(&mut all);
    all
}

/// Keeps the first finding for each `(path, position, body)`.
pub fn dedup_in_place(findings: &mut Vec<Finding>) {
    let mut seen = HashSet::new();
    findings.retain(|f| {
        seen.insert((
            f.comment.path.clone(),
            f.comment.position,
            f.comment.body.trim().to_string(),
        ))
    });
}

/// Turns consolidated findings into builder input, bodies decorated.
pub fn comment_inputs(findings: &[Finding]) -> Vec<CommentInput> {
    findings
        .iter()
        .map(|f| CommentInput {
            path: f.comment.path.clone(),
            position: f.comment.position,
            body: f.decorated_body(),
        })
        .collect()
}

/// Review summary body: one line per non-empty tier plus skipped passes.
pub fn render_summary(findings: &[Finding], timed_out: &[String]) -> String {
    if findings.is_empty() && timed_out.is_empty() {
        return "No issues found.".to_string();
    }

    let mut out = format!("Automated review: {} finding(s).\n", findings.len());
    for tier in Severity::ALL {
        let n = findings.iter().filter(|f| f.severity == tier).count();
        if n > 0 {
            out.push_str(&format!("\n- {tier}: {n}"));
        }
    }
    if !timed_out.is_empty() {
        out.push_str(&format!(
            "\n\nIncomplete: no result from {}.",
            timed_out.join(", ")
        ));
    }
    out
}
