//! Review drafting: comments, the submission intent, and the payload builder.
//!
//! Flow:
//!   1) Callers collect `(path, position, body)` triples, possibly from
//!      several independent analysis passes ([`fanout`], [`policy`]);
//!   2) [`ReviewDraftBuilder::build`] checks every triple against the
//!      session's [`DiffIndex`] and either returns an immutable
//!      [`ReviewDraft`] or *all* violations at once;
//!   3) the draft is handed to [`crate::publish`].
//!
//! Nothing here touches the network: a draft that exists is already valid.

pub mod fanout;
pub mod policy;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ValidationError, ValidationErrors};
use crate::git_providers::types::CreateReviewRequest;
use crate::position::{DiffIndex, PositionError};

/// Closing disposition of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewEvent {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewEvent {
    /// Wire name used by the review API.
    pub fn as_api_str(&self) -> &'static str {
        match self {
            ReviewEvent::Approve => "APPROVE",
            ReviewEvent::RequestChanges => "REQUEST_CHANGES",
            ReviewEvent::Comment => "COMMENT",
        }
    }
}

impl fmt::Display for ReviewEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

impl FromStr for ReviewEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "approve" => Ok(ReviewEvent::Approve),
            "request-changes" => Ok(ReviewEvent::RequestChanges),
            "comment" => Ok(ReviewEvent::Comment),
            other => Err(format!(
                "unknown review event `{other}` (expected approve, request-changes or comment)"
            )),
        }
    }
}

/// Unvalidated comment as produced by a reviewer or read from input.
///
/// `position` is signed on purpose: zero and negative values must be
/// reported, not rejected by the deserializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentInput {
    pub path: String,
    pub position: i64,
    pub body: String,
}

impl CommentInput {
    pub fn new(path: impl Into<String>, position: i64, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            position,
            body: body.into(),
        }
    }
}

/// Validated review comment; serializes to exactly `{path, position, body}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub path: String,
    /// Diff position (never a file line number); a JSON number on the wire.
    pub position: u32,
    pub body: String,
}

/// How a draft is going to be submitted.
///
/// The create endpoint behaves differently depending on whether an event is
/// present, so the choice is made once, here, as a variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SubmissionIntent {
    /// One call creates and submits the review.
    AutoSubmit { event: ReviewEvent, body: String },
    /// The review is created `PENDING`; one later submit call closes it.
    PendingThenSubmit { body: Option<String> },
}

/// Immutable, validated batch of comments for one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewDraft {
    commit_id: String,
    comments: Vec<Comment>,
    intent: SubmissionIntent,
}

impl ReviewDraft {
    pub fn commit_id(&self) -> &str {
        &self.commit_id
    }

    pub fn comments(&self) -> &[Comment] {
        &self.comments
    }

    pub fn intent(&self) -> &SubmissionIntent {
        &self.intent
    }

    /// Event carried by the draft itself (auto-submit drafts only).
    pub fn event(&self) -> Option<ReviewEvent> {
        match &self.intent {
            SubmissionIntent::AutoSubmit { event, .. } => Some(*event),
            SubmissionIntent::PendingThenSubmit { .. } => None,
        }
    }

    /// Payload of the create-review call for this draft.
    pub fn create_request(&self) -> CreateReviewRequest<'_> {
        let (event, body) = match &self.intent {
            SubmissionIntent::AutoSubmit { event, body } => (Some(*event), Some(body.as_str())),
            SubmissionIntent::PendingThenSubmit { body } => (None, body.as_deref()),
        };
        CreateReviewRequest {
            commit_id: &self.commit_id,
            body,
            event,
            comments: &self.comments,
        }
    }
}

/// Collects comment triples and turns them into a [`ReviewDraft`].
#[derive(Debug, Clone, Default)]
pub struct ReviewDraftBuilder {
    commit_id: String,
    comments: Vec<CommentInput>,
    event: Option<ReviewEvent>,
    summary: Option<String>,
}

impl ReviewDraftBuilder {
    pub fn new(commit_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            ..Self::default()
        }
    }

    pub fn comment(mut self, path: impl Into<String>, position: i64, body: impl Into<String>) -> Self {
        self.comments.push(CommentInput::new(path, position, body));
        self
    }

    pub fn comments(mut self, comments: impl IntoIterator<Item = CommentInput>) -> Self {
        self.comments.extend(comments);
        self
    }

    /// Closing event; makes the draft auto-submit on creation.
    pub fn event(mut self, event: ReviewEvent) -> Self {
        self.event = Some(event);
        self
    }

    /// Overall review body; required together with an event.
    pub fn summary(mut self, body: impl Into<String>) -> Self {
        self.summary = Some(body.into());
        self
    }

    /// Validates everything and returns the draft, or every violation found.
    ///
    /// Building twice from the same input yields equal drafts.
    pub fn build(&self, index: &DiffIndex) -> Result<ReviewDraft, ValidationErrors> {
        let mut errors = Vec::new();

        let commit_id = self.commit_id.trim();
        if commit_id.is_empty() {
            errors.push(ValidationError::MissingCommitId);
        }

        let summary = self
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if self.event.is_some() && summary.is_none() {
            errors.push(ValidationError::MissingSummary);
        }

        let mut comments = Vec::with_capacity(self.comments.len());
        for (index_in_batch, c) in self.comments.iter().enumerate() {
            match check_comment(index, index_in_batch, c) {
                Ok(comment) => comments.push(comment),
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        if !errors.is_empty() {
            return Err(ValidationErrors(errors));
        }

        let intent = match (self.event, summary) {
            (Some(event), Some(body)) => SubmissionIntent::AutoSubmit {
                event,
                body: body.to_string(),
            },
            (_, body) => SubmissionIntent::PendingThenSubmit {
                body: body.map(str::to_string),
            },
        };

        Ok(ReviewDraft {
            commit_id: commit_id.to_string(),
            comments,
            intent,
        })
    }
}

fn check_comment(
    index: &DiffIndex,
    i: usize,
    c: &CommentInput,
) -> Result<Comment, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let path = c.path.trim();

    if path.is_empty() {
        errors.push(ValidationError::EmptyField {
            index: i,
            field: "path",
        });
    }
    if c.position < 1 {
        errors.push(ValidationError::InvalidPosition {
            index: i,
            position: c.position,
        });
    }
    if c.body.trim().is_empty() {
        errors.push(ValidationError::EmptyField {
            index: i,
            field: "body",
        });
    }

    if !path.is_empty() {
        match index.validate(path, c.position) {
            Ok(line) if errors.is_empty() => {
                return Ok(Comment {
                    path: path.to_string(),
                    position: line.position,
                    body: c.body.clone(),
                });
            }
            Ok(_) => {}
            Err(PositionError::FileNotFound { .. }) => errors.push(ValidationError::UnknownFile {
                index: i,
                path: path.to_string(),
            }),
            // Non-positive positions are already reported above.
            Err(PositionError::OutOfRange { .. }) if c.position < 1 => {}
            Err(PositionError::OutOfRange {
                min, max, hunks, ..
            }) => errors.push(ValidationError::PositionOutOfRange {
                index: i,
                path: path.to_string(),
                position: c.position,
                min,
                max,
                hunks,
            }),
        }
    }

    Err(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::position::FileDiff;
    use pretty_assertions::assert_eq;

    fn index() -> DiffIndex {
        DiffIndex::from_files([
            FileDiff::parse("x.ts", "@@ -1,3 +1,4 @@\n a\n+b\n c\n d\n").unwrap(),
            FileDiff::parse(
                "y.ts",
                "@@ -1,4 +1,4 @@\n a\n-b\n+c\n d\n e\n@@ -30,3 +30,4 @@\n p\n+q\n r\n s\n",
            )
            .unwrap(),
        ])
    }

    #[test]
    fn valid_batch_builds_pending_draft() {
        let draft = ReviewDraftBuilder::new("abc")
            .comment("x.ts", 2, "why?")
            .comment("y.ts", 6, "first line of second hunk")
            .build(&index())
            .unwrap();
        assert_eq!(draft.commit_id(), "abc");
        assert_eq!(draft.comments().len(), 2);
        assert_eq!(draft.comments()[1].position, 6);
        assert_eq!(
            draft.intent(),
            &SubmissionIntent::PendingThenSubmit { body: None }
        );
        assert!(draft.event().is_none());
    }

    #[test]
    fn event_with_summary_is_auto_submit() {
        let draft = ReviewDraftBuilder::new("abc")
            .comment("x.ts", 1, "ok")
            .event(ReviewEvent::Comment)
            .summary("ok")
            .build(&index())
            .unwrap();
        assert_eq!(draft.event(), Some(ReviewEvent::Comment));
        let req = draft.create_request();
        assert_eq!(req.event, Some(ReviewEvent::Comment));
        assert_eq!(req.body, Some("ok"));
    }

    #[test]
    fn out_of_range_position_is_rejected() {
        let err = ReviewDraftBuilder::new("abc")
            .comment("x.ts", 5, "past the end")
            .build(&index())
            .unwrap_err();
        match &err.0[..] {
            [ValidationError::PositionOutOfRange { min, max, .. }] => {
                assert_eq!((*min, *max), (1, 4));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn all_errors_are_collected() {
        let err = ReviewDraftBuilder::new("  ")
            .comment("", 0, "")
            .comment("missing.ts", 1, "who?")
            .comment("x.ts", 99, "far")
            .comment("x.ts", 1, "fine")
            .event(ReviewEvent::Approve)
            .build(&index())
            .unwrap_err();

        assert_eq!(
            err.0[..5].to_vec(),
            vec![
                ValidationError::MissingCommitId,
                ValidationError::MissingSummary,
                ValidationError::EmptyField {
                    index: 0,
                    field: "path"
                },
                ValidationError::InvalidPosition {
                    index: 0,
                    position: 0
                },
                ValidationError::EmptyField {
                    index: 0,
                    field: "body"
                },
            ]
        );
        assert_eq!(
            err.0[5],
            ValidationError::UnknownFile {
                index: 1,
                path: "missing.ts".into()
            }
        );
        assert!(matches!(
            err.0[6],
            ValidationError::PositionOutOfRange { index: 2, .. }
        ));
        assert_eq!(err.len(), 7);
    }

    #[test]
    fn negative_position_on_known_file_reported_once() {
        let err = ReviewDraftBuilder::new("abc")
            .comment("x.ts", -2, "neg")
            .build(&index())
            .unwrap_err();
        assert_eq!(
            err.0,
            vec![ValidationError::InvalidPosition {
                index: 0,
                position: -2
            }]
        );
    }

    #[test]
    fn building_twice_is_idempotent() {
        let b = ReviewDraftBuilder::new("abc")
            .comment("x.ts", 2, "a")
            .comment("y.ts", 9, "b")
            .summary("notes");
        let idx = index();
        assert_eq!(b.build(&idx).unwrap(), b.build(&idx).unwrap());
    }

    #[test]
    fn event_parsing() {
        assert_eq!("approve".parse::<ReviewEvent>().unwrap(), ReviewEvent::Approve);
        assert_eq!(
            "REQUEST_CHANGES".parse::<ReviewEvent>().unwrap(),
            ReviewEvent::RequestChanges
        );
        assert_eq!(
            "request-changes".parse::<ReviewEvent>().unwrap(),
            ReviewEvent::RequestChanges
        );
        assert!("merge".parse::<ReviewEvent>().is_err());
    }
}
