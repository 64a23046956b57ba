//! Degraded publishing: one comment-less review, then one call per comment.
//!
//! Entered only after the API rejected the atomic batch because it could not
//! anchor one of its comments. Atomicity is gone at this point, so every
//! comment is attempted in order and failures are collected, not raised.

use tracing::{debug, warn};

use crate::errors::MrResult;
use crate::git_providers::{CreateReviewRequest, StandaloneCommentRequest};
use crate::review::{ReviewDraft, ReviewEvent, SubmissionIntent};

use super::{CommentOutcome, PublishMode, PublishOutcome, PublishedReview, ReviewPublisher};

const DEFAULT_BODY: &str = "Review comments were posted individually.";

/// Event and summary for the comment-less review.
///
/// Auto-submit drafts keep their own; pending drafts use the finalize pair
/// when given, else a plain `COMMENT`.
pub fn degraded_event(
    draft: &ReviewDraft,
    finalize: Option<&(ReviewEvent, String)>,
) -> (ReviewEvent, String) {
    match (draft.intent(), finalize) {
        (SubmissionIntent::AutoSubmit { event, body }, _) => (*event, body.clone()),
        (SubmissionIntent::PendingThenSubmit { .. }, Some((event, body))) => {
            (*event, body.clone())
        }
        (SubmissionIntent::PendingThenSubmit { body }, None) => (
            ReviewEvent::Comment,
            body.clone().unwrap_or_else(|| DEFAULT_BODY.to_string()),
        ),
    }
}

pub(crate) async fn post_individually(
    publisher: &ReviewPublisher,
    draft: &ReviewDraft,
    event: ReviewEvent,
    body: &str,
) -> MrResult<PublishOutcome> {
    let client = publisher.client();
    let pull = publisher.pull();

    debug!("fallback: create comment-less review event={}", event);
    let req = CreateReviewRequest {
        commit_id: draft.commit_id(),
        body: Some(body),
        event: Some(event),
        comments: &[],
    };
    let created = publisher.created_from(client.create_review(pull, &req).await?);
    let review = PublishedReview {
        id: created.id(),
        state: created.state(),
        html_url: created.html_url(),
    };

    let mut comments = Vec::with_capacity(draft.comments().len());
    for (i, c) in draft.comments().iter().enumerate() {
        let req = StandaloneCommentRequest {
            commit_id: draft.commit_id(),
            path: &c.path,
            position: c.position,
            body: &c.body,
        };
        let outcome = match client.create_standalone_comment(pull, &req).await {
            Ok(resp) => CommentOutcome {
                path: c.path.clone(),
                position: c.position,
                comment_id: Some(resp.id),
                error: None,
            },
            Err(e) => {
                warn!(
                    "fallback: comment #{} at {}:{} failed: {}",
                    i, c.path, c.position, e
                );
                CommentOutcome {
                    path: c.path.clone(),
                    position: c.position,
                    comment_id: None,
                    error: Some(e.to_string()),
                }
            }
        };
        comments.push(outcome);
    }

    Ok(PublishOutcome {
        mode: PublishMode::Degraded,
        review: Some(review),
        comments,
    })
}
