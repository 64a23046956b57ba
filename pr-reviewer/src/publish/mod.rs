//! Publisher: the review submission state machine.
//!
//! ```text
//! Drafted --create(event)--> Submitted
//! Drafted --create()-------> Pending --submit(event, body)--> Submitted
//! ```
//!
//! - The shape is fixed by the draft's [`SubmissionIntent`]; asking to
//!   finalize a draft that already carries an event is rejected before any
//!   network call.
//! - A [`PendingReview`] handle is consumed by [`ReviewPublisher::submit`],
//!   so one handle submits at most once.
//! - The publisher keeps a ledger of review states it has seen; submitting a
//!   review it knows to be closed fails with `AlreadySubmitted` locally.
//! - When the API cannot anchor one of the batch's comments, publishing
//!   degrades to per-comment calls ([`fallback`]), reported as
//!   [`PublishMode::Degraded`].
//! - Dry-run: log the payload without calling the API.

pub mod fallback;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{Error, MrResult, ProtocolError, ValidationError, ValidationErrors};
use crate::git_providers::{
    ChangeRequestId, GitHubClient, ReviewResponse, ReviewState, SubmitReviewRequest,
};
use crate::review::{Comment, ReviewDraft, ReviewEvent, SubmissionIntent};

/// Configuration for the publishing step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishConfig {
    /// If true, do not send anything; just log what would be posted.
    pub dry_run: bool,
    /// If true, a batch the API cannot anchor is re-posted comment by comment.
    pub allow_fallback: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            allow_fallback: true,
        }
    }
}

/// How a draft ended up on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishMode {
    /// One atomic review carrying every comment.
    Batch,
    /// Comment-less review plus one call per comment.
    Degraded,
    /// Nothing was sent.
    DryRun,
}

/// Review object as seen after publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedReview {
    pub id: u64,
    pub state: ReviewState,
    pub html_url: Option<String>,
}

/// Per-comment result of the degraded path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentOutcome {
    pub path: String,
    pub position: u32,
    /// Id of the created comment; `None` when the call failed.
    pub comment_id: Option<u64>,
    pub error: Option<String>,
}

impl CommentOutcome {
    pub fn is_posted(&self) -> bool {
        self.comment_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishOutcome {
    pub mode: PublishMode,
    pub review: Option<PublishedReview>,
    /// Filled in degraded mode only.
    pub comments: Vec<CommentOutcome>,
}

/// Closed review. No further transition exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedReview {
    pub id: u64,
    pub html_url: Option<String>,
}

/// Open review awaiting exactly one submit call.
#[derive(Debug, PartialEq, Eq)]
pub struct PendingReview {
    id: u64,
    html_url: Option<String>,
}

impl PendingReview {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn html_url(&self) -> Option<&str> {
        self.html_url.as_deref()
    }

    /// Pending reviews take no more comments; recreate the draft or fall back
    /// to individual comments instead.
    pub fn add_comments(&self, _comments: &[Comment]) -> MrResult<()> {
        Err(ProtocolError::UnsupportedUpdate {
            review_id: self.id,
        }
        .into())
    }
}

/// Result of the create call.
#[derive(Debug, PartialEq, Eq)]
pub enum CreatedReview {
    Submitted(SubmittedReview),
    Pending(PendingReview),
}

impl CreatedReview {
    pub fn id(&self) -> u64 {
        match self {
            CreatedReview::Submitted(r) => r.id,
            CreatedReview::Pending(r) => r.id,
        }
    }

    pub fn state(&self) -> ReviewState {
        match self {
            CreatedReview::Submitted(_) => ReviewState::Submitted,
            CreatedReview::Pending(_) => ReviewState::Pending,
        }
    }

    fn html_url(&self) -> Option<String> {
        match self {
            CreatedReview::Submitted(r) => r.html_url.clone(),
            CreatedReview::Pending(r) => r.html_url.clone(),
        }
    }
}

/// Publishes drafts for one pull request.
#[derive(Debug)]
pub struct ReviewPublisher {
    client: GitHubClient,
    id: ChangeRequestId,
    cfg: PublishConfig,
    ledger: Mutex<HashMap<u64, ReviewState>>,
}

impl ReviewPublisher {
    pub fn new(client: GitHubClient, id: ChangeRequestId, cfg: PublishConfig) -> Self {
        Self {
            client,
            id,
            cfg,
            ledger: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> PublishConfig {
        self.cfg
    }

    /// Last state recorded for `review_id`, if this publisher has seen it.
    pub fn known_state(&self, review_id: u64) -> Option<ReviewState> {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&review_id)
            .copied()
    }

    fn record(&self, review_id: u64, state: ReviewState) {
        self.ledger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(review_id, state);
    }

    /// Creates the review. Auto-submit drafts come back `Submitted`, others `Pending`.
    pub async fn create(&self, draft: &ReviewDraft) -> MrResult<CreatedReview> {
        debug!(
            "publish: create review commit={} comments={} event={:?}",
            draft.commit_id(),
            draft.comments().len(),
            draft.event()
        );
        let resp = self
            .client
            .create_review(&self.id, &draft.create_request())
            .await?;
        Ok(self.created_from(resp))
    }

    pub(crate) fn created_from(&self, resp: ReviewResponse) -> CreatedReview {
        let state = resp.review_state();
        self.record(resp.id, state);
        match state {
            ReviewState::Submitted => CreatedReview::Submitted(SubmittedReview {
                id: resp.id,
                html_url: resp.html_url,
            }),
            ReviewState::Pending => CreatedReview::Pending(PendingReview {
                id: resp.id,
                html_url: resp.html_url,
            }),
        }
    }

    /// The only legal `Pending -> Submitted` transition.
    pub async fn submit(
        &self,
        review: PendingReview,
        event: ReviewEvent,
        body: &str,
    ) -> MrResult<SubmittedReview> {
        self.submit_by_id(review.id, event, body).await
    }

    /// Submits a review known only by id (e.g. created by an earlier run).
    ///
    /// Failures come back as [`Error::Submit`] carrying the review's state.
    pub async fn submit_by_id(
        &self,
        review_id: u64,
        event: ReviewEvent,
        body: &str,
    ) -> MrResult<SubmittedReview> {
        if body.trim().is_empty() {
            return Err(ValidationErrors(vec![ValidationError::MissingSummary]).into());
        }
        if self.known_state(review_id) == Some(ReviewState::Submitted) {
            debug!("publish: review {} already closed, not calling the API", review_id);
            return Err(Error::Submit {
                review_id,
                state: ReviewState::Submitted,
                source: Box::new(ProtocolError::AlreadySubmitted { review_id }.into()),
            });
        }

        let req = SubmitReviewRequest {
            event,
            body: body.trim(),
        };
        match self.client.submit_review(&self.id, review_id, &req).await {
            Ok(resp) => {
                self.record(review_id, ReviewState::Submitted);
                info!("publish: review {} submitted ({})", review_id, event);
                Ok(SubmittedReview {
                    id: resp.id,
                    html_url: resp.html_url,
                })
            }
            Err(e) => {
                let state = self.state_after_failed_submit(review_id, &e).await;
                self.record(review_id, state);
                Err(Error::Submit {
                    review_id,
                    state,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Definitive rejections leave the review as it was; ambiguous failures
    /// (timeouts, 5xx) are resolved by reading the review back.
    async fn state_after_failed_submit(&self, review_id: u64, err: &Error) -> ReviewState {
        if let Some(ProtocolError::AlreadySubmitted { .. }) = err.protocol() {
            return ReviewState::Submitted;
        }
        if !err.is_retryable() {
            return ReviewState::Pending;
        }
        match self.client.get_review(&self.id, review_id).await {
            Ok(r) => r.review_state(),
            Err(e) => {
                warn!("publish: could not read back review {}: {}", review_id, e);
                ReviewState::Pending
            }
        }
    }

    /// Publishes a draft end to end.
    ///
    /// `finalize` is the `(event, body)` used to close a pending draft; it is
    /// an error to pass one for a draft that already carries its own event.
    /// A pending draft without `finalize` is left open and reported `Pending`.
    pub async fn publish(
        &self,
        draft: &ReviewDraft,
        finalize: Option<(ReviewEvent, String)>,
    ) -> MrResult<PublishOutcome> {
        let t0 = Instant::now();
        if let (Some(event), Some(_)) = (draft.event(), finalize.as_ref()) {
            return Err(ValidationErrors(vec![ValidationError::EventAlreadySet {
                event: event.to_string(),
            }])
            .into());
        }
        if let Some((_, body)) = &finalize {
            if body.trim().is_empty() {
                return Err(ValidationErrors(vec![ValidationError::MissingSummary]).into());
            }
        }

        info!(
            "publish: start {} comments={} intent={}",
            self.id,
            draft.comments().len(),
            match draft.intent() {
                SubmissionIntent::AutoSubmit { .. } => "auto-submit",
                SubmissionIntent::PendingThenSubmit { .. } => "pending-then-submit",
            }
        );

        if self.cfg.dry_run {
            let payload = serde_json::to_string_pretty(&draft.create_request())?;
            info!("publish: dry-run, would POST review:\n{}", payload);
            if let Some((event, _)) = &finalize {
                info!("publish: dry-run, would then submit with {}", event);
            }
            return Ok(PublishOutcome {
                mode: PublishMode::DryRun,
                review: None,
                comments: Vec::new(),
            });
        }

        let created = match self.create(draft).await {
            Ok(c) => c,
            Err(Error::Protocol(ProtocolError::UnresolvableComment { message }))
                if self.cfg.allow_fallback =>
            {
                let (event, body) = fallback::degraded_event(draft, finalize.as_ref());
                warn!("publish: batch rejected ({}), entering degraded mode", message);
                let outcome = fallback::post_individually(self, draft, event, &body).await?;
                info!(
                    "publish: degraded done posted={} failed={} in {} ms",
                    outcome.comments.iter().filter(|c| c.is_posted()).count(),
                    outcome.comments.iter().filter(|c| !c.is_posted()).count(),
                    t0.elapsed().as_millis()
                );
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        let review = match (created, finalize) {
            (CreatedReview::Pending(pending), Some((event, body))) => {
                let html_url = pending.html_url.clone();
                let submitted = self.submit(pending, event, &body).await?;
                PublishedReview {
                    id: submitted.id,
                    state: ReviewState::Submitted,
                    html_url: submitted.html_url.or(html_url),
                }
            }
            (created, _) => {
                if created.state() == ReviewState::Pending {
                    info!("publish: review {} left pending", created.id());
                }
                PublishedReview {
                    id: created.id(),
                    state: created.state(),
                    html_url: created.html_url(),
                }
            }
        };

        info!(
            "publish: done review={} state={} in {} ms",
            review.id,
            review.state,
            t0.elapsed().as_millis()
        );
        Ok(PublishOutcome {
            mode: PublishMode::Batch,
            review: Some(review),
            comments: Vec::new(),
        })
    }

    pub(crate) fn client(&self) -> &GitHubClient {
        &self.client
    }

    pub(crate) fn pull(&self) -> &ChangeRequestId {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git_providers::ProviderConfig;
    use crate::position::{DiffIndex, FileDiff};
    use crate::review::ReviewDraftBuilder;

    fn publisher(cfg: PublishConfig) -> ReviewPublisher {
        // Unroutable base: any request would fail, which these tests rely on never happening.
        let client =
            GitHubClient::from_config(ProviderConfig::new("http://127.0.0.1:9", "t")).unwrap();
        ReviewPublisher::new(client, ChangeRequestId::new("o/r", 1).unwrap(), cfg)
    }

    fn index() -> DiffIndex {
        DiffIndex::from_files([FileDiff::parse("x.ts", "@@ -1,3 +1,4 @@\n a\n+b\n c\n d\n").unwrap()])
    }

    #[tokio::test]
    async fn finalizing_an_auto_submit_draft_is_rejected_locally() {
        let draft = ReviewDraftBuilder::new("abc")
            .comment("x.ts", 2, "hm")
            .event(ReviewEvent::Comment)
            .summary("ok")
            .build(&index())
            .unwrap();
        let err = publisher(PublishConfig::default())
            .publish(&draft, Some((ReviewEvent::Approve, "lgtm".into())))
            .await
            .unwrap_err();
        match err {
            Error::Validation(v) => assert!(matches!(
                v.0.as_slice(),
                [ValidationError::EventAlreadySet { .. }]
            )),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn dry_run_sends_nothing() {
        let draft = ReviewDraftBuilder::new("abc")
            .comment("x.ts", 2, "hm")
            .build(&index())
            .unwrap();
        let out = publisher(PublishConfig {
            dry_run: true,
            allow_fallback: true,
        })
        .publish(&draft, Some((ReviewEvent::Comment, "done".into())))
        .await
        .unwrap();
        assert_eq!(out.mode, PublishMode::DryRun);
        assert!(out.review.is_none());
    }

    #[tokio::test]
    async fn known_submitted_review_fails_without_network() {
        let p = publisher(PublishConfig::default());
        p.record(42, ReviewState::Submitted);
        let err = p
            .submit_by_id(42, ReviewEvent::Comment, "again")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Submit {
                review_id: 42,
                state: ReviewState::Submitted,
                ..
            }
        ));
        assert!(matches!(
            err.protocol(),
            Some(ProtocolError::AlreadySubmitted { review_id: 42 })
        ));
    }

    #[tokio::test]
    async fn empty_submit_body_is_rejected() {
        let err = publisher(PublishConfig::default())
            .submit_by_id(1, ReviewEvent::Approve, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn pending_reviews_cannot_be_updated() {
        let p = publisher(PublishConfig::default());
        let created = p.created_from(ReviewResponse {
            id: 5,
            state: "PENDING".into(),
            html_url: None,
            submitted_at: None,
        });
        let CreatedReview::Pending(pending) = created else {
            panic!("expected pending");
        };
        assert_eq!(p.known_state(5), Some(ReviewState::Pending));
        assert!(matches!(
            pending.add_comments(&[]).unwrap_err().protocol(),
            Some(ProtocolError::UnsupportedUpdate { review_id: 5 })
        ));
    }
}
