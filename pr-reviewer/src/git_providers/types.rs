//! Data model for pull requests and reviews as the review API exposes them.
//!
//! These types are the normalized output of the provider layer and the
//! request/response shapes of the review endpoints. Wire shapes keep exactly
//! the fields the API accepts: a review comment is `path` + `position`
//! (JSON number) + `body`, nothing else.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::review::{Comment, ReviewEvent};

/// A unique reference to a pull request.
///
/// * `project` – "owner/repo".
/// * `number`  – pull request number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeRequestId {
    pub project: String,
    pub number: u64,
}

impl ChangeRequestId {
    pub fn new(project: &str, number: u64) -> Result<Self, ConfigError> {
        let project = project.trim();
        match project.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() && !repo.contains('/') => {
                Ok(Self {
                    project: project.to_string(),
                    number,
                })
            }
            _ => Err(ConfigError::InvalidRepository(project.to_string())),
        }
    }
}

impl fmt::Display for ChangeRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.project, self.number)
    }
}

/// Pair of SHAs the pull request diff is computed between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRefs {
    pub base_sha: String,
    /// Tip commit of the pull request; the `commit_id` every review targets.
    pub head_sha: String,
}

/// Minimal info about the human who opened the pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorInfo {
    pub login: String,
    pub html_url: Option<String>,
}

/// High-level metadata for a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRequest {
    pub id: ChangeRequestId,
    pub title: String,
    pub description: Option<String>,
    pub author: Option<AuthorInfo>,
    pub state: String,
    pub web_url: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub source_branch: Option<String>,
    pub target_branch: Option<String>,
    pub diff_refs: DiffRefs,
}

/// One entry of the pull request's changed-file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub filename: String,
    #[serde(default)]
    pub previous_filename: Option<String>,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    /// Hunks-only unified diff; absent for binary or very large files.
    #[serde(default)]
    pub patch: Option<String>,
}

/// Everything a review session needs from the provider (cacheable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrBundle {
    pub meta: ChangeRequest,
    pub changed_files: Vec<ChangedFile>,
    /// Whole-PR unified diff, when the provider returned one.
    pub raw_diff: Option<String>,
}

/// Lifecycle of a review object on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewState {
    /// Created without an event; waits for exactly one submit call.
    Pending,
    /// Closed with an event; cannot be submitted again.
    Submitted,
}

impl ReviewState {
    /// `"PENDING"` is the only open state; every other name is a submitted one.
    pub fn from_api(state: &str) -> Self {
        if state.eq_ignore_ascii_case("PENDING") {
            ReviewState::Pending
        } else {
            ReviewState::Submitted
        }
    }
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReviewState::Pending => "pending",
            ReviewState::Submitted => "submitted",
        })
    }
}

/// Body of `POST /repos/{owner}/{repo}/pulls/{number}/reviews`.
///
/// With `event` the review is created and submitted in one call; without it
/// the review is created `PENDING`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateReviewRequest<'a> {
    pub commit_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<ReviewEvent>,
    pub comments: &'a [Comment],
}

/// Body of `POST .../reviews/{review_id}/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReviewRequest<'a> {
    pub event: ReviewEvent,
    pub body: &'a str,
}

/// Body of `POST /repos/{owner}/{repo}/pulls/{number}/comments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StandaloneCommentRequest<'a> {
    pub commit_id: &'a str,
    pub path: &'a str,
    pub position: u32,
    pub body: &'a str,
}

/// Review object as returned by the create/submit endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub id: u64,
    pub state: String,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
}

impl ReviewResponse {
    pub fn review_state(&self) -> ReviewState {
        ReviewState::from_api(&self.state)
    }
}

/// Review comment as returned by the standalone comment endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: u64,
    #[serde(default)]
    pub html_url: Option<String>,
}

impl FromStr for ChangeRequestId {
    type Err = ConfigError;

    /// Parses `owner/repo#123`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (project, number) = s
            .rsplit_once('#')
            .ok_or_else(|| ConfigError::InvalidRepository(s.to_string()))?;
        let number = number
            .parse()
            .map_err(|_| ConfigError::InvalidRepository(s.to_string()))?;
        Self::new(project, number)
    }
}
