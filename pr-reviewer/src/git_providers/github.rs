//! GitHub provider (REST v3) for pull request metadata, diffs and reviews.
//!
//! Endpoints used:
//! - GET  /repos/{owner}/{repo}/pulls/{number}                  (meta, head SHA)
//! - GET  /repos/{owner}/{repo}/pulls/{number}   + diff Accept  (unified diff)
//! - GET  /repos/{owner}/{repo}/pulls/{number}/files            (paginated)
//! - POST /repos/{owner}/{repo}/pulls/{number}/reviews
//! - POST /repos/{owner}/{repo}/pulls/{number}/reviews/{id}/events
//! - GET  /repos/{owner}/{repo}/pulls/{number}/reviews/{id}
//! - POST /repos/{owner}/{repo}/pulls/{number}/comments
//!
//! Every call goes through [`GitHubClient::send`], which applies the retry
//! policy for the call's idempotency class and turns non-2xx responses into
//! `ProtocolError` / `TransportError` values.

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{ConfigError, Error, MrResult, ProtocolError, TransportError};
use crate::git_providers::retry::{Idempotency, RetryPolicy};
use crate::git_providers::types::*;
use crate::git_providers::ProviderConfig;

const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_DIFF: &str = "application/vnd.github.v3.diff";
const API_VERSION: &str = "2022-11-28";
const PER_PAGE: usize = 100;
/// GitHub stops listing files after 3000 entries.
const MAX_FILE_PAGES: usize = 30;

lazy_static! {
    static ref ALREADY_SUBMITTED: Regex =
        Regex::new(r"(?i)already\s+(been\s+)?submitted").unwrap();
    static ref WRONG_TYPE: Regex =
        Regex::new(r"(?i)is not an? (integer|number)").unwrap();
    static ref FOR_FIELD: Regex = Regex::new(r"For '([^']+)'").unwrap();
    static ref COMMENT_INDEX: Regex = Regex::new(r"(?:comments|items)/(\d+)").unwrap();
    static ref UNRESOLVABLE: Regex = Regex::new(
        r"(?i)(could not be resolved|position is invalid|line must be part of the diff|is not part of the diff|path is invalid)"
    )
    .unwrap();
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String, // "https://api.github.com", no trailing slash
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Builds a client with auth and API-version headers preset on every request.
    pub fn from_config(cfg: ProviderConfig) -> MrResult<Self> {
        let base_api = cfg.base_api.trim().trim_end_matches('/').to_string();
        if !(base_api.starts_with("https://") || base_api.starts_with("http://")) {
            return Err(ConfigError::InvalidBaseUrl(cfg.base_api).into());
        }
        if cfg.token.trim().is_empty() {
            return Err(ConfigError::MissingToken.into());
        }

        let http = Client::builder()
            .default_headers(default_headers(cfg.token.trim())?)
            .timeout(cfg.timeout)
            .build()?;

        Ok(Self {
            http,
            base_api,
            retry: cfg.retry,
        })
    }

    /// Fetches pull request metadata; `diff_refs.head_sha` is the review commit.
    pub async fn get_pull(&self, id: &ChangeRequestId) -> MrResult<ChangeRequest> {
        let url = self.pull_url(id, "")?;
        let resp = self
            .send("get pull", Idempotency::Safe, None, || self.http.get(&url))
            .await?;
        let pr: GhPull = read_json(resp).await?;

        Ok(ChangeRequest {
            id: id.clone(),
            title: pr.title,
            description: pr.body,
            author: pr.user.map(|u| AuthorInfo {
                login: u.login,
                html_url: u.html_url,
            }),
            state: pr.state,
            web_url: pr.html_url,
            created_at: pr.created_at,
            updated_at: pr.updated_at,
            source_branch: Some(pr.head.ref_name),
            target_branch: Some(pr.base.ref_name),
            diff_refs: DiffRefs {
                base_sha: pr.base.sha,
                head_sha: pr.head.sha,
            },
        })
    }

    /// Fetches the whole pull request as one unified diff.
    ///
    /// `Ok(None)` when GitHub refuses to render it (HTTP 406, diff too large);
    /// callers then assemble the diff from per-file patches.
    pub async fn get_diff(&self, id: &ChangeRequestId) -> MrResult<Option<String>> {
        let url = self.pull_url(id, "")?;
        let res = self
            .send("get diff", Idempotency::Safe, None, || {
                self.http.get(&url).header(ACCEPT, ACCEPT_DIFF)
            })
            .await;
        match res {
            Ok(resp) => Ok(Some(resp.text().await.map_err(TransportError::from)?)),
            Err(Error::Transport(TransportError::HttpStatus { status: 406, .. })) => {
                debug!("github: diff for {} not renderable (406)", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Lists every changed file, following pagination.
    pub async fn list_changed_files(&self, id: &ChangeRequestId) -> MrResult<Vec<ChangedFile>> {
        let url = self.pull_url(id, "/files")?;
        let mut files = Vec::new();
        for page in 1..=MAX_FILE_PAGES {
            let query = [("per_page", PER_PAGE), ("page", page)];
            let resp = self
                .send("list files", Idempotency::Safe, None, || {
                    self.http.get(&url).query(&query)
                })
                .await?;
            let batch: Vec<ChangedFile> = read_json(resp).await?;
            let n = batch.len();
            files.extend(batch);
            if n < PER_PAGE {
                break;
            }
        }
        debug!("github: {} changed file(s) for {}", files.len(), id);
        Ok(files)
    }

    /// Creates a review (and submits it in the same call when `event` is set).
    pub async fn create_review(
        &self,
        id: &ChangeRequestId,
        req: &CreateReviewRequest<'_>,
    ) -> MrResult<ReviewResponse> {
        let url = self.pull_url(id, "/reviews")?;
        let resp = self
            .send("create review", Idempotency::CreateOnce, None, || {
                self.http.post(&url).json(req)
            })
            .await?;
        read_json(resp).await
    }

    /// Submits a pending review. Never retried.
    pub async fn submit_review(
        &self,
        id: &ChangeRequestId,
        review_id: u64,
        req: &SubmitReviewRequest<'_>,
    ) -> MrResult<ReviewResponse> {
        let url = self.pull_url(id, &format!("/reviews/{review_id}/events"))?;
        let resp = self
            .send("submit review", Idempotency::NotIdempotent, Some(review_id), || {
                self.http.post(&url).json(req)
            })
            .await?;
        read_json(resp).await
    }

    /// Reads one review back (state after an ambiguous submit).
    pub async fn get_review(&self, id: &ChangeRequestId, review_id: u64) -> MrResult<ReviewResponse> {
        let url = self.pull_url(id, &format!("/reviews/{review_id}"))?;
        let resp = self
            .send("get review", Idempotency::Safe, Some(review_id), || self.http.get(&url))
            .await?;
        read_json(resp).await
    }

    /// Posts one review comment outside any review batch.
    pub async fn create_standalone_comment(
        &self,
        id: &ChangeRequestId,
        req: &StandaloneCommentRequest<'_>,
    ) -> MrResult<CommentResponse> {
        let url = self.pull_url(id, "/comments")?;
        let resp = self
            .send("create comment", Idempotency::CreateOnce, None, || {
                self.http.post(&url).json(req)
            })
            .await?;
        read_json(resp).await
    }

    fn pull_url(&self, id: &ChangeRequestId, suffix: &str) -> MrResult<String> {
        let (owner, repo) = id
            .project
            .split_once('/')
            .ok_or_else(|| ConfigError::InvalidRepository(id.project.clone()))?;
        Ok(format!(
            "{}/repos/{}/{}/pulls/{}{}",
            self.base_api,
            urlencoding::encode(owner),
            urlencoding::encode(repo),
            id.number,
            suffix
        ))
    }

    /// Sends the request built by `build`, retrying per `class`.
    async fn send<F>(
        &self,
        what: &str,
        class: Idempotency,
        review_id: Option<u64>,
        build: F,
    ) -> MrResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            let err = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => failure_from_response(resp, review_id).await,
                Err(e) => Error::from(e),
            };

            if !self.retry.should_retry(class, &err, attempt) {
                debug!("github: {} failed (attempt {}): {}", what, attempt + 1, err);
                return Err(err);
            }
            let delay = self.retry.delay_for(attempt, &err);
            warn!(
                "github: {} failed (attempt {}), retrying in {:?}: {}",
                what,
                attempt + 1,
                delay,
                err
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn default_headers(token: &str) -> MrResult<HeaderMap> {
    let mut h = HeaderMap::new();
    h.insert(USER_AGENT, HeaderValue::from_static("pr-reviewer/0.1"));
    h.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
    h.insert("X-GitHub-Api-Version", HeaderValue::from_static(API_VERSION));
    let mut auth = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
        ConfigError::InvalidValue {
            key: "GITHUB_TOKEN".into(),
            value: "<redacted>".into(),
        }
    })?;
    auth.set_sensitive(true);
    h.insert(AUTHORIZATION, auth);
    Ok(h)
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> MrResult<T> {
    let text = resp.text().await.map_err(TransportError::from)?;
    serde_json::from_str(&text)
        .map_err(|e| Error::Transport(TransportError::InvalidResponse(e.to_string())))
}

async fn failure_from_response(resp: Response, review_id: Option<u64>) -> Error {
    let status = resp.status();
    let retry_after = resp
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let rate_exhausted = resp
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");
    let body = resp.text().await.unwrap_or_default();

    if status == StatusCode::FORBIDDEN && (rate_exhausted || retry_after.is_some()) {
        return TransportError::RateLimited {
            retry_after_secs: retry_after,
        }
        .into();
    }
    classify_failure(status.as_u16(), retry_after, &body, review_id)
}

/// Maps a non-2xx API response to the error taxonomy.
pub fn classify_failure(
    status: u16,
    retry_after: Option<u64>,
    body: &str,
    review_id: Option<u64>,
) -> Error {
    let message = error_message(body);

    if matches!(status, 400 | 422) {
        if ALREADY_SUBMITTED.is_match(&message) {
            if let Some(review_id) = review_id {
                return ProtocolError::AlreadySubmitted { review_id }.into();
            }
        }
        if WRONG_TYPE.is_match(&message) {
            let path = FOR_FIELD
                .captures(&message)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string());
            let comment_index = path
                .as_deref()
                .and_then(|p| COMMENT_INDEX.captures(p))
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse().ok());
            let field = path
                .as_deref()
                .and_then(|p| p.rsplit('/').next())
                .unwrap_or("position")
                .to_string();
            return ProtocolError::WrongFieldType {
                field,
                comment_index,
                message,
            }
            .into();
        }
        if UNRESOLVABLE.is_match(&message) {
            return ProtocolError::UnresolvableComment { message }.into();
        }
    }

    match TransportError::from_status(status, message) {
        TransportError::RateLimited { .. } => TransportError::RateLimited {
            retry_after_secs: retry_after,
        }
        .into(),
        other => other.into(),
    }
}

/// Flattens GitHub's `{message, errors: [..]}` body into one line.
fn error_message(body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<GhErrorBody>(body) else {
        return body.trim().to_string();
    };
    let mut parts = vec![parsed.message];
    for e in parsed.errors {
        match e {
            serde_json::Value::String(s) => parts.push(s),
            serde_json::Value::Object(map) => {
                let text = ["message", "field", "code"]
                    .iter()
                    .filter_map(|k| map.get(*k).and_then(|v| v.as_str()))
                    .collect::<Vec<_>>()
                    .join(" ");
                if !text.is_empty() {
                    parts.push(text);
                }
            }
            _ => {}
        }
    }
    parts
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join(": ")
}

/// --- GitHub response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct GhPull {
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    user: Option<GhUser>,
    state: String,
    html_url: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    head: GhRef,
    base: GhRef,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    #[serde(rename = "ref")]
    ref_name: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}
