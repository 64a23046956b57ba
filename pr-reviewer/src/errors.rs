//! Crate-wide error hierarchy for pr-reviewer.
//!
//! Goals:
//! - Single root `Error` for all public functions.
//! - Client-side failures (`Parse`, `Validation`) never reach the network layer.
//! - Status mapping for the review API (401→Unauthorized, 429→RateLimited, 5xx→Server, etc.).
//! - Contract violations reported by the API are `Protocol` errors: fatal, never retried.
//! - Ergonomic `?` via `From` impls.

use std::fmt;

use thiserror::Error;

use crate::git_providers::types::ReviewState;
use crate::position::validate::HunkSpan;

/// Convenient alias for crate-wide results.
pub type MrResult<T> = Result<T, Error>;

/// Root error type for the pr-reviewer crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Unified diff parsing failure.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Client-side validation of a review batch (all violations at once).
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    /// The review API rejected a request because of a contract the client broke.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Network / HTTP status failure talking to the review API.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A submit call failed; `state` tells whether the review is still open.
    #[error("submit of review {review_id} failed (review is {state})")]
    Submit {
        review_id: u64,
        state: ReviewState,
        #[source]
        source: Box<Error>,
    },

    /// Cache (file I/O / JSON) failure.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Configuration problems (bad/missing tokens, base URL, etc.).
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl Error {
    /// Only transient transport failures may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(t) => t.is_transient(),
            _ => false,
        }
    }

    /// True when the request provably never reached the server.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Connect(_)))
    }

    /// Protocol error behind this error, looking through `Submit` wrappers.
    pub fn protocol(&self) -> Option<&ProtocolError> {
        match self {
            Error::Protocol(p) => Some(p),
            Error::Submit { source, .. } => source.protocol(),
            _ => None,
        }
    }
}

/// Unified diff parser errors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("invalid hunk header: {0}")]
    InvalidHunkHeader(String),

    #[error("file `{path}` has no hunks in the diff (files present: {})", list_or_none(.available))]
    FileNotInDiff {
        path: String,
        available: Vec<String>,
    },
}

/// One client-side violation inside a review batch.
///
/// `index` is the zero-based position of the offending comment in the input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("review is missing a commit id")]
    MissingCommitId,

    #[error("a review event requires a non-empty summary body")]
    MissingSummary,

    #[error("draft already carries event {event}; it is submitted on creation, not by a later submit")]
    EventAlreadySet { event: String },

    #[error("comment #{index}: field `{field}` is empty")]
    EmptyField { index: usize, field: &'static str },

    #[error("comment #{index}: position {position} is not a positive integer")]
    InvalidPosition { index: usize, position: i64 },

    #[error("comment #{index}: file `{path}` is not part of this pull request's diff")]
    UnknownFile { index: usize, path: String },

    #[error(
        "comment #{index}: position {position} is outside `{path}` (valid {min}..={max}; hunks: {})",
        render_hunks(.hunks)
    )]
    PositionOutOfRange {
        index: usize,
        path: String,
        position: i64,
        min: u32,
        max: u32,
        hunks: Vec<HunkSpan>,
    },
}

/// Every violation found in a batch, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrors(pub Vec<ValidationError>);

impl ValidationErrors {
    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "review batch rejected ({} problem(s))", self.0.len())?;
        for e in &self.0 {
            write!(f, "\n  - {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Contract violations reported by the review API.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A field was sent with the wrong JSON type (e.g. `position` as a string).
    #[error("field `{field}` has the wrong type{}: {message}", at_comment(.comment_index))]
    WrongFieldType {
        field: String,
        comment_index: Option<usize>,
        message: String,
    },

    /// The review was already submitted; it cannot be submitted again.
    #[error("review {review_id} has already been submitted")]
    AlreadySubmitted { review_id: u64 },

    /// Pending reviews accept no further comments.
    #[error("review {review_id} is pending; comments cannot be added after creation")]
    UnsupportedUpdate { review_id: u64 },

    /// The API could not anchor one of the comments of the batch.
    #[error("the API could not resolve a comment anchor: {message}")]
    UnresolvableComment { message: String },
}

impl ProtocolError {
    /// Remediation text surfaced to the operator together with the error.
    pub fn hint(&self) -> &'static str {
        match self {
            ProtocolError::WrongFieldType { .. } => {
                "send `position` as a JSON number, never as a string"
            }
            ProtocolError::AlreadySubmitted { .. } => {
                "the review is closed; create a new review instead of submitting again"
            }
            ProtocolError::UnsupportedUpdate { .. } => {
                "recreate the review with the corrected comments instead of updating it"
            }
            ProtocolError::UnresolvableComment { .. } => {
                "check the comment positions against the diff, or post comments individually"
            }
        }
    }
}

/// Detailed transport / HTTP failure talking to the review API.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (4xx/3xx) not covered above.
    #[error("http status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Connection could not be established; the request was never sent.
    #[error("connect error: {0}")]
    Connect(String),

    /// Network/transport failure without status (DNS/reset).
    #[error("network error: {0}")]
    Network(String),

    /// Successful status, but the body does not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout
                | TransportError::Connect(_)
                | TransportError::Network(_)
                | TransportError::RateLimited { .. }
                | TransportError::Server(_)
        )
    }

    /// Maps a bare HTTP status to a transport error.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => TransportError::Unauthorized,
            403 => TransportError::Forbidden,
            404 => TransportError::NotFound,
            429 => TransportError::RateLimited {
                retry_after_secs: None,
            },
            500..=599 => TransportError::Server(status),
            _ => TransportError::HttpStatus { status, message },
        }
    }
}

/// File cache related errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Configuration and setup errors (missing token, bad repository, etc.).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing GitHub token (set GITHUB_TOKEN or GH_TOKEN)")]
    MissingToken,

    #[error("invalid base api url: {0}")]
    InvalidBaseUrl(String),

    #[error("invalid repository `{0}` (expected owner/repo)")]
    InvalidRepository(String),

    #[error("invalid value `{value}` for {key}")]
    InvalidValue { key: String, value: String },
}

fn list_or_none(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn render_hunks(hunks: &[HunkSpan]) -> String {
    hunks
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn at_comment(index: &Option<usize>) -> String {
    index
        .map(|i| format!(" in comment #{i}"))
        .unwrap_or_default()
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(TransportError::from(e))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Cache(CacheError::Io(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        // API bodies are decoded in `read_json` as `InvalidResponse`;
        // anything reaching the root is local (cache/input) JSON.
        Error::Cache(CacheError::Serde(e))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return TransportError::Timeout;
        }
        if e.is_connect() {
            return TransportError::Connect(e.to_string());
        }
        if let Some(status) = e.status() {
            return TransportError::from_status(status.as_u16(), e.to_string());
        }
        TransportError::Network(e.to_string())
    }
}
