//! Provider layer: the pull request review API.
//!
//! Only GitHub's REST surface is implemented. The client is a concrete type
//! with plain `async fn`s; no async-trait, no boxed futures.

pub mod github;
pub mod retry;
pub mod types;

use std::time::Duration;

pub use github::GitHubClient;
pub use retry::{Idempotency, RetryPolicy};
pub use types::*;

pub const DEFAULT_GITHUB_API: &str = "https://api.github.com";

/// Runtime configuration for the provider client.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// API base, e.g. "https://api.github.com" or "https://ghe.example.com/api/v3".
    pub base_api: String,
    /// Access token (PAT or app installation token).
    pub token: String,
    /// Whole-request timeout.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ProviderConfig {
    pub fn new(base_api: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_api: base_api.into(),
            token: token.into(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}
