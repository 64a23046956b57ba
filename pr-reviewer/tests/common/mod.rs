#![allow(dead_code)]

use std::time::Duration;

use pr_reviewer::git_providers::{ChangeRequestId, GitHubClient, ProviderConfig, RetryPolicy};
use pr_reviewer::position::{DiffIndex, FileDiff};
use pr_reviewer::{PublishConfig, ReviewPublisher};
use serde_json::{Value, json};
use wiremock::MockServer;

pub const PULL: &str = "/repos/octo/widgets/pulls/7";

pub fn pull_id() -> ChangeRequestId {
    ChangeRequestId::new("octo/widgets", 7).unwrap()
}

/// Client pointed at the mock server, with near-zero backoff.
pub fn client(server: &MockServer) -> GitHubClient {
    let mut cfg = ProviderConfig::new(server.uri(), "test-token");
    cfg.retry = RetryPolicy::new(3, Duration::from_millis(1));
    GitHubClient::from_config(cfg).unwrap()
}

pub fn publisher(server: &MockServer) -> ReviewPublisher {
    ReviewPublisher::new(client(server), pull_id(), PublishConfig::default())
}

/// `x.ts`: one hunk, positions 1-4. `y.ts`: two hunks, 1-5 and 6-9.
pub fn index() -> DiffIndex {
    DiffIndex::from_files([
        FileDiff::parse("x.ts", "@@ -1,3 +1,4 @@\n a\n+b\n c\n d\n").unwrap(),
        FileDiff::parse(
            "y.ts",
            "@@ -1,4 +1,4 @@\n a\n-b\n+c\n d\n e\n@@ -30,3 +30,4 @@\n p\n+q\n r\n s\n",
        )
        .unwrap(),
    ])
}

pub fn review_json(id: u64, state: &str) -> Value {
    json!({
        "id": id,
        "state": state,
        "html_url": format!("https://github.com/octo/widgets/pull/7#pullrequestreview-{id}"),
    })
}

/// Bodies of every request the server saw for `method` + `path`.
pub async fn bodies(server: &MockServer, method: &str, path: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .into_iter()
        .filter(|r| r.method.as_str() == method && r.url.path() == path)
        .map(|r| serde_json::from_slice(&r.body).unwrap_or(Value::Null))
        .collect()
}
