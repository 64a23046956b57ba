mod common;

use common::{PULL, client, pull_id};
use pr_reviewer::errors::ValidationError;
use pr_reviewer::load_session;
use pr_reviewer::parser::LineKind;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DIFF: &str = "diff --git a/x.ts b/x.ts
index 1111111..2222222 100644
--- a/x.ts
+++ b/x.ts
@@ -1,3 +1,4 @@
 a
+b
 c
 d
diff --git a/y.ts b/y.ts
index 3333333..4444444 100644
--- a/y.ts
+++ b/y.ts
@@ -1,4 +1,4 @@
 a
-b
+c
 d
 e
@@ -30,3 +30,4 @@
 p
+q
 r
 s
";

fn pull_json() -> Value {
    json!({
        "title": "Fix widgets",
        "body": "details",
        "user": { "login": "octocat", "html_url": "https://github.com/octocat" },
        "state": "open",
        "html_url": "https://github.com/octo/widgets/pull/7",
        "created_at": "2025-01-02T03:04:05Z",
        "updated_at": "2025-01-02T03:04:05Z",
        "head": { "ref": "fix", "sha": "abc" },
        "base": { "ref": "main", "sha": "base" }
    })
}

fn files_json() -> Value {
    json!([
        {
            "filename": "x.ts",
            "status": "modified",
            "additions": 1,
            "deletions": 0,
            "patch": "@@ -1,3 +1,4 @@\n a\n+b\n c\n d"
        },
        {
            "filename": "y.ts",
            "status": "modified",
            "additions": 2,
            "deletions": 1,
            "patch": "@@ -1,4 +1,4 @@\n a\n-b\n+c\n d\n e\n@@ -30,3 +30,4 @@\n p\n+q\n r\n s"
        }
    ])
}

async fn mount_pull(server: &MockServer, diff: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(PULL))
        .and(header("accept", "application/vnd.github.v3.diff"))
        .respond_with(diff)
        .with_priority(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(PULL))
        .respond_with(ResponseTemplate::new(200).set_body_json(pull_json()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{PULL}/files")))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(files_json()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn session_indexes_the_pull_request_diff() {
    let server = MockServer::start().await;
    mount_pull(&server, ResponseTemplate::new(200).set_body_string(DIFF)).await;

    let session = load_session(&client(&server), &pull_id(), None).await.unwrap();
    assert_eq!(session.commit_id(), "abc");
    assert_eq!(session.index.paths().collect::<Vec<_>>(), vec!["x.ts", "y.ts"]);

    let y = session.index.get("y.ts").unwrap();
    assert_eq!(y.valid_range().last, 9);
    let line = session.index.validate("y.ts", 6).unwrap();
    assert_eq!((line.kind, line.text.as_str()), (LineKind::Context, "p"));
    let removed = session.index.validate("y.ts", 2).unwrap();
    assert_eq!(removed.kind, LineKind::Removed);
}

#[tokio::test]
async fn unknown_file_is_rejected_before_any_review_call() {
    let server = MockServer::start().await;
    mount_pull(&server, ResponseTemplate::new(200).set_body_string(DIFF)).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let session = load_session(&client(&server), &pull_id(), None).await.unwrap();
    let err = session
        .draft()
        .comment("x.ts", 2, "fine")
        .comment("missing.ts", 1, "nope")
        .build(&session.index)
        .unwrap_err();
    assert_eq!(
        err.0,
        vec![ValidationError::UnknownFile {
            index: 1,
            path: "missing.ts".into()
        }]
    );
}

#[tokio::test]
async fn too_large_diff_falls_back_to_file_patches() {
    let server = MockServer::start().await;
    mount_pull(
        &server,
        ResponseTemplate::new(406).set_body_json(json!({
            "message": "Sorry, the diff exceeded the maximum number of lines (20000)"
        })),
    )
    .await;

    let session = load_session(&client(&server), &pull_id(), None).await.unwrap();
    assert!(session.bundle.raw_diff.is_none());
    assert_eq!(session.index.len(), 2);
    assert_eq!(session.index.get("y.ts").unwrap().max_position(), 9);
}

#[tokio::test]
async fn second_load_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(PULL))
        .and(header("accept", "application/vnd.github.v3.diff"))
        .respond_with(ResponseTemplate::new(200).set_body_string(DIFF))
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(PULL))
        .respond_with(ResponseTemplate::new(200).set_body_json(pull_json()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{PULL}/files")))
        .respond_with(ResponseTemplate::new(200).set_body_json(files_json()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let c = client(&server);
    let first = load_session(&c, &pull_id(), Some(dir.path())).await.unwrap();
    let second = load_session(&c, &pull_id(), Some(dir.path())).await.unwrap();
    assert_eq!(first.index, second.index);
    assert_eq!(first.bundle, second.bundle);
}
