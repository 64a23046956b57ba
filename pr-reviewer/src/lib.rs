//! Public entry for the pr-reviewer pipeline.
//!
//! 1) **Step 1: Provider I/O + caching**
//!    - Fetch PR metadata to get `head_sha` (the review commit)
//!    - Try the bundle cache (return fast on hit)
//!    - Otherwise fetch the changed-file list and the unified diff
//!    - Store the bundle into the file cache
//!
//! 2) **Step 2: Position index**
//!    - Split the diff per file, parse hunks, assign diff positions
//!    - Keep only files the API lists as changed
//!
//! 3) **Step 3: Draft** ([`review`]): validate comments against the index
//!    into an immutable [`review::ReviewDraft`], optionally after merging
//!    several analysis passes ([`review::fanout`], [`review::policy`]).
//!
//! 4) **Step 4: Publish** ([`publish`]): atomic review, create-then-submit,
//!    or degraded per-comment posting.
//!
//! The pipeline uses `tracing` for debug logging and avoids `async-trait` and
//! heap trait objects (no `Box<dyn ...>`).

pub mod cache;
pub mod config;
pub mod errors;
pub mod git_providers;
pub mod parser; // step 2: hunk parser
pub mod position; // step 2: indexer + validator
pub mod publish; // step 4
pub mod review; // step 3
pub mod telemetry;

use std::collections::HashSet;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, warn};

use errors::MrResult;
use git_providers::{ChangeRequestId, CrBundle, GitHubClient};
use position::{DiffIndex, FileDiff};
use review::ReviewDraftBuilder;

/// Everything needed to draft comments for one pull request at one commit.
#[derive(Debug, Clone)]
pub struct ReviewSession {
    pub bundle: CrBundle,
    /// Commentable files of the pull request, positions assigned.
    pub index: DiffIndex,
}

impl ReviewSession {
    /// Builds the position index from an already fetched bundle.
    ///
    /// The whole-PR diff is used when present; otherwise the per-file
    /// patches of the changed-file list. Files the API does not list as
    /// changed are never commentable.
    pub fn from_parts(bundle: CrBundle) -> MrResult<Self> {
        let mut index = match &bundle.raw_diff {
            Some(raw) => DiffIndex::from_patch(raw)?,
            None => {
                let mut files = Vec::new();
                for f in &bundle.changed_files {
                    let Some(patch) = f.patch.as_deref().filter(|p| !p.trim().is_empty()) else {
                        continue;
                    };
                    if parser::looks_like_binary_patch(patch) {
                        continue;
                    }
                    files.push(FileDiff::parse(&f.filename, patch)?);
                }
                DiffIndex::from_files(files)
            }
        };

        if !bundle.changed_files.is_empty() {
            let listed: HashSet<&str> = bundle
                .changed_files
                .iter()
                .map(|f| f.filename.as_str())
                .collect();
            index.retain(|path| {
                let keep = listed.contains(path);
                if !keep {
                    warn!("session: `{}` is in the diff but not in the changed-file list", path);
                }
                keep
            });
        }

        Ok(Self { bundle, index })
    }

    /// Tip commit of the pull request.
    pub fn commit_id(&self) -> &str {
        &self.bundle.meta.diff_refs.head_sha
    }

    /// New draft builder targeting this session's commit.
    pub fn draft(&self) -> ReviewDraftBuilder {
        ReviewDraftBuilder::new(self.commit_id())
    }
}

/// Run steps **1–2** for a single pull request.
///
/// # Logging
/// Emits `DEBUG` logs per sub-stage:
/// - `step1: meta/cache/fetch/cache-store`
/// - `step2: index built (files=N)`
pub async fn load_session(
    client: &GitHubClient,
    id: &ChangeRequestId,
    cache_dir: Option<&Path>,
) -> MrResult<ReviewSession> {
    // ---------------------------
    // Step 1: provider I/O + cache
    // ---------------------------
    let t0 = Instant::now();
    debug!("step1: fetch meta to obtain head_sha");
    let meta = client.get_pull(id).await?;
    let head_sha = meta.diff_refs.head_sha.clone();
    debug!("step1: meta ok, head_sha={}", head_sha);

    let cached = match cache_dir {
        Some(root) => cache::load_bundle(root, id, &head_sha).await?,
        None => None,
    };

    let bundle = if let Some(b) = cached {
        debug!(
            "step1: cache hit → files={} ({} ms)",
            b.changed_files.len(),
            t0.elapsed().as_millis()
        );
        b
    } else {
        debug!("step1: cache miss, proceed to fetch");

        let changed_files = client.list_changed_files(id).await?;
        debug!("step1: changed files fetched, count={}", changed_files.len());

        let raw_diff = client.get_diff(id).await?;
        match &raw_diff {
            Some(d) => debug!("step1: diff fetched, bytes={}", d.len()),
            None => debug!("step1: diff unavailable, falling back to per-file patches"),
        }

        let b = CrBundle {
            meta,
            changed_files,
            raw_diff,
        };
        if let Some(root) = cache_dir {
            cache::store_bundle(root, id, &head_sha, &b).await?;
        }
        debug!("step1: done in {} ms", t0.elapsed().as_millis());
        b
    };

    // ---------------------------
    // Step 2: position index
    // ---------------------------
    let t2 = Instant::now();
    let session = ReviewSession::from_parts(bundle)?;
    debug!(
        "step2: index built (files={}) in {} ms",
        session.index.len(),
        t2.elapsed().as_millis()
    );
    Ok(session)
}

// -----------------------------------------------------------------------------
// Convenience re-exports for downstream users
// -----------------------------------------------------------------------------

pub use config::ReviewerConfig;
pub use errors::Error as ReviewerError;
pub use publish::{PublishConfig, PublishMode, PublishOutcome, ReviewPublisher};
pub use review::{Comment, CommentInput, ReviewDraft, ReviewEvent, SubmissionIntent};
