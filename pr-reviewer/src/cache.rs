//! File-based cache for pull request bundles (JSON on disk).
//!
//! A bundle (metadata, changed files, raw diff) is fully determined by the
//! pull request and its head commit, so re-running on the same `head_sha`
//! can skip every diff download.
//!
//! Key: SHA256("{owner/repo}:{number}:{head_sha}")
//! Layout: <root>/github/<project_sanitized>/<number>-<hash12>.json

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::debug;

use crate::errors::MrResult;
use crate::git_providers::ChangeRequestId;
use crate::git_providers::types::CrBundle;

/// Filesystem-safe replacement for project path (slashes → underscores).
fn sanitize(s: &str) -> String {
    s.replace(['/', '\\', ':'], "_")
}

/// Deterministic cache path for the bundle.
pub fn key_path(root: &Path, id: &ChangeRequestId, head_sha: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", id.project, id.number, head_sha));
    let digest = format!("{:x}", hasher.finalize());
    root.join("github")
        .join(sanitize(&id.project))
        .join(format!("{}-{}.json", id.number, &digest[..12]))
}

/// Loads a bundle if one was stored for this head commit.
pub async fn load_bundle(
    root: &Path,
    id: &ChangeRequestId,
    head_sha: &str,
) -> MrResult<Option<CrBundle>> {
    let path = key_path(root, id, head_sha);
    if !fs::try_exists(&path).await? {
        return Ok(None);
    }
    let data = fs::read(&path).await?;
    let bundle: CrBundle = serde_json::from_slice(&data)?;
    debug!("cache: hit {}", path.display());
    Ok(Some(bundle))
}

/// Writes the bundle; the file is replaced atomically.
pub async fn store_bundle(
    root: &Path,
    id: &ChangeRequestId,
    head_sha: &str,
    bundle: &CrBundle,
) -> MrResult<PathBuf> {
    let path = key_path(root, id, head_sha);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(bundle)?).await?;
    fs::rename(&tmp, &path).await?;
    debug!("cache: stored {}", path.display());
    Ok(path)
}
