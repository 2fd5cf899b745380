//! Path validation: lexical normalization, symlink-aware canonicalization
//! and a containment check against the sandbox's allowed roots.
//!
//! Grounded on `vtcode-core/src/tools/file_ops.rs`'s
//! `normalize_and_validate_candidate`/`canonicalize_allow_missing` pair:
//! resolve the path lexically first (so a path that doesn't exist yet can
//! still be checked), then canonicalize whatever prefix of it does exist
//! on disk to catch a symlink that would otherwise walk the check outside
//! the sandbox.

use super::policy::SandboxPolicy;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathViolation {
    #[error("path '{0}' resolves outside the sandbox")]
    OutsideSandbox(String),
    #[error("failed to resolve path '{0}': {1}")]
    Unresolvable(String, String),
}

/// Lexically collapse `.`/`..` components without touching the
/// filesystem. A leading `..` past the root is simply dropped, matching
/// the teacher's `normalize_path`.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            Component::Prefix(prefix) => normalized.push(prefix.as_os_str()),
            Component::RootDir => normalized.push(component.as_os_str()),
            Component::Normal(part) => normalized.push(part),
        }
    }
    normalized
}

fn absolute_candidate(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Canonicalize as much of `normalized` as exists on disk, bounded by
/// walking up to the filesystem root at most once per missing ancestor so
/// a deeply nested, entirely-missing path can't loop.
async fn canonicalize_allow_missing(normalized: &Path) -> Result<PathBuf, PathViolation> {
    if tokio::fs::try_exists(normalized).await.unwrap_or(false) {
        return tokio::fs::canonicalize(normalized)
            .await
            .map_err(|e| PathViolation::Unresolvable(normalized.display().to_string(), e.to_string()));
    }

    let mut current = normalized.to_path_buf();
    while let Some(parent) = current.parent().map(Path::to_path_buf) {
        if tokio::fs::try_exists(&parent).await.unwrap_or(false) {
            let canonical_parent = tokio::fs::canonicalize(&parent)
                .await
                .map_err(|e| PathViolation::Unresolvable(parent.display().to_string(), e.to_string()))?;
            let remainder = normalized.strip_prefix(&parent).unwrap_or_else(|_| Path::new(""));
            return Ok(if remainder.as_os_str().is_empty() {
                canonical_parent
            } else {
                canonical_parent.join(remainder)
            });
        }
        current = parent;
    }
    Ok(normalized.to_path_buf())
}

/// Validate that `candidate` (absolute or relative to `policy.work_root`)
/// resolves under one of the sandbox's allowed roots, returning the
/// canonical path on success.
pub async fn validate_path(policy: &SandboxPolicy, candidate: &Path) -> Result<PathBuf, PathViolation> {
    let display = candidate.display().to_string();
    if candidate.as_os_str().is_empty() || display.trim().is_empty() {
        return Err(PathViolation::OutsideSandbox(display));
    }

    let absolute = absolute_candidate(&policy.work_root, candidate);
    let normalized = normalize_lexically(&absolute);

    let lexically_contained = policy
        .allowed_roots()
        .any(|root| normalized.starts_with(normalize_lexically(&root)));
    if !lexically_contained {
        return Err(PathViolation::OutsideSandbox(display));
    }

    let canonical = canonicalize_allow_missing(&normalized).await?;

    let mut canonical_roots = Vec::new();
    for root in policy.allowed_roots() {
        canonical_roots.push(canonicalize_allow_missing(&normalize_lexically(&root)).await?);
    }
    if !canonical_roots.iter().any(|root| canonical.starts_with(root)) {
        return Err(PathViolation::OutsideSandbox(display));
    }

    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn relative_path_inside_root_is_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy::builder(dir.path()).build();
        let resolved = validate_path(&policy, Path::new("notes.txt")).await.unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[tokio::test]
    async fn parent_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy::builder(dir.path()).build();
        let err = validate_path(&policy, Path::new("../../etc/passwd"))
            .await
            .unwrap_err();
        assert!(matches!(err, PathViolation::OutsideSandbox(_)));
    }

    #[tokio::test]
    async fn empty_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy::builder(dir.path()).build();
        let err = validate_path(&policy, Path::new("")).await.unwrap_err();
        assert!(matches!(err, PathViolation::OutsideSandbox(_)));
    }

    #[tokio::test]
    async fn whitespace_only_path_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy::builder(dir.path()).build();
        let err = validate_path(&policy, Path::new("   ")).await.unwrap_err();
        assert!(matches!(err, PathViolation::OutsideSandbox(_)));
    }

    #[tokio::test]
    async fn symlink_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let link = dir.path().join("escape");
        #[cfg(unix)]
        std::os::unix::fs::symlink(outside.path(), &link).unwrap();
        #[cfg(unix)]
        {
            let policy = SandboxPolicy::builder(dir.path()).build();
            let err = validate_path(&policy, Path::new("escape/file.txt"))
                .await
                .unwrap_err();
            assert!(matches!(err, PathViolation::OutsideSandbox(_)));
        }
    }

    #[tokio::test]
    async fn allow_listed_extra_root_is_permitted() {
        let dir = tempfile::tempdir().unwrap();
        let extra = tempfile::tempdir().unwrap();
        let policy = SandboxPolicy::builder(dir.path()).allow(extra.path()).build();
        let candidate = extra.path().join("shared.txt");
        let resolved = validate_path(&policy, &candidate).await.unwrap();
        assert!(resolved.starts_with(extra.path().canonicalize().unwrap()));
    }
}
