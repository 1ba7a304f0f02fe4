//! Path confinement: filesystem sandboxing to the session's working directory.
//!
//! Every path argument is resolved against the working directory and must stay
//! inside it. Unsafe paths are refused, never rewritten.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use crate::audit::{AuditEvent, AuditLogger};

/// Error returned when path validation fails.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside working directory '{root}'")]
    OutsideWorkingDirectory { path: String, root: String },

    #[error("Path '{path}' resolves through a symlink outside working directory '{root}'")]
    SymlinkEscape { path: String, root: String },

    #[error("Failed to canonicalize path '{path}': {reason}")]
    CanonicalizeFailed { path: String, reason: String },
}

/// The confinement boundary for one tool executor.
///
/// The root is fixed at construction; there is no way to move it afterwards.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
    audit: Option<Arc<AuditLogger>>,
}

impl WorkspaceGuard {
    /// Create a guard rooted at `root`.
    ///
    /// A relative root is anchored at the process's current directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = normalize(&std::path::absolute(&root).unwrap_or(root));
        let canonical_root = root.canonicalize().ok();
        Self {
            root,
            canonical_root,
            audit: None,
        }
    }

    /// Also record blocked accesses in an audit log.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// The audit log refusals are written to, if any.
    pub fn audit(&self) -> Option<&Arc<AuditLogger>> {
        self.audit.as_ref()
    }

    /// The working directory this guard confines to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `path` onto the working directory (absolute paths replace it) and
    /// fold `.` and `..` lexically.
    pub fn join(&self, path: &str) -> PathBuf {
        normalize(&self.root.join(path))
    }

    /// The path relative to the working directory, or `None` when the relative
    /// form would start with `..` or stay absolute.
    pub fn relative(&self, path: &str) -> Option<PathBuf> {
        let joined = self.join(path);
        let rel = joined.strip_prefix(&self.root).ok()?;
        if rel.is_absolute() || matches!(rel.components().next(), Some(Component::ParentDir)) {
            return None;
        }
        Some(rel.to_path_buf())
    }

    /// Lexical confinement check.
    pub fn is_path_safe(&self, path: &str) -> bool {
        self.relative(path).is_some()
    }

    /// Validate `path` for a tool and return its absolute form.
    ///
    /// Besides the lexical check, the nearest existing ancestor is canonicalized
    /// so a symlink inside the working directory cannot point outside it.
    /// Refusals are logged and audited on behalf of `actor`.
    pub fn resolve(&self, actor: &str, path: &str) -> Result<PathBuf, PathValidationError> {
        let resolved = self.join(path);

        if self.relative(path).is_none() {
            return Err(self.deny(actor, path, PathValidationError::OutsideWorkingDirectory {
                path: path.into(),
                root: self.root.display().to_string(),
            }));
        }

        if let Some(canonical_root) = &self.canonical_root
            && let Some(existing) = nearest_existing(&resolved)
        {
            let canonical = existing
                .canonicalize()
                .map_err(|e| PathValidationError::CanonicalizeFailed {
                    path: path.into(),
                    reason: e.to_string(),
                })?;
            if !canonical.starts_with(canonical_root) {
                return Err(self.deny(actor, path, PathValidationError::SymlinkEscape {
                    path: path.into(),
                    root: self.root.display().to_string(),
                }));
            }
        }

        Ok(resolved)
    }

    fn deny(&self, actor: &str, path: &str, err: PathValidationError) -> PathValidationError {
        warn!(
            tool = %actor,
            path = %path,
            working_dir = %self.root.display(),
            "Blocked access outside working directory"
        );
        if let Some(audit) = &self.audit {
            audit.log(
                AuditEvent::PathDenied { path: path.into() },
                actor,
                Some(err.to_string()),
            );
        }
        err
    }
}

/// Fold `.` and `..` without touching the filesystem.
///
/// `..` never climbs above a root or prefix; on a relative path it is kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                Some(Component::ParentDir) | Some(Component::CurDir) | None => {
                    out.push("..");
                }
            },
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

fn nearest_existing(path: &Path) -> Option<&Path> {
    path.ancestors().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> WorkspaceGuard {
        WorkspaceGuard::new("/home/user/project")
    }

    #[test]
    fn relative_paths_inside_are_safe() {
        let g = guard();
        assert!(g.is_path_safe("src/main.rs"));
        assert!(g.is_path_safe("./README.md"));
        assert!(g.is_path_safe("src/../Cargo.toml"));
        assert!(g.is_path_safe("."));
    }

    #[test]
    fn parent_traversal_is_unsafe() {
        let g = guard();
        assert!(!g.is_path_safe("../../etc/passwd"));
        assert!(!g.is_path_safe(".."));
        assert!(!g.is_path_safe("src/../../other"));
    }

    #[test]
    fn absolute_paths_checked_against_root() {
        let g = guard();
        assert!(g.is_path_safe("/home/user/project/src/lib.rs"));
        assert!(!g.is_path_safe("/etc/passwd"));
        // Sibling with a shared string prefix is still outside
        assert!(!g.is_path_safe("/home/user/project2/secret"));
    }

    #[test]
    fn relative_form_is_reported() {
        let g = guard();
        assert_eq!(g.relative("a/./b/../c"), Some(PathBuf::from("a/c")));
        assert_eq!(g.relative("/home/user/project"), Some(PathBuf::new()));
        assert_eq!(g.relative("../x"), None);
    }

    #[test]
    fn resolve_reports_outside_working_directory() {
        let audit = Arc::new(AuditLogger::new());
        let g = guard().with_audit(audit.clone());
        let err = g.resolve("Read", "../../etc/passwd").unwrap_err();
        assert!(err.to_string().contains("outside working directory"));
        assert_eq!(audit.count(), 1);
        assert_eq!(audit.entries()[0].actor, "Read");
    }

    #[test]
    fn resolve_returns_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let g = WorkspaceGuard::new(dir.path());
        let resolved = g.resolve("Write", "new/file.txt").unwrap();
        assert!(resolved.is_absolute());
        assert!(resolved.ends_with("new/file.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escape_is_blocked() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "top secret").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();

        let g = WorkspaceGuard::new(dir.path());
        assert!(g.is_path_safe("link/secret.txt"));
        let err = g.resolve("Read", "link/secret.txt").unwrap_err();
        assert!(matches!(err, PathValidationError::SymlinkEscape { .. }));
    }

    #[test]
    fn relative_root_is_anchored_at_current_dir() {
        let g = WorkspaceGuard::new(".");
        assert!(g.root().is_absolute());
        assert!(g.is_path_safe("src/lib.rs"));
        assert!(!g.is_path_safe("../../etc/passwd"));
        assert!(!g.is_path_safe("/etc/passwd"));
        assert!(g.resolve("Read", "/etc/passwd").is_err());
        assert!(g.resolve("Read", "../outside.txt").is_err());

        let parent = WorkspaceGuard::new("..");
        assert!(parent.root().is_absolute());
        assert!(!parent.is_path_safe("../x"));
    }

    #[test]
    fn normalize_keeps_leading_parent_on_relative() {
        assert_eq!(normalize(Path::new("../a/./b")), PathBuf::from("../a/b"));
        assert_eq!(normalize(Path::new("/../etc")), PathBuf::from("/etc"));
    }
}
