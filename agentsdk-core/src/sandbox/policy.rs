//! Sandbox policy: the workspace root, any additional allowed roots, and
//! whether shell metacharacters are permitted in command arguments.

use parking_lot::RwLock;
use std::path::PathBuf;

#[derive(Debug)]
pub struct SandboxPolicy {
    pub work_root: PathBuf,
    allow_list: RwLock<Vec<PathBuf>>,
    pub allow_shell_metacharacters: bool,
}

impl Clone for SandboxPolicy {
    fn clone(&self) -> Self {
        Self {
            work_root: self.work_root.clone(),
            allow_list: RwLock::new(self.allow_list.read().clone()),
            allow_shell_metacharacters: self.allow_shell_metacharacters,
        }
    }
}

impl SandboxPolicy {
    pub fn builder(work_root: impl Into<PathBuf>) -> SandboxPolicyBuilder {
        SandboxPolicyBuilder {
            work_root: work_root.into(),
            allow_list: Vec::new(),
            allow_shell_metacharacters: false,
        }
    }

    /// Every root a path is allowed to resolve under: the workspace root
    /// plus any additionally allow-listed directories.
    pub fn allowed_roots(&self) -> impl Iterator<Item = PathBuf> {
        std::iter::once(self.work_root.clone()).chain(self.allow_list.read().clone().into_iter())
    }

    /// Add an additional absolute prefix to the allow-list at runtime.
    /// Duplicate and empty inputs are silently ignored; thread-safe
    /// against concurrent `validate_path` calls (§4.2).
    pub fn allow(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        if path.as_os_str().is_empty() {
            return;
        }
        let mut allow_list = self.allow_list.write();
        if !allow_list.contains(&path) {
            allow_list.push(path);
        }
    }
}

/// Builder mirroring the teacher's settings-driven policy construction:
/// a policy always starts from a mandatory workspace root and is refined
/// with optional extras (spec.md §2.2 "supplemented feature").
pub struct SandboxPolicyBuilder {
    work_root: PathBuf,
    allow_list: Vec<PathBuf>,
    allow_shell_metacharacters: bool,
}

impl SandboxPolicyBuilder {
    pub fn allow(mut self, path: impl Into<PathBuf>) -> Self {
        self.allow_list.push(path.into());
        self
    }

    pub fn allow_shell_metacharacters(mut self, allow: bool) -> Self {
        self.allow_shell_metacharacters = allow;
        self
    }

    pub fn build(self) -> SandboxPolicy {
        SandboxPolicy {
            work_root: self.work_root,
            allow_list: RwLock::new(self.allow_list),
            allow_shell_metacharacters: self.allow_shell_metacharacters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_adds_a_new_root() {
        let policy = SandboxPolicy::builder("/work").build();
        policy.allow("/extra");
        assert_eq!(policy.allowed_roots().count(), 2);
    }

    #[test]
    fn allow_ignores_duplicates_and_empty_input() {
        let policy = SandboxPolicy::builder("/work").build();
        policy.allow("/extra");
        policy.allow("/extra");
        policy.allow("");
        assert_eq!(policy.allowed_roots().count(), 2);
    }

    #[test]
    fn allow_is_visible_from_concurrent_validations() {
        use std::sync::Arc;
        use std::thread;

        let policy = Arc::new(SandboxPolicy::builder("/work").build());
        let mut handles = Vec::new();
        for i in 0..8 {
            let policy = policy.clone();
            handles.push(thread::spawn(move || {
                policy.allow(format!("/extra-{i}"));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(policy.allowed_roots().count(), 9);
    }
}
