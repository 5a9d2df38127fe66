use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const UNKNOWN_REF: &str = "unknown";

const BRANCH_HASH_BYTES: usize = 4;

/// Branch / commit pair of the repository head, as reported by git
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoState {
    pub branch: String,
    pub commit: String,
}

impl RepoState {
    pub fn new(branch: impl Into<String>, commit: impl Into<String>) -> Self {
        let branch = branch.into();
        let commit = commit.into();
        Self {
            branch: non_empty_or_unknown(branch),
            commit: non_empty_or_unknown(commit),
        }
    }

    pub fn unknown() -> Self {
        Self {
            branch: UNKNOWN_REF.to_string(),
            commit: UNKNOWN_REF.to_string(),
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.branch == UNKNOWN_REF && self.commit == UNKNOWN_REF
    }

    /// `<branch>-<commit>` with every character that is not safe inside a single
    /// path segment replaced by `_`. A branch that needed rewriting also gets a
    /// short hash of its raw name, so `feature/login` and `feature_login` stay
    /// apart (`feature_login_1a2b3c4d`).
    pub fn storage_segment(&self) -> String {
        format!(
            "{}-{}",
            branch_segment(&self.branch),
            sanitize_segment(&self.commit)
        )
    }
}

impl Default for RepoState {
    fn default() -> Self {
        Self::unknown()
    }
}

fn non_empty_or_unknown(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNKNOWN_REF.to_string()
    } else {
        trimmed.to_string()
    }
}

fn branch_segment(branch: &str) -> String {
    let safe = sanitize_segment(branch);
    if safe == branch {
        return safe;
    }
    let digest = Sha256::digest(branch.as_bytes());
    let suffix: String = digest
        .iter()
        .take(BRANCH_HASH_BYTES)
        .map(|b| format!("{b:02x}"))
        .collect();
    format!("{safe}_{suffix}")
}

pub fn sanitize_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_refs_fall_back_to_unknown() {
        let state = RepoState::new("  ", "");
        assert!(state.is_unknown());
        assert_eq!(state.storage_segment(), "unknown-unknown");
    }

    #[test]
    fn storage_segment_is_a_single_path_segment() {
        let segment = RepoState::new("feature/login-v2", "abc123").storage_segment();
        assert!(segment.starts_with("feature_login_v2_"));
        assert!(segment.ends_with("-abc123"));
        assert!(!segment.contains('/'));
        assert_eq!(segment.matches('-').count(), 1);
    }

    #[test]
    fn safe_branch_names_are_kept_verbatim() {
        assert_eq!(
            RepoState::new("main", "abc123").storage_segment(),
            "main-abc123"
        );
    }

    #[test]
    fn rewritten_branches_do_not_collide() {
        let commit = "abc123";
        let segments: Vec<String> = ["feature/login", "feature_login", "feature-login"]
            .into_iter()
            .map(|branch| RepoState::new(branch, commit).storage_segment())
            .collect();
        assert_ne!(segments[0], segments[1]);
        assert_ne!(segments[0], segments[2]);
        assert_ne!(segments[1], segments[2]);
        assert_eq!(segments[1], "feature_login-abc123");
    }
}
