use context_protocol::{sanitize_segment, FileRecord, RepoState};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const PATH_HASH_LEN: usize = 16;

/// Content- and head-addressed identity of one file's analyses.
///
/// Renders as `{language}/{branch}-{commit}/{pathHash}-{contentHash}`: always
/// three path segments, so the storage location is a pure function of the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub language: String,
    pub branch: String,
    pub commit: String,
    pub path_hash: String,
    pub content_hash: String,
}

impl CacheKey {
    pub fn derive(record: &FileRecord, repo: &RepoState) -> Self {
        Self {
            language: record.language.as_str().to_string(),
            branch: repo.branch.clone(),
            commit: repo.commit.clone(),
            path_hash: path_hash(&record.path),
            content_hash: sanitize_segment(&record.content_hash),
        }
    }

    /// `{branch}-{commit}`, sanitized
    pub fn repo_segment(&self) -> String {
        RepoState::new(self.branch.as_str(), self.commit.as_str()).storage_segment()
    }

    /// Storage id of one analysis kind for this key
    pub(crate) fn storage_id(&self, kind_suffix: &str) -> String {
        format!("{self}.{kind_suffix}")
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}-{}",
            sanitize_segment(&self.language),
            self.repo_segment(),
            self.path_hash,
            self.content_hash
        )
    }
}

/// Pure function of (record, head state)
pub fn derive_key(record: &FileRecord, repo: &RepoState) -> CacheKey {
    CacheKey::derive(record, repo)
}

/// First 16 hex chars of SHA-256 over the repo-relative path
pub fn path_hash(path: &str) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let mut out = String::with_capacity(PATH_HASH_LEN);
    for b in digest.iter().take(PATH_HASH_LEN / 2) {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Storage id split back into (language, repo segment, file name)
pub(crate) fn split_storage_id(id: &str) -> Option<(&str, &str, &str)> {
    let mut parts = id.splitn(3, '/');
    Some((parts.next()?, parts.next()?, parts.next()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(path: &str, hash: &str) -> FileRecord {
        let mut record = FileRecord::from_source(path, "export const a = 1;\n");
        record.content_hash = hash.to_string();
        record
    }

    #[test]
    fn key_layout_matches_storage_contract() {
        let key = derive_key(&record("a.ts", "h1"), &RepoState::new("main", "abc123"));
        assert_eq!(
            key.to_string(),
            format!("typescript/main-abc123/{}-h1", path_hash("a.ts"))
        );
        assert_eq!(path_hash("a.ts").len(), 16);
    }

    #[test]
    fn key_is_deterministic_and_sensitive_to_every_input() {
        let repo = RepoState::new("main", "abc123");
        let base = derive_key(&record("a.ts", "h1"), &repo);
        assert_eq!(base, derive_key(&record("a.ts", "h1"), &repo));

        assert_ne!(base, derive_key(&record("a.ts", "h2"), &repo));
        assert_ne!(base, derive_key(&record("b.ts", "h1"), &repo));
        assert_ne!(
            base,
            derive_key(&record("a.ts", "h1"), &RepoState::new("dev", "abc123"))
        );
        assert_ne!(
            base,
            derive_key(&record("a.ts", "h1"), &RepoState::new("main", "def456"))
        );
    }

    #[test]
    fn branch_with_slashes_stays_one_segment() {
        let key = derive_key(
            &record("src/a.py", "h"),
            &RepoState::new("feature/login", "abc"),
        );
        let rendered = key.to_string();
        assert_eq!(rendered.split('/').count(), 3);
        assert!(rendered.starts_with("python/feature_login_"));
        assert!(rendered.contains("-abc/"));
    }

    #[test]
    fn branches_differing_only_in_punctuation_get_separate_keys() {
        let a = record("src/a.py", "h");
        let slash = derive_key(&a, &RepoState::new("feature/login", "abc"));
        let underscore = derive_key(&a, &RepoState::new("feature_login", "abc"));
        assert_ne!(slash.to_string(), underscore.to_string());
        assert_ne!(slash.repo_segment(), underscore.repo_segment());
    }

    #[test]
    fn unknown_head_uses_fallback_literals() {
        let key = derive_key(&record("a.rs", "h"), &RepoState::unknown());
        assert!(key.to_string().starts_with("rust/unknown-unknown/"));
    }
}
