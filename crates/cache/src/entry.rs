use context_complexity::ComplexityReport;
use context_graph::FileDependencies;
use context_relevance::FileProfile;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which analyzer produced a payload. Part of the storage id, so the three
/// analyses of one file live side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Dependencies,
    Complexity,
    Relevance,
}

impl AnalysisKind {
    pub const ALL: [AnalysisKind; 3] = [
        AnalysisKind::Dependencies,
        AnalysisKind::Complexity,
        AnalysisKind::Relevance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AnalysisKind::Dependencies => "deps",
            AnalysisKind::Complexity => "complexity",
            AnalysisKind::Relevance => "relevance",
        }
    }
}

/// Cached analysis result, one variant per analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AnalysisPayload {
    Dependencies(FileDependencies),
    Complexity(ComplexityReport),
    Relevance(FileProfile),
}

impl AnalysisPayload {
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisPayload::Dependencies(_) => AnalysisKind::Dependencies,
            AnalysisPayload::Complexity(_) => AnalysisKind::Complexity,
            AnalysisPayload::Relevance(_) => AnalysisKind::Relevance,
        }
    }

    pub fn into_dependencies(self) -> Option<FileDependencies> {
        match self {
            AnalysisPayload::Dependencies(deps) => Some(deps),
            _ => None,
        }
    }

    pub fn into_complexity(self) -> Option<ComplexityReport> {
        match self {
            AnalysisPayload::Complexity(report) => Some(report),
            _ => None,
        }
    }

    pub fn into_relevance(self) -> Option<FileProfile> {
        match self {
            AnalysisPayload::Relevance(profile) => Some(profile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryOrigin {
    /// Computed on the request path
    Request,
    /// Warmed during idle time, short-lived
    Preemptive,
}

/// On-disk / in-memory envelope. Never mutated: a rewrite replaces it whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub kind: AnalysisKind,
    pub version: u32,
    pub created_unix_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_unix_ms: Option<u64>,
    pub origin: EntryOrigin,
    pub payload: AnalysisPayload,
}

impl CacheEntry {
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.created_unix_ms)
    }

    /// Valid iff younger than `max_age`, not past its own expiry and written by
    /// the current format version
    pub fn is_valid(&self, now_ms: u64, max_age: Duration, current_version: u32) -> bool {
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        self.version == current_version
            && self.age_ms(now_ms) < max_age_ms
            && self.expires_unix_ms.map_or(true, |expires| now_ms < expires)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_graph::FileDependencies;
    use context_protocol::Language;

    fn entry(created: u64, expires: Option<u64>, version: u32) -> CacheEntry {
        CacheEntry {
            key: "typescript/main-abc/0000-h".to_string(),
            kind: AnalysisKind::Dependencies,
            version,
            created_unix_ms: created,
            expires_unix_ms: expires,
            origin: EntryOrigin::Request,
            payload: AnalysisPayload::Dependencies(FileDependencies {
                path: "a.ts".to_string(),
                language: Language::TypeScript,
                imports: Vec::new(),
                exports: Vec::new(),
                defined_functions: Vec::new(),
                calls: Vec::new(),
                inheritance: Vec::new(),
            }),
        }
    }

    #[test]
    fn validity_requires_age_expiry_and_version() {
        let max_age = Duration::from_secs(10);
        assert!(entry(1_000, None, 1).is_valid(5_000, max_age, 1));
        assert!(!entry(1_000, None, 1).is_valid(11_000, max_age, 1));
        assert!(!entry(1_000, None, 2).is_valid(5_000, max_age, 1));
        assert!(!entry(1_000, Some(3_000), 1).is_valid(5_000, max_age, 1));
        assert!(entry(1_000, Some(9_000), 1).is_valid(5_000, max_age, 1));
    }

    #[test]
    fn payload_accessors_match_kind() {
        let payload = entry(0, None, 1).payload;
        assert_eq!(payload.kind(), AnalysisKind::Dependencies);
        assert!(payload.clone().into_complexity().is_none());
        assert!(payload.into_dependencies().is_some());
    }
}
