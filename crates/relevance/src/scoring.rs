use crate::profile::FileProfile;
use crate::task::{ComplexityLevel, TaskAnalysis};
use context_complexity::ComplexityReport;
use context_graph::FileNode;
use context_protocol::Language;
use serde::{Deserialize, Serialize};

pub const RELEVANCE_WEIGHT: f64 = 0.4;
pub const COMPLEXITY_WEIGHT: f64 = 0.3;
pub const DEPENDENCY_WEIGHT: f64 = 0.2;
pub const RECENCY_WEIGHT: f64 = 0.1;

const PATH_MATCH_SCORE: f64 = 0.15;
const PATH_CAP: f64 = 0.4;
const CONTENT_PER_OCCURRENCE: f64 = 0.02;
const CONTENT_OCCURRENCE_CAP: u32 = 5;
const CONTENT_CAP: f64 = 0.3;
const LANGUAGE_BONUS: f64 = 0.15;
const FRAMEWORK_BONUS: f64 = 0.15;

/// `imports + 2 * imported_by` at which centrality saturates
const CENTRALITY_SATURATION: f64 = 20.0;

const RECENCY_SOURCE: f64 = 0.8;
const RECENCY_TEST: f64 = 0.5;
const RECENCY_OTHER: f64 = 0.2;

/// Per-request score of one file. Depends on the task, so never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileScore {
    pub path: String,
    /// `[0, 1]`
    pub relevance: f64,
    /// `[0, 1]`
    pub complexity_fit: f64,
    /// `[0, 1]`
    pub dependency_centrality: f64,
    /// `[0, 1]`
    pub recency: f64,
    pub total: f64,
    pub reasons: Vec<String>,
}

pub fn score_file(
    analysis: &TaskAnalysis,
    profile: &FileProfile,
    node: Option<&FileNode>,
    complexity: Option<&ComplexityReport>,
) -> FileScore {
    let mut reasons = Vec::new();
    let relevance = relevance_score(analysis, profile, &mut reasons);
    let complexity_fit = complexity_fit(analysis.complexity, complexity);
    let dependency_centrality = node.map_or(0.0, |node| {
        let weight = node.imports.len() + 2 * node.imported_by.len();
        if !node.imported_by.is_empty() {
            reasons.push(format!("imported by {} files", node.imported_by.len()));
        }
        (weight as f64 / CENTRALITY_SATURATION).min(1.0)
    });
    let recency = recency_bucket(profile);

    let total = RELEVANCE_WEIGHT * relevance
        + COMPLEXITY_WEIGHT * complexity_fit
        + DEPENDENCY_WEIGHT * dependency_centrality
        + RECENCY_WEIGHT * recency;

    FileScore {
        path: profile.path.clone(),
        relevance,
        complexity_fit,
        dependency_centrality,
        recency,
        total,
        reasons,
    }
}

/// Path, content, language and framework signals, each capped on its own
fn relevance_score(analysis: &TaskAnalysis, profile: &FileProfile, reasons: &mut Vec<String>) -> f64 {
    let path_hits: Vec<&str> = analysis
        .keywords
        .iter()
        .filter(|k| profile.path_matches(k))
        .map(String::as_str)
        .collect();
    let path = (path_hits.len() as f64 * PATH_MATCH_SCORE).min(PATH_CAP);
    if !path_hits.is_empty() {
        reasons.push(format!("path matches: {}", path_hits.join(", ")));
    }

    let mut mentioned = Vec::new();
    let mut occurrences = 0u32;
    for keyword in &analysis.keywords {
        let count = profile.occurrences(keyword).min(CONTENT_OCCURRENCE_CAP);
        if count > 0 {
            mentioned.push(keyword.as_str());
            occurrences += count;
        }
    }
    let content = (f64::from(occurrences) * CONTENT_PER_OCCURRENCE).min(CONTENT_CAP);
    if !mentioned.is_empty() {
        reasons.push(format!("content mentions: {}", mentioned.join(", ")));
    }

    let language = if analysis.has_language()
        && Language::from_name(&analysis.language) == profile.language
    {
        reasons.push(format!("{} file", analysis.language));
        LANGUAGE_BONUS
    } else {
        0.0
    };

    let framework = if analysis.has_framework() && profile.uses_framework(&analysis.framework) {
        reasons.push(format!("uses {}", analysis.framework));
        FRAMEWORK_BONUS
    } else {
        0.0
    };

    (path + content + language + framework).min(1.0)
}

/// High tasks favor complex files, low tasks simple ones, medium the middle.
/// Files without a report are neutral.
pub fn complexity_fit(level: ComplexityLevel, report: Option<&ComplexityReport>) -> f64 {
    let Some(report) = report else {
        return 0.5;
    };
    let normalized = ((report.file.average_complexity - 1.0) / 9.0).clamp(0.0, 1.0);
    match level {
        ComplexityLevel::High => normalized,
        ComplexityLevel::Low => 1.0 - normalized,
        ComplexityLevel::Medium => 1.0 - (normalized - 0.5).abs(),
    }
}

fn recency_bucket(profile: &FileProfile) -> f64 {
    if profile.is_test {
        RECENCY_TEST
    } else if profile.language.is_source() && !profile.is_config {
        RECENCY_SOURCE
    } else {
        RECENCY_OTHER
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_complexity::ComplexityScorer;
    use context_protocol::FileRecord;

    fn profile(path: &str, content: &str) -> FileProfile {
        FileProfile::from_record(&FileRecord::from_source(path, content))
    }

    #[test]
    fn each_relevance_signal_is_capped() {
        let analysis = TaskAnalysis::analyze(
            "auth login session token password user cache with typescript react",
        );
        let content = "auth login session token password user cache ".repeat(20);
        let mut profile = profile("auth/login/session/token/password/user.tsx", &content);
        profile.frameworks = vec!["react".to_string()];

        let score = score_file(&analysis, &profile, None, None);
        assert!(score.relevance <= 1.0);
        assert!((score.relevance - 1.0).abs() < 1e-9, "{score:?}");
        assert!(score.total <= 1.0);
    }

    #[test]
    fn unrelated_file_scores_zero_relevance() {
        let analysis = TaskAnalysis::analyze("fix authentication bug in login flow");
        let score = score_file(&analysis, &profile("ui/button.tsx", "<button/>"), None, None);
        assert_eq!(score.relevance, 0.0);
        assert!(score.reasons.is_empty());
        assert!((score.recency - RECENCY_SOURCE).abs() < 1e-9);
    }

    #[test]
    fn recency_buckets_follow_path_kind() {
        assert!((recency_bucket(&profile("src/a.ts", "")) - RECENCY_SOURCE).abs() < 1e-9);
        assert!((recency_bucket(&profile("tests/a.test.ts", "")) - RECENCY_TEST).abs() < 1e-9);
        assert!((recency_bucket(&profile("docs/readme.md", "")) - RECENCY_OTHER).abs() < 1e-9);
    }

    #[test]
    fn complexity_fit_matches_task_level() {
        let simple = ComplexityScorer::default()
            .score(&FileRecord::from_source("a.ts", "const a = 1;\n"))
            .unwrap();
        assert!(complexity_fit(ComplexityLevel::Low, Some(&simple)) > 0.9);
        assert!(complexity_fit(ComplexityLevel::High, Some(&simple)) < 0.1);
        assert!((complexity_fit(ComplexityLevel::Medium, None) - 0.5).abs() < 1e-9);
    }
}
