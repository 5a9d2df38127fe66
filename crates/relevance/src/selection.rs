use crate::error::{RelevanceError, Result};
use crate::profile::FileProfile;
use crate::scoring::{score_file, FileScore};
use crate::task::{TaskAnalysis, TaskDescriptor, TaskType};
use context_complexity::ComplexityReport;
use context_graph::DependencyGraph;
use context_protocol::FileRecord;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_MAX_TOKENS: usize = 8_000;
pub const DEFAULT_MAX_FILES: usize = 20;

/// Functions scoring above this are reported as hotspots
const HOTSPOT_THRESHOLD: f64 = 7.0;
const MAX_HOTSPOT_INSIGHTS: usize = 5;
const WEAK_RELEVANCE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub max_tokens: usize,
    pub max_files: usize,
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl ContextBudget {
    pub fn new(max_tokens: usize, max_files: usize) -> Self {
        Self {
            max_tokens,
            max_files,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(RelevanceError::InvalidBudget("max_tokens is 0".to_string()));
        }
        if self.max_files == 0 {
            return Err(RelevanceError::InvalidBudget("max_files is 0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InclusionMode {
    Full,
    Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedFile {
    pub path: String,
    pub mode: InclusionMode,
    /// Tokens charged against the budget for `content`
    pub token_estimate: usize,
    pub score: FileScore,
    /// Full source or the generated summary, per `mode`
    pub content: String,
}

impl SelectedFile {
    pub fn reasons(&self) -> &[String] {
        &self.score.reasons
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Framework,
    Hotspot,
    CircularDependency,
    Guidance,
    Diagnostic,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
}

impl Insight {
    pub fn new(kind: InsightKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A file whose analysis failed and was left out of the universe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub task: TaskAnalysis,
    pub total_candidates: usize,
    pub full_files: usize,
    pub summarized_files: usize,
    /// Candidates that fit neither in full nor as a summary
    pub skipped_files: usize,
    pub total_tokens: usize,
    pub max_tokens: usize,
    pub token_utilization_pct: f64,
    pub average_relevance: f64,
    pub completeness_pct: f64,
    pub failed_files: Vec<FailedFile>,
}

/// Ordered, budget-bounded selection handed to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectedContext {
    pub files: Vec<SelectedFile>,
    pub insights: Vec<Insight>,
    pub recommendations: Vec<String>,
    pub metadata: ContextMetadata,
    /// Set when assembly failed and this is the empty error-context
    pub degraded: bool,
}

impl SelectedContext {
    /// Empty selection carrying a single diagnostic
    pub fn degraded(reason: impl Into<String>, budget: ContextBudget) -> Self {
        let reason = reason.into();
        Self {
            files: Vec::new(),
            insights: vec![Insight::new(
                InsightKind::Diagnostic,
                format!("Context assembly failed: {reason}"),
            )],
            recommendations: Vec::new(),
            metadata: ContextMetadata {
                task: TaskAnalysis::analyze(""),
                total_candidates: 0,
                full_files: 0,
                summarized_files: 0,
                skipped_files: 0,
                total_tokens: 0,
                max_tokens: budget.max_tokens,
                token_utilization_pct: 0.0,
                average_relevance: 0.0,
                completeness_pct: 0.0,
                failed_files: Vec::new(),
            },
            degraded: true,
        }
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn total_tokens(&self) -> usize {
        self.files.iter().map(|f| f.token_estimate).sum()
    }
}

/// One file of the universe with its cached analyses
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub record: &'a FileRecord,
    pub profile: &'a FileProfile,
    pub complexity: Option<&'a ComplexityReport>,
}

impl<'a> Candidate<'a> {
    pub fn new(record: &'a FileRecord, profile: &'a FileProfile) -> Self {
        Self {
            record,
            profile,
            complexity: None,
        }
    }

    #[must_use]
    pub fn with_complexity(mut self, report: &'a ComplexityReport) -> Self {
        self.complexity = Some(report);
        self
    }

    fn path(&self) -> &str {
        &self.record.path
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Never fails: any error yields the degraded error-context
    pub fn select(
        &self,
        tasks: &[TaskDescriptor],
        candidates: &[Candidate<'_>],
        graph: &DependencyGraph,
        budget: ContextBudget,
    ) -> SelectedContext {
        match self.try_select(tasks, candidates, graph, budget) {
            Ok(context) => context,
            Err(e) => {
                log::warn!("Context selection degraded: {e}");
                SelectedContext::degraded(e.to_string(), budget)
            }
        }
    }

    pub fn try_select(
        &self,
        tasks: &[TaskDescriptor],
        candidates: &[Candidate<'_>],
        graph: &DependencyGraph,
        budget: ContextBudget,
    ) -> Result<SelectedContext> {
        budget.validate()?;
        let analysis = TaskAnalysis::from_tasks(tasks);
        let ranked = self.rank(&analysis, candidates, graph)?;

        let mut files: Vec<SelectedFile> = Vec::new();
        let mut chosen: Vec<&Candidate<'_>> = Vec::new();
        let mut used_tokens = 0usize;
        let mut skipped_files = 0usize;
        for (score, candidate) in ranked.iter() {
            if files.len() >= budget.max_files {
                break;
            }
            let profile = candidate.profile;
            let (mode, tokens, content) = if used_tokens + profile.token_estimate <= budget.max_tokens
            {
                (
                    InclusionMode::Full,
                    profile.token_estimate,
                    candidate.record.content.clone(),
                )
            } else if used_tokens + profile.summary_tokens <= budget.max_tokens {
                (
                    InclusionMode::Summary,
                    profile.summary_tokens,
                    profile.summary.clone(),
                )
            } else {
                skipped_files += 1;
                continue;
            };
            used_tokens += tokens;
            chosen.push(*candidate);
            files.push(SelectedFile {
                path: candidate.path().to_string(),
                mode,
                token_estimate: tokens,
                score: score.clone(),
                content,
            });
        }

        let insights = insights_for(&analysis, &chosen, graph);
        let recommendations = recommendations_for(&files, &insights, skipped_files);
        let metadata = metadata_for(
            analysis,
            &files,
            &ranked,
            budget,
            used_tokens,
            skipped_files,
        );

        log::debug!(
            "Selected {} of {} files ({} tokens of {})",
            files.len(),
            candidates.len(),
            used_tokens,
            budget.max_tokens
        );

        Ok(SelectedContext {
            files,
            insights,
            recommendations,
            metadata,
            degraded: false,
        })
    }

    /// Scores every candidate, best first, ties broken by path
    pub fn rank<'c, 'a>(
        &self,
        analysis: &TaskAnalysis,
        candidates: &'c [Candidate<'a>],
        graph: &DependencyGraph,
    ) -> Result<Vec<(FileScore, &'c Candidate<'a>)>> {
        let mut seen = HashSet::new();
        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if !seen.insert(candidate.path()) {
                return Err(RelevanceError::DuplicateCandidate(
                    candidate.path().to_string(),
                ));
            }
            let score = score_file(
                analysis,
                candidate.profile,
                graph.file(candidate.path()),
                candidate.complexity,
            );
            if !score.total.is_finite() {
                return Err(RelevanceError::NonFiniteScore { path: score.path });
            }
            ranked.push((score, candidate));
        }
        ranked.sort_by(|(a, _), (b, _)| compare_scores(a, b));
        Ok(ranked)
    }
}

fn compare_scores(a: &FileScore, b: &FileScore) -> Ordering {
    b.total
        .total_cmp(&a.total)
        .then_with(|| a.path.cmp(&b.path))
}

fn insights_for(
    analysis: &TaskAnalysis,
    selected: &[&Candidate<'_>],
    graph: &DependencyGraph,
) -> Vec<Insight> {
    let mut insights = Vec::new();

    let mut frameworks: BTreeMap<&str, usize> = BTreeMap::new();
    for candidate in selected {
        for framework in &candidate.profile.frameworks {
            *frameworks.entry(framework.as_str()).or_default() += 1;
        }
    }
    for (framework, count) in frameworks {
        insights.push(Insight::new(
            InsightKind::Framework,
            format!("{framework} used in {count} selected files"),
        ));
    }

    let mut hotspots: Vec<(f64, String)> = selected
        .iter()
        .filter_map(|c| c.complexity.map(|report| (c.path(), report)))
        .flat_map(|(path, report)| {
            report
                .hotspots(HOTSPOT_THRESHOLD)
                .into_iter()
                .map(move |f| (f.overall, format!("{path}::{}", f.name)))
        })
        .collect();
    hotspots.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    for (overall, symbol) in hotspots.into_iter().take(MAX_HOTSPOT_INSIGHTS) {
        insights.push(Insight::new(
            InsightKind::Hotspot,
            format!("Complexity hotspot: {symbol} (score {overall:.1})"),
        ));
    }

    let selected_paths: HashSet<&str> = selected.iter().map(|c| c.path()).collect();
    for cycle in graph.detect_cycles() {
        if !cycle.files.iter().any(|f| selected_paths.contains(f.as_str())) {
            continue;
        }
        let mut chain = cycle.files.clone();
        if let Some(first) = cycle.files.first() {
            chain.push(first.clone());
        }
        insights.push(Insight::new(
            InsightKind::CircularDependency,
            format!(
                "Circular dependency ({}): {}",
                format!("{:?}", cycle.severity).to_lowercase(),
                chain.join(" -> ")
            ),
        ));
    }

    insights.push(Insight::new(
        InsightKind::Guidance,
        guidance_for(analysis.task_type),
    ));
    insights
}

fn guidance_for(task_type: TaskType) -> &'static str {
    match task_type {
        TaskType::Feature => {
            "Follow the patterns of the closest existing module and wire the new code through its exports"
        }
        TaskType::Bugfix => {
            "Start from the files with the strongest keyword matches and trace their callers before changing behavior"
        }
        TaskType::Refactoring => {
            "Check the dependents of every file you touch; the highest-centrality files carry the widest blast radius"
        }
        TaskType::Testing => "Mirror the structure of the existing tests next to the code under test",
        TaskType::Documentation => "Keep examples in sync with the exported API of the selected files",
        TaskType::Performance => "Measure the hotspots before and after changing them",
        TaskType::Security => "Review input validation and authentication boundaries in the selected files",
        TaskType::General => "Review the highest-ranked files first",
    }
}

fn recommendations_for(
    files: &[SelectedFile],
    insights: &[Insight],
    skipped_files: usize,
) -> Vec<String> {
    let mut recommendations = Vec::new();
    if files.is_empty() {
        recommendations
            .push("No files were selected; name the modules or files involved in the task".to_string());
        return recommendations;
    }

    let summarized = files
        .iter()
        .filter(|f| f.mode == InclusionMode::Summary)
        .count();
    if summarized > 0 {
        recommendations.push(format!(
            "{summarized} files were included as summaries; raise max_tokens for full sources"
        ));
    }
    if skipped_files > 0 {
        recommendations.push(format!(
            "{skipped_files} files did not fit the token budget"
        ));
    }
    if insights
        .iter()
        .any(|i| i.kind == InsightKind::CircularDependency)
    {
        recommendations
            .push("Break the reported circular dependencies before extending those modules".to_string());
    }
    if insights.iter().any(|i| i.kind == InsightKind::Hotspot) {
        recommendations.push("Simplify the reported hotspots before adding behavior to them".to_string());
    }
    let average = files.iter().map(|f| f.score.relevance).sum::<f64>() / files.len() as f64;
    if average < WEAK_RELEVANCE {
        recommendations.push(
            "Selected files match the task weakly; add identifiers or paths to the task description"
                .to_string(),
        );
    }
    recommendations
}

fn metadata_for(
    task: TaskAnalysis,
    files: &[SelectedFile],
    ranked: &[(FileScore, &Candidate<'_>)],
    budget: ContextBudget,
    used_tokens: usize,
    skipped_files: usize,
) -> ContextMetadata {
    let full_files = files
        .iter()
        .filter(|f| f.mode == InclusionMode::Full)
        .count();
    let summarized_files = files.len() - full_files;

    let average_relevance = if files.is_empty() {
        0.0
    } else {
        files.iter().map(|f| f.score.relevance).sum::<f64>() / files.len() as f64
    };

    // Relevant candidates covered, summaries counting half
    let relevant = ranked.iter().filter(|(s, _)| s.relevance > 0.0).count();
    let expected = relevant.min(budget.max_files);
    let covered: f64 = files
        .iter()
        .filter(|f| f.score.relevance > 0.0)
        .map(|f| match f.mode {
            InclusionMode::Full => 1.0,
            InclusionMode::Summary => 0.5,
        })
        .sum();
    let completeness_pct = if expected == 0 {
        100.0
    } else {
        (covered / expected as f64 * 100.0).min(100.0)
    };

    ContextMetadata {
        task,
        total_candidates: ranked.len(),
        full_files,
        summarized_files,
        skipped_files,
        total_tokens: used_tokens,
        max_tokens: budget.max_tokens,
        token_utilization_pct: round1(used_tokens as f64 / budget.max_tokens as f64 * 100.0),
        average_relevance: round2(average_relevance),
        completeness_pct: round1(completeness_pct),
        failed_files: Vec::new(),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
