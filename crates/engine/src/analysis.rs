use crate::error::{EngineError, Result};
use context_cache::{derive_key, AnalysisKind, AnalysisPayload, CacheManager};
use context_complexity::{ComplexityReport, ComplexityScorer};
use context_graph::{DependencyMapper, FileDependencies};
use context_protocol::{FileRecord, RepoState};
use context_relevance::{FailedFile, FileProfile};
use std::path::Path;
use std::sync::Arc;

/// The three cached analyses of one file
#[derive(Debug, Clone)]
pub struct FileAnalysis {
    pub record: FileRecord,
    pub dependencies: FileDependencies,
    pub complexity: ComplexityReport,
    pub profile: FileProfile,
    /// Analyses served from the cache rather than computed
    pub cache_hits: usize,
}

pub async fn resolve_repo_state(root: Option<&Path>) -> RepoState {
    match root {
        Some(root) => context_cache::probe_repo_state(root).await,
        None => RepoState::unknown(),
    }
}

pub fn compute_payload(record: &FileRecord, kind: AnalysisKind) -> Result<AnalysisPayload> {
    Ok(match kind {
        AnalysisKind::Dependencies => {
            AnalysisPayload::Dependencies(DependencyMapper::new().extract(record)?)
        }
        AnalysisKind::Complexity => {
            AnalysisPayload::Complexity(ComplexityScorer::default().score(record)?)
        }
        AnalysisKind::Relevance => AnalysisPayload::Relevance(FileProfile::from_record(record)),
    })
}

/// Every analysis of `record`, each through `get_or_compute`
pub async fn analyze_file(
    cache: &CacheManager,
    repo: &RepoState,
    record: FileRecord,
) -> Result<FileAnalysis> {
    record.validate()?;
    let key = derive_key(&record, repo);

    let mut cache_hits = 0;
    let mut payloads = Vec::with_capacity(AnalysisKind::ALL.len());
    for kind in AnalysisKind::ALL {
        let source = &record;
        let lookup = cache
            .get_or_compute(&key, kind, move || async move { compute_payload(source, kind) })
            .await?;
        if lookup.from_cache {
            cache_hits += 1;
        }
        payloads.push(lookup.payload);
    }

    let mut dependencies = None;
    let mut complexity = None;
    let mut profile = None;
    for payload in payloads {
        match payload {
            AnalysisPayload::Dependencies(deps) => dependencies = Some(deps),
            AnalysisPayload::Complexity(report) => complexity = Some(report),
            AnalysisPayload::Relevance(p) => profile = Some(p),
        }
    }

    match (dependencies, complexity, profile) {
        (Some(dependencies), Some(complexity), Some(profile)) => Ok(FileAnalysis {
            record,
            dependencies,
            complexity,
            profile,
            cache_hits,
        }),
        _ => Err(EngineError::IncompleteAnalysis(record.path)),
    }
}

/// Analyzes `records` in chunks of `concurrency` spawned tasks. A failed file
/// is reported and left out; it never fails the others.
pub async fn analyze_all(
    cache: &Arc<CacheManager>,
    repo: &RepoState,
    records: Vec<FileRecord>,
    concurrency: usize,
) -> (Vec<FileAnalysis>, Vec<FailedFile>) {
    let mut analyses = Vec::with_capacity(records.len());
    let mut failed = Vec::new();
    let mut pending = records.into_iter().peekable();

    while pending.peek().is_some() {
        let tasks: Vec<_> = pending
            .by_ref()
            .take(concurrency.max(1))
            .map(|record| {
                let path = record.path.clone();
                let cache = Arc::clone(cache);
                let repo = repo.clone();
                let task =
                    tokio::spawn(async move { analyze_file(&cache, &repo, record).await });
                (path, task)
            })
            .collect();

        for (path, task) in tasks {
            let outcome = task.await.map_err(|e| EngineError::Join {
                path: path.clone(),
                reason: e.to_string(),
            });
            match outcome.and_then(|result| result) {
                Ok(analysis) => analyses.push(analysis),
                Err(err) => {
                    log::warn!("Excluding {path} from context: {err}");
                    failed.push(FailedFile {
                        path,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    (analyses, failed)
}
