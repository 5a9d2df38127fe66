use crate::analysis::{analyze_all, resolve_repo_state, FileAnalysis};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::preemptive::EngineSourceAnalyzer;
use crate::source::SourceProvider;
use context_cache::{CacheManager, CacheStats};
use context_graph::{DependencyGraph, DependencyMapper};
use context_invalidation::{
    ContextId, ContextInvalidated, ContextRegistry, ContextTicket, GraphHandle,
    InvalidationDeps, InvalidationHandle, InvalidationMetrics, RegistryEpoch,
};
use context_protocol::{ChangeEvent, FileRecord};
use context_relevance::{
    Candidate, ContextBudget, ContextBuilder, FailedFile, Insight, InsightKind, SelectedContext,
    TaskDescriptor,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A selection plus the ticket that tracks its freshness
#[derive(Debug, Clone, Serialize)]
pub struct BuiltContext {
    /// `None` for a degraded context, which is never registered
    pub ticket: Option<ContextTicket>,
    pub context: SelectedContext,
    /// Per-file analyses served from the cache
    pub cache_hits: usize,
}

impl BuiltContext {
    pub fn context_id(&self) -> Option<ContextId> {
        self.ticket.map(|t| t.id)
    }
}

/// Request pipeline over the five components.
///
/// `build_context` runs the cached per-file analyses, rebuilds the dependency
/// graph, selects within the budget and registers the result; change events
/// flow through the invalidation loop and make registered contexts stale.
pub struct ContextEngine {
    config: EngineConfig,
    cache: Arc<CacheManager>,
    registry: ContextRegistry,
    graph: GraphHandle,
    invalidation: InvalidationHandle,
    source: Option<Arc<dyn SourceProvider>>,
    builder: ContextBuilder,
}

impl ContextEngine {
    /// Must be called inside a tokio runtime
    pub fn new(config: EngineConfig) -> Self {
        Self::start(config, None)
    }

    pub fn with_source(config: EngineConfig, source: Arc<dyn SourceProvider>) -> Self {
        Self::start(config, Some(source))
    }

    fn start(config: EngineConfig, source: Option<Arc<dyn SourceProvider>>) -> Self {
        let cache = Arc::new(CacheManager::new(config.cache_config()));
        let registry = ContextRegistry::new();
        let graph = GraphHandle::new();

        let mut deps = InvalidationDeps::new(Arc::clone(&cache), registry.clone())
            .with_graph(graph.clone());
        if let Some(source) = &source {
            if config.invalidation.preemptive_analysis {
                deps = deps.with_analyzer(Arc::new(EngineSourceAnalyzer::new(
                    Arc::clone(&cache),
                    Arc::clone(source),
                    config.repo_root.clone(),
                )));
            }
        }
        let invalidation = InvalidationHandle::start(config.invalidation_config(), deps);
        log::info!(
            "Context engine started ({:?} cache, smart invalidation {})",
            config.cache.backend,
            config.invalidation.smart_invalidation
        );

        Self {
            config,
            cache,
            registry,
            graph,
            invalidation,
            source,
            builder: ContextBuilder::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn default_budget(&self) -> ContextBudget {
        self.config.budget()
    }

    /// Never fails: unanalyzable files are reported in
    /// `metadata.failed_files`, assembly errors yield a degraded context.
    ///
    /// Changes processed while the context is being built leave its ticket
    /// stale from the start.
    pub async fn build_context(
        &self,
        tasks: &[TaskDescriptor],
        records: Vec<FileRecord>,
        budget: ContextBudget,
    ) -> BuiltContext {
        let since = self.registry.epoch();
        self.assemble(tasks, records, Vec::new(), budget, since).await
    }

    /// Loads `paths` through the source provider, then as
    /// [`build_context`](Self::build_context).
    pub async fn build_context_for_paths(
        &self,
        tasks: &[TaskDescriptor],
        paths: &[String],
        budget: ContextBudget,
    ) -> Result<BuiltContext> {
        let source = self.source.clone().ok_or(EngineError::NoSource)?;
        let since = self.registry.epoch();

        let mut records = Vec::with_capacity(paths.len());
        let mut failed = Vec::new();
        for chunk in paths.chunks(self.config.analysis.concurrency.max(1)) {
            let loads: Vec<_> = chunk
                .iter()
                .map(|path| {
                    let source = Arc::clone(&source);
                    let path = path.clone();
                    tokio::spawn(async move { source.load(&path).await })
                })
                .collect();
            for (path, load) in chunk.iter().zip(loads) {
                let loaded = load.await.map_err(|e| EngineError::Join {
                    path: path.clone(),
                    reason: e.to_string(),
                });
                match loaded.and_then(|result| result) {
                    Ok(record) => records.push(record),
                    Err(err) => {
                        log::warn!("Excluding {path} from context: {err}");
                        failed.push(FailedFile {
                            path: path.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }
        }

        Ok(self.assemble(tasks, records, failed, budget, since).await)
    }

    async fn assemble(
        &self,
        tasks: &[TaskDescriptor],
        records: Vec<FileRecord>,
        mut failed: Vec<FailedFile>,
        budget: ContextBudget,
        since: RegistryEpoch,
    ) -> BuiltContext {
        let repo = resolve_repo_state(self.config.repo_root.as_deref()).await;
        let (analyses, analysis_failures) = analyze_all(
            &self.cache,
            &repo,
            records,
            self.config.analysis.concurrency,
        )
        .await;
        failed.extend(analysis_failures);
        let cache_hits = analyses.iter().map(|a| a.cache_hits).sum();

        let graph = match assemble_graph(&analyses) {
            Ok(graph) => Arc::new(graph),
            Err(err) => {
                log::warn!("Dependency graph assembly failed: {err}");
                let mut context = SelectedContext::degraded(err.to_string(), budget);
                context.metadata.failed_files = failed;
                return BuiltContext {
                    ticket: None,
                    context,
                    cache_hits,
                };
            }
        };
        self.graph.set_shared(Arc::clone(&graph));

        let candidates: Vec<Candidate<'_>> = analyses
            .iter()
            .map(|a| Candidate::new(&a.record, &a.profile).with_complexity(&a.complexity))
            .collect();
        let mut context = self.builder.select(tasks, &candidates, &graph, budget);

        if !failed.is_empty() {
            context.insights.push(Insight::new(
                InsightKind::Diagnostic,
                format!("{} file(s) could not be analyzed and were left out", failed.len()),
            ));
        }
        context.metadata.failed_files = failed;

        let ticket = if context.degraded {
            None
        } else {
            Some(
                self.registry
                    .register_built(context.paths(), Some(Arc::clone(&graph)), since),
            )
        };
        if let Some(ticket) = ticket {
            if self.registry.is_current(ticket) {
                log::debug!(
                    "Built {} with {} files ({} tokens)",
                    ticket.id,
                    context.files.len(),
                    context.total_tokens()
                );
            } else {
                log::info!("{} went stale while it was being built", ticket.id);
            }
        }

        BuiltContext {
            ticket,
            context,
            cache_hits,
        }
    }

    pub async fn submit_change(&self, event: ChangeEvent) -> Result<()> {
        Ok(self.invalidation.submit(event).await?)
    }

    /// Processes submitted changes now instead of after the debounce window
    pub async fn flush_changes(&self) -> Result<()> {
        Ok(self.invalidation.flush().await?)
    }

    pub fn subscribe_invalidations(&self) -> broadcast::Receiver<ContextInvalidated> {
        self.invalidation.subscribe()
    }

    pub fn is_context_current(&self, ticket: ContextTicket) -> bool {
        self.registry.is_current(ticket)
    }

    /// Stops tracking a context the caller no longer holds
    pub fn discard_context(&self, id: ContextId) -> bool {
        self.registry.discard(id)
    }

    pub fn latest_graph(&self) -> Option<Arc<DependencyGraph>> {
        self.graph.current()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    pub fn metrics(&self) -> InvalidationMetrics {
        self.invalidation.metrics()
    }

    /// Drops expired and stale cache entries
    pub async fn cleanup(&self) -> usize {
        self.cache.cleanup().await
    }
}

fn assemble_graph(analyses: &[FileAnalysis]) -> Result<DependencyGraph> {
    let extracted = analyses.iter().map(|a| a.dependencies.clone()).collect();
    Ok(DependencyMapper::new().assemble(extracted)?)
}
