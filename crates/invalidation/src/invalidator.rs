use crate::impact::InvalidationStrategy;
use crate::registry::{ContextId, ContextRegistry};
use context_graph::DependencyGraph;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Latest assembled dependency graph, replaced whole on every rebuild.
/// Serves warmup ranking, and invalidation of contexts registered without
/// a graph of their own.
#[derive(Debug, Clone, Default)]
pub struct GraphHandle {
    inner: Arc<RwLock<Option<Arc<DependencyGraph>>>>,
}

impl GraphHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, graph: DependencyGraph) {
        self.set_shared(Arc::new(graph));
    }

    pub fn set_shared(&self, graph: Arc<DependencyGraph>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(graph);
    }

    pub fn current(&self) -> Option<Arc<DependencyGraph>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Normalized `[0, 1]` criticality of `path`, 0 without a graph
    pub fn centrality(&self, path: &str) -> f64 {
        self.current()
            .map_or(0.0, |graph| graph.criticality_score(path) / 10.0)
    }
}

/// Resolves which registered contexts a change must invalidate
pub trait Invalidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn affected_contexts(
        &self,
        changed: &[String],
        strategy: InvalidationStrategy,
        registry: &ContextRegistry,
    ) -> Vec<ContextId>;
}

/// Graph-backed: conservative follows transitive dependents, balanced
/// direct ones. Each context is checked against the graph it was selected
/// over, falling back to the shared graph; with neither it is invalidated.
#[derive(Debug)]
pub struct PreciseInvalidator {
    graph: GraphHandle,
    missing_graph_logged: AtomicBool,
}

impl PreciseInvalidator {
    pub fn new(graph: GraphHandle) -> Self {
        Self {
            graph,
            missing_graph_logged: AtomicBool::new(false),
        }
    }

    /// Files of `graph` that are stale after `changed`, changed paths included
    pub fn affected_paths(
        graph: &DependencyGraph,
        changed: &[String],
        strategy: InvalidationStrategy,
    ) -> BTreeSet<String> {
        match strategy {
            InvalidationStrategy::Conservative | InvalidationStrategy::Full => {
                graph.impacted_by(changed)
            }
            InvalidationStrategy::Balanced => graph.directly_affected_by(changed),
            InvalidationStrategy::Deferred => changed.iter().cloned().collect(),
        }
    }

    fn warn_missing_graph(&self) {
        if !self.missing_graph_logged.swap(true, Ordering::Relaxed) {
            log::warn!("No dependency graph yet; invalidating every registered context on change");
        }
    }
}

impl Invalidator for PreciseInvalidator {
    fn name(&self) -> &'static str {
        "precise"
    }

    fn affected_contexts(
        &self,
        changed: &[String],
        strategy: InvalidationStrategy,
        registry: &ContextRegistry,
    ) -> Vec<ContextId> {
        match strategy {
            InvalidationStrategy::Full => return registry.active_ids(),
            InvalidationStrategy::Deferred => return registry.contexts_touching(changed),
            InvalidationStrategy::Conservative | InvalidationStrategy::Balanced => {}
        }

        let shared = self.graph.current();
        // Contexts built in one request share a graph; resolve each graph once
        let mut resolved: Vec<(Arc<DependencyGraph>, BTreeSet<String>)> = Vec::new();
        let mut ids = Vec::new();

        for context in registry.snapshot() {
            let Some(graph) = context.graph.or_else(|| shared.clone()) else {
                self.warn_missing_graph();
                ids.push(context.id);
                continue;
            };
            let position = match resolved.iter().position(|(g, _)| Arc::ptr_eq(g, &graph)) {
                Some(position) => position,
                None => {
                    let affected = Self::affected_paths(&graph, changed, strategy);
                    resolved.push((graph, affected));
                    resolved.len() - 1
                }
            };
            let affected = &resolved[position].1;
            if context.paths.iter().any(|p| affected.contains(p)) {
                ids.push(context.id);
            }
        }
        ids
    }
}

/// Every registered context is treated as affected
#[derive(Debug, Default)]
pub struct ConservativeInvalidator;

impl Invalidator for ConservativeInvalidator {
    fn name(&self) -> &'static str {
        "conservative"
    }

    fn affected_contexts(
        &self,
        changed: &[String],
        strategy: InvalidationStrategy,
        registry: &ContextRegistry,
    ) -> Vec<ContextId> {
        match strategy {
            InvalidationStrategy::Deferred => registry.contexts_touching(changed),
            _ => registry.active_ids(),
        }
    }
}

/// Picks the implementation once, at construction
pub fn select_invalidator(smart: bool, graph: Option<GraphHandle>) -> Arc<dyn Invalidator> {
    match (smart, graph) {
        (true, Some(graph)) => Arc::new(PreciseInvalidator::new(graph)),
        (true, None) => {
            log::warn!(
                "Smart invalidation unavailable (no dependency graph); falling back to conservative invalidation"
            );
            Arc::new(ConservativeInvalidator)
        }
        (false, _) => {
            log::info!("Smart invalidation disabled; every change invalidates all contexts");
            Arc::new(ConservativeInvalidator)
        }
    }
}
