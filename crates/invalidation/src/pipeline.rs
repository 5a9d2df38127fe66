use crate::config::InvalidationConfig;
use crate::debounce::{Batch, DebounceState};
use crate::error::{InvalidationError, Result};
use crate::impact::{classify_path, ImpactTier, InvalidationPlan, InvalidationStrategy};
use crate::invalidator::{select_invalidator, GraphHandle, Invalidator};
use crate::metrics::InvalidationMetrics;
use crate::preemptive::{PreemptiveAnalyzer, PreemptiveQueue};
use crate::registry::{ContextId, ContextRegistry, InvalidatedContext};
use context_cache::CacheManager;
use context_protocol::{ChangeEvent, ChangeType};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::{self, Instant};

/// Shared state the loop invalidates. The graph handle, when present,
/// enables precise invalidation and centrality-ranked warmups.
#[derive(Clone)]
pub struct InvalidationDeps {
    pub cache: Arc<CacheManager>,
    pub registry: ContextRegistry,
    pub graph: Option<GraphHandle>,
    pub analyzer: Option<Arc<dyn PreemptiveAnalyzer>>,
}

impl InvalidationDeps {
    pub fn new(cache: Arc<CacheManager>, registry: ContextRegistry) -> Self {
        Self {
            cache,
            registry,
            graph: None,
            analyzer: None,
        }
    }

    pub fn with_graph(mut self, graph: GraphHandle) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn PreemptiveAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }
}

/// Broadcast once per invalidated context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextInvalidated {
    pub context_id: ContextId,
    /// Version after the bump; any ticket holding an older one is stale
    pub version: u64,
    pub tier: ImpactTier,
    pub changed_paths: Vec<String>,
}

enum Command {
    Flush { ack: oneshot::Sender<()> },
    Preempt { candidates: Vec<(String, f64)> },
    Shutdown,
}

/// Entry point for file-change events. Cloning shares the same loop; the
/// loop stops when the last handle is dropped.
#[derive(Clone)]
pub struct InvalidationHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    event_tx: mpsc::Sender<ChangeEvent>,
    command_tx: mpsc::Sender<Command>,
    notify_tx: broadcast::Sender<ContextInvalidated>,
    metrics_tx: watch::Sender<InvalidationMetrics>,
    cache: Arc<CacheManager>,
}

impl InvalidationHandle {
    /// Spawns the invalidation loop on the current tokio runtime.
    pub fn start(config: InvalidationConfig, deps: InvalidationDeps) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(16);
        let (notify_tx, _) = broadcast::channel(256);

        let invalidator = select_invalidator(config.smart_invalidation, deps.graph.clone());
        let metrics = InvalidationMetrics {
            invalidator: invalidator.name().to_string(),
            current_debounce_ms: duration_ms(config.debounce),
            ..InvalidationMetrics::default()
        };
        let (metrics_tx, _) = watch::channel(metrics.clone());

        let cache = Arc::clone(&deps.cache);
        let event_loop = InvalidationLoop {
            debounce: DebounceState::new(&config),
            preemptive: PreemptiveQueue::new(config.preemptive_queue_capacity),
            config,
            cache: deps.cache,
            registry: deps.registry,
            graph: deps.graph,
            analyzer: deps.analyzer,
            invalidator,
            metrics,
            notify_tx: notify_tx.clone(),
            metrics_tx: metrics_tx.clone(),
            last_activity: Instant::now(),
            warming: false,
        };
        tokio::spawn(event_loop.run(event_rx, command_rx));

        Self {
            inner: Arc::new(HandleInner {
                event_tx,
                command_tx,
                notify_tx,
                metrics_tx,
                cache,
            }),
        }
    }

    /// Waits for queue space
    pub async fn submit(&self, event: ChangeEvent) -> Result<()> {
        self.inner
            .event_tx
            .send(event)
            .await
            .map_err(|_| InvalidationError::Closed)
    }

    pub fn try_submit(&self, event: ChangeEvent) -> Result<()> {
        self.inner.event_tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => InvalidationError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => InvalidationError::Closed,
        })
    }

    /// Processes everything submitted so far without waiting for the
    /// debounce window; resolves once the batch is done.
    pub async fn flush(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.inner
            .command_tx
            .send(Command::Flush { ack })
            .await
            .map_err(|_| InvalidationError::Closed)?;
        done.await.map_err(|_| InvalidationError::Closed)
    }

    /// Queues `(path, centrality)` pairs for idle-time warming
    pub async fn suggest_preemptive(&self, candidates: Vec<(String, f64)>) -> Result<()> {
        if candidates.is_empty() {
            return Ok(());
        }
        self.inner
            .command_tx
            .send(Command::Preempt { candidates })
            .await
            .map_err(|_| InvalidationError::Closed)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ContextInvalidated> {
        self.inner.notify_tx.subscribe()
    }

    #[must_use]
    pub fn metrics(&self) -> InvalidationMetrics {
        let mut metrics = self.inner.metrics_tx.borrow().clone();
        metrics.record_preemptive_hits(self.inner.cache.preemptive_hits());
        metrics
    }

    #[must_use]
    pub fn metrics_stream(&self) -> watch::Receiver<InvalidationMetrics> {
        self.inner.metrics_tx.subscribe()
    }
}

impl Drop for InvalidationHandle {
    fn drop(&mut self) {
        if Arc::strong_count(&self.inner) == 1 {
            let _ = self.inner.command_tx.try_send(Command::Shutdown);
        }
    }
}

struct WarmOutcome {
    path: String,
    result: Result<usize>,
}

/// Sole owner of the debounce state; at most one batch and one warmup are in
/// flight, events arriving meanwhile wait in the channel for the next batch.
struct InvalidationLoop {
    config: InvalidationConfig,
    cache: Arc<CacheManager>,
    registry: ContextRegistry,
    graph: Option<GraphHandle>,
    analyzer: Option<Arc<dyn PreemptiveAnalyzer>>,
    invalidator: Arc<dyn Invalidator>,
    debounce: DebounceState,
    preemptive: PreemptiveQueue,
    metrics: InvalidationMetrics,
    notify_tx: broadcast::Sender<ContextInvalidated>,
    metrics_tx: watch::Sender<InvalidationMetrics>,
    last_activity: Instant,
    warming: bool,
}

impl InvalidationLoop {
    async fn run(
        mut self,
        mut event_rx: mpsc::Receiver<ChangeEvent>,
        mut command_rx: mpsc::Receiver<Command>,
    ) {
        let (warm_tx, mut warm_rx) = mpsc::channel::<WarmOutcome>(1);

        loop {
            let next_deadline = self.debounce.next_deadline();
            let idle_deadline = self.idle_deadline();

            tokio::select! {
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    self.record(event);
                }
                Some(cmd) = command_rx.recv() => {
                    match cmd {
                        Command::Flush { ack } => {
                            while let Ok(event) = event_rx.try_recv() {
                                self.record(event);
                            }
                            if self.debounce.is_armed() {
                                self.process_batch().await;
                            }
                            let _ = ack.send(());
                        }
                        Command::Preempt { candidates } => {
                            for (path, centrality) in candidates {
                                self.preemptive.push(path, centrality, false);
                            }
                            self.publish();
                        }
                        Command::Shutdown => break,
                    }
                }
                () = async {
                    if let Some(deadline) = next_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if next_deadline.is_some() => {
                    self.process_batch().await;
                }
                () = async {
                    if let Some(deadline) = idle_deadline {
                        time::sleep_until(deadline).await;
                    }
                }, if idle_deadline.is_some() => {
                    self.start_warmup(&warm_tx);
                }
                Some(outcome) = warm_rx.recv() => {
                    self.finish_warmup(outcome);
                }
            }
        }

        debug!("Invalidation loop stopped");
    }

    fn record(&mut self, event: ChangeEvent) {
        let now = Instant::now();
        self.last_activity = now;
        if self.debounce.record(event, now) {
            self.metrics.debounce_window_hits += 1;
        }
        self.metrics.queue_depth = self.debounce.pending();
        self.metrics.current_debounce_ms = duration_ms(self.debounce.window());
        self.publish();
    }

    fn idle_deadline(&self) -> Option<Instant> {
        let ready = self.config.preemptive_analysis
            && self.analyzer.is_some()
            && !self.warming
            && !self.debounce.is_armed()
            && !self.preemptive.is_empty();
        ready.then(|| self.last_activity + self.config.idle_threshold)
    }

    async fn process_batch(&mut self) {
        let started = Instant::now();
        let window = self.debounce.window();
        let Batch { events, raw_events } = self.debounce.take_batch();
        if events.is_empty() {
            return;
        }

        let paths: Vec<String> = events.iter().map(|e| e.path.clone()).collect();
        let plan = InvalidationPlan::build(&paths);
        debug!(
            "Processing {} changed paths ({raw_events} events, window {window:?})",
            paths.len()
        );

        if plan.is_full() {
            self.registry.record_full_change();
            let cleared = self.cache.clear_all().await;
            let invalidated = self.registry.invalidate_all();
            info!(
                "Full invalidation: {cleared} cache entries, {} contexts",
                invalidated.len()
            );
            self.metrics.full_invalidations += 1;
            self.notify(invalidated, ImpactTier::Critical, &paths);
        } else {
            self.registry.record_changes(&paths);
            for group in plan.groups() {
                let chunk_size = match group.strategy {
                    InvalidationStrategy::Balanced => self.config.max_concurrent_analysis.max(1),
                    _ => group.paths.len().max(1),
                };
                if group.strategy == InvalidationStrategy::Deferred {
                    self.metrics.deferred_changes += group.paths.len() as u64;
                }
                for chunk in group.paths.chunks(chunk_size) {
                    if group.strategy != InvalidationStrategy::Deferred {
                        self.invalidate_cached(chunk).await;
                    }
                    let ids =
                        self.invalidator
                            .affected_contexts(chunk, group.strategy, &self.registry);
                    let invalidated = self.registry.invalidate(&ids);
                    if !invalidated.is_empty() {
                        debug!(
                            "{} change to {} path(s) invalidated {} context(s)",
                            group.tier.as_str(),
                            chunk.len(),
                            invalidated.len()
                        );
                    }
                    self.notify(invalidated, group.tier, chunk);
                }
            }
        }

        self.queue_warmups(&events);
        self.last_activity = Instant::now();

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_batch(raw_events, elapsed_ms);
        self.metrics.queue_depth = self.debounce.pending();
        self.metrics.current_debounce_ms = duration_ms(self.debounce.window());
        self.publish();
    }

    /// Per-path cache invalidation, fanned out and joined in order
    async fn invalidate_cached(&self, paths: &[String]) {
        let tasks: Vec<_> = paths
            .iter()
            .map(|path| {
                let cache = Arc::clone(&self.cache);
                let path = path.clone();
                tokio::spawn(async move { cache.invalidate_path(&path).await })
            })
            .collect();

        for (path, task) in paths.iter().zip(tasks) {
            if let Err(err) = task.await {
                warn!("Cache invalidation for {path} did not complete: {err}");
            }
        }
    }

    fn notify(&mut self, invalidated: Vec<InvalidatedContext>, tier: ImpactTier, changed: &[String]) {
        self.metrics.contexts_invalidated += invalidated.len() as u64;
        for context in invalidated {
            let _ = self.notify_tx.send(ContextInvalidated {
                context_id: context.id,
                version: context.version,
                tier,
                changed_paths: changed.to_vec(),
            });
        }
    }

    fn queue_warmups(&mut self, events: &[ChangeEvent]) {
        if !self.config.preemptive_analysis || self.analyzer.is_none() {
            return;
        }
        for event in events {
            if event.change_type == ChangeType::Delete {
                self.preemptive.remove(&event.path);
                continue;
            }
            if !matches!(
                classify_path(&event.path),
                ImpactTier::High | ImpactTier::Medium
            ) {
                continue;
            }
            let centrality = self
                .graph
                .as_ref()
                .map_or(0.0, |graph| graph.centrality(&event.path));
            self.preemptive.push(event.path.clone(), centrality, true);
        }
    }

    fn start_warmup(&mut self, warm_tx: &mpsc::Sender<WarmOutcome>) {
        let Some(analyzer) = self.analyzer.clone() else {
            return;
        };
        let Some(candidate) = self.preemptive.pop() else {
            return;
        };
        self.warming = true;
        let ttl = self.config.preemptive_ttl;
        let warm_tx = warm_tx.clone();
        tokio::spawn(async move {
            let result = analyzer.warm(&candidate.path, ttl).await;
            let _ = warm_tx
                .send(WarmOutcome {
                    path: candidate.path,
                    result,
                })
                .await;
        });
        self.publish();
    }

    fn finish_warmup(&mut self, outcome: WarmOutcome) {
        self.warming = false;
        match outcome.result {
            Ok(0) => debug!("Preemptive analysis of {} already cached", outcome.path),
            Ok(written) => {
                self.metrics.preemptive_warmups += 1;
                debug!(
                    "Preemptively cached {written} analyses of {}",
                    outcome.path
                );
            }
            Err(err) => warn!("{err}"),
        }
        self.publish();
    }

    fn publish(&mut self) {
        self.metrics.preemptive_queue_depth = self.preemptive.len();
        self.metrics
            .record_preemptive_hits(self.cache.preemptive_hits());
        self.metrics_tx.send_replace(self.metrics.clone());
    }
}

fn duration_ms(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
