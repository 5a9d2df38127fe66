use async_trait::async_trait;
use context_cache::{derive_key, AnalysisKind, AnalysisPayload, CacheConfig, CacheManager};
use context_graph::DependencyMapper;
use context_invalidation::{
    ContextInvalidated, ContextRegistry, GraphHandle, ImpactTier, InvalidationConfig,
    InvalidationDeps, InvalidationError, InvalidationHandle, PreemptiveAnalyzer, Result,
};
use context_protocol::{ChangeEvent, FileRecord, RepoState};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

fn memory_cache() -> Arc<CacheManager> {
    Arc::new(CacheManager::new(CacheConfig::memory(64)))
}

fn config() -> InvalidationConfig {
    InvalidationConfig {
        preemptive_analysis: false,
        ..InvalidationConfig::default()
    }
}

/// app -> service -> core, other standalone
fn chain_graph() -> GraphHandle {
    let records = vec![
        FileRecord::from_source("src/app.ts", "").with_imports(["./service"]),
        FileRecord::from_source("src/service.ts", "").with_imports(["./core"]),
        FileRecord::from_source("src/core.ts", ""),
        FileRecord::from_source("src/other.ts", ""),
    ];
    let handle = GraphHandle::new();
    handle.set(DependencyMapper::new().build(&records).unwrap());
    handle
}

fn drain(rx: &mut broadcast::Receiver<ContextInvalidated>) -> Vec<ContextInvalidated> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

#[tokio::test(start_paused = true)]
async fn changes_within_one_window_form_one_batch() {
    let handle = InvalidationHandle::start(
        config(),
        InvalidationDeps::new(memory_cache(), ContextRegistry::new()),
    );

    for i in 0..5 {
        handle
            .submit(ChangeEvent::modified(format!("src/file{i}.ts")))
            .await
            .unwrap();
        time::sleep(Duration::from_millis(100)).await;
    }
    time::sleep(Duration::from_secs(2)).await;

    let metrics = handle.metrics();
    assert_eq!(metrics.batches_processed, 1);
    assert_eq!(metrics.changes_processed, 5);
    assert_eq!(metrics.debounce_window_hits, 4);
    assert_eq!(metrics.queue_depth, 0);
}

#[tokio::test(start_paused = true)]
async fn separate_windows_form_separate_batches() {
    let handle = InvalidationHandle::start(
        config(),
        InvalidationDeps::new(memory_cache(), ContextRegistry::new()),
    );

    handle.submit(ChangeEvent::modified("src/a.ts")).await.unwrap();
    time::sleep(Duration::from_secs(1)).await;
    handle.submit(ChangeEvent::modified("src/b.ts")).await.unwrap();
    time::sleep(Duration::from_secs(1)).await;

    assert_eq!(handle.metrics().batches_processed, 2);
}

#[tokio::test(start_paused = true)]
async fn disabled_smart_invalidation_hits_every_context() {
    let registry = ContextRegistry::new();
    let tickets = [
        registry.register(["src/auth/login.ts"]),
        registry.register(["src/ui/button.tsx"]),
        registry.register(["src/db/user.ts"]),
    ];
    let handle = InvalidationHandle::start(
        InvalidationConfig {
            smart_invalidation: false,
            ..config()
        },
        InvalidationDeps::new(memory_cache(), registry.clone()).with_graph(chain_graph()),
    );
    let mut rx = handle.subscribe();

    handle
        .submit(ChangeEvent::modified("src/auth/login.ts"))
        .await
        .unwrap();
    handle.flush().await.unwrap();

    let notices = drain(&mut rx);
    assert_eq!(notices.len(), 3);
    assert!(notices.iter().all(|n| n.tier == ImpactTier::Medium));
    assert!(notices.iter().all(|n| n.version == 2));
    assert!(tickets.iter().all(|t| !registry.is_current(*t)));
    assert_eq!(handle.metrics().invalidator, "conservative");
    assert_eq!(handle.metrics().contexts_invalidated, 3);
}

#[tokio::test(start_paused = true)]
async fn graph_backed_invalidation_reaches_direct_dependents() {
    let registry = ContextRegistry::new();
    let app = registry.register(["src/app.ts"]);
    let service = registry.register(["src/service.ts"]);
    let core = registry.register(["src/core.ts"]);
    let other = registry.register(["src/other.ts"]);
    let handle = InvalidationHandle::start(
        config(),
        InvalidationDeps::new(memory_cache(), registry.clone()).with_graph(chain_graph()),
    );
    let mut rx = handle.subscribe();

    handle.submit(ChangeEvent::modified("src/core.ts")).await.unwrap();
    handle.flush().await.unwrap();

    let mut ids: Vec<_> = drain(&mut rx).into_iter().map(|n| n.context_id).collect();
    ids.sort();
    assert_eq!(ids, vec![service.id, core.id]);
    assert!(registry.is_current(app));
    assert!(registry.is_current(other));
    assert_eq!(handle.metrics().invalidator, "precise");
}

#[tokio::test(start_paused = true)]
async fn manifest_change_clears_everything() {
    let cache = memory_cache();
    let record = FileRecord::from_source("src/a.ts", "export const a = 1;\n");
    let key = derive_key(&record, &RepoState::new("main", "abc123"));
    cache
        .put(
            &key,
            AnalysisPayload::Dependencies(DependencyMapper::new().extract(&record).unwrap()),
        )
        .await
        .unwrap();

    let registry = ContextRegistry::new();
    registry.register(["src/a.ts"]);
    registry.register(["src/b.ts"]);
    let handle = InvalidationHandle::start(
        config(),
        InvalidationDeps::new(Arc::clone(&cache), registry.clone()),
    );
    let mut rx = handle.subscribe();

    handle.submit(ChangeEvent::modified("src/b.ts")).await.unwrap();
    handle.submit(ChangeEvent::modified("package.json")).await.unwrap();
    handle.flush().await.unwrap();

    assert!(!cache.has(&key, AnalysisKind::Dependencies).await);
    assert!(registry.is_empty());
    let notices = drain(&mut rx);
    assert_eq!(notices.len(), 2);
    assert!(notices.iter().all(|n| n.tier == ImpactTier::Critical));
    assert_eq!(handle.metrics().full_invalidations, 1);
}

#[tokio::test(start_paused = true)]
async fn source_change_drops_its_cache_entries() {
    let cache = memory_cache();
    let record = FileRecord::from_source("src/auth/login.ts", "export const a = 1;\n");
    let key = derive_key(&record, &RepoState::new("main", "abc123"));
    cache
        .put(
            &key,
            AnalysisPayload::Dependencies(DependencyMapper::new().extract(&record).unwrap()),
        )
        .await
        .unwrap();

    let handle = InvalidationHandle::start(
        config(),
        InvalidationDeps::new(Arc::clone(&cache), ContextRegistry::new()),
    );
    handle
        .submit(ChangeEvent::modified("src/auth/login.ts"))
        .await
        .unwrap();
    handle.flush().await.unwrap();

    assert!(!cache.has(&key, AnalysisKind::Dependencies).await);
}

#[tokio::test(start_paused = true)]
async fn docs_change_is_deferred() {
    let cache = memory_cache();
    let record = FileRecord::from_source("docs/readme.md", "# Readme\n");
    let key = derive_key(&record, &RepoState::new("main", "abc123"));
    cache
        .put(
            &key,
            AnalysisPayload::Dependencies(DependencyMapper::new().extract(&record).unwrap()),
        )
        .await
        .unwrap();

    let registry = ContextRegistry::new();
    let with_docs = registry.register(["docs/readme.md", "src/a.ts"]);
    let without_docs = registry.register(["src/a.ts"]);
    let handle = InvalidationHandle::start(
        config(),
        InvalidationDeps::new(Arc::clone(&cache), registry.clone()),
    );

    handle
        .submit(ChangeEvent::modified("docs/readme.md"))
        .await
        .unwrap();
    handle.flush().await.unwrap();

    assert!(cache.has(&key, AnalysisKind::Dependencies).await);
    assert!(!registry.is_current(with_docs));
    assert!(registry.is_current(without_docs));
    let metrics = handle.metrics();
    assert_eq!(metrics.deferred_changes, 1);
    assert_eq!(metrics.full_invalidations, 0);
}

#[derive(Default)]
struct RecordingAnalyzer {
    warmed: Mutex<Vec<String>>,
}

#[async_trait]
impl PreemptiveAnalyzer for RecordingAnalyzer {
    async fn warm(&self, path: &str, _ttl: Duration) -> Result<usize> {
        self.warmed.lock().unwrap().push(path.to_string());
        Ok(3)
    }
}

#[tokio::test(start_paused = true)]
async fn idle_time_warms_changed_files_first() {
    let analyzer = Arc::new(RecordingAnalyzer::default());
    let handle = InvalidationHandle::start(
        InvalidationConfig {
            preemptive_analysis: true,
            idle_threshold: Duration::from_secs(2),
            ..InvalidationConfig::default()
        },
        InvalidationDeps::new(memory_cache(), ContextRegistry::new())
            .with_graph(chain_graph())
            .with_analyzer(analyzer.clone()),
    );

    handle
        .suggest_preemptive(vec![("src/other.ts".to_string(), 0.9)])
        .await
        .unwrap();
    handle
        .submit(ChangeEvent::modified("src/service.ts"))
        .await
        .unwrap();
    handle.submit(ChangeEvent::modified("docs/notes.md")).await.unwrap();
    handle.flush().await.unwrap();
    assert!(analyzer.warmed.lock().unwrap().is_empty());

    time::sleep(Duration::from_secs(5)).await;

    assert_eq!(
        *analyzer.warmed.lock().unwrap(),
        vec!["src/service.ts".to_string(), "src/other.ts".to_string()]
    );
    let metrics = handle.metrics();
    assert_eq!(metrics.preemptive_warmups, 2);
    assert_eq!(metrics.preemptive_queue_depth, 0);
}

#[tokio::test]
async fn try_submit_reports_a_full_queue() {
    let handle = InvalidationHandle::start(
        InvalidationConfig {
            event_queue_capacity: 1,
            ..config()
        },
        InvalidationDeps::new(memory_cache(), ContextRegistry::new()),
    );

    handle.try_submit(ChangeEvent::modified("src/a.ts")).unwrap();
    assert!(matches!(
        handle.try_submit(ChangeEvent::modified("src/b.ts")),
        Err(InvalidationError::QueueFull)
    ));

    handle.flush().await.unwrap();
    assert_eq!(handle.metrics().changes_processed, 1);
}
