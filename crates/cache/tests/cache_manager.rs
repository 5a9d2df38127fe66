use context_cache::{
    derive_key, path_hash, AnalysisKind, AnalysisPayload, CacheConfig, CacheKey, CacheManager,
    EntryOrigin,
};
use context_graph::DependencyMapper;
use context_protocol::{FileRecord, RepoState};
use pretty_assertions::assert_eq;
use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

fn record(path: &str, hash: &str) -> FileRecord {
    let mut record = FileRecord::from_source(path, "import { x } from './b';\nexport const a = x;\n")
        .with_imports(["./b"]);
    record.content_hash = hash.to_string();
    record
}

fn deps_payload(record: &FileRecord) -> AnalysisPayload {
    AnalysisPayload::Dependencies(DependencyMapper::new().extract(record).unwrap())
}

fn file_cache(dir: &TempDir) -> CacheManager {
    CacheManager::new(CacheConfig::in_dir(dir.path()))
}

async fn compute_counted(
    cache: &CacheManager,
    key: &CacheKey,
    record: &FileRecord,
    calls: &AtomicUsize,
) -> (AnalysisPayload, bool) {
    let lookup = cache
        .get_or_compute(key, AnalysisKind::Dependencies, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(deps_payload(record))
        })
        .await
        .unwrap();
    (lookup.payload, lookup.from_cache)
}

#[tokio::test]
async fn miss_then_hit_for_identical_inputs() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc123"));
    assert_eq!(
        key.to_string(),
        format!("typescript/main-abc123/{}-h1", path_hash("a.ts"))
    );

    let calls = AtomicUsize::new(0);
    let (first, from_cache) = compute_counted(&cache, &key, &a, &calls).await;
    assert!(!from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let (second, from_cache) = compute_counted(&cache, &key, &a, &calls).await;
    assert!(from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first, second);

    let on_disk = dir
        .path()
        .join("typescript")
        .join("main-abc123")
        .join(format!("{}-h1.deps.json", path_hash("a.ts")));
    assert!(on_disk.exists());
}

#[tokio::test]
async fn entries_older_than_max_age_are_recomputed() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc123"));
    cache.put(&key, deps_payload(&a)).await.unwrap();

    let calls = AtomicUsize::new(0);
    let lookup = cache
        .get_or_compute_with_max_age(&key, AnalysisKind::Dependencies, Duration::ZERO, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(deps_payload(&a))
        })
        .await
        .unwrap();
    assert!(!lookup.from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn corrupted_entry_reads_as_miss() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc123"));
    cache.put(&key, deps_payload(&a)).await.unwrap();

    let path = dir
        .path()
        .join("typescript/main-abc123")
        .join(format!("{}-h1.deps.json", path_hash("a.ts")));
    std::fs::write(&path, b"{ not json").unwrap();

    assert!(!cache.has(&key, AnalysisKind::Dependencies).await);
    let calls = AtomicUsize::new(0);
    let (_, from_cache) = compute_counted(&cache, &key, &a, &calls).await;
    assert!(!from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn compute_errors_propagate_without_storing() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::unknown());

    let result = cache
        .get_or_compute(&key, AnalysisKind::Dependencies, || async {
            Err::<AnalysisPayload, _>("parser crashed")
        })
        .await;
    assert_eq!(result.unwrap_err(), "parser crashed");
    assert!(!cache.has(&key, AnalysisKind::Dependencies).await);
}

#[tokio::test]
async fn unwritable_cache_still_returns_fresh_result() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, b"a file, not a directory").unwrap();
    let cache = CacheManager::new(CacheConfig::in_dir(&blocker));
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc123"));

    let calls = AtomicUsize::new(0);
    let (_, from_cache) = compute_counted(&cache, &key, &a, &calls).await;
    assert!(!from_cache);
    let (_, from_cache) = compute_counted(&cache, &key, &a, &calls).await;
    assert!(!from_cache);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn clear_for_repo_state_only_touches_that_segment() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let a = record("a.ts", "h1");
    let main = derive_key(&a, &RepoState::new("main", "abc123"));
    let feature = derive_key(&a, &RepoState::new("feature/x", "def456"));
    cache.put(&main, deps_payload(&a)).await.unwrap();
    cache.put(&feature, deps_payload(&a)).await.unwrap();

    assert_eq!(cache.clear_for_repo_state("feature/x", "def456").await, 1);
    assert!(cache.has(&main, AnalysisKind::Dependencies).await);
    assert!(!cache.has(&feature, AnalysisKind::Dependencies).await);
}

#[tokio::test]
async fn invalidate_path_drops_every_kind_and_state() {
    let cache = CacheManager::new(CacheConfig::memory(64));
    let a = record("src/a.ts", "h1");
    let b = record("src/b.ts", "h2");
    let repo = RepoState::new("main", "abc");
    let key_a = derive_key(&a, &repo);
    let key_b = derive_key(&b, &repo);
    cache.put(&key_a, deps_payload(&a)).await.unwrap();
    cache
        .put(&derive_key(&a, &RepoState::unknown()), deps_payload(&a))
        .await
        .unwrap();
    cache.put(&key_b, deps_payload(&b)).await.unwrap();

    assert_eq!(cache.invalidate_path("src/a.ts").await, 2);
    assert!(!cache.has(&key_a, AnalysisKind::Dependencies).await);
    assert!(cache.has(&key_b, AnalysisKind::Dependencies).await);
}

#[tokio::test]
async fn clear_all_leaves_nothing_valid() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let repo = RepoState::new("main", "abc");
    let keys: Vec<CacheKey> = (0..5)
        .map(|i| {
            let r = record(&format!("f{i}.ts"), &format!("h{i}"));
            derive_key(&r, &repo)
        })
        .collect();
    for (i, key) in keys.iter().enumerate() {
        let r = record(&format!("f{i}.ts"), &format!("h{i}"));
        cache.put(key, deps_payload(&r)).await.unwrap();
    }

    assert_eq!(cache.stats().await.entry_count, 5);
    assert_eq!(cache.clear_all().await, 5);
    for key in &keys {
        assert!(!cache.has(key, AnalysisKind::Dependencies).await);
    }
    assert_eq!(cache.stats().await.entry_count, 0);
}

#[tokio::test]
async fn cleanup_removes_entries_from_other_versions() {
    let dir = TempDir::new().unwrap();
    let old = CacheManager::new(CacheConfig {
        version: 0,
        ..CacheConfig::in_dir(dir.path())
    });
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc"));
    old.put(&key, deps_payload(&a)).await.unwrap();

    let current = file_cache(&dir);
    assert_eq!(current.cleanup().await, 1);
    assert_eq!(current.stats().await.entry_count, 0);
}

#[tokio::test]
async fn preemptive_entries_expire_and_count_hits() {
    let cache = CacheManager::new(CacheConfig::memory(16));
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc"));

    cache
        .put_with_ttl(&key, deps_payload(&a), Duration::from_secs(60))
        .await
        .unwrap();
    let calls = AtomicUsize::new(0);
    let lookup = cache
        .get_or_compute(&key, AnalysisKind::Dependencies, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(deps_payload(&a))
        })
        .await
        .unwrap();
    assert!(lookup.from_cache);
    assert_eq!(lookup.origin, EntryOrigin::Preemptive);
    assert_eq!(cache.stats().await.preemptive_hits, 1);

    cache
        .put_with_ttl(&key, deps_payload(&a), Duration::ZERO)
        .await
        .unwrap();
    assert!(!cache.has(&key, AnalysisKind::Dependencies).await);
}

#[tokio::test]
async fn stats_break_down_by_language() {
    let cache = CacheManager::new(CacheConfig::memory(16));
    let repo = RepoState::new("main", "abc");
    let ts = record("a.ts", "h1");
    let mut py = FileRecord::from_source("b.py", "import os\n");
    py.content_hash = "h2".to_string();
    cache.put(&derive_key(&ts, &repo), deps_payload(&ts)).await.unwrap();
    cache.put(&derive_key(&py, &repo), deps_payload(&py)).await.unwrap();

    let stats = cache.stats().await;
    assert_eq!(stats.entry_count, 2);
    assert_eq!(stats.by_language.get("typescript"), Some(&1));
    assert_eq!(stats.by_language.get("python"), Some(&1));
    assert!(stats.total_bytes > 0);
    assert!(stats.oldest_entry_age_ms >= stats.newest_entry_age_ms);
}

fn files_under(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            out.extend(files_under(&path));
        } else {
            out.push(path);
        }
    }
    out
}

fn is_temp(path: &std::path::Path) -> bool {
    path.extension().is_some_and(|ext| ext == "tmp")
}

#[tokio::test]
async fn failed_rename_leaves_no_temp_file_behind() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc123"));
    cache.put(&key, deps_payload(&a)).await.unwrap();

    let entry = files_under(dir.path()).pop().unwrap();
    std::fs::remove_file(&entry).unwrap();
    std::fs::create_dir(&entry).unwrap();
    std::fs::write(entry.join("occupant"), b"x").unwrap();

    assert!(cache.put(&key, deps_payload(&a)).await.is_err());
    let leftovers: Vec<_> = files_under(dir.path())
        .into_iter()
        .filter(|p| is_temp(p))
        .collect();
    assert_eq!(leftovers, Vec::<std::path::PathBuf>::new());
}

#[tokio::test]
async fn cleanup_sweeps_stray_temp_files() {
    let dir = TempDir::new().unwrap();
    let cache = file_cache(&dir);
    let a = record("a.ts", "h1");
    let key = derive_key(&a, &RepoState::new("main", "abc123"));
    cache.put(&key, deps_payload(&a)).await.unwrap();

    let entry = files_under(dir.path()).pop().unwrap();
    let stray = entry.with_file_name("interrupted.json.4242.7.tmp");
    std::fs::write(&stray, b"{\"partial").unwrap();

    assert_eq!(cache.cleanup().await, 1);
    assert!(!stray.exists());
    assert!(entry.exists());
    assert_eq!(cache.stats().await.entry_count, 1);
}
