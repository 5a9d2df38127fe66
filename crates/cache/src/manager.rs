use crate::entry::{AnalysisKind, AnalysisPayload, CacheEntry, EntryOrigin};
use crate::error::{CacheError, Result};
use crate::key::{path_hash, split_storage_id, CacheKey};
use context_protocol::RepoState;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::fs;

/// Bump when the envelope or any payload type changes shape
pub const CACHE_FORMAT_VERSION: u32 = 1;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_CAPACITY: usize = 4096;
const TMP_SUFFIX: &str = "tmp";

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    File,
    Memory,
}

impl CacheBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" | "disk" => Some(Self::File),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub max_age: Duration,
    pub backend: CacheBackend,
    /// Entry bound of the memory backend
    pub capacity: usize,
    pub version: u32,
}

impl CacheConfig {
    pub fn with_defaults() -> Self {
        Self {
            dir: PathBuf::from(".context/cache"),
            max_age: DEFAULT_MAX_AGE,
            backend: CacheBackend::File,
            capacity: DEFAULT_CAPACITY,
            version: CACHE_FORMAT_VERSION,
        }
    }

    /// File backend rooted at `dir`
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::with_defaults()
        }
    }

    pub fn memory(capacity: usize) -> Self {
        Self {
            backend: CacheBackend::Memory,
            capacity,
            ..Self::with_defaults()
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }
}

/// Result of [`CacheManager::get_or_compute`]
#[derive(Debug, Clone, PartialEq)]
pub struct CacheLookup {
    pub payload: AnalysisPayload,
    pub from_cache: bool,
    pub origin: EntryOrigin,
}

/// Observability snapshot, not a correctness input
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_bytes: u64,
    pub by_language: BTreeMap<String, usize>,
    pub oldest_entry_age_ms: Option<u64>,
    pub newest_entry_age_ms: Option<u64>,
    pub hits: u64,
    pub misses: u64,
    pub preemptive_hits: u64,
    pub hit_rate: f64,
}

struct StoredFile {
    id: String,
    path: PathBuf,
}

/// Store of per-file analysis results keyed by [`CacheKey`].
///
/// Every I/O failure degrades to a miss (reads) or a skipped write; nothing in
/// here aborts a request.
pub struct CacheManager {
    config: CacheConfig,
    memory: Mutex<LruCache<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    preemptive_hits: AtomicU64,
    tmp_counter: AtomicU64,
    /// Temp files of writes still in progress; `cleanup` leaves these alone
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        log::debug!(
            "Cache manager: {:?} backend at {}, max age {:?}",
            config.backend,
            config.dir.display(),
            config.max_age
        );
        Self {
            config,
            memory: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            preemptive_hits: AtomicU64::new(0),
            tmp_counter: AtomicU64::new(0),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Hits served by preemptively warmed entries since startup
    pub fn preemptive_hits(&self) -> u64 {
        self.preemptive_hits.load(Ordering::Relaxed)
    }

    /// Cached payload if valid, otherwise `compute()` stored under `key`.
    /// A failed write is logged and the fresh result still returned.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &CacheKey,
        kind: AnalysisKind,
        compute: F,
    ) -> std::result::Result<CacheLookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<AnalysisPayload, E>>,
    {
        self.get_or_compute_with_max_age(key, kind, self.config.max_age, compute)
            .await
    }

    pub async fn get_or_compute_with_max_age<F, Fut, E>(
        &self,
        key: &CacheKey,
        kind: AnalysisKind,
        max_age: Duration,
        compute: F,
    ) -> std::result::Result<CacheLookup, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<AnalysisPayload, E>>,
    {
        if let Some(entry) = self.get_with_max_age(key, kind, max_age).await {
            self.hits.fetch_add(1, Ordering::Relaxed);
            if entry.origin == EntryOrigin::Preemptive {
                self.preemptive_hits.fetch_add(1, Ordering::Relaxed);
            }
            return Ok(CacheLookup {
                payload: entry.payload,
                from_cache: true,
                origin: entry.origin,
            });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let payload = compute().await?;
        if let Err(e) = self.store(key, payload.clone(), None, EntryOrigin::Request).await {
            log::warn!("Cache write skipped for {key}: {e}");
        }
        Ok(CacheLookup {
            payload,
            from_cache: false,
            origin: EntryOrigin::Request,
        })
    }

    pub async fn get(&self, key: &CacheKey, kind: AnalysisKind) -> Option<CacheEntry> {
        self.get_with_max_age(key, kind, self.config.max_age).await
    }

    /// Valid entry or `None`. Invalid and corrupted entries are dropped on read.
    pub async fn get_with_max_age(
        &self,
        key: &CacheKey,
        kind: AnalysisKind,
        max_age: Duration,
    ) -> Option<CacheEntry> {
        let id = key.storage_id(kind.as_str());
        let entry = self.read_entry(&id).await?;

        if entry.kind != kind || entry.payload.kind() != kind {
            log::warn!("Cache entry {id} holds a {:?} payload, dropping", entry.payload.kind());
            self.remove_entry(&id).await;
            return None;
        }
        if !entry.is_valid(unix_now_ms(), max_age, self.config.version) {
            self.remove_entry(&id).await;
            return None;
        }
        Some(entry)
    }

    pub async fn has(&self, key: &CacheKey, kind: AnalysisKind) -> bool {
        self.get(key, kind).await.is_some()
    }

    pub async fn put(&self, key: &CacheKey, payload: AnalysisPayload) -> Result<()> {
        self.store(key, payload, None, EntryOrigin::Request).await
    }

    /// Short-lived entry from idle-time warming
    pub async fn put_with_ttl(
        &self,
        key: &CacheKey,
        payload: AnalysisPayload,
        ttl: Duration,
    ) -> Result<()> {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires = unix_now_ms().saturating_add(ttl_ms);
        self.store(key, payload, Some(expires), EntryOrigin::Preemptive)
            .await
    }

    async fn store(
        &self,
        key: &CacheKey,
        payload: AnalysisPayload,
        expires_unix_ms: Option<u64>,
        origin: EntryOrigin,
    ) -> Result<()> {
        let kind = payload.kind();
        let entry = CacheEntry {
            key: key.to_string(),
            kind,
            version: self.config.version,
            created_unix_ms: unix_now_ms(),
            expires_unix_ms,
            origin,
            payload,
        };
        let id = key.storage_id(kind.as_str());

        match self.config.backend {
            CacheBackend::Memory => {
                self.lock_memory().put(id, entry);
                Ok(())
            }
            CacheBackend::File => self.write_file(&id, &entry).await,
        }
    }

    /// Drop every analysis of `path`, across languages and repository states
    pub async fn invalidate_path(&self, path: &str) -> usize {
        let prefix = format!("{}-", path_hash(path));
        let removed = self
            .remove_matching(|_, _, name| name.starts_with(&prefix))
            .await;
        if removed > 0 {
            log::debug!("Invalidated {removed} cache entries for {path}");
        }
        removed
    }

    /// Drop everything stored under one `{branch}-{commit}` segment
    pub async fn clear_for_repo_state(&self, branch: &str, commit: &str) -> usize {
        let segment = RepoState::new(branch, commit).storage_segment();
        let removed = self
            .remove_matching(|_, seg, _| seg == segment)
            .await;
        log::info!("Cleared {removed} cache entries for {segment}");
        removed
    }

    pub async fn clear_all(&self) -> usize {
        let removed = self.remove_matching(|_, _, _| true).await;
        log::info!("Cleared all {removed} cache entries");
        removed
    }

    /// Remove entries failing the validity check (age, expiry, version, corruption)
    /// and temp files of writes that never completed
    pub async fn cleanup(&self) -> usize {
        let now = unix_now_ms();
        let mut removed = 0;
        match self.config.backend {
            CacheBackend::Memory => {
                let mut memory = self.lock_memory();
                let stale: Vec<String> = memory
                    .iter()
                    .filter(|(_, entry)| !entry.is_valid(now, self.config.max_age, self.config.version))
                    .map(|(id, _)| id.clone())
                    .collect();
                for id in stale {
                    memory.pop(&id);
                    removed += 1;
                }
            }
            CacheBackend::File => {
                for file in self.list_files().await {
                    let valid = match fs::read(&file.path).await {
                        Ok(bytes) => serde_json::from_slice::<CacheEntry>(&bytes)
                            .map(|entry| entry.is_valid(now, self.config.max_age, self.config.version))
                            .unwrap_or(false),
                        Err(_) => false,
                    };
                    if !valid && remove_file_logged(&file.path).await {
                        removed += 1;
                    }
                }
                for tmp in self.stray_temp_files().await {
                    if remove_file_logged(&tmp).await {
                        removed += 1;
                    }
                }
            }
        }
        if removed > 0 {
            log::info!("Cache cleanup removed {removed} entries");
        }
        removed
    }

    pub async fn stats(&self) -> CacheStats {
        let now = unix_now_ms();
        let mut stats = CacheStats::default();
        let mut ages: Vec<u64> = Vec::new();

        match self.config.backend {
            CacheBackend::Memory => {
                let memory = self.lock_memory();
                for (id, entry) in memory.iter() {
                    stats.entry_count += 1;
                    stats.total_bytes += serde_json::to_vec(entry).map_or(0, |b| b.len() as u64);
                    if let Some((language, _, _)) = split_storage_id(id) {
                        *stats.by_language.entry(language.to_string()).or_default() += 1;
                    }
                    ages.push(entry.age_ms(now));
                }
            }
            CacheBackend::File => {
                for file in self.list_files().await {
                    let Ok(bytes) = fs::read(&file.path).await else {
                        continue;
                    };
                    stats.entry_count += 1;
                    stats.total_bytes += bytes.len() as u64;
                    if let Some((language, _, _)) = split_storage_id(&file.id) {
                        *stats.by_language.entry(language.to_string()).or_default() += 1;
                    }
                    if let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) {
                        ages.push(entry.age_ms(now));
                    }
                }
            }
        }

        stats.oldest_entry_age_ms = ages.iter().copied().max();
        stats.newest_entry_age_ms = ages.iter().copied().min();
        stats.hits = self.hits.load(Ordering::Relaxed);
        stats.misses = self.misses.load(Ordering::Relaxed);
        stats.preemptive_hits = self.preemptive_hits.load(Ordering::Relaxed);
        let lookups = stats.hits + stats.misses;
        stats.hit_rate = if lookups == 0 {
            0.0
        } else {
            stats.hits as f64 / lookups as f64
        };
        stats
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_memory(&self) -> MutexGuard<'_, LruCache<String, CacheEntry>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn entry_path(&self, id: &str) -> PathBuf {
        self.config.dir.join(format!("{id}.json"))
    }

    async fn read_entry(&self, id: &str) -> Option<CacheEntry> {
        match self.config.backend {
            CacheBackend::Memory => {
                let entry = self.lock_memory().get(id).cloned();
                entry
            }
            CacheBackend::File => {
                let path = self.entry_path(id);
                let bytes = match fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
                    Err(e) => {
                        log::warn!("Cache read failed {}: {e}", path.display());
                        return None;
                    }
                };
                match serde_json::from_slice(&bytes) {
                    Ok(entry) => Some(entry),
                    Err(err) => {
                        log::warn!("Cache entry corrupted {}: {err}", path.display());
                        remove_file_logged(&path).await;
                        None
                    }
                }
            }
        }
    }

    async fn remove_entry(&self, id: &str) {
        match self.config.backend {
            CacheBackend::Memory => {
                self.lock_memory().pop(id);
            }
            CacheBackend::File => {
                remove_file_logged(&self.entry_path(id)).await;
            }
        }
    }

    /// Temp file + rename so readers never observe a partial entry
    async fn write_file(&self, id: &str, entry: &CacheEntry) -> Result<()> {
        let path = self.entry_path(id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec(entry)?;
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("json.{}.{n}.{TMP_SUFFIX}", std::process::id()));

        self.lock_in_flight().insert(tmp.clone());
        let written = match fs::write(&tmp, bytes).await {
            Ok(()) => fs::rename(&tmp, &path).await,
            Err(e) => Err(e),
        };
        self.lock_in_flight().remove(&tmp);

        if let Err(e) = written {
            remove_file_logged(&tmp).await;
            return Err(CacheError::Io(e));
        }
        Ok(())
    }

    /// Remove entries whose (language, repo segment, file name) match
    async fn remove_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&str, &str, &str) -> bool,
    {
        match self.config.backend {
            CacheBackend::Memory => {
                let mut memory = self.lock_memory();
                let doomed: Vec<String> = memory
                    .iter()
                    .map(|(id, _)| id)
                    .filter(|id| {
                        split_storage_id(id)
                            .is_some_and(|(lang, seg, name)| predicate(lang, seg, name))
                    })
                    .cloned()
                    .collect();
                for id in &doomed {
                    memory.pop(id);
                }
                doomed.len()
            }
            CacheBackend::File => {
                let mut removed = 0;
                for file in self.list_files().await {
                    let matches = split_storage_id(&file.id)
                        .is_some_and(|(lang, seg, name)| predicate(lang, seg, name));
                    if matches && remove_file_logged(&file.path).await {
                        removed += 1;
                    }
                }
                removed
            }
        }
    }

    /// `(language, segment, dir)` of every `<dir>/<language>/<branch>-<commit>/`
    async fn segment_dirs(&self) -> Vec<(String, String, PathBuf)> {
        let mut out = Vec::new();
        for language_dir in list_dir(&self.config.dir, true).await {
            let Some(language) = file_name(&language_dir) else {
                continue;
            };
            for segment_dir in list_dir(&language_dir, true).await {
                let Some(segment) = file_name(&segment_dir) else {
                    continue;
                };
                out.push((language.clone(), segment, segment_dir));
            }
        }
        out
    }

    /// `<dir>/<language>/<branch>-<commit>/<file>.json`, temp files excluded
    async fn list_files(&self) -> Vec<StoredFile> {
        let mut out = Vec::new();
        for (language, segment, segment_dir) in self.segment_dirs().await {
            for path in list_dir(&segment_dir, false).await {
                let Some(name) = file_name(&path) else {
                    continue;
                };
                let Some(stem) = name.strip_suffix(".json") else {
                    continue;
                };
                out.push(StoredFile {
                    id: format!("{language}/{segment}/{stem}"),
                    path,
                });
            }
        }
        out
    }

    /// Temp files left behind by interrupted writes
    async fn stray_temp_files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for (_, _, segment_dir) in self.segment_dirs().await {
            for path in list_dir(&segment_dir, false).await {
                let is_tmp = path.extension().is_some_and(|ext| ext == TMP_SUFFIX);
                if is_tmp && !self.lock_in_flight().contains(&path) {
                    out.push(path);
                }
            }
        }
        out
    }
}

async fn list_dir(dir: &Path, want_dirs: bool) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(mut entries) = fs::read_dir(dir).await else {
        return out;
    };
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => {
                let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
                if is_dir == want_dirs {
                    out.push(entry.path());
                }
            }
            Ok(None) => break,
            Err(e) => {
                log::warn!("Cache directory scan failed {}: {e}", dir.display());
                break;
            }
        }
    }
    out
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().to_string())
}

async fn remove_file_logged(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            log::warn!("Cache entry removal failed {}: {e}", path.display());
            false
        }
    }
}

pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}
