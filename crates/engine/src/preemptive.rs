use crate::analysis::{compute_payload, resolve_repo_state};
use crate::source::SourceProvider;
use async_trait::async_trait;
use context_cache::{derive_key, AnalysisKind, CacheManager};
use context_invalidation::{InvalidationError, PreemptiveAnalyzer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Warms the cache with short-lived analyses of likely-next files. Kinds
/// already cached are left alone.
pub struct EngineSourceAnalyzer {
    cache: Arc<CacheManager>,
    source: Arc<dyn SourceProvider>,
    repo_root: Option<PathBuf>,
}

impl EngineSourceAnalyzer {
    pub fn new(
        cache: Arc<CacheManager>,
        source: Arc<dyn SourceProvider>,
        repo_root: Option<PathBuf>,
    ) -> Self {
        Self {
            cache,
            source,
            repo_root,
        }
    }
}

#[async_trait]
impl PreemptiveAnalyzer for EngineSourceAnalyzer {
    async fn warm(&self, path: &str, ttl: Duration) -> context_invalidation::Result<usize> {
        let failed = |reason: String| InvalidationError::Preemptive {
            path: path.to_string(),
            reason,
        };

        let record = self
            .source
            .load(path)
            .await
            .map_err(|e| failed(e.to_string()))?;
        record.validate().map_err(|e| failed(e.to_string()))?;
        let repo = resolve_repo_state(self.repo_root.as_deref()).await;
        let key = derive_key(&record, &repo);

        let mut written = 0;
        for kind in AnalysisKind::ALL {
            if self.cache.has(&key, kind).await {
                continue;
            }
            let payload = compute_payload(&record, kind).map_err(|e| failed(e.to_string()))?;
            match self.cache.put_with_ttl(&key, payload, ttl).await {
                Ok(()) => written += 1,
                Err(e) => log::warn!("Preemptive write for {path} skipped: {e}"),
            }
        }
        Ok(written)
    }
}
