use anyhow::{Context, Result};
use context_cache::{CacheBackend, CacheConfig};
use context_invalidation::InvalidationConfig;
use context_relevance::ContextBudget;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CACHE_MAX_AGE_SECS: &str = "CONTEXT_CACHE_MAX_AGE_SECS";
pub const ENV_CACHE_BACKEND: &str = "CONTEXT_CACHE_BACKEND";
pub const ENV_ANALYSIS_CONCURRENCY: &str = "CONTEXT_ANALYSIS_CONCURRENCY";
pub const ENV_DEBOUNCE_MS: &str = "CONTEXT_DEBOUNCE_MS";
pub const ENV_SMART_INVALIDATION: &str = "CONTEXT_SMART_INVALIDATION";

const MAX_CACHE_AGE_SECS: u64 = 30 * 24 * 60 * 60;
const MAX_ANALYSIS_CONCURRENCY: usize = 32;
const MIN_DEBOUNCE_MS: u64 = 50;
const MAX_DEBOUNCE_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub dir: PathBuf,
    pub backend: CacheBackend,
    pub max_age_secs: u64,
    /// Entry bound of the memory backend
    pub capacity: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::with_defaults();
        Self {
            dir: defaults.dir,
            backend: defaults.backend,
            max_age_secs: defaults.max_age.as_secs(),
            capacity: defaults.capacity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    /// Files analyzed concurrently per request
    pub concurrency: usize,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            concurrency: context_invalidation::DEFAULT_MAX_CONCURRENT_ANALYSIS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvalidationSettings {
    pub debounce_ms: u64,
    pub max_debounce_ms: u64,
    pub rapid_change_threshold: usize,
    pub max_concurrent_analysis: usize,
    pub smart_invalidation: bool,
    pub preemptive_analysis: bool,
    pub preemptive_ttl_secs: u64,
    pub idle_threshold_ms: u64,
}

impl Default for InvalidationSettings {
    fn default() -> Self {
        let defaults = InvalidationConfig::default();
        Self {
            debounce_ms: millis(defaults.debounce),
            max_debounce_ms: millis(defaults.max_debounce),
            rapid_change_threshold: defaults.rapid_change_threshold,
            max_concurrent_analysis: defaults.max_concurrent_analysis,
            smart_invalidation: defaults.smart_invalidation,
            preemptive_analysis: defaults.preemptive_analysis,
            preemptive_ttl_secs: defaults.preemptive_ttl.as_secs(),
            idle_threshold_ms: millis(defaults.idle_threshold),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub max_tokens: usize,
    pub max_files: usize,
}

impl Default for ContextSettings {
    fn default() -> Self {
        let budget = ContextBudget::default();
        Self {
            max_tokens: budget.max_tokens,
            max_files: budget.max_files,
        }
    }
}

/// Engine configuration, loadable from TOML with environment overrides.
///
/// ```toml
/// repo_root = "."
///
/// [cache]
/// backend = "file"
/// dir = ".context/cache"
/// max_age_secs = 86400
///
/// [invalidation]
/// debounce_ms = 500
/// smart_invalidation = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Git checkout probed for branch/commit; `None` keys everything as `unknown`
    pub repo_root: Option<PathBuf>,
    pub cache: CacheSettings,
    pub analysis: AnalysisSettings,
    pub invalidation: InvalidationSettings,
    pub context: ContextSettings,
}

impl EngineConfig {
    /// In-memory cache, suitable for tests and short-lived hosts
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.cache.backend = CacheBackend::Memory;
        config
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).context("Invalid engine configuration")?;
        Ok(config.normalized())
    }

    /// Reads `path`, then applies `CONTEXT_*` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Same as [`apply_env_overrides`](Self::apply_env_overrides) over an
    /// arbitrary lookup. Unparsable values keep the current setting.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };

        if let Some(raw) = read(ENV_CACHE_MAX_AGE_SECS) {
            match raw.parse::<u64>() {
                Ok(secs) => self.cache.max_age_secs = secs,
                Err(_) => log::warn!("Ignoring {ENV_CACHE_MAX_AGE_SECS}={raw}"),
            }
        }
        if let Some(raw) = read(ENV_CACHE_BACKEND) {
            match CacheBackend::parse(&raw) {
                Some(backend) => self.cache.backend = backend,
                None => log::warn!("Ignoring {ENV_CACHE_BACKEND}={raw}"),
            }
        }
        if let Some(raw) = read(ENV_ANALYSIS_CONCURRENCY) {
            match raw.parse::<usize>() {
                Ok(n) => self.analysis.concurrency = n,
                Err(_) => log::warn!("Ignoring {ENV_ANALYSIS_CONCURRENCY}={raw}"),
            }
        }
        if let Some(raw) = read(ENV_DEBOUNCE_MS) {
            match raw.parse::<u64>() {
                Ok(ms) => self.invalidation.debounce_ms = ms,
                Err(_) => log::warn!("Ignoring {ENV_DEBOUNCE_MS}={raw}"),
            }
        }
        if let Some(raw) = read(ENV_SMART_INVALIDATION) {
            match parse_flag(&raw) {
                Some(flag) => self.invalidation.smart_invalidation = flag,
                None => log::warn!("Ignoring {ENV_SMART_INVALIDATION}={raw}"),
            }
        }

        *self = std::mem::take(self).normalized();
    }

    fn normalized(mut self) -> Self {
        self.cache.max_age_secs = self.cache.max_age_secs.clamp(1, MAX_CACHE_AGE_SECS);
        self.cache.capacity = self.cache.capacity.max(1);
        self.analysis.concurrency = self.analysis.concurrency.clamp(1, MAX_ANALYSIS_CONCURRENCY);
        let inv = &mut self.invalidation;
        inv.debounce_ms = inv.debounce_ms.clamp(MIN_DEBOUNCE_MS, MAX_DEBOUNCE_MS);
        inv.max_debounce_ms = inv.max_debounce_ms.clamp(inv.debounce_ms, MAX_DEBOUNCE_MS * 4);
        inv.rapid_change_threshold = inv.rapid_change_threshold.max(1);
        inv.max_concurrent_analysis = inv
            .max_concurrent_analysis
            .clamp(1, MAX_ANALYSIS_CONCURRENCY);
        self
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            dir: self.cache.dir.clone(),
            max_age: Duration::from_secs(self.cache.max_age_secs),
            backend: self.cache.backend,
            capacity: self.cache.capacity,
            ..CacheConfig::with_defaults()
        }
    }

    pub fn invalidation_config(&self) -> InvalidationConfig {
        let inv = &self.invalidation;
        InvalidationConfig {
            debounce: Duration::from_millis(inv.debounce_ms),
            max_debounce: Duration::from_millis(inv.max_debounce_ms),
            rapid_change_threshold: inv.rapid_change_threshold,
            max_concurrent_analysis: inv.max_concurrent_analysis,
            smart_invalidation: inv.smart_invalidation,
            preemptive_analysis: inv.preemptive_analysis,
            preemptive_ttl: Duration::from_secs(inv.preemptive_ttl_secs),
            idle_threshold: Duration::from_millis(inv.idle_threshold_ms),
            ..InvalidationConfig::default()
        }
    }

    pub fn budget(&self) -> ContextBudget {
        ContextBudget::new(self.context.max_tokens, self.context.max_files)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
