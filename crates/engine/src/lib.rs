//! # Context Engine
//!
//! Host-facing facade: configuration, logging setup and the request
//! pipeline that ties the cache, the analyzers, selection and invalidation
//! together.
//!
//! ```text
//! build_context(tasks, records)
//!   ├─► per-file analyses (deps, complexity, profile) via CacheManager::get_or_compute
//!   ├─► DependencyMapper::assemble ─► GraphHandle (shared with invalidation)
//!   ├─► ContextBuilder::select
//!   └─► ContextRegistry::register ─► BuiltContext { ticket, context }
//!
//! submit_change(event) ─► InvalidationHandle ─► stale tickets + ContextInvalidated
//! ```

mod analysis;
mod config;
mod engine;
mod error;
mod logging;
mod preemptive;
mod source;

pub use analysis::{analyze_file, compute_payload, resolve_repo_state, FileAnalysis};
pub use config::{
    AnalysisSettings, CacheSettings, ContextSettings, EngineConfig, InvalidationSettings,
    ENV_ANALYSIS_CONCURRENCY, ENV_CACHE_BACKEND, ENV_CACHE_MAX_AGE_SECS, ENV_DEBOUNCE_MS,
    ENV_SMART_INVALIDATION,
};
pub use engine::{BuiltContext, ContextEngine};
pub use error::{EngineError, Result};
pub use logging::init_logging;
pub use preemptive::EngineSourceAnalyzer;
pub use source::{FsSourceProvider, SourceProvider};
