//! # Context Invalidation
//!
//! Turns a stream of file-change events into cache and context invalidation.
//!
//! ```text
//! ChangeEvent ─► mpsc ─► DebounceState ─► Batch ─► InvalidationPlan (critical/high/medium/low)
//!                                                        │
//!                          ┌─────────────────────────────┤
//!                          ▼                             ▼
//!                 CacheManager::invalidate_path   Invalidator ─► ContextRegistry
//!                                                        │
//!                                         broadcast<ContextInvalidated>
//! ```
//!
//! One task owns the debounce timer, so batches never interleave. Idle gaps
//! are used to re-analyze likely-next files through a [`PreemptiveAnalyzer`];
//! those entries are short-lived and only ever save work.

mod config;
mod debounce;
mod error;
mod impact;
mod invalidator;
mod metrics;
mod pipeline;
mod preemptive;
mod registry;

pub use config::{
    InvalidationConfig, DEFAULT_DEBOUNCE, DEFAULT_MAX_CONCURRENT_ANALYSIS, DEFAULT_MAX_DEBOUNCE,
    DEFAULT_RAPID_CHANGE_THRESHOLD,
};
pub use debounce::{Batch, DebounceState};
pub use error::{InvalidationError, Result};
pub use impact::{classify_path, ImpactTier, InvalidationPlan, InvalidationStrategy, PlanGroup};
pub use invalidator::{
    select_invalidator, ConservativeInvalidator, GraphHandle, Invalidator, PreciseInvalidator,
};
pub use metrics::InvalidationMetrics;
pub use pipeline::{ContextInvalidated, InvalidationDeps, InvalidationHandle};
pub use preemptive::{PreemptiveAnalyzer, PreemptiveCandidate, PreemptiveQueue};
pub use registry::{
    ContextId, ContextRegistry, ContextTicket, InvalidatedContext, RegisteredContext, RegistryEpoch,
};
