//! # Context Cache
//!
//! Content-addressed store of per-file analysis results.
//!
//! Keys combine language, repository head (branch + commit) and the path and
//! content hashes of the analyzed file, so a content edit or a checkout lands
//! on a fresh key instead of a stale entry. Entries carry a format version and
//! a creation time; anything older than the configured max age, past its own
//! expiry or written by another format version reads as a miss.
//!
//! Two backends share one storage-id layout:
//! `<language>/<branch>-<commit>/<pathHash>-<contentHash>.<kind>`
//! (plus `.json` on disk). Clearing a repository state is a scan of the second
//! segment.

mod entry;
mod error;
mod key;
mod manager;
mod repo;

pub use entry::{AnalysisKind, AnalysisPayload, CacheEntry, EntryOrigin};
pub use error::{CacheError, Result};
pub use key::{derive_key, path_hash, CacheKey};
pub use manager::{
    CacheBackend, CacheConfig, CacheLookup, CacheManager, CacheStats, CACHE_FORMAT_VERSION,
};
pub use repo::probe_repo_state;
