//! # Context Protocol
//!
//! Data model shared by every code-intelligence crate: parsed file records,
//! change events from the watcher and the repository head state.
//!
//! Records are produced by language-specific parsers outside this workspace;
//! the analyzers only read them.

mod event;
mod language;
mod record;
mod repo;

pub use event::{ChangeEvent, ChangeType};
pub use language::Language;
pub use record::{
    content_hash, is_config_path, is_test_path, normalize_path, ClassSymbol, ExportRecord,
    FileRecord, FunctionSymbol, ImportRecord, RecordError,
};
pub use repo::{sanitize_segment, RepoState, UNKNOWN_REF};

/// Rough token estimate used for budgeting (about four characters per token)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::estimate_tokens;

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
        assert_eq!(estimate_tokens("abcdefghi"), 3);
    }
}
