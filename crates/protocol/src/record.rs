use crate::language::Language;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Why a record could not be used for analysis
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("record has an empty path")]
    EmptyPath,

    #[error("record path must be repo-relative: {0}")]
    AbsolutePath(String),

    #[error("{path}: symbol `{symbol}` spans lines {start}-{end} outside the file ({lines} lines)")]
    SymbolOutOfRange {
        path: String,
        symbol: String,
        start: usize,
        end: usize,
        lines: usize,
    },
}

/// A function or method extracted by the language parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSymbol {
    pub name: String,

    /// Line range (1-indexed, inclusive)
    pub start_line: usize,
    pub end_line: usize,

    pub parameter_count: usize,

    #[serde(default)]
    pub is_exported: bool,

    #[serde(default)]
    pub is_async: bool,

    /// Decorators / attributes attached to the definition
    #[serde(default)]
    pub decorators: Vec<String>,
}

impl FunctionSymbol {
    pub fn new(name: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            name: name.into(),
            start_line,
            end_line,
            parameter_count: 0,
            is_exported: false,
            is_async: false,
            decorators: Vec::new(),
        }
    }

    #[must_use]
    pub const fn with_parameters(mut self, count: usize) -> Self {
        self.parameter_count = count;
        self
    }

    #[must_use]
    pub const fn exported(mut self) -> Self {
        self.is_exported = true;
        self
    }

    #[must_use]
    pub const fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

/// A class / struct / interface extracted by the language parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSymbol {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,

    #[serde(default)]
    pub extends: Option<String>,

    #[serde(default)]
    pub implements: Vec<String>,

    #[serde(default)]
    pub is_exported: bool,
}

impl ClassSymbol {
    pub fn new(name: impl Into<String>, start_line: usize, end_line: usize) -> Self {
        Self {
            name: name.into(),
            start_line,
            end_line,
            extends: None,
            implements: Vec::new(),
            is_exported: false,
        }
    }

    #[must_use]
    pub fn extending(mut self, base: impl Into<String>) -> Self {
        self.extends = Some(base.into());
        self
    }

    #[must_use]
    pub const fn exported(mut self) -> Self {
        self.is_exported = true;
        self
    }

    /// Does `function` sit inside this class body?
    pub const fn contains(&self, function: &FunctionSymbol) -> bool {
        function.start_line >= self.start_line && function.end_line <= self.end_line
    }
}

/// An import statement as written in the source (`./auth`, `react`, `.models`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub source: String,

    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default)]
    pub line: usize,
}

impl ImportRecord {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            names: Vec::new(),
            line: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub name: String,

    #[serde(default)]
    pub line: usize,
}

/// Parsed view of one file. Produced by the external parser, never mutated:
/// a content change produces a new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Repo-relative path with `/` separators
    pub path: String,
    pub language: Language,
    pub content_hash: String,
    pub size_bytes: u64,
    pub modified_unix_ms: u64,
    pub is_test: bool,
    pub is_config: bool,

    #[serde(default)]
    pub content: String,

    #[serde(default)]
    pub functions: Vec<FunctionSymbol>,

    #[serde(default)]
    pub classes: Vec<ClassSymbol>,

    #[serde(default)]
    pub imports: Vec<ImportRecord>,

    #[serde(default)]
    pub exports: Vec<ExportRecord>,
}

impl FileRecord {
    /// Build a record from raw content, deriving hash, size, language and flags.
    /// Symbols are left empty for the caller (or parser) to fill in.
    pub fn from_source(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = normalize_path(&path.into());
        let content = content.into();
        Self {
            language: Language::from_path(&path),
            content_hash: content_hash(&content),
            size_bytes: content.len() as u64,
            modified_unix_ms: unix_now_ms(),
            is_test: is_test_path(&path),
            is_config: is_config_path(&path),
            path,
            content,
            functions: Vec::new(),
            classes: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_functions(mut self, functions: Vec<FunctionSymbol>) -> Self {
        self.functions = functions;
        self
    }

    #[must_use]
    pub fn with_classes(mut self, classes: Vec<ClassSymbol>) -> Self {
        self.classes = classes;
        self
    }

    #[must_use]
    pub fn with_imports<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.imports = sources.into_iter().map(ImportRecord::new).collect();
        self
    }

    #[must_use]
    pub fn with_exports<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exports = names
            .into_iter()
            .map(|name| ExportRecord {
                name: name.into(),
                line: 0,
            })
            .collect();
        self
    }

    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }

    /// Lines `start..=end` (1-indexed), clamped to the file
    pub fn line_slice(&self, start_line: usize, end_line: usize) -> Vec<&str> {
        let start = start_line.max(1) - 1;
        let end = end_line.max(start_line);
        self.content.lines().skip(start).take(end - start).collect()
    }

    pub fn estimated_tokens(&self) -> usize {
        crate::estimate_tokens(&self.content)
    }

    /// Reject records the analyzers cannot interpret
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.path.trim().is_empty() {
            return Err(RecordError::EmptyPath);
        }
        if self.path.starts_with('/') || self.path.contains(":\\") {
            return Err(RecordError::AbsolutePath(self.path.clone()));
        }
        let lines = self.line_count();
        let spans = self
            .functions
            .iter()
            .map(|f| (&f.name, f.start_line, f.end_line))
            .chain(
                self.classes
                    .iter()
                    .map(|c| (&c.name, c.start_line, c.end_line)),
            );
        for (name, start, end) in spans {
            if start == 0 || end < start || end > lines.max(1) {
                return Err(RecordError::SymbolOutOfRange {
                    path: self.path.clone(),
                    symbol: name.clone(),
                    start,
                    end,
                    lines,
                });
            }
        }
        Ok(())
    }
}

/// Hex SHA-256 of file content
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    to_hex(&digest)
}

pub(crate) fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Forward slashes, no leading `./`
pub fn normalize_path(path: &str) -> String {
    let replaced = path.trim().replace('\\', "/");
    replaced
        .strip_prefix("./")
        .map(str::to_string)
        .unwrap_or(replaced)
}

pub fn is_test_path(path: &str) -> bool {
    let lowered = path.to_lowercase();
    let file_name = lowered.rsplit('/').next().unwrap_or(&lowered);
    lowered.split('/').any(|segment| {
        matches!(
            segment,
            "test" | "tests" | "__tests__" | "spec" | "specs" | "__mocks__"
        )
    }) || file_name.contains(".test.")
        || file_name.contains(".spec.")
        || file_name.starts_with("test_")
        || file_name.ends_with("_test.go")
        || file_name.ends_with("_test.py")
        || file_name.ends_with("_test.rs")
}

pub fn is_config_path(path: &str) -> bool {
    let lowered = path.to_lowercase();
    let file_name = lowered.rsplit('/').next().unwrap_or(&lowered);
    file_name.contains(".config.")
        || file_name.starts_with(".eslintrc")
        || file_name.starts_with(".prettierrc")
        || file_name.starts_with(".babelrc")
        || file_name.starts_with("tsconfig")
        || matches!(
            file_name,
            "package.json"
                | "cargo.toml"
                | "pyproject.toml"
                | "setup.py"
                | "setup.cfg"
                | "requirements.txt"
                | "go.mod"
                | "pom.xml"
                | "build.gradle"
                | "makefile"
                | "dockerfile"
                | ".env"
                | ".env.example"
        )
}

pub(crate) fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
