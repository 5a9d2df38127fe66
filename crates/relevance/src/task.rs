use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub const UNKNOWN: &str = "unknown";

static WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-z0-9_]+").unwrap_or_else(|e| unreachable!("word pattern: {e}")));

/// Short terms that are still meaningful keywords
const TECH_TERMS: &[&str] = &[
    "api", "auth", "authentication", "authorization", "login", "logout", "session", "token", "jwt",
    "oauth", "password", "user", "database", "db", "sql", "orm", "query", "cache", "redis", "http",
    "rest", "graphql", "endpoint", "route", "router", "middleware", "component", "hook", "state",
    "store", "form", "validation", "css", "ui", "ux", "modal", "layout", "render", "server",
    "client", "socket", "websocket", "event", "queue", "worker", "job", "email", "payment",
    "upload", "search", "index", "log", "logging", "schema", "model", "controller", "service",
    "parser", "cli", "io", "ci", "js", "ts", "py", "go",
];

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "into", "onto", "when", "where", "which",
    "what", "who", "why", "how", "should", "would", "could", "must", "have", "has", "had", "been",
    "are", "was", "were", "will", "not", "but", "all", "any", "can", "our", "your", "their", "its",
    "there", "then", "than", "also", "some", "more", "most", "very", "just", "only", "about",
    "after", "before", "over", "under", "please", "make", "sure", "need", "needs", "want", "use",
    "using", "via", "per", "each", "every", "other", "same", "such", "like", "into", "out",
];

/// Verbs that carry intent but never name code
const INTENT_WORDS: &[&str] = &[
    "fix", "bug", "bugs", "add", "create", "implement", "update", "change", "modify", "refactor",
    "issue", "problem", "write", "improve", "new",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Create,
    Fix,
    Modify,
    Refactor,
    Test,
    General,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Create => "create",
            Intent::Fix => "fix",
            Intent::Modify => "modify",
            Intent::Refactor => "refactor",
            Intent::Test => "test",
            Intent::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Feature,
    Bugfix,
    Refactoring,
    Testing,
    Documentation,
    Performance,
    Security,
    General,
}

impl TaskType {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskType::Feature => "feature",
            TaskType::Bugfix => "bugfix",
            TaskType::Refactoring => "refactoring",
            TaskType::Testing => "testing",
            TaskType::Documentation => "documentation",
            TaskType::Performance => "performance",
            TaskType::Security => "security",
            TaskType::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

const INTENTS: &[(Intent, &[&str])] = &[
    (
        Intent::Create,
        &["create", "add", "implement", "build", "new", "introduce", "generate"],
    ),
    (
        Intent::Fix,
        &["fix", "bug", "bugs", "error", "issue", "broken", "crash", "fail", "failing", "repair"],
    ),
    (
        Intent::Modify,
        &["update", "change", "modify", "adjust", "improve", "enhance", "extend"],
    ),
    (
        Intent::Refactor,
        &["refactor", "restructure", "cleanup", "reorganize", "simplify", "extract", "rename"],
    ),
    (
        Intent::Test,
        &["test", "tests", "testing", "spec", "coverage", "unit", "integration"],
    ),
];

const TASK_TYPES: &[(TaskType, &[&str])] = &[
    (
        TaskType::Feature,
        &["feature", "add", "create", "implement", "new", "build", "introduce"],
    ),
    (
        TaskType::Bugfix,
        &["fix", "bug", "bugs", "error", "issue", "crash", "broken", "regression"],
    ),
    (
        TaskType::Refactoring,
        &["refactor", "refactoring", "restructure", "cleanup", "reorganize", "simplify"],
    ),
    (
        TaskType::Testing,
        &["test", "tests", "testing", "coverage", "mock", "fixture"],
    ),
    (
        TaskType::Documentation,
        &["doc", "docs", "documentation", "readme", "comment", "comments", "guide"],
    ),
    (
        TaskType::Performance,
        &["performance", "slow", "optimize", "optimization", "speed", "latency", "memory"],
    ),
    (
        TaskType::Security,
        &["security", "secure", "vulnerability", "xss", "csrf", "injection", "encryption"],
    ),
];

const LANGUAGES: &[(&str, &[&str])] = &[
    ("typescript", &["typescript", "ts", "tsx", "angular"]),
    ("javascript", &["javascript", "js", "jsx", "node", "nodejs", "npm"]),
    ("python", &["python", "py", "django", "flask", "fastapi", "pandas", "pip"]),
    ("rust", &["rust", "cargo", "tokio", "crate"]),
    ("go", &["golang", "go", "goroutine"]),
    ("java", &["java", "spring", "maven", "gradle"]),
    ("ruby", &["ruby", "rails", "gem"]),
];

const FRAMEWORKS: &[(&str, &[&str])] = &[
    ("react", &["react", "jsx", "hook", "hooks", "redux", "usestate", "useeffect"]),
    ("nextjs", &["next", "nextjs"]),
    ("vue", &["vue", "vuex", "nuxt", "pinia"]),
    ("angular", &["angular", "ngrx", "rxjs"]),
    ("express", &["express", "middleware"]),
    ("django", &["django"]),
    ("flask", &["flask", "blueprint"]),
    ("fastapi", &["fastapi", "pydantic"]),
    ("spring", &["spring", "springboot"]),
    ("rails", &["rails", "activerecord"]),
    ("tokio", &["tokio", "async"]),
];

const FOCUS_AREAS: &[(&str, &[&str])] = &[
    (
        "authentication",
        &["auth", "authentication", "authorization", "login", "logout", "session", "password", "oauth", "jwt", "token"],
    ),
    (
        "database",
        &["database", "db", "sql", "query", "schema", "migration", "model", "orm"],
    ),
    (
        "api",
        &["api", "endpoint", "rest", "graphql", "route", "router", "http", "request", "response"],
    ),
    (
        "ui",
        &["ui", "ux", "component", "button", "modal", "layout", "style", "css", "render", "page", "view"],
    ),
    ("state", &["state", "store", "redux", "context", "reducer"]),
    ("testing", &["test", "tests", "testing", "mock", "coverage", "fixture"]),
    (
        "performance",
        &["performance", "slow", "optimize", "cache", "latency", "memory"],
    ),
    (
        "security",
        &["security", "vulnerability", "xss", "csrf", "injection", "encryption", "permission"],
    ),
    ("configuration", &["config", "configuration", "settings", "env", "environment"]),
    ("messaging", &["event", "queue", "worker", "job", "socket", "websocket", "email"]),
];

const HIGH_COMPLEXITY: &[&str] = &[
    "complex", "architecture", "system", "migrate", "migration", "redesign", "distributed",
    "scalable", "scale", "concurrency", "concurrent", "integrate", "integration", "overhaul",
    "multiple", "rewrite",
];

const LOW_COMPLEXITY: &[&str] = &[
    "simple", "typo", "small", "minor", "quick", "tweak", "trivial", "label", "text", "color",
    "wording", "rename",
];

/// One unit of work requested by the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub details: String,
}

impl TaskDescriptor {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Non-empty title/description/details of every task, one per line
pub fn combined_text(tasks: &[TaskDescriptor]) -> String {
    tasks
        .iter()
        .flat_map(|t| [t.title.as_str(), t.description.as_str(), t.details.as_str()])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskAnalysis {
    /// Deduplicated, in order of first appearance
    pub keywords: Vec<String>,
    pub intent: Intent,
    pub task_type: TaskType,
    /// Language name or `unknown`
    pub language: String,
    /// Framework name or `unknown`
    pub framework: String,
    pub complexity: ComplexityLevel,
    pub focus_areas: BTreeSet<String>,
}

impl TaskAnalysis {
    pub fn analyze(text: &str) -> Self {
        let lowered = text.to_lowercase();
        let tokens: Vec<String> = WORD_RE
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect();

        let focus_areas: BTreeSet<String> = FOCUS_AREAS
            .iter()
            .filter(|(_, words)| tokens.iter().any(|t| words.contains(&t.as_str())))
            .map(|(area, _)| (*area).to_string())
            .collect();

        Self {
            keywords: extract_keywords(&tokens),
            intent: best_match(&tokens, INTENTS).unwrap_or(Intent::General),
            task_type: best_match(&tokens, TASK_TYPES).unwrap_or(TaskType::General),
            language: best_match(&tokens, LANGUAGES).unwrap_or(UNKNOWN).to_string(),
            framework: best_match(&tokens, FRAMEWORKS).unwrap_or(UNKNOWN).to_string(),
            complexity: estimate_complexity(&tokens, focus_areas.len()),
            focus_areas,
        }
    }

    pub fn from_tasks(tasks: &[TaskDescriptor]) -> Self {
        Self::analyze(&combined_text(tasks))
    }

    pub fn has_language(&self) -> bool {
        self.language != UNKNOWN
    }

    pub fn has_framework(&self) -> bool {
        self.framework != UNKNOWN
    }
}

fn extract_keywords(tokens: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut keywords = Vec::new();
    let mut push = |word: &str, keywords: &mut Vec<String>| {
        if seen.insert(word.to_string()) {
            keywords.push(word.to_string());
        }
    };

    for token in tokens {
        let token = token.as_str();
        if STOPWORDS.contains(&token) || INTENT_WORDS.contains(&token) {
            continue;
        }
        if TECH_TERMS.contains(&token) || is_identifier_shaped(token) {
            push(token, &mut keywords);
        }
        // snake_case identifiers also contribute their parts
        if token.contains('_') {
            for part in token.split('_') {
                if TECH_TERMS.contains(&part) || is_identifier_shaped(part) {
                    push(part, &mut keywords);
                }
            }
        }
    }
    keywords
}

fn is_identifier_shaped(word: &str) -> bool {
    word.len() >= 3
        && word.starts_with(|c: char| c.is_ascii_alphabetic())
        && !STOPWORDS.contains(&word)
        && !INTENT_WORDS.contains(&word)
}

/// Label with the most vocabulary hits; `None` when nothing matched or the
/// top count is shared
fn best_match<T: Copy>(tokens: &[String], table: &[(T, &[&str])]) -> Option<T> {
    let mut best: Option<(T, usize)> = None;
    let mut tied = false;
    for (label, words) in table {
        let hits = tokens
            .iter()
            .filter(|t| words.contains(&t.as_str()))
            .count();
        if hits == 0 {
            continue;
        }
        match best {
            Some((_, count)) if hits < count => {}
            Some((_, count)) if hits == count => tied = true,
            _ => {
                best = Some((*label, hits));
                tied = false;
            }
        }
    }
    if tied {
        None
    } else {
        best.map(|(label, _)| label)
    }
}

fn estimate_complexity(tokens: &[String], focus_area_count: usize) -> ComplexityLevel {
    let high = tokens
        .iter()
        .filter(|t| HIGH_COMPLEXITY.contains(&t.as_str()))
        .count();
    let low = tokens
        .iter()
        .filter(|t| LOW_COMPLEXITY.contains(&t.as_str()))
        .count();
    let spread = usize::from(focus_area_count >= 3);
    match (high + spread).cmp(&low) {
        std::cmp::Ordering::Greater => ComplexityLevel::High,
        std::cmp::Ordering::Less => ComplexityLevel::Low,
        std::cmp::Ordering::Equal => ComplexityLevel::Medium,
    }
}
