use context_protocol::{estimate_tokens, FileRecord, Language};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Upper bound on a generated summary, about 200 tokens
pub const SUMMARY_MAX_CHARS: usize = 800;

/// Distinct content terms kept per profile, most frequent first
const MAX_TERMS: usize = 4096;

const SUMMARY_LIST_LIMIT: usize = 12;

static IDENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap_or_else(|e| unreachable!("ident pattern: {e}"))
});

/// (framework, package prefixes, content markers)
const FRAMEWORK_SIGNALS: &[(&str, &[&str], &[&str])] = &[
    ("react", &["react", "react-dom"], &["useState(", "useEffect(", "React."]),
    ("nextjs", &["next"], &["getServerSideProps", "getStaticProps"]),
    ("vue", &["vue", "nuxt"], &["defineComponent(", "<template>"]),
    ("angular", &["@angular"], &["@Component(", "@NgModule("]),
    ("express", &["express"], &["express()", "app.use("]),
    ("django", &["django"], &["models.Model"]),
    ("flask", &["flask"], &["Flask(__name__)"]),
    ("fastapi", &["fastapi"], &["FastAPI("]),
    ("spring", &["org.springframework"], &["@RestController", "@SpringBootApplication"]),
    ("rails", &["rails"], &["ActiveRecord::", "Rails."]),
    ("tokio", &["tokio"], &["#[tokio::main]"]),
];

/// Task-independent view of one file used for relevance scoring.
///
/// Cacheable alongside the other analyses: it depends only on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileProfile {
    pub path: String,
    pub path_lower: String,
    /// Alphanumeric runs of the lower-cased path
    pub path_terms: Vec<String>,
    pub language: Language,
    pub is_test: bool,
    pub is_config: bool,
    /// Lower-cased identifiers (and their camelCase/snake_case parts) with counts
    pub term_counts: BTreeMap<String, u32>,
    pub frameworks: Vec<String>,
    /// Imports, exports, functions and classes excerpt
    pub summary: String,
    pub token_estimate: usize,
    pub summary_tokens: usize,
}

impl FileProfile {
    pub fn from_record(record: &FileRecord) -> Self {
        let path_lower = record.path.to_lowercase();
        let path_terms = path_lower
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|term| !term.is_empty())
            .map(str::to_string)
            .collect();
        let summary = summarize(record);
        let summary_tokens = estimate_tokens(&summary);

        Self {
            path: record.path.clone(),
            path_lower,
            path_terms,
            language: record.language,
            is_test: record.is_test,
            is_config: record.is_config,
            term_counts: count_terms(&record.content),
            frameworks: detect_frameworks(record),
            summary,
            token_estimate: record.estimated_tokens(),
            summary_tokens,
        }
    }

    pub fn path_matches(&self, keyword: &str) -> bool {
        self.path_terms.iter().any(|term| term_matches(keyword, term))
    }

    /// Occurrences of content terms matching `keyword`
    pub fn occurrences(&self, keyword: &str) -> u32 {
        self.term_counts
            .iter()
            .filter(|(term, _)| term_matches(keyword, term))
            .map(|(_, count)| *count)
            .sum()
    }

    pub fn uses_framework(&self, framework: &str) -> bool {
        self.frameworks.iter().any(|f| f == framework)
    }
}

/// Equal, a prefix of at least four characters, or a shared stem
/// (`authenticate` / `authentication`).
pub fn term_matches(keyword: &str, term: &str) -> bool {
    if keyword == term {
        return true;
    }
    let (shorter, longer) = if keyword.len() <= term.len() {
        (keyword, term)
    } else {
        (term, keyword)
    };
    if shorter.len() >= 4 && longer.starts_with(shorter) {
        return true;
    }
    let common = shorter
        .bytes()
        .zip(longer.bytes())
        .take_while(|(a, b)| a == b)
        .count();
    common >= 6 && common + 2 >= shorter.len()
}

fn count_terms(content: &str) -> BTreeMap<String, u32> {
    let mut counts: HashMap<String, u32> = HashMap::new();
    for ident in IDENT_RE.find_iter(content) {
        let ident = ident.as_str();
        let whole = ident.to_lowercase();
        let parts = split_identifier(ident);
        if parts.len() > 1 {
            for part in parts {
                if part.len() >= 2 && part != whole {
                    *counts.entry(part).or_default() += 1;
                }
            }
        }
        if whole.len() >= 2 {
            *counts.entry(whole).or_default() += 1;
        }
    }

    let mut terms: Vec<(String, u32)> = counts.into_iter().collect();
    if terms.len() > MAX_TERMS {
        terms.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        terms.truncate(MAX_TERMS);
    }
    terms.into_iter().collect()
}

/// `loginUser_id` -> `login`, `user`, `id`
fn split_identifier(ident: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in ident.chars() {
        if c == '_' {
            if !current.is_empty() {
                parts.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn matches_package(source: &str, package: &str) -> bool {
    source == package
        || source
            .strip_prefix(package)
            .is_some_and(|rest| rest.starts_with(['/', '.', ':']))
}

fn detect_frameworks(record: &FileRecord) -> Vec<String> {
    let path_lower = record.path.to_lowercase();
    FRAMEWORK_SIGNALS
        .iter()
        .filter(|(name, packages, markers)| {
            let imported = record
                .imports
                .iter()
                .any(|import| packages.iter().any(|p| matches_package(&import.source, p)));
            let by_extension = match *name {
                "react" => path_lower.ends_with(".jsx") || path_lower.ends_with(".tsx"),
                "vue" => path_lower.ends_with(".vue"),
                _ => false,
            };
            imported || by_extension || markers.iter().any(|m| record.content.contains(m))
        })
        .map(|(name, _, _)| (*name).to_string())
        .collect()
}

/// Short excerpt used when the full file does not fit the budget
pub fn summarize(record: &FileRecord) -> String {
    let mut lines = vec![format!(
        "{} ({}, {} lines)",
        record.path,
        record.language.as_str(),
        record.line_count()
    )];

    let imports: Vec<&str> = record.imports.iter().map(|i| i.source.as_str()).collect();
    push_list(&mut lines, "imports", &imports);

    let exports: Vec<&str> = record.exports.iter().map(|e| e.name.as_str()).collect();
    push_list(&mut lines, "exports", &exports);

    let functions: Vec<String> = record
        .functions
        .iter()
        .map(|f| format!("{}({})", f.name, f.parameter_count))
        .collect();
    let functions: Vec<&str> = functions.iter().map(String::as_str).collect();
    push_list(&mut lines, "functions", &functions);

    let classes: Vec<String> = record
        .classes
        .iter()
        .map(|c| match &c.extends {
            Some(base) => format!("{} extends {base}", c.name),
            None => c.name.clone(),
        })
        .collect();
    let classes: Vec<&str> = classes.iter().map(String::as_str).collect();
    push_list(&mut lines, "classes", &classes);

    let summary = lines.join("\n");
    if summary.chars().count() > SUMMARY_MAX_CHARS {
        summary.chars().take(SUMMARY_MAX_CHARS).collect()
    } else {
        summary
    }
}

fn push_list(lines: &mut Vec<String>, label: &str, items: &[&str]) {
    if items.is_empty() {
        return;
    }
    let shown = items
        .iter()
        .take(SUMMARY_LIST_LIMIT)
        .copied()
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > SUMMARY_LIST_LIMIT {
        lines.push(format!(
            "{label}: {shown} (+{} more)",
            items.len() - SUMMARY_LIST_LIMIT
        ));
    } else {
        lines.push(format!("{label}: {shown}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::{ClassSymbol, FunctionSymbol};
    use pretty_assertions::assert_eq;

    #[test]
    fn identifiers_split_on_case_and_underscore() {
        assert_eq!(split_identifier("loginUser_id"), vec!["login", "user", "id"]);
        assert_eq!(split_identifier("HTTPServer"), vec!["httpserver"]);
        assert_eq!(split_identifier("parse2Json"), vec!["parse2", "json"]);
    }

    #[test]
    fn stems_and_prefixes_match() {
        assert!(term_matches("authentication", "auth"));
        assert!(term_matches("authentication", "authenticate"));
        assert!(term_matches("login", "loginuser"));
        assert!(!term_matches("log", "login"));
        assert!(!term_matches("button", "auth"));
    }

    #[test]
    fn profile_counts_terms_and_path() {
        let record = FileRecord::from_source(
            "src/auth/Login.tsx",
            "import React from 'react';\nexport function loginUser(user) { return user; }\n",
        )
        .with_imports(["react"]);
        let profile = FileProfile::from_record(&record);

        assert_eq!(profile.path_terms, vec!["src", "auth", "login", "tsx"]);
        assert!(profile.path_matches("authentication"));
        assert_eq!(profile.occurrences("user"), 3);
        assert_eq!(profile.frameworks, vec!["react"]);
        assert!(profile.uses_framework("react"));
        assert_eq!(profile.token_estimate, record.estimated_tokens());
    }

    #[test]
    fn summary_is_bounded_and_lists_symbols() {
        let functions = (0..200)
            .map(|i| FunctionSymbol::new(format!("handler_number_{i}"), i + 1, i + 1))
            .collect();
        let record = FileRecord::from_source("api/routes.py", "pass\n")
            .with_functions(functions)
            .with_classes(vec![ClassSymbol::new("Router", 1, 1).extending("Base")])
            .with_imports(["flask"]);
        let summary = summarize(&record);

        assert!(summary.starts_with("api/routes.py (python, 1 lines)"));
        assert!(summary.contains("imports: flask"));
        assert!(summary.contains("(+188 more)"));
        assert!(summary.contains("classes: Router extends Base"));
        assert!(summary.chars().count() <= SUMMARY_MAX_CHARS);
        assert!(FileProfile::from_record(&record).summary_tokens <= 200);
    }
}
