//! Per-file extraction of imports, exports, call sites and inheritance.
//!
//! Call sites and inheritance are pattern-matched over raw text. They are
//! approximate: string literals and block comments still match, aliased
//! imports and dynamic dispatch do not.

use crate::types::{
    CallSite, EdgeProvenance, FileDependencies, InheritanceKind, InheritanceLink, RawImport,
};
use context_protocol::{FileRecord, Language};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static CALL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\b(function|def|fn|func)\s+)?\b([A-Za-z_][A-Za-z0-9_]*)\s*\(")
        .unwrap_or_else(|e| unreachable!("call pattern: {e}"))
});

static EXTENDS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*<[^>{]*>)?\s+extends\s+([A-Za-z_][A-Za-z0-9_.]*)")
        .unwrap_or_else(|e| unreachable!("extends pattern: {e}"))
});

static IMPLEMENTS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)[^{;]*?\bimplements\s+([A-Za-z0-9_.,<>\s]+?)\s*\{")
        .unwrap_or_else(|e| unreachable!("implements pattern: {e}"))
});

static PY_CLASS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(([^)]*)\)\s*:")
        .unwrap_or_else(|e| unreachable!("python class pattern: {e}"))
});

static RUST_IMPL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bimpl(?:\s*<[^>]*>)?\s+([A-Za-z_][A-Za-z0-9_:]*)(?:<[^>]*>)?\s+for\s+([A-Za-z_][A-Za-z0-9_]*)")
        .unwrap_or_else(|e| unreachable!("rust impl pattern: {e}"))
});

const CALL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "return", "match", "elif", "except", "with",
    "function", "def", "fn", "func", "class", "new", "typeof", "sizeof", "await", "yield",
    "super", "this", "self", "print", "assert", "loop", "else", "import", "require", "from",
    "and", "or", "not", "in", "lambda", "async", "let", "const", "var", "impl", "where",
];

pub(crate) fn extract_dependencies(record: &FileRecord) -> FileDependencies {
    let imports = record
        .imports
        .iter()
        .map(|import| RawImport {
            source: import.source.trim().to_string(),
            names: import.names.clone(),
            line: import.line,
        })
        .filter(|import| !import.source.is_empty())
        .collect();

    let mut exports: Vec<String> = record.exports.iter().map(|e| e.name.clone()).collect();
    exports.extend(
        record
            .functions
            .iter()
            .filter(|f| f.is_exported)
            .map(|f| f.name.clone()),
    );
    exports.extend(
        record
            .classes
            .iter()
            .filter(|c| c.is_exported)
            .map(|c| c.name.clone()),
    );
    dedup_preserving_order(&mut exports);

    let defined_functions: Vec<String> = record.functions.iter().map(|f| f.name.clone()).collect();

    FileDependencies {
        path: record.path.clone(),
        language: record.language,
        imports,
        exports,
        calls: extract_call_sites(&record.content),
        inheritance: extract_inheritance(record),
        defined_functions,
    }
}

/// Name-based call detection. A definition (`function foo(`) is not a call.
pub(crate) fn extract_call_sites(content: &str) -> Vec<CallSite> {
    let mut calls = Vec::new();
    let mut seen: HashSet<(String, usize)> = HashSet::new();
    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("//") || trimmed.starts_with('#') || trimmed.starts_with('*') {
            continue;
        }
        for caps in CALL_RE.captures_iter(line) {
            if caps.get(1).is_some() {
                continue;
            }
            let Some(name) = caps.get(2).map(|m| m.as_str()) else {
                continue;
            };
            if CALL_KEYWORDS.contains(&name) {
                continue;
            }
            let line_no = idx + 1;
            if seen.insert((name.to_string(), line_no)) {
                calls.push(CallSite {
                    name: name.to_string(),
                    line: line_no,
                });
            }
        }
    }
    calls
}

pub(crate) fn extract_inheritance(record: &FileRecord) -> Vec<InheritanceLink> {
    let mut links: Vec<InheritanceLink> = Vec::new();

    for class in &record.classes {
        if let Some(base) = &class.extends {
            links.push(InheritanceLink {
                class_name: class.name.clone(),
                kind: InheritanceKind::Extends,
                target: base.clone(),
                provenance: EdgeProvenance::Parser,
            });
        }
        for iface in &class.implements {
            links.push(InheritanceLink {
                class_name: class.name.clone(),
                kind: InheritanceKind::Implements,
                target: iface.clone(),
                provenance: EdgeProvenance::Parser,
            });
        }
    }

    let content = &record.content;
    let mut heuristic = Vec::new();
    match record.language {
        Language::Python => {
            for caps in PY_CLASS_RE.captures_iter(content) {
                let class_name = caps[1].to_string();
                for base in caps[2].split(',') {
                    let base = base.trim();
                    if base.is_empty() || base.contains('=') || base == "object" {
                        continue;
                    }
                    heuristic.push(heuristic_link(&class_name, InheritanceKind::Extends, base));
                }
            }
        }
        Language::Rust => {
            for caps in RUST_IMPL_RE.captures_iter(content) {
                heuristic.push(heuristic_link(
                    &caps[2],
                    InheritanceKind::Implements,
                    &caps[1],
                ));
            }
        }
        _ => {
            for caps in EXTENDS_RE.captures_iter(content) {
                heuristic.push(heuristic_link(&caps[1], InheritanceKind::Extends, &caps[2]));
            }
            for caps in IMPLEMENTS_RE.captures_iter(content) {
                for iface in caps[2].split(',') {
                    let iface = iface.split('<').next().unwrap_or("").trim();
                    if !iface.is_empty() {
                        heuristic.push(heuristic_link(
                            &caps[1],
                            InheritanceKind::Implements,
                            iface,
                        ));
                    }
                }
            }
        }
    }

    for link in heuristic {
        let known = links.iter().any(|existing| {
            existing.class_name == link.class_name
                && existing.kind == link.kind
                && existing.target == link.target
        });
        if !known {
            links.push(link);
        }
    }
    links
}

fn heuristic_link(class_name: &str, kind: InheritanceKind, target: &str) -> InheritanceLink {
    InheritanceLink {
        class_name: class_name.to_string(),
        kind,
        target: target.to_string(),
        provenance: EdgeProvenance::Heuristic,
    }
}

fn dedup_preserving_order(items: &mut Vec<String>) {
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::{ClassSymbol, FunctionSymbol};
    use pretty_assertions::assert_eq;

    #[test]
    fn call_sites_skip_definitions_and_keywords() {
        let src = "function login(user) {\n  if (validate(user)) {\n    return createSession(user);\n  }\n}\n";
        let calls: Vec<String> = extract_call_sites(src)
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(calls, vec!["validate", "createSession"]);
    }

    #[test]
    fn typescript_extends_and_implements_are_heuristic() {
        let record = FileRecord::from_source(
            "src/admin.ts",
            "export class Admin extends User implements Auditable, Serializable<Admin> {\n}\n",
        );
        let links = extract_inheritance(&record);
        assert_eq!(links.len(), 3);
        assert!(links
            .iter()
            .all(|l| l.provenance == EdgeProvenance::Heuristic && l.class_name == "Admin"));
        assert!(links
            .iter()
            .any(|l| l.kind == InheritanceKind::Implements && l.target == "Serializable"));
    }

    #[test]
    fn parser_links_win_over_duplicate_heuristics() {
        let record = FileRecord::from_source("models.py", "class Admin(User):\n    pass\n")
            .with_classes(vec![ClassSymbol::new("Admin", 1, 2).extending("User")]);
        let links = extract_inheritance(&record);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].provenance, EdgeProvenance::Parser);
    }

    #[test]
    fn rust_trait_impls_are_detected() {
        let record = FileRecord::from_source(
            "src/lib.rs",
            "impl<T> Display for Wrapper<T> {}\nimpl Default for Config {}\n",
        );
        let links = extract_inheritance(&record);
        assert!(links
            .iter()
            .any(|l| l.class_name == "Config" && l.target == "Default"));
    }

    #[test]
    fn exports_merge_flags_and_explicit_records() {
        let record = FileRecord::from_source("a.ts", "export function a() {}\nfunction b() {}\n")
            .with_functions(vec![
                FunctionSymbol::new("a", 1, 1).exported(),
                FunctionSymbol::new("b", 2, 2),
            ])
            .with_exports(["a", "DEFAULT"]);
        let deps = extract_dependencies(&record);
        assert_eq!(deps.exports, vec!["a", "DEFAULT"]);
        assert_eq!(deps.defined_functions, vec!["a", "b"]);
    }
}
