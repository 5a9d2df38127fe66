use context_protocol::Language;
use std::collections::BTreeSet;

const SCRIPT_EXTENSIONS: &[&str] = &["ts", "tsx", "js", "jsx", "mjs", "cjs", "d.ts"];

/// Resolve an import specifier written in `from` to another known file.
/// Returns `None` when the import points outside the analyzed set.
pub(crate) fn resolve_import(
    from: &str,
    language: Language,
    source: &str,
    known: &BTreeSet<String>,
) -> Option<String> {
    let source = source.trim();
    if source.is_empty() {
        return None;
    }

    if known.contains(source) {
        return Some(source.to_string());
    }

    let dir = parent_dir(from);
    match language {
        Language::Python => resolve_python(dir, source, known),
        Language::Rust => resolve_rust(from, source, known),
        _ => {
            if source.starts_with("./") || source.starts_with("../") {
                let base = normalize_join(dir, source)?;
                probe_script_candidates(&base, known)
            } else if source.starts_with('/') {
                probe_script_candidates(source.trim_start_matches('/'), known)
            } else {
                probe_script_candidates(source, known)
            }
        }
    }
}

fn probe_script_candidates(base: &str, known: &BTreeSet<String>) -> Option<String> {
    if known.contains(base) {
        return Some(base.to_string());
    }
    for ext in SCRIPT_EXTENSIONS {
        let candidate = format!("{base}.{ext}");
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }
    for ext in SCRIPT_EXTENSIONS {
        let candidate = format!("{base}/index.{ext}");
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }
    None
}

/// `.models` / `..core.auth` relative modules and dotted absolute modules
fn resolve_python(dir: &str, source: &str, known: &BTreeSet<String>) -> Option<String> {
    let dots = source.chars().take_while(|c| *c == '.').count();
    let rest = &source[dots..];
    let module_path = rest.replace('.', "/");

    let base_dir = if dots == 0 {
        String::new()
    } else {
        let mut segments: Vec<&str> = split_segments(dir);
        for _ in 1..dots {
            segments.pop()?;
        }
        segments.join("/")
    };

    let base = join_segments(&base_dir, &module_path);
    if base.is_empty() {
        let init = join_segments(&base_dir, "__init__.py");
        return known.contains(&init).then_some(init);
    }
    for candidate in [format!("{base}.py"), format!("{base}/__init__.py")] {
        if known.contains(&candidate) {
            return Some(candidate);
        }
    }
    if dots == 0 {
        // `app.models` may live under a top-level source dir
        for root in ["src", "lib"] {
            let candidate = format!("{root}/{base}.py");
            if known.contains(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

/// `crate::a::b`, `super::x`, `self::y` to `src/...rs` files
fn resolve_rust(from: &str, source: &str, known: &BTreeSet<String>) -> Option<String> {
    let path = source.trim_end_matches(';');
    let mut parts: Vec<&str> = path.split("::").filter(|p| !p.is_empty()).collect();
    let first = *parts.first()?;

    let module_dir = rust_module_dir(from);
    let base: Vec<String> = match first {
        "crate" => {
            parts.remove(0);
            let crate_root = crate_src_root(from);
            split_segments(&crate_root)
                .into_iter()
                .map(str::to_string)
                .collect()
        }
        "self" => {
            parts.remove(0);
            split_segments(&module_dir)
                .into_iter()
                .map(str::to_string)
                .collect()
        }
        "super" => {
            let mut segments: Vec<String> = split_segments(&module_dir)
                .into_iter()
                .map(str::to_string)
                .collect();
            while parts.first() == Some(&"super") {
                parts.remove(0);
                segments.pop()?;
            }
            segments
        }
        _ => return None,
    };

    // Longest module prefix that maps to a file wins (`crate::a::b::Item` -> a/b.rs).
    // `take == 0` is the base module itself (`super::Item`).
    for take in (0..=parts.len()).rev() {
        let mut segments = base.clone();
        segments.extend(parts[..take].iter().map(|s| (*s).to_string()));
        let joined = segments.join("/");
        for candidate in [format!("{joined}.rs"), format!("{joined}/mod.rs")] {
            if known.contains(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn crate_src_root(from: &str) -> String {
    match from.find("src/") {
        Some(idx) => from[..idx + 3].to_string(),
        None => String::new(),
    }
}

/// Directory holding a Rust file's child modules
fn rust_module_dir(from: &str) -> String {
    let dir = parent_dir(from);
    let file_name = from.rsplit('/').next().unwrap_or(from);
    match file_name {
        "mod.rs" | "lib.rs" | "main.rs" => dir.to_string(),
        other => {
            let stem = other.trim_end_matches(".rs");
            join_segments(dir, stem)
        }
    }
}

/// External package name for an unresolved import (`react-dom/client` -> `react-dom`)
pub(crate) fn package_name(source: &str, language: Language) -> String {
    let source = source.trim();
    match language {
        Language::Python => source
            .trim_start_matches('.')
            .split('.')
            .next()
            .unwrap_or(source)
            .to_string(),
        Language::Rust => source.split("::").next().unwrap_or(source).to_string(),
        _ => {
            if let Some(scoped) = source.strip_prefix('@') {
                let mut parts = scoped.splitn(3, '/');
                match (parts.next(), parts.next()) {
                    (Some(scope), Some(name)) => format!("@{scope}/{name}"),
                    _ => source.to_string(),
                }
            } else {
                source.split('/').next().unwrap_or(source).to_string()
            }
        }
    }
}

fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn join_segments(dir: &str, rest: &str) -> String {
    match (dir.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (false, true) => dir.to_string(),
        (false, false) => format!("{dir}/{rest}"),
    }
}

/// Join a relative specifier onto `dir`, folding `.` and `..`.
/// Escaping above the repository root yields `None`.
fn normalize_join(dir: &str, relative: &str) -> Option<String> {
    let mut segments: Vec<&str> = split_segments(dir);
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            other => segments.push(other),
        }
    }
    Some(segments.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn known(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn resolves_relative_script_imports() {
        let files = known(&["src/auth/login.ts", "src/utils/index.ts", "src/app.tsx"]);
        assert_eq!(
            resolve_import("src/app.tsx", Language::TypeScript, "./auth/login", &files),
            Some("src/auth/login.ts".to_string())
        );
        assert_eq!(
            resolve_import("src/auth/login.ts", Language::TypeScript, "../utils", &files),
            Some("src/utils/index.ts".to_string())
        );
        assert_eq!(
            resolve_import("src/app.tsx", Language::TypeScript, "react", &files),
            None
        );
    }

    #[test]
    fn relative_import_cannot_escape_root() {
        let files = known(&["a.ts"]);
        assert_eq!(
            resolve_import("a.ts", Language::TypeScript, "../../a", &files),
            None
        );
    }

    #[test]
    fn resolves_python_relative_and_dotted_modules() {
        let files = known(&["app/models.py", "app/core/__init__.py", "app/views.py"]);
        assert_eq!(
            resolve_import("app/views.py", Language::Python, ".models", &files),
            Some("app/models.py".to_string())
        );
        assert_eq!(
            resolve_import("app/views.py", Language::Python, "app.core", &files),
            Some("app/core/__init__.py".to_string())
        );
        assert_eq!(
            resolve_import("app/views.py", Language::Python, "numpy", &files),
            None
        );
    }

    #[test]
    fn resolves_rust_module_paths() {
        let files = known(&["src/lib.rs", "src/cache/mod.rs", "src/cache/key.rs"]);
        assert_eq!(
            resolve_import("src/lib.rs", Language::Rust, "crate::cache::key::CacheKey", &files),
            Some("src/cache/key.rs".to_string())
        );
        assert_eq!(
            resolve_import("src/cache/key.rs", Language::Rust, "super::Store", &files),
            Some("src/cache/mod.rs".to_string())
        );
        assert_eq!(
            resolve_import("src/lib.rs", Language::Rust, "serde::Serialize", &files),
            None
        );
    }

    #[test]
    fn package_names_strip_subpaths() {
        assert_eq!(package_name("react-dom/client", Language::JavaScript), "react-dom");
        assert_eq!(package_name("@tanstack/query/core", Language::TypeScript), "@tanstack/query");
        assert_eq!(package_name("numpy.linalg", Language::Python), "numpy");
        assert_eq!(package_name("tokio::sync", Language::Rust), "tokio");
    }
}
