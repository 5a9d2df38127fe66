//! Line-oriented scanning of function bodies.
//!
//! Source is first cleaned (comments dropped, string literals collapsed to a
//! placeholder) so that keywords and braces inside them are not counted.

use crate::config::COGNITIVE_CAP;
use context_protocol::Language;
use once_cell::sync::Lazy;
use regex::Regex;

/// Stand-in for a collapsed string literal; counts as one operand
pub(crate) const STRING_PLACEHOLDER: &str = "__str";

static BRANCH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(if|for|while|catch|case|foreach|elif|except)\b")
        .unwrap_or_else(|e| unreachable!("branch pattern: {e}"))
});

static STRUCTURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(else\s+if|elif|else|if|for|foreach|while|switch|match|catch|except|loop)\b")
        .unwrap_or_else(|e| unreachable!("structure pattern: {e}"))
});

static BOOL_OP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&&|\|\|").unwrap_or_else(|e| unreachable!("bool pattern: {e}")));

static PY_BOOL_OP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(and|or)\b").unwrap_or_else(|e| unreachable!("python bool pattern: {e}"))
});

static TERNARY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|[^?])\?(?:[^?.:]|$)").unwrap_or_else(|e| unreachable!("ternary pattern: {e}"))
});

static MATCH_ARM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"=>").unwrap_or_else(|e| unreachable!("arm pattern: {e}")));

/// Decision and nesting counts for one function body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct BodyScan {
    pub cyclomatic: u32,
    pub cognitive: u32,
    pub nesting_depth: u32,
}

/// Drop comments and collapse string literals, keeping line structure
pub(crate) fn clean_lines<'a>(
    lines: impl IntoIterator<Item = &'a str>,
    language: Language,
) -> Vec<String> {
    let hash_comments = matches!(
        language,
        Language::Python | Language::Ruby | Language::Yaml | Language::Toml
    );
    let block_comments = !hash_comments;
    let triple_quotes = language == Language::Python;

    let mut in_block = false;
    let mut in_docstring: Option<char> = None;
    let mut out = Vec::new();

    for line in lines {
        let chars: Vec<char> = line.chars().collect();
        let mut cleaned = String::with_capacity(line.len());
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if in_block {
                if c == '*' && next == Some('/') {
                    in_block = false;
                    i += 2;
                } else {
                    i += 1;
                }
                continue;
            }

            if let Some(quote) = in_docstring {
                if is_triple(&chars, i, quote) {
                    in_docstring = None;
                    i += 3;
                } else {
                    i += 1;
                }
                continue;
            }

            if block_comments && c == '/' && next == Some('/') {
                break;
            }
            if block_comments && c == '/' && next == Some('*') {
                in_block = true;
                i += 2;
                continue;
            }
            if hash_comments && c == '#' {
                break;
            }
            if triple_quotes && (c == '"' || c == '\'') && is_triple(&chars, i, c) {
                cleaned.push_str(STRING_PLACEHOLDER);
                in_docstring = Some(c);
                i += 3;
                continue;
            }

            if c == '"' || c == '`' || (c == '\'' && !is_rust_lifetime(language, &chars, i)) {
                cleaned.push(' ');
                cleaned.push_str(STRING_PLACEHOLDER);
                cleaned.push(' ');
                i = skip_string(&chars, i);
                continue;
            }

            cleaned.push(c);
            i += 1;
        }

        out.push(cleaned);
    }

    out
}

fn is_triple(chars: &[char], i: usize, quote: char) -> bool {
    chars.get(i) == Some(&quote) && chars.get(i + 1) == Some(&quote) && chars.get(i + 2) == Some(&quote)
}

/// `'a` in Rust is a lifetime unless it closes as a char literal (`'a'`, `'\n'`)
fn is_rust_lifetime(language: Language, chars: &[char], i: usize) -> bool {
    if language != Language::Rust {
        return false;
    }
    match chars.get(i + 1) {
        Some('\\') => false,
        Some(_) => chars.get(i + 2) != Some(&'\''),
        None => true,
    }
}

/// Index just past the closing quote (or end of line for unterminated literals)
fn skip_string(chars: &[char], start: usize) -> usize {
    let quote = chars[start];
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    chars.len()
}

/// Score a cleaned function body. The first line is the definition line.
pub(crate) fn scan_body(lines: &[String], language: Language) -> BodyScan {
    let levels = if language.uses_indentation_blocks() {
        indentation_levels(lines)
    } else {
        brace_levels(lines)
    };

    let mut cyclomatic: u32 = 1;
    let mut cognitive: u32 = 0;
    let mut max_depth: u32 = 0;

    for (line, level) in lines.iter().zip(levels) {
        max_depth = max_depth.max(level.max_depth);
        // Body statements sit at depth 1
        let nesting = level.at_start.saturating_sub(1);

        cyclomatic = cyclomatic.saturating_add(decision_points(line, language));
        cognitive = cognitive.saturating_add(cognitive_weight(line, language, nesting));
    }

    BodyScan {
        cyclomatic,
        cognitive: cognitive.min(COGNITIVE_CAP),
        nesting_depth: max_depth.saturating_sub(1),
    }
}

/// Whole-file cyclomatic count, no per-function split
pub(crate) fn decision_points_in(lines: &[String], language: Language) -> u32 {
    lines
        .iter()
        .fold(1u32, |acc, line| acc.saturating_add(decision_points(line, language)))
}

fn decision_points(line: &str, language: Language) -> u32 {
    let mut points = BRANCH_RE.find_iter(line).count();
    match language {
        Language::Python => {
            points += PY_BOOL_OP_RE.find_iter(line).count();
        }
        Language::Rust => {
            points += BOOL_OP_RE.find_iter(line).count();
            points += MATCH_ARM_RE.find_iter(line).count();
        }
        _ => {
            points += BOOL_OP_RE.find_iter(line).count();
            points += TERNARY_RE.find_iter(line).count();
        }
    }
    u32::try_from(points).unwrap_or(u32::MAX)
}

/// Structural constructs cost 1 + nesting; continuations (`else`, `elif`)
/// and boolean operators cost 1 flat.
fn cognitive_weight(line: &str, language: Language, nesting: u32) -> u32 {
    let mut weight: u32 = 0;
    for caps in STRUCTURE_RE.captures_iter(line) {
        let keyword = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        let flat = keyword == "else" || keyword == "elif" || keyword.starts_with("else");
        weight = weight.saturating_add(if flat { 1 } else { 1 + nesting });
    }

    let bool_ops = if language == Language::Python {
        PY_BOOL_OP_RE.find_iter(line).count()
    } else {
        BOOL_OP_RE.find_iter(line).count()
    };
    let ternaries = if language.uses_indentation_blocks() || language == Language::Rust {
        0
    } else {
        TERNARY_RE.find_iter(line).count()
    };

    weight
        .saturating_add(u32::try_from(bool_ops).unwrap_or(u32::MAX))
        .saturating_add(u32::try_from(ternaries).unwrap_or(u32::MAX).saturating_mul(1 + nesting))
}

#[derive(Debug, Clone, Copy, Default)]
struct LineLevel {
    /// Depth at which the line's own constructs sit
    at_start: u32,
    /// Deepest depth reached while reading the line
    max_depth: u32,
}

/// Brace depth per line. Leading closers (`} else {`) count before the line's
/// constructs. The counter saturates at zero.
fn brace_levels(lines: &[String]) -> Vec<LineLevel> {
    let mut depth: u32 = 0;
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let trimmed = line.trim_start();
        let leading_closers = trimmed.chars().take_while(|c| *c == '}').count();
        depth = depth.saturating_sub(u32::try_from(leading_closers).unwrap_or(u32::MAX));
        let at_start = depth;
        let mut max_depth = depth;
        for c in trimmed.chars().skip(leading_closers) {
            match c {
                '{' => {
                    depth += 1;
                    max_depth = max_depth.max(depth);
                }
                '}' => depth = depth.saturating_sub(1),
                _ => {}
            }
        }
        out.push(LineLevel {
            at_start,
            max_depth,
        });
    }
    out
}

/// Indentation depth per line relative to the definition line. Blank lines
/// inherit the previous depth.
fn indentation_levels(lines: &[String]) -> Vec<LineLevel> {
    let mut stack: Vec<usize> = Vec::new();
    let mut last: u32 = 0;
    let mut out = Vec::with_capacity(lines.len());

    for line in lines {
        if line.trim().is_empty() {
            out.push(LineLevel {
                at_start: last,
                max_depth: last,
            });
            continue;
        }
        let indent = indent_width(line);
        if stack.is_empty() {
            stack.push(indent);
        } else {
            while stack.len() > 1 && stack.last().is_some_and(|top| indent < *top) {
                stack.pop();
            }
            if stack.last().is_some_and(|top| indent > *top) {
                stack.push(indent);
            }
        }
        last = u32::try_from(stack.len().saturating_sub(1)).unwrap_or(u32::MAX);
        out.push(LineLevel {
            at_start: last,
            max_depth: last,
        });
    }
    out
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}
