//! Halstead metrics over a token stream.
//!
//! Keywords and punctuation are operators; identifiers, numbers and collapsed
//! string literals are operands.

use crate::types::HalsteadMetrics;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[A-Za-z_][A-Za-z0-9_]*|\d+(?:\.\d+)?|===|!==|\*\*=|==|!=|<=|>=|&&|\|\||=>|->|::|\+\+|--|\+=|-=|\*=|/=|%=|\*\*|<<|>>|[-+*/%=<>!&|^~?:.,;(){}\[\]@]",
    )
    .unwrap_or_else(|e| unreachable!("token pattern: {e}"))
});

const KEYWORDS: &[&str] = &[
    "if", "else", "elif", "for", "foreach", "while", "do", "loop", "switch", "match", "case",
    "default", "break", "continue", "return", "yield", "throw", "raise", "try", "catch", "except",
    "finally", "with", "function", "def", "fn", "func", "class", "struct", "enum", "trait", "impl",
    "interface", "new", "delete", "typeof", "instanceof", "in", "of", "is", "not", "and", "or",
    "let", "const", "var", "mut", "pub", "static", "async", "await", "import", "from", "export",
    "as", "lambda", "pass", "where", "use", "mod", "go", "defer", "select",
];

pub(crate) fn halstead_for(lines: &[String]) -> HalsteadMetrics {
    let mut operators: HashSet<&str> = HashSet::new();
    let mut operands: HashSet<&str> = HashSet::new();
    let mut total_operators = 0usize;
    let mut total_operands = 0usize;

    for line in lines {
        for token in TOKEN_RE.find_iter(line).map(|m| m.as_str()) {
            if is_operator(token) {
                operators.insert(token);
                total_operators += 1;
            } else {
                operands.insert(token);
                total_operands += 1;
            }
        }
    }

    compute(operators.len(), operands.len(), total_operators, total_operands)
}

fn is_operator(token: &str) -> bool {
    let starts_like_word = token
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    !starts_like_word || KEYWORDS.contains(&token)
}

/// Standard formulas from distinct (n1, n2) and total (N1, N2) counts
pub fn compute(n1: usize, n2: usize, big_n1: usize, big_n2: usize) -> HalsteadMetrics {
    let vocabulary = (n1 + n2) as f64;
    let length = (big_n1 + big_n2) as f64;
    let volume = if vocabulary > 0.0 && length > 0.0 {
        length * vocabulary.log2()
    } else {
        0.0
    };
    let difficulty = if n2 > 0 {
        (n1 as f64 / 2.0) * (big_n2 as f64 / n2 as f64)
    } else {
        0.0
    };
    let effort = difficulty * volume;

    HalsteadMetrics {
        distinct_operators: n1,
        distinct_operands: n2,
        total_operators: big_n1,
        total_operands: big_n2,
        vocabulary,
        length,
        volume,
        difficulty,
        effort,
        time: effort / 18.0,
        bugs: volume / 3000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_operators_and_operands() {
        let metrics = halstead_for(&["return a + b * a;".to_string()]);
        // operators: return + * ;   operands: a b
        assert_eq!(metrics.distinct_operators, 4);
        assert_eq!(metrics.total_operators, 4);
        assert_eq!(metrics.distinct_operands, 2);
        assert_eq!(metrics.total_operands, 3);
        assert_eq!(metrics.vocabulary, 6.0);
        assert_eq!(metrics.length, 7.0);
        assert!((metrics.volume - 7.0 * 6f64.log2()).abs() < 1e-9);
        assert!((metrics.difficulty - 3.0).abs() < 1e-9);
        assert!((metrics.bugs - metrics.volume / 3000.0).abs() < 1e-12);
    }

    #[test]
    fn empty_input_is_all_zero() {
        assert_eq!(halstead_for(&[]), HalsteadMetrics::default());
    }
}
