use crate::config::ComplexityConfig;
use crate::error::{ComplexityError, Result};
use crate::halstead::halstead_for;
use crate::scanner::{clean_lines, decision_points_in, scan_body};
use crate::types::{
    ClassComplexity, ComplexityIssue, ComplexityReport, FileComplexity, FunctionComplexity,
    IssueKind, IssueSeverity,
};
use context_protocol::{FileRecord, FunctionSymbol};

const CYCLOMATIC_WEIGHT: f64 = 0.3;
const COGNITIVE_WEIGHT: f64 = 0.3 * 0.2;
const NESTING_WEIGHT: f64 = 0.2;
const MAINTENANCE_WEIGHT: f64 = 0.2;

const MIN_SCORE: f64 = 1.0;
const MAX_SCORE: f64 = 10.0;

/// Multi-metric complexity scoring over parsed file records
#[derive(Debug, Clone, Default)]
pub struct ComplexityScorer {
    config: ComplexityConfig,
}

impl ComplexityScorer {
    pub fn new(config: ComplexityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ComplexityConfig {
        &self.config
    }

    pub fn score(&self, record: &FileRecord) -> Result<ComplexityReport> {
        record.validate()?;

        let external_deps = external_dependency_count(record);
        let functions: Vec<FunctionComplexity> = record
            .functions
            .iter()
            .map(|symbol| self.function_metrics(record, symbol, external_deps))
            .collect();

        let classes: Vec<ClassComplexity> = record
            .classes
            .iter()
            .map(|class| {
                let methods: Vec<&FunctionComplexity> = record
                    .functions
                    .iter()
                    .zip(&functions)
                    .filter(|(symbol, _)| class.contains(symbol))
                    .map(|(_, metrics)| metrics)
                    .collect();
                class_metrics(
                    &class.name,
                    class.start_line,
                    class.end_line,
                    &methods,
                    external_deps,
                )
            })
            .collect();

        let cleaned = clean_lines(record.content.lines(), record.language);
        let file = self.file_metrics(record, &cleaned, &functions, external_deps);

        let mut issues = Vec::new();
        for function in &functions {
            self.function_issues(function, &mut issues);
        }
        for class in &classes {
            if class.cohesion < 0.5 {
                issues.push(ComplexityIssue {
                    kind: IssueKind::LowClassCohesion,
                    severity: IssueSeverity::Medium,
                    message: format!(
                        "Class {} has {} methods (cohesion {:.2})",
                        class.name, class.method_count, class.cohesion
                    ),
                    line: Some(class.start_line),
                    symbol: Some(class.name.clone()),
                });
            }
        }
        self.file_issues(&file, &mut issues);

        let recommendations = recommendations_for(&issues);

        log::debug!(
            "Scored {}: {} functions, avg {:.1}, MI {:.1}, {} issues",
            record.path,
            functions.len(),
            file.average_complexity,
            file.maintainability_index,
            issues.len()
        );

        Ok(ComplexityReport {
            path: record.path.clone(),
            language: record.language,
            functions,
            classes,
            file,
            issues,
            recommendations,
        })
    }

    /// Score one named function of `record`
    pub fn score_function(&self, record: &FileRecord, name: &str) -> Result<FunctionComplexity> {
        let symbol = record
            .functions
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| ComplexityError::FunctionNotFound {
                path: record.path.clone(),
                name: name.to_string(),
            })?;
        Ok(self.function_metrics(record, symbol, external_dependency_count(record)))
    }

    fn function_metrics(
        &self,
        record: &FileRecord,
        symbol: &FunctionSymbol,
        external_deps: usize,
    ) -> FunctionComplexity {
        let body = record.line_slice(symbol.start_line, symbol.end_line);
        let cleaned = clean_lines(body.iter().copied(), record.language);
        let scan = scan_body(&cleaned, record.language);
        let halstead = halstead_for(&cleaned);
        let lines = symbol.line_count();
        let maintenance = maintenance_score(lines, symbol.parameter_count, external_deps);

        FunctionComplexity {
            name: symbol.name.clone(),
            start_line: symbol.start_line,
            end_line: symbol.end_line,
            lines,
            parameter_count: symbol.parameter_count,
            cyclomatic: scan.cyclomatic,
            cognitive: scan.cognitive,
            halstead,
            nesting_depth: scan.nesting_depth,
            maintenance,
            overall: overall_score(scan.cyclomatic, scan.cognitive, scan.nesting_depth, maintenance),
        }
    }

    fn file_metrics(
        &self,
        record: &FileRecord,
        cleaned: &[String],
        functions: &[FunctionComplexity],
        external_deps: usize,
    ) -> FileComplexity {
        let lines_of_code = record
            .content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count();
        let halstead = halstead_for(cleaned);

        let (average_complexity, max_complexity, average_cyclomatic, average_cognitive, total_cc) =
            if functions.is_empty() {
                // No parsed functions: score the file as one body
                let scan = scan_body(cleaned, record.language);
                let maintenance = maintenance_score(lines_of_code, 0, external_deps);
                let overall =
                    overall_score(scan.cyclomatic, scan.cognitive, scan.nesting_depth, maintenance);
                let cc = decision_points_in(cleaned, record.language);
                (overall, overall, f64::from(cc), f64::from(scan.cognitive), cc)
            } else {
                let n = functions.len() as f64;
                let total_cc: u32 = functions.iter().map(|f| f.cyclomatic).sum();
                (
                    round1(functions.iter().map(|f| f.overall).sum::<f64>() / n),
                    functions.iter().map(|f| f.overall).fold(MIN_SCORE, f64::max),
                    round1(f64::from(total_cc) / n),
                    round1(functions.iter().map(|f| f64::from(f.cognitive)).sum::<f64>() / n),
                    total_cc,
                )
            };

        let maintainability_index =
            maintainability_index(halstead.volume, total_cc, lines_of_code);
        let technical_debt_hours = technical_debt_hours(
            functions.iter().map(|f| f.overall),
            self.config.debt_threshold,
            record.line_count(),
        );

        FileComplexity {
            function_count: functions.len(),
            class_count: record.classes.len(),
            lines_of_code,
            average_complexity,
            max_complexity,
            average_cyclomatic,
            average_cognitive,
            maintainability_index,
            technical_debt_hours,
            halstead,
        }
    }

    fn function_issues(&self, f: &FunctionComplexity, issues: &mut Vec<ComplexityIssue>) {
        let checks = [
            (
                IssueKind::HighCyclomaticComplexity,
                f64::from(f.cyclomatic),
                &self.config.cyclomatic,
                "cyclomatic complexity",
            ),
            (
                IssueKind::HighCognitiveComplexity,
                f64::from(f.cognitive),
                &self.config.cognitive,
                "cognitive complexity",
            ),
            (
                IssueKind::DeepNesting,
                f64::from(f.nesting_depth),
                &self.config.nesting,
                "nesting depth",
            ),
            (
                IssueKind::TooManyParameters,
                f.parameter_count as f64,
                &self.config.parameters,
                "parameter count",
            ),
            (
                IssueKind::LongFunction,
                f.lines as f64,
                &self.config.function_length,
                "length in lines",
            ),
        ];

        for (kind, value, thresholds, label) in checks {
            if let Some(severity) = IssueSeverity::from_value(value, thresholds) {
                issues.push(ComplexityIssue {
                    kind,
                    severity,
                    message: format!(
                        "{} has {label} {value} (limit {})",
                        f.name, thresholds.medium
                    ),
                    line: Some(f.start_line),
                    symbol: Some(f.name.clone()),
                });
            }
        }
    }

    fn file_issues(&self, file: &FileComplexity, issues: &mut Vec<ComplexityIssue>) {
        if let Some(severity) =
            IssueSeverity::from_value(file.lines_of_code as f64, &self.config.file_length)
        {
            issues.push(ComplexityIssue {
                kind: IssueKind::LongFile,
                severity,
                message: format!("File has {} lines of code", file.lines_of_code),
                line: None,
                symbol: None,
            });
        }
        if file.maintainability_index < self.config.min_maintainability {
            issues.push(ComplexityIssue {
                kind: IssueKind::LowMaintainability,
                severity: if file.maintainability_index < self.config.min_maintainability / 2.0 {
                    IssueSeverity::High
                } else {
                    IssueSeverity::Medium
                },
                message: format!(
                    "Maintainability index {:.1} is below {:.1}",
                    file.maintainability_index, self.config.min_maintainability
                ),
                line: None,
                symbol: None,
            });
        }
        if file.technical_debt_hours >= 8.0 {
            issues.push(ComplexityIssue {
                kind: IssueKind::HighTechnicalDebt,
                severity: if file.technical_debt_hours >= 24.0 {
                    IssueSeverity::Critical
                } else {
                    IssueSeverity::High
                },
                message: format!(
                    "Estimated technical debt {:.1}h",
                    file.technical_debt_hours
                ),
                line: None,
                symbol: None,
            });
        }
    }
}

/// Imports that do not look like relative paths
pub fn external_dependency_count(record: &FileRecord) -> usize {
    record
        .imports
        .iter()
        .filter(|import| {
            let source = import.source.trim();
            !(source.starts_with('.') || source.starts_with('/') || source.is_empty())
                && !source.starts_with("crate::")
                && !source.starts_with("super::")
                && !source.starts_with("self::")
        })
        .count()
}

/// 1 plus penalties for length, parameters and external dependencies, capped at 10
pub fn maintenance_score(lines: usize, parameters: usize, external_deps: usize) -> f64 {
    let mut score = 1.0;
    if lines > 50 {
        score += 2.0;
    } else if lines > 25 {
        score += 1.0;
    }
    if parameters > 5 {
        score += 2.0;
    } else if parameters > 3 {
        score += 1.0;
    }
    if external_deps > 10 {
        score += 2.0;
    } else if external_deps > 5 {
        score += 1.0;
    }
    f64::min(score, MAX_SCORE)
}

/// Weighted composite, one decimal, bounded to `[1, 10]`
pub fn overall_score(cyclomatic: u32, cognitive: u32, nesting: u32, maintenance: f64) -> f64 {
    let raw = f64::from(cyclomatic) * CYCLOMATIC_WEIGHT
        + f64::from(cognitive) * COGNITIVE_WEIGHT
        + f64::from(nesting) * NESTING_WEIGHT
        + maintenance * MAINTENANCE_WEIGHT;
    round1(raw).clamp(MIN_SCORE, MAX_SCORE)
}

/// `171 - 5.2 ln V - 0.23 CC - 16.2 ln LOC`, rescaled to `[0, 100]`
pub fn maintainability_index(volume: f64, cyclomatic: u32, lines_of_code: usize) -> f64 {
    let volume = volume.max(1.0);
    let loc = (lines_of_code as f64).max(1.0);
    let raw = 171.0 - 5.2 * volume.ln() - 0.23 * f64::from(cyclomatic) - 16.2 * loc.ln();
    round1((raw * 100.0 / 171.0).clamp(0.0, 100.0))
}

/// 2h per point above `threshold` per function plus 1h per 100 lines past 500
pub fn technical_debt_hours(
    overall_scores: impl Iterator<Item = f64>,
    threshold: f64,
    file_lines: usize,
) -> f64 {
    let function_debt: f64 = overall_scores
        .filter(|score| *score > threshold)
        .map(|score| (score - threshold) * 2.0)
        .sum();
    let length_debt = if file_lines > 500 {
        (file_lines - 500) as f64 / 100.0
    } else {
        0.0
    };
    round1(function_debt + length_debt)
}

fn class_metrics(
    name: &str,
    start_line: usize,
    end_line: usize,
    methods: &[&FunctionComplexity],
    external_deps: usize,
) -> ClassComplexity {
    let method_count = methods.len();
    let (average, max) = if methods.is_empty() {
        (MIN_SCORE, MIN_SCORE)
    } else {
        let sum: f64 = methods.iter().map(|m| m.overall).sum();
        (
            sum / method_count as f64,
            methods.iter().map(|m| m.overall).fold(MIN_SCORE, f64::max),
        )
    };
    let cohesion = 1.0 / (1.0 + 0.1 * method_count as f64);
    let coupling = (external_deps as f64 / 10.0).min(1.0);
    let overall = round1(average + (1.0 - cohesion) * 2.0 + coupling * 2.0).clamp(MIN_SCORE, MAX_SCORE);

    ClassComplexity {
        name: name.to_string(),
        start_line,
        end_line,
        method_count,
        average_method_complexity: round1(average),
        max_method_complexity: max,
        cohesion: (cohesion * 1000.0).round() / 1000.0,
        coupling,
        overall,
    }
}

fn recommendations_for(issues: &[ComplexityIssue]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for issue in issues {
        let text = match issue.kind {
            IssueKind::HighCyclomaticComplexity => {
                "Split functions with many branches into smaller, single-purpose helpers"
            }
            IssueKind::HighCognitiveComplexity => {
                "Flatten control flow with early returns and guard clauses"
            }
            IssueKind::DeepNesting => "Extract deeply nested blocks into named functions",
            IssueKind::TooManyParameters => "Group related parameters into a struct or options object",
            IssueKind::LongFunction => "Break long functions into smaller steps",
            IssueKind::LowClassCohesion => "Split large classes along their responsibilities",
            IssueKind::LongFile => "Split the file into focused modules",
            IssueKind::LowMaintainability => "Prioritize this file for refactoring",
            IssueKind::HighTechnicalDebt => "Schedule dedicated time to pay down complexity debt",
        };
        if !out.iter().any(|existing| existing == text) {
            out.push(text.to_string());
        }
    }
    out
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
