use crate::config::ComplexityThresholds;
use context_protocol::Language;
use serde::{Deserialize, Serialize};

/// Halstead software-science metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HalsteadMetrics {
    /// Distinct operators (n1)
    pub distinct_operators: usize,
    /// Distinct operands (n2)
    pub distinct_operands: usize,
    /// Total operators (N1)
    pub total_operators: usize,
    /// Total operands (N2)
    pub total_operands: usize,
    pub vocabulary: f64,
    pub length: f64,
    pub volume: f64,
    pub difficulty: f64,
    pub effort: f64,
    /// Seconds, effort / 18
    pub time: f64,
    /// Estimated delivered bugs, volume / 3000
    pub bugs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionComplexity {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub lines: usize,
    pub parameter_count: usize,
    /// Always at least 1
    pub cyclomatic: u32,
    /// Bounded to `[0, 50]`
    pub cognitive: u32,
    pub halstead: HalsteadMetrics,
    pub nesting_depth: u32,
    /// Bounded to `[1, 10]`
    pub maintenance: f64,
    /// Weighted composite, bounded to `[1, 10]`
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassComplexity {
    pub name: String,
    pub start_line: usize,
    pub end_line: usize,
    pub method_count: usize,
    pub average_method_complexity: f64,
    pub max_method_complexity: f64,
    /// `(0, 1]`, shrinks as methods pile up
    pub cohesion: f64,
    /// `[0, 1]`, grows with external dependencies
    pub coupling: f64,
    pub overall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileComplexity {
    pub function_count: usize,
    pub class_count: usize,
    /// Non-blank lines
    pub lines_of_code: usize,
    /// Mean function `overall`; the whole-file score when no functions were parsed
    pub average_complexity: f64,
    pub max_complexity: f64,
    pub average_cyclomatic: f64,
    pub average_cognitive: f64,
    /// Bounded to `[0, 100]`
    pub maintainability_index: f64,
    pub technical_debt_hours: f64,
    pub halstead: HalsteadMetrics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    /// Position of `value` on a threshold ladder; `None` while at or below `medium`
    pub fn from_value(value: f64, thresholds: &ComplexityThresholds) -> Option<Self> {
        if value > thresholds.very_high {
            Some(Self::Critical)
        } else if value > thresholds.high {
            Some(Self::High)
        } else if value > thresholds.medium {
            Some(Self::Medium)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    HighCyclomaticComplexity,
    HighCognitiveComplexity,
    DeepNesting,
    TooManyParameters,
    LongFunction,
    LowClassCohesion,
    LongFile,
    LowMaintainability,
    HighTechnicalDebt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityIssue {
    pub kind: IssueKind,
    pub severity: IssueSeverity,
    pub message: String,
    pub line: Option<usize>,
    /// Function or class name, `None` for file-level issues
    pub symbol: Option<String>,
}

/// Full scoring result for one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub path: String,
    pub language: Language,
    pub functions: Vec<FunctionComplexity>,
    pub classes: Vec<ClassComplexity>,
    pub file: FileComplexity,
    pub issues: Vec<ComplexityIssue>,
    pub recommendations: Vec<String>,
}

impl ComplexityReport {
    /// Functions whose overall score exceeds `threshold`, highest first
    pub fn hotspots(&self, threshold: f64) -> Vec<&FunctionComplexity> {
        let mut hot: Vec<&FunctionComplexity> = self
            .functions
            .iter()
            .filter(|f| f.overall > threshold)
            .collect();
        hot.sort_by(|a, b| b.overall.total_cmp(&a.overall));
        hot
    }

    pub fn highest_severity(&self) -> Option<IssueSeverity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}
