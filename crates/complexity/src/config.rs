use serde::{Deserialize, Serialize};

/// Upper bound for per-function cognitive complexity
pub const COGNITIVE_CAP: u32 = 50;

/// Threshold ladder for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComplexityThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub very_high: f64,
}

impl ComplexityThresholds {
    pub const fn new(low: f64, medium: f64, high: f64, very_high: f64) -> Self {
        Self {
            low,
            medium,
            high,
            very_high,
        }
    }

    pub const fn cyclomatic() -> Self {
        Self::new(5.0, 10.0, 15.0, 25.0)
    }

    pub const fn cognitive() -> Self {
        Self::new(5.0, 15.0, 25.0, 40.0)
    }

    pub const fn nesting() -> Self {
        Self::new(2.0, 4.0, 6.0, 8.0)
    }

    pub const fn parameters() -> Self {
        Self::new(3.0, 5.0, 7.0, 10.0)
    }

    /// Lines per function
    pub const fn function_length() -> Self {
        Self::new(25.0, 50.0, 100.0, 200.0)
    }

    /// Lines per file
    pub const fn file_length() -> Self {
        Self::new(200.0, 500.0, 1000.0, 2000.0)
    }
}

/// Thresholds behind issue and recommendation generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityConfig {
    pub cyclomatic: ComplexityThresholds,
    pub cognitive: ComplexityThresholds,
    pub nesting: ComplexityThresholds,
    pub parameters: ComplexityThresholds,
    pub function_length: ComplexityThresholds,
    pub file_length: ComplexityThresholds,

    /// Per-function overall score above which technical debt accrues
    pub debt_threshold: f64,

    /// Maintainability index below which the file is flagged
    pub min_maintainability: f64,
}

impl Default for ComplexityConfig {
    fn default() -> Self {
        Self {
            cyclomatic: ComplexityThresholds::cyclomatic(),
            cognitive: ComplexityThresholds::cognitive(),
            nesting: ComplexityThresholds::nesting(),
            parameters: ComplexityThresholds::parameters(),
            function_length: ComplexityThresholds::function_length(),
            file_length: ComplexityThresholds::file_length(),
            debt_threshold: 7.0,
            min_maintainability: 20.0,
        }
    }
}
