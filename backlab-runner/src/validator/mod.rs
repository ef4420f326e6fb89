//! Validator — advisory scoring of input data, parameters and results.
//!
//! Nothing here returns an error: every check lands in a structured
//! [`ValidationResult`] and the caller decides whether to proceed.

pub mod data;
pub mod parameters;
pub mod results;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use data::validate_data;
pub use parameters::validate_parameters;
pub use results::validate_results;

/// Penalty-based scores start here.
pub const FULL_SCORE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    /// ≥95 excellent, ≥85 good, ≥70 fair, else poor.
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            Self::Excellent
        } else if score >= 85.0 {
            Self::Good
        } else if score >= 70.0 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Excellent => "excellent",
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Poor => "poor",
        }
    }
}

impl fmt::Display for QualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// True when no errors were found.
    pub is_valid: bool,
    /// In [0, 100].
    pub quality_score: f64,
    pub quality_level: QualityLevel,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl ValidationResult {
    pub fn from_score(score: f64, findings: Findings) -> Self {
        let quality_score = score.clamp(0.0, FULL_SCORE);
        Self {
            is_valid: findings.errors.is_empty(),
            quality_score,
            quality_level: QualityLevel::from_score(quality_score),
            errors: findings.errors,
            warnings: findings.warnings,
            suggestions: findings.suggestions,
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "valid: {}  score: {:.1} ({})",
            self.is_valid, self.quality_score, self.quality_level
        )?;
        for e in &self.errors {
            writeln!(f, "  error: {e}")?;
        }
        for w in &self.warnings {
            writeln!(f, "  warning: {w}")?;
        }
        for s in &self.suggestions {
            writeln!(f, "  suggestion: {s}")?;
        }
        Ok(())
    }
}

/// Messages collected by a group of checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
}

impl Findings {
    pub fn extend(&mut self, other: Findings) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        self.suggestions.extend(other.suggestions);
    }
}

/// One scored group of checks. Starts at [`FULL_SCORE`]; each finding
/// subtracts its penalty, floored at zero.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Section {
    pub score: f64,
    pub findings: Findings,
}

impl Default for Section {
    fn default() -> Self {
        Self {
            score: FULL_SCORE,
            findings: Findings::default(),
        }
    }
}

impl Section {
    pub fn error(&mut self, penalty: f64, message: impl Into<String>) {
        self.score = (self.score - penalty).max(0.0);
        self.findings.errors.push(message.into());
    }

    pub fn warning(&mut self, penalty: f64, message: impl Into<String>) {
        self.score = (self.score - penalty).max(0.0);
        self.findings.warnings.push(message.into());
    }

    pub fn suggest(&mut self, message: impl Into<String>) {
        self.findings.suggestions.push(message.into());
    }

    /// Hard failure: score drops to zero.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.score = 0.0;
        self.findings.errors.push(message.into());
    }
}

/// Count-based score for checks without sub-sections.
pub(crate) fn score_from_counts(errors: usize, warnings: usize) -> f64 {
    (FULL_SCORE - 20.0 * errors as f64 - 10.0 * warnings as f64).max(0.0)
}
