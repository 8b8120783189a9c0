//! Rule-based fraud assessment
//!
//! Fixed point contributions, summed without clamping:
//!
//! | Rule                          | Points |
//! |-------------------------------|--------|
//! | OIG exclusion match           | +90    |
//! | NPI not in registry           | +60    |
//! | Entry/document/registry conflict | +25 |
//!
//! Level: total ≥ 80 → HIGH, ≥ 20 → MEDIUM, else LOW.

use crate::types::{FraudAnalysis, FraudRiskLevel, ValidationResult};

pub const OIG_EXCLUSION_POINTS: f64 = 90.0;
pub const INVALID_NPI_POINTS: f64 = 60.0;
pub const INCONSISTENCY_POINTS: f64 = 25.0;

pub const HIGH_AT: f64 = 80.0;
pub const MEDIUM_AT: f64 = 20.0;

pub fn level_for(score: f64) -> FraudRiskLevel {
    if score >= HIGH_AT {
        FraudRiskLevel::High
    } else if score >= MEDIUM_AT {
        FraudRiskLevel::Medium
    } else {
        FraudRiskLevel::Low
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FraudAssessor;

impl FraudAssessor {
    pub fn assess(&self, validation: &ValidationResult) -> FraudAnalysis {
        let mut risk_score = 0.0;
        let mut flagged_patterns = Vec::new();

        if validation.oig_excluded {
            risk_score += OIG_EXCLUSION_POINTS;
            flagged_patterns.push("OIG Exclusion Match".to_string());
        }

        if !validation.npi_valid {
            risk_score += INVALID_NPI_POINTS;
            flagged_patterns.push("Invalid NPI".to_string());
        }

        if !validation.is_consistent {
            risk_score += INCONSISTENCY_POINTS;
            flagged_patterns.push("Data Inconsistency".to_string());
        }

        let risk_level = level_for(risk_score);
        if risk_level == FraudRiskLevel::High {
            tracing::warn!(risk_score, patterns = ?flagged_patterns, "High fraud risk detected");
        }

        FraudAnalysis {
            risk_score,
            risk_level,
            flagged_patterns,
        }
    }
}
