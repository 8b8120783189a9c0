//! Per-record financial impact
//!
//! Three layers, each computed independently and then summed:
//! 1. Operational: manual verification time avoided (halved when the
//!    record still needs a human review)
//! 2. Denial prevention: claims rework avoided for records with at least
//!    one discrepancy
//! 3. Fraud prevention: tiered by risk bucket

use crate::types::{BusinessImpact, TrustStatus};

pub const MANUAL_MINUTES_PER_PROVIDER: f64 = 30.0;
pub const HOURLY_RATE: f64 = 30.0;
/// Share of manual time still spent on records that go to review
pub const REVIEW_TIME_REDUCTION: f64 = 0.5;

/// Detection rate gained over manual review (0.80 − 0.50)
pub const DETECTION_IMPROVEMENT: f64 = 0.30;
pub const CLAIMS_PER_ERROR_PROVIDER: f64 = 5.0;
pub const COST_PER_PROBLEMATIC_CLAIM: f64 = 200.0;

pub const HIGH_RISK_FRAUD_SAVING: f64 = 500.0;
pub const MEDIUM_RISK_FRAUD_SAVING: f64 = 100.0;

/// Risk at or below this with Verified status is auto-approved
pub const AUTO_APPROVE_MAX_RISK: f64 = 35.0;

/// Manual verification cost of one record ($15)
pub fn manual_cost() -> f64 {
    MANUAL_MINUTES_PER_PROVIDER / 60.0 * HOURLY_RATE
}

pub fn is_auto_approved(status: TrustStatus, risk_score: f64) -> bool {
    status == TrustStatus::Verified && risk_score <= AUTO_APPROVE_MAX_RISK
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BusinessImpactCalculator;

impl BusinessImpactCalculator {
    /// # Arguments
    /// * `risk_score` - Record risk (100 − trust)
    /// * `status` - Record status bucket
    /// * `conflict_count` - Discrepancies surfaced for the record
    pub fn calculate(&self, risk_score: f64, status: TrustStatus, conflict_count: usize) -> BusinessImpact {
        // Layer 1
        let operational = if is_auto_approved(status, risk_score) {
            manual_cost()
        } else {
            manual_cost() * REVIEW_TIME_REDUCTION
        };

        // Layer 2
        let denial = if conflict_count > 0 {
            DETECTION_IMPROVEMENT * CLAIMS_PER_ERROR_PROVIDER * COST_PER_PROBLEMATIC_CLAIM
        } else {
            0.0
        };

        // Layer 3
        let fraud = if risk_score > 70.0 {
            HIGH_RISK_FRAUD_SAVING
        } else if risk_score > 35.0 {
            MEDIUM_RISK_FRAUD_SAVING
        } else {
            0.0
        };

        BusinessImpact::from_layers(round2(operational), round2(denial), round2(fraud))
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
