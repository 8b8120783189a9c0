//! Trust score
//!
//! `T = 100 × (w1·s1 + w2·s2 + w3·s3) × (1 − λ)`
//!
//! λ is the sum of every triggered penalty contribution, capped at
//! [`LAMBDA_CAP`]. Weights and status thresholds are fixed policy.

use crate::types::{
    ComplaintOutcome, IdentityOutcome, PenaltyContribution, PenaltySource, ReachabilityOutcome,
    ReputationOutcome, TrustAssessment, TrustStatus,
};

/// Identity weight
pub const W1: f64 = 0.40;
/// Reachability weight
pub const W2: f64 = 0.30;
/// Reputation weight
pub const W3: f64 = 0.30;

pub const LAMBDA_CAP: f64 = 0.95;

/// Risk above this is Flagged
pub const FLAGGED_ABOVE: f64 = 70.0;
/// Risk above this (and not Flagged) is Review
pub const REVIEW_ABOVE: f64 = 35.0;

/// λ contribution when the address does not geocode and the license state differs
pub const JOINT_FAILURE_PENALTY: f64 = 0.5;

/// Trust score in [0, 100], rounded to one decimal
///
/// λ is clamped to `[0, LAMBDA_CAP]` and the dimension scores to `[0, 1]`.
pub fn trust_score(s1: f64, s2: f64, s3: f64, lambda: f64) -> f64 {
    let s1 = s1.clamp(0.0, 1.0);
    let s2 = s2.clamp(0.0, 1.0);
    let s3 = s3.clamp(0.0, 1.0);
    let lambda = lambda.clamp(0.0, LAMBDA_CAP);

    let raw = W1 * s1 + W2 * s2 + W3 * s3;
    round1((100.0 * raw * (1.0 - lambda)).clamp(0.0, 100.0))
}

/// Three-bucket status from a risk score
pub fn status_for_risk(risk: f64) -> TrustStatus {
    if risk > FLAGGED_ABOVE {
        TrustStatus::Flagged
    } else if risk > REVIEW_ABOVE {
        TrustStatus::Review
    } else {
        TrustStatus::Verified
    }
}

/// Joint reachability/reputation failure, if both signals are known and bad
pub fn joint_failure_penalty(
    reachability: &ReachabilityOutcome,
    reputation: &ReputationOutcome,
) -> Option<PenaltyContribution> {
    let address_failed = reachability.address_matched == Some(false);
    let license_state_differs = reputation.license_state_matches == Some(false);
    (address_failed && license_state_differs).then(|| {
        PenaltyContribution::new(
            PenaltySource::JointReachabilityReputation,
            JOINT_FAILURE_PENALTY,
        )
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TrustScorer;

impl TrustScorer {
    /// Combine the three dimensions and all penalty contributions
    pub fn assess(
        &self,
        identity: &IdentityOutcome,
        reachability: &ReachabilityOutcome,
        reputation: &ReputationOutcome,
        complaints: &ComplaintOutcome,
    ) -> TrustAssessment {
        // Step 1: Collect independently triggered penalties
        let mut penalties: Vec<PenaltyContribution> = identity.penalties.clone();
        if let Some(joint) = joint_failure_penalty(reachability, reputation) {
            penalties.push(joint);
        }
        if complaints.lambda_boost > 0.0 {
            penalties.push(PenaltyContribution::new(
                PenaltySource::Complaints,
                complaints.lambda_boost,
            ));
        }

        // Step 2: Sum and cap
        let lambda = penalties
            .iter()
            .map(|p| p.amount)
            .sum::<f64>()
            .clamp(0.0, LAMBDA_CAP);

        // Step 3: Score and bucket
        let (s1, s2, s3) = (
            identity.s1.score,
            reachability.s2.score,
            reputation.s3.score,
        );
        let trust = trust_score(s1, s2, s3, lambda);
        let risk = round1(100.0 - trust);
        let status = status_for_risk(risk);

        tracing::debug!(s1, s2, s3, lambda, trust, risk, status = %status, "Trust score computed");

        TrustAssessment {
            s1,
            s2,
            s3,
            lambda,
            penalties,
            trust_score: trust,
            risk_score: risk,
            status,
        }
    }
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
