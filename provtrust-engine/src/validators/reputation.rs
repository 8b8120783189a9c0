//! D3: Reputation
//!
//! Registry standing of the provider: enumeration status, license state
//! against the submitted practice state, and whether a credential is on file.

use crate::types::{Finding, FindingSet, ProviderRecord, RegistrySnapshot, ReputationOutcome};
use provtrust_common::text::{codes_match, normalize_code};

/// s3 floor when there is no registry data to judge from
pub const NO_DATA_S3: f64 = 0.3;

pub fn assess(record: &ProviderRecord, registry: Option<&RegistrySnapshot>) -> ReputationOutcome {
    let Some(snapshot) = registry else {
        return ReputationOutcome {
            s3: FindingSet::new(
                NO_DATA_S3,
                vec![Finding::warn(
                    "Cannot assess reputation: NPPES data unavailable",
                )],
            ),
            license_state_matches: None,
        };
    };

    let mut checks = Vec::with_capacity(3);
    let mut findings = Vec::new();

    let status = normalize_code(&snapshot.status);
    if snapshot.is_active() {
        checks.push(1.0);
        findings.push(Finding::pass("NPI status is Active"));
    } else if !status.is_empty() {
        checks.push(0.0);
        findings.push(Finding::fail(format!("NPI status: {}", status)));
    } else {
        checks.push(0.7);
    }

    let license_state = normalize_code(&snapshot.license_state);
    let submitted_state = normalize_code(&record.state);
    let license_state_matches = if !license_state.is_empty() && !submitted_state.is_empty() {
        if codes_match(&license_state, &submitted_state) {
            checks.push(1.0);
            findings.push(Finding::pass(format!(
                "License state ({}) matches submitted state",
                license_state
            )));
            Some(true)
        } else {
            checks.push(0.4);
            findings.push(Finding::warn(format!(
                "License state ({}) differs from submitted state ({})",
                license_state, submitted_state
            )));
            Some(false)
        }
    } else {
        None
    };

    if snapshot.credential.trim().is_empty() {
        checks.push(0.6);
        findings.push(Finding::warn("No credential on file in NPPES"));
    } else {
        checks.push(1.0);
    }

    let s3 = FindingSet::from_checks(&checks, 0.5, findings);
    tracing::debug!(npi = %record.npi, s3 = s3.score, "Reputation check complete");

    ReputationOutcome {
        s3,
        license_state_matches,
    }
}
