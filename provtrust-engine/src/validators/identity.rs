//! D1: Identity integrity
//!
//! Compares submitted identity fields with the registry record. Four
//! component checks (name, credential, specialty, state) are averaged into
//! `s1`. A registry that says the NPI does not exist is the strongest
//! negative signal in the pipeline and carries a fixed λ contribution.

use crate::lookups::LookupOutcome;
use crate::types::{
    Finding, FindingSet, IdentityOutcome, PenaltyContribution, PenaltySource, ProviderRecord,
    RegistrySnapshot,
};
use provtrust_common::text::{codes_match, fuzzy_ratio};

/// λ contribution when the registry has no such NPI
pub const NOT_FOUND_PENALTY: f64 = 0.9;
/// λ contribution when the registry lists the NPI as deactivated
pub const DEACTIVATED_PENALTY: f64 = 0.5;
/// s1 when the registry could not be consulted
pub const UNCERTAIN_S1: f64 = 0.3;

/// Identity check with its similarity thresholds
#[derive(Debug, Clone)]
pub struct IdentityCheck {
    name_pass: f64,
    name_partial: f64,
    credential_pass: f64,
    credential_partial: f64,
    /// Specialty strings are abbreviation-prone, so these are looser
    specialty_pass: f64,
    specialty_partial: f64,
}

impl Default for IdentityCheck {
    fn default() -> Self {
        Self {
            name_pass: 0.85,
            name_partial: 0.5,
            credential_pass: 0.7,
            credential_partial: 0.3,
            specialty_pass: 0.5,
            specialty_partial: 0.25,
        }
    }
}

impl IdentityCheck {
    /// Score the submitted record against the registry lookup outcome
    ///
    /// # Returns
    /// `IdentityOutcome` with `s1`, the registry snapshot (for D2/D3) and any
    /// λ contributions (not found, deactivated)
    pub fn assess(
        &self,
        record: &ProviderRecord,
        registry: LookupOutcome<RegistrySnapshot>,
    ) -> IdentityOutcome {
        let registry_status = registry.status();

        let snapshot = match registry {
            LookupOutcome::NotFound => {
                return IdentityOutcome {
                    s1: FindingSet::new(
                        0.0,
                        vec![Finding::fail(format!(
                            "NPI {} NOT FOUND in NPPES registry",
                            record.npi.trim()
                        ))],
                    ),
                    registry_status,
                    snapshot: None,
                    penalties: vec![PenaltyContribution::new(
                        PenaltySource::NotFound,
                        NOT_FOUND_PENALTY,
                    )],
                };
            }
            LookupOutcome::Uncertain(reason) => {
                return IdentityOutcome {
                    s1: FindingSet::new(
                        UNCERTAIN_S1,
                        vec![Finding::warn(format!("NPPES API error: {}", truncate(&reason, 80)))],
                    ),
                    registry_status,
                    snapshot: None,
                    penalties: Vec::new(),
                };
            }
            LookupOutcome::Found(snapshot) => snapshot,
        };

        let mut checks = Vec::with_capacity(4);
        let mut findings = Vec::new();
        let mut penalties = Vec::new();

        // Step 1: Name
        let (name_sim, submitted_name, registry_name) = name_similarity(record, &snapshot);
        if name_sim >= self.name_pass {
            checks.push(1.0);
            findings.push(Finding::pass(format!(
                "Name match: {} ↔ NPPES: {}",
                submitted_name, registry_name
            )));
        } else if name_sim >= self.name_partial {
            checks.push(0.5);
            findings.push(Finding::warn(format!(
                "Partial name match ({:.0}%): submitted '{}' vs NPPES '{}'",
                name_sim * 100.0,
                submitted_name,
                registry_name
            )));
        } else {
            checks.push(0.0);
            findings.push(Finding::fail(format!(
                "Name MISMATCH: submitted '{}' vs NPPES '{}'",
                submitted_name, registry_name
            )));
        }

        // Step 2: Credential
        let cred_sim = fuzzy_ratio(&record.credential, &snapshot.credential);
        if cred_sim >= self.credential_pass {
            checks.push(1.0);
        } else if cred_sim >= self.credential_partial {
            checks.push(0.5);
            findings.push(Finding::warn(format!(
                "Credential partial match: submitted '{}' vs NPPES '{}'",
                record.credential, snapshot.credential
            )));
        } else {
            checks.push(0.2);
            if !record.credential.trim().is_empty() && !snapshot.credential.trim().is_empty() {
                findings.push(Finding::fail(format!(
                    "Credential mismatch: submitted '{}' vs NPPES '{}'",
                    record.credential, snapshot.credential
                )));
            }
        }

        // Step 3: Specialty
        let spec_sim = fuzzy_ratio(&record.specialty, &snapshot.specialty);
        if spec_sim >= self.specialty_pass {
            checks.push(1.0);
        } else if spec_sim >= self.specialty_partial {
            checks.push(0.6);
            findings.push(Finding::warn(format!(
                "Specialty partial match: submitted '{}' vs NPPES '{}'",
                record.specialty, snapshot.specialty
            )));
        } else {
            checks.push(0.2);
            findings.push(Finding::fail(format!(
                "Specialty mismatch: submitted '{}' vs NPPES '{}'",
                record.specialty, snapshot.specialty
            )));
        }

        // Step 4: State
        if codes_match(&record.state, &snapshot.state) {
            checks.push(1.0);
        } else {
            checks.push(0.0);
            findings.push(Finding::fail(format!(
                "State mismatch: submitted '{}' vs NPPES '{}'",
                record.state, snapshot.state
            )));
        }

        // Deactivation is penalized independently of the component checks
        if snapshot.is_deactivated() {
            penalties.push(PenaltyContribution::new(
                PenaltySource::Deactivated,
                DEACTIVATED_PENALTY,
            ));
            findings.push(Finding::fail("NPI is DEACTIVATED in NPPES registry"));
        }

        let s1 = FindingSet::from_checks(&checks, 0.0, findings);

        tracing::debug!(
            npi = %record.npi,
            s1 = s1.score,
            name_sim,
            deactivated = snapshot.is_deactivated(),
            "Identity check complete"
        );

        IdentityOutcome {
            s1,
            registry_status,
            snapshot: Some(snapshot),
            penalties,
        }
    }
}

/// Mean of first/last name similarity; organization name for NPI-2 entities
fn name_similarity(record: &ProviderRecord, snapshot: &RegistrySnapshot) -> (f64, String, String) {
    let registry_is_org =
        snapshot.first_name.trim().is_empty() && snapshot.last_name.trim().is_empty();

    if registry_is_org && !snapshot.organization_name.trim().is_empty() {
        let sim = fuzzy_ratio(&record.organization_name, &snapshot.organization_name);
        return (
            sim,
            record.organization_name.trim().to_string(),
            snapshot.organization_name.trim().to_string(),
        );
    }

    let sim = (fuzzy_ratio(&record.first_name, &snapshot.first_name)
        + fuzzy_ratio(&record.last_name, &snapshot.last_name))
        / 2.0;
    let submitted = format!("{} {}", record.first_name.trim(), record.last_name.trim())
        .trim()
        .to_string();
    (sim, submitted, snapshot.full_name())
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
