//! D2: Reachability
//!
//! Can a member actually reach this provider? Combines the geocoder result
//! for the submitted address, phone agreement with the registry, and
//! whether the NPI shows recent billing activity.

use super::identity::truncate;
use crate::lookups::LookupOutcome;
use crate::types::{
    BillingLocation, Finding, FindingSet, ProviderRecord, ReachabilityOutcome, RegistrySnapshot,
};
use provtrust_common::text::{codes_match, normalize_code, normalize_phone};

/// Neutral score: unknown is neither evidence for nor against
pub const NEUTRAL: f64 = 0.5;
/// Geocoder could not answer
pub const GEOCODER_UNCERTAIN: f64 = 0.3;
/// Known-but-different phone, or billing from another state
pub const INCONSISTENT: f64 = 0.3;

/// Score reachability for one record
///
/// # Arguments
/// * `record` - Submitted provider record
/// * `registry` - Registry snapshot from D1, if the NPI was found
/// * `geocode` - Geocoder outcome for the submitted one-line address
/// * `billing` - Billing activity outcome for the NPI
pub fn assess(
    record: &ProviderRecord,
    registry: Option<&RegistrySnapshot>,
    geocode: LookupOutcome<String>,
    billing: LookupOutcome<BillingLocation>,
) -> ReachabilityOutcome {
    let mut checks = Vec::with_capacity(3);
    let mut findings = Vec::new();

    // Step 1: Geocoder
    let address_matched = match geocode {
        LookupOutcome::Found(matched) => {
            checks.push(1.0);
            findings.push(Finding::pass(format!(
                "Address geocoded successfully: {}",
                matched
            )));
            Some(true)
        }
        LookupOutcome::NotFound => {
            checks.push(0.0);
            findings.push(Finding::fail(format!(
                "Address could not be geocoded: '{}'",
                record.one_line_address()
            )));
            Some(false)
        }
        LookupOutcome::Uncertain(reason) => {
            checks.push(GEOCODER_UNCERTAIN);
            findings.push(Finding::warn(format!(
                "Geocoder API error: {}",
                truncate(&reason, 80)
            )));
            None
        }
    };

    // Step 2: Phone against registry
    let submitted_phone = normalize_phone(&record.phone);
    let registry_phone = registry
        .map(|r| normalize_phone(&r.phone))
        .unwrap_or_default();
    if submitted_phone.is_empty() || registry_phone.is_empty() {
        checks.push(NEUTRAL);
    } else if submitted_phone == registry_phone {
        checks.push(1.0);
        findings.push(Finding::pass("Phone number matches NPPES record"));
    } else {
        checks.push(INCONSISTENT);
        findings.push(Finding::warn(format!(
            "Phone mismatch: submitted '{}' vs NPPES '{}'",
            submitted_phone, registry_phone
        )));
    }

    // Step 3: Billing activity
    let billing = match billing {
        LookupOutcome::Found(location) => {
            let billing_state = normalize_code(&location.state);
            let submitted_state = normalize_code(&record.state);
            if !billing_state.is_empty()
                && !submitted_state.is_empty()
                && !codes_match(&billing_state, &submitted_state)
            {
                checks.push(INCONSISTENT);
                findings.push(Finding::warn(format!(
                    "Medicare billing state ({}) differs from submitted state ({})",
                    billing_state, submitted_state
                )));
            } else {
                checks.push(1.0);
                findings.push(Finding::pass(format!(
                    "Medicare billing activity found: {}, {}",
                    location.city, location.state
                )));
            }
            Some(location)
        }
        LookupOutcome::NotFound => {
            checks.push(NEUTRAL);
            findings.push(Finding::warn("No Medicare billing records found for this NPI"));
            None
        }
        LookupOutcome::Uncertain(reason) => {
            checks.push(NEUTRAL);
            findings.push(Finding::warn(format!(
                "Medicare API error (non-critical): {}",
                truncate(&reason, 60)
            )));
            None
        }
    };

    let s2 = FindingSet::from_checks(&checks, NEUTRAL, findings);
    tracing::debug!(npi = %record.npi, s2 = s2.score, ?address_matched, "Reachability check complete");

    ReachabilityOutcome {
        s2,
        address_matched,
        billing,
    }
}
