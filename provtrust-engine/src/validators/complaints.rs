//! Member complaint directory and cross-referencing
//!
//! A complaint is *confirmed* when the validation findings mention the
//! field it is about (by keyword), and merely *on file* otherwise. Both
//! raise λ; confirmed complaints raise it more.

use crate::scoring::business_impact::round2;
use crate::types::{Complaint, ComplaintField, ComplaintOutcome, Finding};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Keywords whose presence in findings text corroborates a complaint
pub fn field_keywords(field: ComplaintField) -> &'static [&'static str] {
    match field {
        ComplaintField::Phone => &["phone", "telephone"],
        ComplaintField::Address => &["address", "geocod", "location", "moved"],
        ComplaintField::Specialty => &["specialty", "specializ", "taxonomy"],
        ComplaintField::Name => &["name", "mismatch"],
        ComplaintField::General => &[],
    }
}

/// On-file complaints keyed by NPI
///
/// Loaded once per batch and shared read-only by every in-flight record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ComplaintDirectory {
    by_npi: HashMap<String, Vec<Complaint>>,
}

impl ComplaintDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON object of `npi -> [complaint]`
    ///
    /// # Errors
    /// `Error::Io` if the file cannot be read, `Error::Parse` if it is not valid JSON
    pub fn load(path: &Path) -> provtrust_common::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let directory: ComplaintDirectory = serde_json::from_str(&content)?;
        tracing::info!(
            providers = directory.by_npi.len(),
            complaints = directory.total(),
            path = %path.display(),
            "Loaded complaint directory"
        );
        Ok(directory)
    }

    pub fn with_complaint(mut self, npi: &str, complaint: Complaint) -> Self {
        self.by_npi
            .entry(npi.trim().to_string())
            .or_default()
            .push(complaint);
        self
    }

    pub fn for_npi(&self, npi: &str) -> &[Complaint] {
        self.by_npi
            .get(npi.trim())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total complaints across all providers
    pub fn total(&self) -> usize {
        self.by_npi.values().map(Vec::len).sum()
    }
}

/// Complaint cross-referencer with its λ weights
#[derive(Debug, Clone)]
pub struct ComplaintCrossReferencer {
    confirmed_weight: f64,
    unconfirmed_weight: f64,
    boost_cap: f64,
}

impl Default for ComplaintCrossReferencer {
    fn default() -> Self {
        Self {
            confirmed_weight: 0.15,
            unconfirmed_weight: 0.08,
            boost_cap: 0.50,
        }
    }
}

impl ComplaintCrossReferencer {
    /// Split complaints into confirmed/unconfirmed and compute the λ boost
    ///
    /// # Arguments
    /// * `complaints` - On-file complaints for one NPI
    /// * `findings_text` - Validation findings joined into one string (any case)
    pub fn cross_reference(&self, complaints: &[Complaint], findings_text: &str) -> ComplaintOutcome {
        if complaints.is_empty() {
            return ComplaintOutcome::default();
        }

        let findings_lower = findings_text.to_lowercase();
        let mut outcome = ComplaintOutcome::default();
        let mut boost = 0.0;

        for complaint in complaints {
            let confirmed = field_keywords(complaint.field)
                .iter()
                .any(|kw| findings_lower.contains(kw));

            if confirmed {
                boost += self.confirmed_weight;
                outcome.confirmed.push(complaint.clone());
            } else {
                boost += self.unconfirmed_weight;
                outcome.unconfirmed.push(complaint.clone());
            }
        }

        outcome.lambda_boost = round2(boost.min(self.boost_cap));

        if !outcome.confirmed.is_empty() {
            let mut fields: Vec<&str> = Vec::new();
            for complaint in &outcome.confirmed {
                let name = complaint.field.as_str();
                if !fields.contains(&name) {
                    fields.push(name);
                }
            }
            outcome.findings.push(Finding::fail(format!(
                "MATCH FOUND: {} member complaint(s) corroborated by validation findings (Fields: {}). Increasing risk penalty.",
                outcome.confirmed.len(),
                fields.join(", ")
            )));
        }

        if !outcome.unconfirmed.is_empty() {
            outcome.findings.push(Finding::warn(format!(
                "{} member complaint(s) found in registry. While not directly corroborated by external source failures, these remain risk factors.",
                outcome.unconfirmed.len()
            )));
        }

        tracing::debug!(
            confirmed = outcome.confirmed.len(),
            unconfirmed = outcome.unconfirmed.len(),
            lambda_boost = outcome.lambda_boost,
            "Complaints cross-referenced"
        );

        outcome
    }
}
