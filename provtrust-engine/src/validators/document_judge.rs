//! Document judge
//!
//! Compares entry-supplied fields against a supporting document and against
//! the registry record. Any disagreement becomes a [`ConflictDetail`]; the
//! resulting [`ValidationResult`] is consistent exactly when there are none.
//!
//! Pairwise comparisons:
//! 1. entry NPI vs document NPI (exact; no fuzziness for identifiers)
//! 2. entry name vs document name (fuzzy, conflict below threshold)
//! 3. entry name vs registry name (fuzzy, independent of any document)

use crate::types::{
    ConflictDetail, IdentityOutcome, LookupStatus, ParsedData, ProviderRecord, ValidationResult,
};
use provtrust_common::text::fuzzy_ratio;

#[derive(Debug, Clone)]
pub struct DocumentJudge {
    /// Name similarity below this is a conflict
    name_threshold: f64,
}

impl Default for DocumentJudge {
    fn default() -> Self {
        Self {
            name_threshold: 0.8,
        }
    }
}

impl DocumentJudge {
    /// Collect conflicts between entry, document and registry values
    pub fn conflicts(
        &self,
        record: &ProviderRecord,
        parsed: Option<&ParsedData>,
        identity: &IdentityOutcome,
    ) -> Vec<ConflictDetail> {
        let mut conflicts = Vec::new();
        let entry_npi = record.npi.trim();
        let entry_name = record.full_name();

        if let Some(parsed) = parsed {
            if let Some(doc_npi) = parsed.extracted_npi.as_deref().map(str::trim) {
                if !doc_npi.is_empty() && !entry_npi.is_empty() && doc_npi != entry_npi {
                    conflicts.push(ConflictDetail {
                        field: "NPI".to_string(),
                        entry_value: entry_npi.to_string(),
                        reference_value: doc_npi.to_string(),
                        description: "NPI mismatch between entry and document".to_string(),
                    });
                }
            }

            if let Some(doc_name) = parsed.extracted_name.as_deref().map(str::trim) {
                if !doc_name.is_empty() {
                    let similarity = fuzzy_ratio(&entry_name, doc_name);
                    if similarity < self.name_threshold {
                        conflicts.push(ConflictDetail {
                            field: "Name".to_string(),
                            entry_value: entry_name.clone(),
                            reference_value: doc_name.to_string(),
                            description: format!("Name mismatch (similarity: {:.2})", similarity),
                        });
                    }
                }
            }
        }

        if let Some(snapshot) = identity.snapshot.as_ref() {
            let registry_name = snapshot.full_name();
            if !entry_name.is_empty() && !registry_name.is_empty() {
                let similarity = fuzzy_ratio(&entry_name, &registry_name);
                if similarity < self.name_threshold {
                    conflicts.push(ConflictDetail {
                        field: "Name (Registry)".to_string(),
                        entry_value: entry_name,
                        reference_value: registry_name,
                        description: "Entry name does not match NPPES registry record"
                            .to_string(),
                    });
                }
            }
        }

        conflicts
    }

    /// Build the record's `ValidationResult`
    ///
    /// # Arguments
    /// * `record` - Submitted provider record
    /// * `parsed` - Document-extracted fields, if a document was supplied
    /// * `identity` - D1 outcome (registry status and snapshot)
    /// * `oig_excluded` - NPI appears on the exclusion list for this batch
    pub fn evaluate(
        &self,
        record: &ProviderRecord,
        parsed: Option<&ParsedData>,
        identity: &IdentityOutcome,
        oig_excluded: bool,
    ) -> ValidationResult {
        let conflicts = self.conflicts(record, parsed, identity);

        // Only an explicit "does not exist" invalidates the NPI
        let npi_valid = identity.registry_status != LookupStatus::NotFound;
        let license_valid = match identity.registry_status {
            LookupStatus::Found => identity
                .snapshot
                .as_ref()
                .map(|s| s.is_active())
                .unwrap_or(false),
            LookupStatus::NotFound => false,
            LookupStatus::Uncertain => true,
        };

        let mut sources_checked = vec![
            "NPPES_NPI_Registry".to_string(),
            "OIG_Exclusion_List".to_string(),
            "Fuzzy_Judge".to_string(),
        ];
        if parsed.is_some() {
            sources_checked.push("Document_Extraction".to_string());
        }

        let details = if !npi_valid {
            format!("NPI invalid: {} not found in registry", record.npi.trim())
        } else if !conflicts.is_empty() {
            format!("Conflicts detected: {}", conflicts.len())
        } else if identity.registry_status == LookupStatus::Uncertain {
            "Registry unavailable; validation inconclusive".to_string()
        } else {
            "Validation passed".to_string()
        };

        if !conflicts.is_empty() {
            tracing::info!(npi = %record.npi, conflicts = conflicts.len(), "Document judge found conflicts");
        }

        ValidationResult::new(
            npi_valid,
            license_valid,
            oig_excluded,
            conflicts,
            sources_checked,
            details,
        )
    }
}
