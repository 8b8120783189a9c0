//! Batch input files
//!
//! All inputs are JSON and are loaded once before a batch starts. The
//! resulting values are shared read-only by every record in the batch.

use crate::types::{ParsedData, ProviderRecord};
use provtrust_common::{Error, Result};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Load provider records from a JSON array
///
/// # Errors
/// `Error::Io` if the file cannot be read, `Error::Parse` if it is not a
/// JSON array of records
pub fn load_records(path: &Path) -> Result<Vec<ProviderRecord>> {
    let content = std::fs::read_to_string(path)?;
    let records: Vec<ProviderRecord> = serde_json::from_str(&content)?;
    tracing::info!(count = records.len(), path = %path.display(), "Loaded provider records");
    Ok(records)
}

/// Load document-extracted fields keyed by NPI
///
/// The file is a JSON object mapping NPI to
/// `{extracted_npi, extracted_name, extracted_address, confidence}`.
pub fn load_documents(path: &Path) -> Result<HashMap<String, ParsedData>> {
    let content = std::fs::read_to_string(path)?;
    let documents: HashMap<String, ParsedData> = serde_json::from_str(&content)?;
    tracing::info!(count = documents.len(), path = %path.display(), "Loaded document extractions");
    Ok(documents
        .into_iter()
        .map(|(npi, parsed)| (npi.trim().to_string(), parsed))
        .collect())
}

/// Snapshot of excluded NPIs (OIG exclusion list)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExclusionList {
    npis: HashSet<String>,
}

impl ExclusionList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a JSON array of NPIs (strings or numbers)
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let list: ExclusionList = serde_json::from_str(&content)?;
        tracing::info!(count = list.len(), path = %path.display(), "Loaded exclusion list");
        Ok(list)
    }

    pub fn contains(&self, npi: &str) -> bool {
        let npi = npi.trim();
        !npi.is_empty() && self.npis.contains(npi)
    }

    pub fn len(&self) -> usize {
        self.npis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.npis.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for ExclusionList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            npis: iter
                .into_iter()
                .map(|s| s.as_ref().trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for ExclusionList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let values = Vec::<Value>::deserialize(deserializer)?;
        values
            .into_iter()
            .map(|v| match v {
                Value::String(s) => Ok(s),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(serde::de::Error::custom(format!(
                    "expected NPI string or number, got {}",
                    other
                ))),
            })
            .collect::<std::result::Result<Vec<String>, _>>()
            .map(|npis| npis.into_iter().collect())
    }
}

/// Reject an empty batch before any lookups are made
pub fn ensure_records(records: &[ProviderRecord]) -> Result<()> {
    if records.is_empty() {
        return Err(Error::InvalidInput("no provider records in input".to_string()));
    }
    Ok(())
}
