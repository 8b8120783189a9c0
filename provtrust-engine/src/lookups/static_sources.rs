//! In-memory lookup sources
//!
//! Used for offline runs (registry snapshots loaded from a JSON file) and
//! for driving the pipeline deterministically in tests. Each source can be
//! told to fail or to stall so the degradation paths are reachable without
//! a network.

use super::{BillingActivity, Geocoder, IdentityRegistry};
use crate::error::LookupError;
use crate::types::{BillingLocation, RegistrySnapshot};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Shared failure/latency knobs
#[derive(Debug, Clone, Default)]
struct Behavior {
    /// Every call fails with this error
    fail_all: Option<LookupError>,
    /// Keys whose lookups fail
    failing: HashSet<String>,
    delay: Option<Duration>,
}

impl Behavior {
    async fn apply(&self, key: &str) -> Result<(), LookupError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.fail_all {
            return Err(err.clone());
        }
        if self.failing.contains(key) {
            return Err(LookupError::Network(format!("simulated failure for {}", key)));
        }
        Ok(())
    }
}

/// Registry backed by a fixed set of snapshots keyed by NPI
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    entries: HashMap<String, RegistrySnapshot>,
    behavior: Behavior,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that answers every lookup with an error
    pub fn unavailable() -> Self {
        Self {
            behavior: Behavior {
                fail_all: Some(LookupError::Network("registry unavailable offline".to_string())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn from_snapshots(snapshots: impl IntoIterator<Item = RegistrySnapshot>) -> Self {
        let entries = snapshots
            .into_iter()
            .map(|s| (s.npi.trim().to_string(), s))
            .collect();
        Self {
            entries,
            behavior: Behavior::default(),
        }
    }

    /// Load a JSON array of registry snapshots
    ///
    /// # Errors
    /// `Error::Io` if the file cannot be read, `Error::Parse` if it is not valid JSON
    pub fn load(path: &Path) -> provtrust_common::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshots: Vec<RegistrySnapshot> = serde_json::from_str(&content)?;
        tracing::info!(count = snapshots.len(), path = %path.display(), "Loaded registry snapshots");
        Ok(Self::from_snapshots(snapshots))
    }

    pub fn with_entry(mut self, snapshot: RegistrySnapshot) -> Self {
        self.entries.insert(snapshot.npi.trim().to_string(), snapshot);
        self
    }

    pub fn with_failure(mut self, npi: &str) -> Self {
        self.behavior.failing.insert(npi.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behavior.delay = Some(delay);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl IdentityRegistry for StaticRegistry {
    async fn lookup(&self, npi: &str) -> Result<Option<RegistrySnapshot>, LookupError> {
        self.behavior.apply(npi).await?;
        Ok(self.entries.get(npi.trim()).cloned())
    }
}

/// Geocoder that matches any non-blank address except those marked unmatched
#[derive(Debug, Clone, Default)]
pub struct StaticGeocoder {
    unmatched: HashSet<String>,
    behavior: Behavior,
}

impl StaticGeocoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            behavior: Behavior {
                fail_all: Some(LookupError::Network("geocoder unavailable offline".to_string())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Mark a one-line address (as built by `ProviderRecord::one_line_address`) unmatched
    pub fn with_unmatched(mut self, one_line_address: &str) -> Self {
        self.unmatched.insert(normalize(one_line_address));
        self
    }

    pub fn with_failure(mut self, one_line_address: &str) -> Self {
        self.behavior.failing.insert(normalize(one_line_address));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behavior.delay = Some(delay);
        self
    }
}

fn normalize(address: &str) -> String {
    address.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn match_address(&self, one_line_address: &str) -> Result<Option<String>, LookupError> {
        let key = normalize(one_line_address);
        self.behavior.apply(&key).await?;

        let blank = key.chars().all(|c| c == ',' || c.is_whitespace());
        if blank || self.unmatched.contains(&key) {
            Ok(None)
        } else {
            Ok(Some(key))
        }
    }
}

/// Billing activity keyed by NPI
#[derive(Debug, Clone, Default)]
pub struct StaticBilling {
    entries: HashMap<String, BillingLocation>,
    behavior: Behavior,
}

impl StaticBilling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            behavior: Behavior {
                fail_all: Some(LookupError::Network("billing source unavailable offline".to_string())),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_entry(mut self, npi: &str, city: &str, state: &str) -> Self {
        self.entries.insert(
            npi.to_string(),
            BillingLocation {
                city: city.to_string(),
                state: state.to_string(),
            },
        );
        self
    }

    pub fn with_failure(mut self, npi: &str) -> Self {
        self.behavior.failing.insert(npi.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.behavior.delay = Some(delay);
        self
    }
}

#[async_trait]
impl BillingActivity for StaticBilling {
    async fn lookup(&self, npi: &str) -> Result<Option<BillingLocation>, LookupError> {
        self.behavior.apply(npi).await?;
        Ok(self.entries.get(npi.trim()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_registry_found_and_missing() {
        let registry = StaticRegistry::new().with_entry(RegistrySnapshot {
            npi: "9912345678".to_string(),
            status: "A".to_string(),
            ..Default::default()
        });

        assert!(registry.lookup("9912345678").await.unwrap().is_some());
        assert!(registry.lookup("1234567893").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_registry_failure_is_an_error_not_absence() {
        let registry = StaticRegistry::new().with_failure("9912345678");
        assert!(registry.lookup("9912345678").await.is_err());

        let offline = StaticRegistry::unavailable();
        assert!(matches!(
            offline.lookup("1").await,
            Err(LookupError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_geocoder_matches_unless_marked() {
        let geocoder = StaticGeocoder::new().with_unmatched("1 Nowhere Rd, Ghost, NV 00000");

        assert!(geocoder
            .match_address("1 Main St, Sacramento, CA 95814")
            .await
            .unwrap()
            .is_some());
        assert!(geocoder
            .match_address("1 nowhere rd,  ghost, NV 00000")
            .await
            .unwrap()
            .is_none());
        assert!(geocoder.match_address(", ,  ").await.unwrap().is_none());
    }

    #[test]
    fn test_load_registry_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"npi": "9912345678", "first_name": "JANE", "last_name": "DOE", "status": "A"}}]"#
        )
        .unwrap();

        let registry = StaticRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
