//! External lookup capabilities
//!
//! The pipeline depends only on the three traits below. Concrete HTTP
//! clients live next to them; `static_sources` holds in-memory versions for
//! offline runs and tests.
//!
//! Every call made by a stage goes through [`bounded`], which applies the
//! configured timeout and folds the result into a [`LookupOutcome`].

pub mod billing_client;
pub mod geocoder_client;
pub mod nppes_client;
pub mod static_sources;

use crate::error::LookupError;
use crate::types::{BillingLocation, LookupStatus, RegistrySnapshot};
use async_trait::async_trait;
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

pub use billing_client::MedicareBillingClient;
pub use geocoder_client::CensusGeocoderClient;
pub use nppes_client::NppesRegistryClient;
pub use static_sources::{StaticBilling, StaticGeocoder, StaticRegistry};

/// Authoritative identity registry keyed by NPI
#[async_trait]
pub trait IdentityRegistry: Send + Sync {
    /// `Ok(None)` means the registry says the NPI does not exist
    async fn lookup(&self, npi: &str) -> Result<Option<RegistrySnapshot>, LookupError>;
}

/// Address geocoder
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Matched address on success, `Ok(None)` when nothing matched
    async fn match_address(&self, one_line_address: &str) -> Result<Option<String>, LookupError>;
}

/// Billing activity source keyed by NPI
#[async_trait]
pub trait BillingActivity: Send + Sync {
    async fn lookup(&self, npi: &str) -> Result<Option<BillingLocation>, LookupError>;
}

/// Normalized result of one external call
#[derive(Debug, Clone, PartialEq)]
pub enum LookupOutcome<T> {
    Found(T),
    NotFound,
    /// Timed out or errored; carries the error text for findings
    Uncertain(String),
}

impl<T> LookupOutcome<T> {
    pub fn status(&self) -> LookupStatus {
        match self {
            LookupOutcome::Found(_) => LookupStatus::Found,
            LookupOutcome::NotFound => LookupStatus::NotFound,
            LookupOutcome::Uncertain(_) => LookupStatus::Uncertain,
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            LookupOutcome::Found(value) => Some(value),
            _ => None,
        }
    }
}

impl<T> From<Result<Option<T>, LookupError>> for LookupOutcome<T> {
    fn from(result: Result<Option<T>, LookupError>) -> Self {
        match result {
            Ok(Some(value)) => LookupOutcome::Found(value),
            Ok(None) => LookupOutcome::NotFound,
            Err(e) => LookupOutcome::Uncertain(e.to_string()),
        }
    }
}

/// Await `call` for at most `limit`, mapping an elapsed timer to Uncertain
pub async fn bounded<T, F>(limit: Duration, call: F) -> LookupOutcome<T>
where
    F: Future<Output = Result<Option<T>, LookupError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.into(),
        Err(_) => {
            let err = LookupError::Timeout(limit.as_millis() as u64);
            tracing::warn!(timeout_ms = limit.as_millis() as u64, "External lookup timed out");
            LookupOutcome::Uncertain(err.to_string())
        }
    }
}

/// Token-bucket limiter shared by all calls of one client
pub(crate) type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Limiter allowing `requests_per_second` calls (minimum 1)
pub(crate) fn per_second_limiter(requests_per_second: u32) -> DirectLimiter {
    let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(rate))
}

/// HTTP client with bounded request and connect timeouts
pub(crate) fn http_client(user_agent: &str, timeout: Duration) -> Result<Client, LookupError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .user_agent(user_agent)
        .build()
        .map_err(|e| LookupError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// The three lookup capabilities, shared by every record in a batch
#[derive(Clone)]
pub struct LookupSet {
    pub registry: Arc<dyn IdentityRegistry>,
    pub geocoder: Arc<dyn Geocoder>,
    pub billing: Arc<dyn BillingActivity>,
}

impl LookupSet {
    pub fn new(
        registry: Arc<dyn IdentityRegistry>,
        geocoder: Arc<dyn Geocoder>,
        billing: Arc<dyn BillingActivity>,
    ) -> Self {
        Self {
            registry,
            geocoder,
            billing,
        }
    }
}

impl std::fmt::Debug for LookupSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupSet").finish_non_exhaustive()
    }
}
