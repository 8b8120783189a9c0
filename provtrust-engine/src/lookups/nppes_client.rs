//! NPPES NPI Registry client
//!
//! Queries the public NPPES API (version 2.1) by NPI number and maps the
//! first result into a [`RegistrySnapshot`].
//!
//! API documentation: https://npiregistry.cms.hhs.gov/api-page

use super::{http_client, per_second_limiter, DirectLimiter, IdentityRegistry};
use crate::error::LookupError;
use crate::types::RegistrySnapshot;
use async_trait::async_trait;
use provtrust_common::config::EndpointConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct NppesResponse {
    #[serde(default)]
    result_count: u32,
    #[serde(default)]
    results: Vec<NppesResult>,
    /// Present instead of results when the query itself is rejected
    #[serde(rename = "Errors", default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NppesResult {
    #[serde(default)]
    number: serde_json::Value,
    #[serde(default)]
    basic: NppesBasic,
    #[serde(default)]
    addresses: Vec<NppesAddress>,
    #[serde(default)]
    taxonomies: Vec<NppesTaxonomy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NppesBasic {
    first_name: String,
    last_name: String,
    organization_name: String,
    credential: String,
    status: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NppesAddress {
    address_purpose: String,
    address_1: String,
    city: String,
    state: String,
    postal_code: String,
    telephone_number: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NppesTaxonomy {
    desc: String,
    primary: bool,
    state: String,
    license: String,
}

impl NppesResult {
    fn into_snapshot(self, npi: &str) -> RegistrySnapshot {
        // Practice location first, mailing address otherwise
        let address = self
            .addresses
            .iter()
            .position(|a| a.address_purpose.eq_ignore_ascii_case("LOCATION"))
            .or_else(|| (!self.addresses.is_empty()).then_some(0))
            .map(|i| &self.addresses[i]);

        let taxonomy = self
            .taxonomies
            .iter()
            .find(|t| t.primary)
            .or_else(|| self.taxonomies.first());

        let number = match &self.number {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n.to_string(),
            _ => npi.to_string(),
        };

        RegistrySnapshot {
            npi: number,
            first_name: self.basic.first_name,
            last_name: self.basic.last_name,
            organization_name: self.basic.organization_name,
            credential: self.basic.credential,
            specialty: taxonomy.map(|t| t.desc.clone()).unwrap_or_default(),
            license_number: taxonomy.map(|t| t.license.clone()).unwrap_or_default(),
            license_state: taxonomy.map(|t| t.state.clone()).unwrap_or_default(),
            address: address.map(|a| a.address_1.clone()).unwrap_or_default(),
            city: address.map(|a| a.city.clone()).unwrap_or_default(),
            state: address.map(|a| a.state.clone()).unwrap_or_default(),
            zip: address.map(|a| a.postal_code.clone()).unwrap_or_default(),
            phone: address.map(|a| a.telephone_number.clone()).unwrap_or_default(),
            status: self.basic.status,
        }
    }
}

/// NPPES registry client
///
/// Rate limited per client; every request also carries the configured
/// total and connect timeouts.
pub struct NppesRegistryClient {
    client: Client,
    base_url: String,
    rate_limiter: DirectLimiter,
    timeout: Duration,
}

impl NppesRegistryClient {
    /// # Errors
    /// Returns `LookupError::Network` if the HTTP client cannot be built
    pub fn new(endpoints: &EndpointConfig, timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            client: http_client(&endpoints.user_agent, timeout)?,
            base_url: endpoints.registry_url.clone(),
            rate_limiter: per_second_limiter(endpoints.requests_per_second),
            timeout,
        })
    }
}

#[async_trait]
impl IdentityRegistry for NppesRegistryClient {
    async fn lookup(&self, npi: &str) -> Result<Option<RegistrySnapshot>, LookupError> {
        self.rate_limiter.until_ready().await;

        tracing::debug!(npi = %npi, "Querying NPPES registry");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("number", npi), ("version", "2.1")])
            .send()
            .await
            .map_err(|e| LookupError::from_reqwest(e, self.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.as_u16() == 429 {
                LookupError::RateLimited
            } else {
                LookupError::Api {
                    status: status.as_u16(),
                }
            });
        }

        let body: NppesResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("NPPES response: {}", e)))?;

        parse_response(body, npi)
    }
}

fn parse_response(body: NppesResponse, npi: &str) -> Result<Option<RegistrySnapshot>, LookupError> {
    if !body.errors.is_empty() {
        // Registry rejected the number outright (e.g. malformed NPI)
        tracing::debug!(npi = %npi, errors = body.errors.len(), "NPPES rejected query");
        return Ok(None);
    }

    if body.result_count == 0 {
        return Ok(None);
    }

    Ok(body
        .results
        .into_iter()
        .next()
        .map(|result| result.into_snapshot(npi)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<Option<RegistrySnapshot>, LookupError> {
        let body: NppesResponse = serde_json::from_str(json).unwrap();
        parse_response(body, "9912345678")
    }

    #[test]
    fn test_zero_results_is_not_found() {
        assert_eq!(parse(r#"{"result_count": 0, "results": []}"#), Ok(None));
    }

    #[test]
    fn test_query_errors_are_not_found() {
        let json = r#"{"Errors": [{"description": "Field number requires 10 digits"}]}"#;
        assert_eq!(parse(json), Ok(None));
    }

    #[test]
    fn test_maps_location_address_and_primary_taxonomy() {
        let json = r#"{
            "result_count": 1,
            "results": [{
                "number": 9912345678,
                "basic": {"first_name": "JANE", "last_name": "DOE", "credential": "MD", "status": "A"},
                "addresses": [
                    {"address_purpose": "MAILING", "address_1": "PO BOX 1", "city": "X", "state": "NV"},
                    {"address_purpose": "LOCATION", "address_1": "1 MAIN ST", "city": "SACRAMENTO",
                     "state": "CA", "postal_code": "95814", "telephone_number": "555-123-4567"}
                ],
                "taxonomies": [
                    {"desc": "Pediatrics", "primary": false, "state": "NV", "license": "N1"},
                    {"desc": "Internal Medicine", "primary": true, "state": "CA", "license": "A123"}
                ]
            }]
        }"#;

        let snapshot = parse(json).unwrap().unwrap();
        assert_eq!(snapshot.npi, "9912345678");
        assert_eq!(snapshot.full_name(), "JANE DOE");
        assert_eq!(snapshot.state, "CA");
        assert_eq!(snapshot.address, "1 MAIN ST");
        assert_eq!(snapshot.specialty, "Internal Medicine");
        assert_eq!(snapshot.license_state, "CA");
        assert!(snapshot.is_active());
    }

    #[tokio::test]
    async fn test_client_timeout_reports_configured_limit() {
        // Accepts connections but never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let endpoints = EndpointConfig {
            registry_url: format!("http://{}/api/", addr),
            ..Default::default()
        };
        let client = NppesRegistryClient::new(&endpoints, Duration::from_millis(100)).unwrap();

        let err = client.lookup("1234567893").await.unwrap_err();
        assert_eq!(err, LookupError::Timeout(100));
        assert_eq!(err.to_string(), "lookup timed out after 100 ms");
    }
}
