//! Census Bureau one-line address geocoder client

use super::{http_client, per_second_limiter, DirectLimiter, Geocoder};
use crate::error::LookupError;
use async_trait::async_trait;
use provtrust_common::config::EndpointConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeocodeResponse {
    result: GeocodeResult,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeocodeResult {
    #[serde(rename = "addressMatches")]
    address_matches: Vec<AddressMatch>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AddressMatch {
    #[serde(rename = "matchedAddress")]
    matched_address: String,
}

pub struct CensusGeocoderClient {
    client: Client,
    base_url: String,
    rate_limiter: DirectLimiter,
    timeout: Duration,
}

impl CensusGeocoderClient {
    /// # Errors
    /// Returns `LookupError::Network` if the HTTP client cannot be built
    pub fn new(endpoints: &EndpointConfig, timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            client: http_client(&endpoints.user_agent, timeout)?,
            base_url: endpoints.geocoder_url.clone(),
            rate_limiter: per_second_limiter(endpoints.requests_per_second),
            timeout,
        })
    }
}

#[async_trait]
impl Geocoder for CensusGeocoderClient {
    async fn match_address(&self, one_line_address: &str) -> Result<Option<String>, LookupError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("address", one_line_address),
                ("benchmark", "Public_AR_Current"),
                ("format", "json"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LookupError::from_reqwest(e, self.timeout))?;

        let body: GeocodeResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("geocoder response: {}", e)))?;

        Ok(first_match(body))
    }
}

fn first_match(body: GeocodeResponse) -> Option<String> {
    body.result
        .address_matches
        .into_iter()
        .next()
        .map(|m| m.matched_address)
}
