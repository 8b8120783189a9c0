//! CMS Medicare provider utilization client
//!
//! A provider with any billing rows in the dataset is treated as actively
//! practicing; the first row's city and state are reported.

use super::{http_client, per_second_limiter, BillingActivity, DirectLimiter};
use crate::error::LookupError;
use crate::types::BillingLocation;
use async_trait::async_trait;
use provtrust_common::config::EndpointConfig;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BillingRow {
    #[serde(rename = "Rndrng_Prvdr_City")]
    city: String,
    #[serde(rename = "Rndrng_Prvdr_State_Abrvtn")]
    state: String,
}

pub struct MedicareBillingClient {
    client: Client,
    base_url: String,
    rate_limiter: DirectLimiter,
    timeout: Duration,
}

impl MedicareBillingClient {
    /// # Errors
    /// Returns `LookupError::Network` if the HTTP client cannot be built
    pub fn new(endpoints: &EndpointConfig, timeout: Duration) -> Result<Self, LookupError> {
        Ok(Self {
            client: http_client(&endpoints.user_agent, timeout)?,
            base_url: endpoints.billing_url.clone(),
            rate_limiter: per_second_limiter(endpoints.requests_per_second),
            timeout,
        })
    }
}

#[async_trait]
impl BillingActivity for MedicareBillingClient {
    async fn lookup(&self, npi: &str) -> Result<Option<BillingLocation>, LookupError> {
        self.rate_limiter.until_ready().await;

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("filter[Rndrng_NPI]", npi), ("size", "1")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LookupError::from_reqwest(e, self.timeout))?;

        let rows: Vec<BillingRow> = response
            .json()
            .await
            .map_err(|e| LookupError::Parse(format!("billing response: {}", e)))?;

        Ok(first_location(rows))
    }
}

fn first_location(rows: Vec<BillingRow>) -> Option<BillingLocation> {
    rows.into_iter().next().map(|row| BillingLocation {
        city: row.city,
        state: row.state,
    })
}
