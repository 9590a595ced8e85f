use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;

use super::{ensure_success, read_json, FxRateSource};
use crate::core::rates::RawRates;
use crate::error::FetchError;

const BASE_URL: &str = "https://cdn.jsdelivr.net/npm/@fawazahmed0/currency-api@latest/v1/currencies";

/// Community currency API served from a CDN. Keys are lower-case and the
/// payload nests rates under the base code: `{ "date": "...", "usd": { "aed": 3.67 } }`.
pub struct CurrencyApiFetcher {
    client: Client,
    base_url: String,
}

impl CurrencyApiFetcher {
    pub fn new(client: Client) -> Self {
        Self { client, base_url: BASE_URL.to_string() }
    }

    pub(crate) fn parse_latest(json: &Value, reference: &str) -> Result<RawRates, FetchError> {
        let base = reference.to_ascii_lowercase();
        let rates = json[&base]
            .as_object()
            .ok_or_else(|| FetchError::DataShape(format!("No '{}' table in currency API response", base)))?;

        let table: HashMap<String, f64> = rates
            .iter()
            .filter_map(|(code, v)| v.as_f64().map(|r| (code.to_ascii_lowercase(), r)))
            .collect();

        Ok(RawRates::LowercaseKeyed { base, table })
    }
}

#[async_trait]
impl FxRateSource for CurrencyApiFetcher {
    fn name(&self) -> &str {
        "currency-api"
    }

    async fn fetch_rates(&self, reference: &str, _targets: &[&str]) -> Result<RawRates, FetchError> {
        let url = format!("{}/{}.json", self.base_url, reference.to_ascii_lowercase());
        let resp = self.client.get(&url).send().await?;
        let json = read_json(ensure_success("CurrencyAPI", resp).await?).await?;
        Self::parse_latest(&json, reference)
    }
}
