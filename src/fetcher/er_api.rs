use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;

use super::{ensure_success, read_json, FxRateSource};
use crate::core::rates::RawRates;
use crate::error::FetchError;
use crate::models::RateTable;

const BASE_URL: &str = "https://open.er-api.com/v6/latest";

#[derive(Debug, Deserialize)]
struct LatestResponse {
    result: String,
    #[serde(default)]
    base_code: Option<String>,
    #[serde(default)]
    rates: HashMap<String, f64>,
    #[serde(rename = "error-type", default)]
    error_type: Option<String>,
}

/// ExchangeRate-API open endpoint: a direct USD-based table.
pub struct ErApiFetcher {
    client: Client,
    base_url: String,
}

impl ErApiFetcher {
    pub fn new(client: Client) -> Self {
        Self { client, base_url: BASE_URL.to_string() }
    }

    fn into_raw(body: LatestResponse, reference: &str) -> Result<RawRates, FetchError> {
        if body.result != "success" {
            return Err(FetchError::Transport(format!(
                "ExchangeRate-API error: {}",
                body.error_type.unwrap_or_else(|| body.result.clone())
            )));
        }
        let base = body.base_code.unwrap_or_else(|| reference.to_string());
        let table: RateTable = body.rates.iter().map(|(c, r)| (c.as_str(), *r)).collect();
        if table.is_empty() {
            return Err(FetchError::DataShape("ExchangeRate-API returned no rates".to_string()));
        }
        if base.eq_ignore_ascii_case(reference) {
            Ok(RawRates::Direct(table))
        } else {
            Ok(RawRates::CrossRate { via: base, table })
        }
    }
}

#[async_trait]
impl FxRateSource for ErApiFetcher {
    fn name(&self) -> &str {
        "er-api"
    }

    async fn fetch_rates(&self, reference: &str, _targets: &[&str]) -> Result<RawRates, FetchError> {
        let url = format!("{}/{}", self.base_url, reference);
        let resp = self.client.get(&url).send().await?;
        let json = read_json(ensure_success("ExchangeRate-API", resp).await?).await?;
        let body: LatestResponse = serde_json::from_value(json)
            .map_err(|e| FetchError::DataShape(format!("unexpected ExchangeRate-API payload: {}", e)))?;
        Self::into_raw(body, reference)
    }
}
