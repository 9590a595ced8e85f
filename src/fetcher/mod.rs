use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, Response};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::core::rates::RawRates;
use crate::error::FetchError;

pub mod metalprice;
pub mod frankfurter;
pub mod currency_api;
pub mod er_api;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotPrice {
    pub price_per_ounce: f64,
}

#[async_trait]
pub trait SpotPriceSource: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch_spot_price(&self, reference: &str) -> Result<SpotPrice, FetchError>;
}

#[async_trait]
pub trait FxRateSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_rates(&self, reference: &str, targets: &[&str]) -> Result<RawRates, FetchError>;

    /// Per-date rates for chart conversion. Providers without history return an empty map.
    async fn fetch_historical_rates(
        &self,
        _reference: &str,
        _targets: &[&str],
        _range: RangeInclusive<NaiveDate>,
    ) -> Result<BTreeMap<NaiveDate, RawRates>, FetchError> {
        Ok(BTreeMap::new())
    }
}

/// Shared HTTP client. Requests that exceed `timeout` fail as transport errors.
pub fn http_client(timeout: Duration) -> reqwest::Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static("GoldTracker/0.1"));

    Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
}

/// Turns a non-success status into a transport error carrying the body.
pub(crate) async fn ensure_success(provider: &str, resp: Response) -> Result<Response, FetchError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(FetchError::Transport(format!("{} API Error: {} - Body: {}", provider, status, body)))
}

/// Reads the body as JSON. A body that is not JSON at all (proxy error pages,
/// truncated transfers) is a transport failure, not a shape problem.
pub(crate) async fn read_json(resp: Response) -> Result<serde_json::Value, FetchError> {
    let body = resp.text().await?;
    parse_body(&body)
}

pub(crate) fn parse_body(body: &str) -> Result<serde_json::Value, FetchError> {
    serde_json::from_str(body).map_err(|e| FetchError::Transport(format!("unparseable response body: {}", e)))
}

/// Finite, positive number at `value`, else a data-shape error naming `field`.
pub(crate) fn positive_number(value: &serde_json::Value, field: &str) -> Result<f64, FetchError> {
    match value.as_f64() {
        Some(n) if n.is_finite() && n > 0.0 => Ok(n),
        Some(n) => Err(FetchError::DataShape(format!("{} is not a positive number: {}", field, n))),
        None => Err(FetchError::DataShape(format!("missing/invalid {}", field))),
    }
}
