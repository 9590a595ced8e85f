use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use super::{ensure_success, read_json, FxRateSource};
use crate::core::rates::RawRates;
use crate::error::FetchError;
use crate::models::RateTable;

const BASE_URL: &str = "https://api.frankfurter.app";
/// ECB reference rates are quoted against EUR.
const PIVOT: &str = "EUR";

/// ECB rates via frankfurter.app. Not every Gulf currency is published;
/// missing ones are simply absent from the table.
pub struct FrankfurterFetcher {
    client: Client,
    base_url: String,
}

impl FrankfurterFetcher {
    pub fn new(client: Client) -> Self {
        Self { client, base_url: BASE_URL.to_string() }
    }

    fn symbols(reference: &str, targets: &[&str]) -> String {
        let mut symbols: Vec<&str> = vec![reference];
        symbols.extend(targets.iter().copied().filter(|t| *t != reference && *t != PIVOT));
        symbols.join(",")
    }

    fn parse_table(rates: &Value) -> RateTable {
        rates
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(code, v)| v.as_f64().map(|r| (code.as_str(), r)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn parse_latest(json: &Value) -> Result<RawRates, FetchError> {
        let rates = json
            .get("rates")
            .filter(|r| r.is_object())
            .ok_or_else(|| FetchError::DataShape("No rates found in Frankfurter response".to_string()))?;
        Ok(RawRates::CrossRate { via: PIVOT.to_string(), table: Self::parse_table(rates) })
    }

    pub(crate) fn parse_series(json: &Value) -> Result<BTreeMap<NaiveDate, RawRates>, FetchError> {
        let days = json["rates"]
            .as_object()
            .ok_or_else(|| FetchError::DataShape("No rate series found in Frankfurter response".to_string()))?;

        let mut series = BTreeMap::new();
        for (date_str, rates) in days {
            // "2024-05-01": { "USD": 1.07, "AED": 3.93 }
            let Ok(date) = NaiveDate::parse_from_str(date_str, "%Y-%m-%d") else {
                continue;
            };
            series.insert(date, RawRates::CrossRate { via: PIVOT.to_string(), table: Self::parse_table(rates) });
        }
        Ok(series)
    }
}

#[async_trait]
impl FxRateSource for FrankfurterFetcher {
    fn name(&self) -> &str {
        "frankfurter"
    }

    async fn fetch_rates(&self, reference: &str, targets: &[&str]) -> Result<RawRates, FetchError> {
        let url = format!("{}/latest", self.base_url);
        let symbols = Self::symbols(reference, targets);
        let resp = self
            .client
            .get(&url)
            .query(&[("from", PIVOT), ("to", symbols.as_str())])
            .send()
            .await?;
        let json = read_json(ensure_success("Frankfurter", resp).await?).await?;
        Self::parse_latest(&json)
    }

    async fn fetch_historical_rates(
        &self,
        reference: &str,
        targets: &[&str],
        range: RangeInclusive<NaiveDate>,
    ) -> Result<BTreeMap<NaiveDate, RawRates>, FetchError> {
        let url = format!(
            "{}/{}..{}",
            self.base_url,
            range.start().format("%Y-%m-%d"),
            range.end().format("%Y-%m-%d")
        );
        let symbols = Self::symbols(reference, targets);
        let resp = self
            .client
            .get(&url)
            .query(&[("from", PIVOT), ("to", symbols.as_str())])
            .send()
            .await?;
        let json = read_json(ensure_success("Frankfurter", resp).await?).await?;
        Self::parse_series(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_latest_cross_rate() {
        let json_data = json!({
            "amount": 1.0,
            "base": "EUR",
            "date": "2024-05-02",
            "rates": { "USD": 1.07, "AED": 3.93 }
        });
        let raw = FrankfurterFetcher::parse_latest(&json_data).unwrap();
        let table = raw.normalize();
        assert!((table.get("AED").unwrap() - 3.93 / 1.07).abs() < 1e-12);
        assert_eq!(table.get("KWD"), None);
    }

    #[test]
    fn test_parse_series() {
        let json_data = json!({
            "base": "EUR",
            "start_date": "2024-05-01",
            "end_date": "2024-05-03",
            "rates": {
                "2024-05-02": { "USD": 1.07 },
                "2024-05-03": { "USD": 1.08 },
                "garbage": { "USD": 9.0 }
            }
        });
        let series = FrankfurterFetcher::parse_series(&json_data).unwrap();
        assert_eq!(series.len(), 2);
        let last = series.keys().last().unwrap();
        assert_eq!(*last, NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());
    }

    #[test]
    fn test_parse_invalid_format() {
        let json_data = json!({ "message": "not found" });
        assert!(FrankfurterFetcher::parse_latest(&json_data).is_err());
        assert!(FrankfurterFetcher::parse_series(&json_data).is_err());
    }

    #[test]
    fn test_symbols_skip_pivot() {
        assert_eq!(FrankfurterFetcher::symbols("USD", &["USD", "EUR", "AED"]), "USD,AED");
    }
}
