use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use sqlx::SqlitePool;

use super::{ensure_success, positive_number, read_json, SpotPrice, SpotPriceSource};
use crate::error::FetchError;

pub const DEFAULT_BASE_URL: &str = "https://api.metalpriceapi.com";

/// Gold spot price from MetalpriceAPI (`rates.USDXAU` = USD per troy ounce).
///
/// `base_url` may point at a caching proxy exposing the same `/v1/latest` shape.
pub struct MetalPriceFetcher {
    api_key: String,
    base_url: String,
    client: Client,
    quota: Option<Quota>,
}

struct Quota {
    pool: SqlitePool,
    monthly_limit: i64,
}

impl MetalPriceFetcher {
    pub fn new(api_key: String, base_url: Option<String>, client: Client) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
            quota: None,
        }
    }

    /// Counts requests per calendar month in `pool` and refuses to go over `monthly_limit`.
    pub fn with_quota(mut self, pool: SqlitePool, monthly_limit: i64) -> Self {
        self.quota = Some(Quota { pool, monthly_limit });
        self
    }

    pub fn usage_key() -> String {
        format!("METALPRICE_USAGE_{}", chrono::Local::now().format("%Y-%m"))
    }

    async fn check_quota(&self) -> Result<(), FetchError> {
        let Some(quota) = &self.quota else {
            return Ok(());
        };
        let key = Self::usage_key();
        // A broken counter must not block fetching.
        let used = crate::db::get_api_usage(&quota.pool, &key).await.unwrap_or(0);
        if used >= quota.monthly_limit {
            return Err(FetchError::QuotaExceeded {
                provider: "MetalpriceAPI".to_string(),
                used,
                limit: quota.monthly_limit,
            });
        }
        Ok(())
    }

    async fn record_usage(&self) {
        if let Some(quota) = &self.quota {
            if let Err(e) = crate::db::increment_api_usage(&quota.pool, &Self::usage_key()).await {
                tracing::warn!(error = %e, "failed to record MetalpriceAPI usage");
            }
        }
    }

    pub(crate) fn parse_latest(json: &Value, reference: &str) -> Result<SpotPrice, FetchError> {
        if json["success"] == Value::Bool(false) {
            let info = json["error"]["info"]
                .as_str()
                .or_else(|| json["error"]["message"].as_str())
                .unwrap_or("unknown error");
            return Err(FetchError::Transport(format!("MetalpriceAPI rejected request: {}", info)));
        }

        let field = format!("{}XAU", reference.to_ascii_uppercase());
        let price_per_ounce = positive_number(&json["rates"][&field], &field)?;
        Ok(SpotPrice { price_per_ounce })
    }
}

#[async_trait]
impl SpotPriceSource for MetalPriceFetcher {
    fn name(&self) -> &str {
        "metalpriceapi"
    }

    async fn fetch_spot_price(&self, reference: &str) -> Result<SpotPrice, FetchError> {
        let key = self.api_key.trim();
        if key.is_empty() {
            return Err(FetchError::Transport("MetalpriceAPI key is empty or missing".to_string()));
        }

        self.check_quota().await?;

        let url = format!("{}/v1/latest", self.base_url.trim_end_matches('/'));
        let params = [
            ("api_key", key),
            ("base", reference),
            ("currencies", "EUR,XAU,XAG"),
        ];

        tracing::debug!(provider = self.name(), "fetching spot price");
        let resp = self.client.get(&url).query(&params).send().await?;
        self.record_usage().await;

        let resp = ensure_success("MetalpriceAPI", resp).await?;
        let json = read_json(resp).await?;
        Self::parse_latest(&json, reference)
    }
}
