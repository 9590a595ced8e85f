//! Runtime configuration.
//!
//! Read from the process environment, after loading `.env` if present.

use std::path::PathBuf;
use std::time::Duration;

use crate::core::oracle::OracleSettings;
use crate::error::TrackerError;
use crate::models::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FxProvider {
    Frankfurter,
    CurrencyApi,
    ErApi,
}

impl FxProvider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "frankfurter" | "ecb" => Some(FxProvider::Frankfurter),
            "currency-api" | "currency_api" => Some(FxProvider::CurrencyApi),
            "er-api" | "er_api" | "open-er-api" => Some(FxProvider::ErApi),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub metalprice_api_key: String,
    /// Alternative endpoint (e.g. a caching proxy) with the MetalpriceAPI shape.
    pub metalprice_base_url: Option<String>,
    pub metalprice_monthly_limit: i64,
    pub fx_provider: FxProvider,
    pub poll_interval: Duration,
    pub granularity: Granularity,
    pub history_capacity: usize,
    pub chart_window: usize,
    pub http_timeout: Duration,
    pub data_dir: PathBuf,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            metalprice_api_key: String::new(),
            metalprice_base_url: None,
            metalprice_monthly_limit: 100,
            fx_provider: FxProvider::Frankfurter,
            poll_interval: Duration::from_secs(600),
            granularity: Granularity::Daily,
            history_capacity: Granularity::Daily.default_capacity(),
            chart_window: 30,
            http_timeout: Duration::from_secs(15),
            data_dir: PathBuf::from("./data"),
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Loads `.env` (if any) and reads the environment.
    pub fn from_env() -> Result<Self, TrackerError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Unset keys keep defaults;
    /// set-but-invalid keys are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, TrackerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Config::default();

        if let Some(key) = get("METALPRICE_API_KEY") {
            config.metalprice_api_key = key;
        }
        config.metalprice_base_url = get("METALPRICE_BASE_URL");
        if let Some(v) = get("METALPRICE_MONTHLY_LIMIT") {
            config.metalprice_monthly_limit = parse_number("METALPRICE_MONTHLY_LIMIT", &v)?;
        }

        if let Some(v) = get("GOLD_FX_PROVIDER") {
            config.fx_provider = FxProvider::from_str(&v)
                .ok_or_else(|| TrackerError::Config(format!("unknown GOLD_FX_PROVIDER '{}'", v)))?;
        }

        if let Some(v) = get("GOLD_POLL_SECS") {
            let secs: u64 = parse_number("GOLD_POLL_SECS", &v)?;
            if secs == 0 {
                return Err(TrackerError::Config("GOLD_POLL_SECS must be > 0".to_string()));
            }
            config.poll_interval = Duration::from_secs(secs);
        }

        let bucket_secs: i64 = match get("GOLD_BUCKET_SECS") {
            Some(v) => parse_number("GOLD_BUCKET_SECS", &v)?,
            None => 600,
        };
        if bucket_secs <= 0 {
            return Err(TrackerError::Config("GOLD_BUCKET_SECS must be > 0".to_string()));
        }

        if let Some(v) = get("GOLD_GRANULARITY") {
            config.granularity = match v.to_ascii_lowercase().as_str() {
                "daily" | "day" => Granularity::Daily,
                "bucket" | "bucketed" => Granularity::Bucketed { width_secs: bucket_secs },
                other => return Err(TrackerError::Config(format!("unknown GOLD_GRANULARITY '{}'", other))),
            };
        }

        config.history_capacity = match get("GOLD_HISTORY_CAPACITY") {
            Some(v) => parse_number("GOLD_HISTORY_CAPACITY", &v)?,
            None => config.granularity.default_capacity(),
        };
        if let Some(v) = get("GOLD_CHART_WINDOW") {
            config.chart_window = parse_number("GOLD_CHART_WINDOW", &v)?;
        }
        if let Some(v) = get("GOLD_HTTP_TIMEOUT_SECS") {
            config.http_timeout = Duration::from_secs(parse_number("GOLD_HTTP_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("GOLD_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("GOLD_LOG") {
            config.log_filter = v;
        }

        Ok(config)
    }

    pub fn oracle_settings(&self) -> OracleSettings {
        OracleSettings {
            granularity: self.granularity,
            capacity: self.history_capacity,
            chart_window: self.chart_window,
            poll_interval: self.poll_interval,
            historical_fx: self.fx_provider == FxProvider::Frankfurter,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, TrackerError> {
    value
        .parse()
        .map_err(|_| TrackerError::Config(format!("{} has invalid value '{}'", key, value)))
}
