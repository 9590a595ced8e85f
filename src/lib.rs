pub mod db;
pub mod models;
pub mod error;
pub mod config;
pub mod currencies;
pub mod fetcher;
pub mod core;
pub mod host;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, FxProvider};
use crate::core::clock::SystemClock;
use crate::core::oracle::PriceOracle;
use crate::core::scheduler::RefreshScheduler;
use crate::fetcher::currency_api::CurrencyApiFetcher;
use crate::fetcher::er_api::ErApiFetcher;
use crate::fetcher::frankfurter::FrankfurterFetcher;
use crate::fetcher::metalprice::MetalPriceFetcher;
use crate::fetcher::{FxRateSource, SpotPriceSource};

/// Installs the global subscriber. `GOLD_LOG` (or the config default) sets the filter.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_env("GOLD_LOG").unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn build_fx_source(provider: FxProvider, client: reqwest::Client) -> Box<dyn FxRateSource> {
    match provider {
        FxProvider::Frankfurter => Box::new(FrankfurterFetcher::new(client)),
        FxProvider::CurrencyApi => Box::new(CurrencyApiFetcher::new(client)),
        FxProvider::ErApi => Box::new(ErApiFetcher::new(client)),
    }
}

pub fn build_spot_source(config: &Config, client: reqwest::Client, pool: sqlx::SqlitePool) -> Box<dyn SpotPriceSource> {
    Box::new(
        MetalPriceFetcher::new(config.metalprice_api_key.clone(), config.metalprice_base_url.clone(), client)
            .with_quota(pool, config.metalprice_monthly_limit),
    )
}

/// Opens the store, restores state and builds an oracle wired to the configured providers.
pub async fn build_oracle(config: &Config) -> anyhow::Result<(PriceOracle, sqlx::SqlitePool)> {
    if !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir)?;
    }
    let pool = db::init(&config.data_dir).await?;

    if config.metalprice_api_key.is_empty() && config.metalprice_base_url.is_none() {
        tracing::warn!("METALPRICE_API_KEY is not set; spot refreshes will fail");
    }

    let client = fetcher::http_client(config.http_timeout)?;
    let spot = build_spot_source(config, client.clone(), pool.clone());
    let fx = build_fx_source(config.fx_provider, client);
    let store = Arc::new(db::SqliteStore::new(pool.clone()));

    let oracle = PriceOracle::load(spot, fx, store, Arc::new(SystemClock), config.oracle_settings()).await;
    Ok((oracle, pool))
}

pub async fn run() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(&config.log_filter);

    tracing::info!(
        fx = ?config.fx_provider,
        poll_secs = config.poll_interval.as_secs(),
        granularity = ?config.granularity,
        data_dir = %config.data_dir.display(),
        "starting gold tracker"
    );

    let (oracle, _pool) = build_oracle(&config).await?;
    if let Some(quote) = &oracle.state().quote {
        println!("last known: {}", host::format_quote(quote));
    }

    let handle = RefreshScheduler::start(oracle, config.poll_interval).await?;
    let result = host::run(&handle).await;

    handle.shutdown().await?;
    tracing::info!("bye");
    result
}
