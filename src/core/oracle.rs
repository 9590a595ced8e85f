use chrono::{DateTime, Days, Local, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::core::clock::Clock;
use crate::core::history::HistoryStore;
use crate::core::persistence::{self, StateStore};
use crate::core::projector::{self, FxBasis};
use crate::core::rates::{RateResolver, RawRates, Resolution};
use crate::core::units;
use crate::currencies::Catalog;
use crate::error::{Result, TrackerError};
use crate::fetcher::{FxRateSource, SpotPriceSource};
use crate::models::{
    ChartPoint, Granularity, HistoryPoint, PriceQuote, RateSource, RateTable, RefreshStatus, Selection,
    REFERENCE_CURRENCY,
};

#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub granularity: Granularity,
    pub capacity: usize,
    /// Number of history samples handed to the chart.
    pub chart_window: usize,
    pub poll_interval: Duration,
    /// Ask the FX provider for a per-date series covering the chart window.
    pub historical_fx: bool,
}

impl Default for OracleSettings {
    fn default() -> Self {
        let granularity = Granularity::Daily;
        Self {
            granularity,
            capacity: granularity.default_capacity(),
            chart_window: 30,
            poll_interval: Duration::from_secs(600),
            historical_fx: true,
        }
    }
}

/// Everything the tracker persists.
#[derive(Debug, Clone, PartialEq)]
pub struct AppState {
    pub selection: Selection,
    pub history: HistoryStore,
    pub resolver: RateResolver,
    pub status: RefreshStatus,
    pub quote: Option<PriceQuote>,
}

impl AppState {
    pub fn new(settings: &OracleSettings, now: DateTime<Utc>) -> Self {
        Self {
            selection: Selection::default(),
            history: HistoryStore::new(settings.capacity),
            resolver: RateResolver::new(),
            status: RefreshStatus::new(now),
            quote: None,
        }
    }

    /// Reads the persisted state, falling back to defaults per key.
    pub async fn load(store: &dyn StateStore, settings: &OracleSettings, now: DateTime<Utc>) -> Self {
        let mut state = Self::new(settings, now);

        if let Some(selection) = persistence::load_json::<Selection>(store, persistence::KEY_SELECTION).await {
            if is_valid_selection(&selection) {
                state.selection = selection;
            } else {
                tracing::warn!(?selection, "ignoring unsupported persisted selection");
            }
        }

        if let Some(points) = persistence::load_json::<Vec<HistoryPoint>>(store, persistence::KEY_HISTORY).await {
            state.history = HistoryStore::from_points(settings.capacity, points);
            let dropped = state.history.retain_granularity(&settings.granularity);
            if dropped > 0 {
                tracing::info!(dropped, "dropped history samples of a different granularity");
            }
        }

        if let Some(last_known) =
            persistence::load_json::<BTreeMap<String, f64>>(store, persistence::KEY_LAST_KNOWN_RATES).await
        {
            state.resolver = RateResolver::with_last_known(last_known);
        }

        if let Some(status) = persistence::load_json::<RefreshStatus>(store, persistence::KEY_REFRESH_STATUS).await {
            state.status = status;
        }

        state.quote = persistence::load_json::<PriceQuote>(store, persistence::KEY_LAST_QUOTE).await;
        state
    }

    /// Writes every key. All keys are attempted; the first failure is returned.
    pub async fn persist(&self, store: &dyn StateStore) -> Result<()> {
        let results = [
            persistence::save_json(store, persistence::KEY_SELECTION, &self.selection).await,
            persistence::save_json(store, persistence::KEY_HISTORY, self.history.points()).await,
            persistence::save_json(store, persistence::KEY_LAST_KNOWN_RATES, self.resolver.last_known()).await,
            persistence::save_json(store, persistence::KEY_REFRESH_STATUS, &self.status).await,
            persistence::save_json(store, persistence::KEY_LAST_QUOTE, &self.quote).await,
        ];
        results.into_iter().collect::<Result<Vec<()>>>().map(|_| ())
    }
}

pub fn is_valid_selection(selection: &Selection) -> bool {
    Catalog::is_supported(&selection.currency) && units::is_allowed_karat(selection.karat)
}

/// Outcome of a completed cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    pub quote: PriceQuote,
    pub chart: Vec<ChartPoint>,
    pub status: RefreshStatus,
    /// Set when the cycle completed in a degraded mode.
    pub notice: Option<String>,
}

/// FX data gathered for one cycle.
struct FxSnapshot {
    live: Option<RateTable>,
    /// Newest series table, only set when the live call failed.
    backfill: Option<RateTable>,
    basis: FxBasis,
}

/// Fetches, normalizes and records prices. `&mut self` on `refresh` means a
/// single oracle can never run two cycles at once.
pub struct PriceOracle {
    state: AppState,
    spot: Box<dyn SpotPriceSource>,
    fx: Box<dyn FxRateSource>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    settings: OracleSettings,
}

impl PriceOracle {
    pub fn new(
        state: AppState,
        spot: Box<dyn SpotPriceSource>,
        fx: Box<dyn FxRateSource>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: OracleSettings,
    ) -> Self {
        Self { state, spot, fx, store, clock, settings }
    }

    /// Loads persisted state from `store` and builds the oracle around it.
    pub async fn load(
        spot: Box<dyn SpotPriceSource>,
        fx: Box<dyn FxRateSource>,
        store: Arc<dyn StateStore>,
        clock: Arc<dyn Clock>,
        settings: OracleSettings,
    ) -> Self {
        let state = AppState::load(store.as_ref(), &settings, clock.now()).await;
        Self::new(state, spot, fx, store, clock, settings)
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    /// Runs one cycle for `selection`.
    ///
    /// A spot failure aborts with all state left as it was. FX failures only
    /// degrade the result.
    pub async fn refresh(&mut self, selection: &Selection) -> Result<RefreshReport> {
        if !is_valid_selection(selection) {
            return Err(TrackerError::Config(format!(
                "unsupported selection {} {}K",
                selection.currency, selection.karat
            )));
        }
        if self.state.selection != *selection {
            self.state.selection = selection.clone();
            self.save_quietly(persistence::KEY_SELECTION, &self.state.selection).await;
        }

        let now = self.clock.now();

        let spot = match self.spot.fetch_spot_price(REFERENCE_CURRENCY).await {
            Ok(spot) => spot,
            Err(e) => {
                tracing::warn!(source = self.spot.name(), kind = e.kind(), error = %e, "spot price fetch failed");
                return Err(e.into());
            }
        };

        let usd_per_gram = units::ounce_to_gram(spot.price_per_ounce);
        if !usd_per_gram.is_finite() || usd_per_gram <= 0.0 {
            tracing::warn!(source = self.spot.name(), kind = "data_shape", value = spot.price_per_ounce, "rejecting spot price");
            return Err(TrackerError::DataShape(format!("invalid spot price {}", spot.price_per_ounce)));
        }

        let key = self.settings.granularity.key_for(now);
        self.state.history.upsert(key, usd_per_gram);

        let fx = self.fetch_fx(now).await;

        let resolution = match &fx.live {
            Some(table) => self.state.resolver.resolve_and_remember(&selection.currency, Some(table)),
            // A series table is not a live quote: not cached, and labelled as stale.
            None => match self.state.resolver.resolve(&selection.currency, fx.backfill.as_ref()) {
                Resolution::Resolved { rate, source: RateSource::Live } => {
                    Resolution::Resolved { rate, source: RateSource::LastKnown }
                }
                other => other,
            },
        };
        let (currency, rate, rate_source, notice) = match resolution {
            Resolution::Resolved { rate, source } => (selection.currency.clone(), rate, source, None),
            Resolution::Unavailable => {
                let err = TrackerError::RateUnavailable { currency: selection.currency.clone() };
                tracing::warn!(error = %err, "falling back to USD");
                (
                    REFERENCE_CURRENCY.to_string(),
                    1.0,
                    RateSource::Identity,
                    Some(format!("FX missing for {} (showing USD)", selection.currency)),
                )
            }
        };
        let degraded = notice.is_some();

        let quote = PriceQuote {
            currency,
            karat: selection.karat,
            usd_per_gram_24k: usd_per_gram,
            rate,
            rate_source,
            price_per_gram: usd_per_gram * rate * selection.purity_factor(),
            degraded,
            as_of: now,
        };

        let chart = projector::project(
            &self.state.history,
            self.settings.chart_window,
            selection,
            &self.state.resolver,
            &fx.basis,
        );

        self.state.status = RefreshStatus {
            last_success_at: Some(now),
            next_due_at: now + chrono::Duration::from_std(self.settings.poll_interval)
                .unwrap_or_else(|_| chrono::Duration::zero()),
            degraded,
            notice: notice.clone(),
        };
        self.state.quote = Some(quote.clone());

        if let Err(e) = self.state.persist(self.store.as_ref()).await {
            tracing::warn!(error = %e, "failed to persist state; keeping in-memory copy");
        }

        tracing::info!(
            currency = %quote.currency,
            karat = quote.karat,
            price_per_gram = quote.price_per_gram,
            rate_source = ?quote.rate_source,
            samples = self.state.history.len(),
            "refresh complete"
        );

        Ok(RefreshReport { quote, chart, status: self.state.status.clone(), notice })
    }

    /// Records when the next scheduled cycle will run.
    pub async fn set_next_due(&mut self, at: DateTime<Utc>) {
        if self.state.status.next_due_at == at {
            return;
        }
        self.state.status.next_due_at = at;
        self.save_quietly(persistence::KEY_REFRESH_STATUS, &self.state.status).await;
    }

    /// Refreshes with the selection current at cycle start and repeats while
    /// the selection changed during the cycle.
    pub async fn refresh_until_settled(&mut self, selection: &mut watch::Receiver<Selection>) -> Result<RefreshReport> {
        loop {
            let sampled = selection.borrow_and_update().clone();
            let result = self.refresh(&sampled).await;
            if !selection.has_changed().unwrap_or(false) {
                return result;
            }
            tracing::info!("selection changed during refresh; refreshing again");
        }
    }

    /// Current table plus the basis used for the chart. Failures are logged and
    /// absorbed by the resolver's fallback chain.
    async fn fetch_fx(&self, now: DateTime<Utc>) -> FxSnapshot {
        let targets = Catalog::codes();

        let live = match self.fx.fetch_rates(REFERENCE_CURRENCY, &targets).await {
            Ok(raw) => Some(raw.normalize()),
            Err(e) => {
                tracing::warn!(source = self.fx.name(), kind = e.kind(), error = %e, "FX fetch failed; using fallbacks");
                None
            }
        };

        if !self.settings.historical_fx {
            return FxSnapshot { basis: FxBasis::Uniform(live.clone()), live, backfill: None };
        }

        let today = now.with_timezone(&Local).date_naive();
        let span = self.settings.chart_window.saturating_sub(1) as u64;
        let start = today.checked_sub_days(Days::new(span)).unwrap_or(today);

        let series = match self.fx.fetch_historical_rates(REFERENCE_CURRENCY, &targets, start..=today).await {
            Ok(series) => series,
            Err(e) => {
                tracing::warn!(source = self.fx.name(), kind = e.kind(), error = %e, "FX history fetch failed");
                BTreeMap::new()
            }
        };

        if series.is_empty() {
            return FxSnapshot { basis: FxBasis::Uniform(live.clone()), live, backfill: None };
        }

        let mut tables: BTreeMap<NaiveDate, RateTable> =
            series.iter().map(|(date, raw): (&NaiveDate, &RawRates)| (*date, raw.normalize())).collect();

        let backfill = if live.is_none() { tables.values().next_back().cloned() } else { None };
        if let Some(table) = live.as_ref().or(backfill.as_ref()) {
            tables.entry(today).or_insert_with(|| table.clone());
        }

        FxSnapshot { live, backfill, basis: FxBasis::PerDate(tables) }
    }

    async fn save_quietly<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = persistence::save_json(self.store.as_ref(), key, value).await {
            tracing::warn!(key, error = %e, "failed to persist state");
        }
    }
}
