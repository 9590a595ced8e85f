#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};

use gold_tracker_lib::core::clock::{FixedClock, SystemClock};
use gold_tracker_lib::core::oracle::{OracleSettings, PriceOracle};
use gold_tracker_lib::core::persistence::MemoryStore;
use gold_tracker_lib::core::rates::RawRates;
use gold_tracker_lib::error::FetchError;
use gold_tracker_lib::fetcher::{FxRateSource, SpotPrice, SpotPriceSource};
use gold_tracker_lib::models::{RateTable, Selection};

pub const DEFAULT_SPOT: f64 = 2000.0;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap()
}

/// Spot source that plays back queued answers, then repeats `DEFAULT_SPOT`.
#[derive(Clone, Default)]
pub struct ScriptedSpot {
    script: Arc<Mutex<VecDeque<Result<f64, FetchError>>>>,
    calls: Arc<AtomicUsize>,
    /// Applied to the selection channel on the first call, to simulate a user
    /// switching currency while a fetch is in flight.
    switch_on_first_call: Arc<Mutex<Option<(watch::Sender<Selection>, Selection)>>>,
    /// When set, the next call signals `entered` and then waits on the gate.
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
    entered: Arc<Notify>,
}

impl ScriptedSpot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, answer: Result<f64, FetchError>) -> &Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Holds the next fetch in flight until the returned gate is notified.
    pub fn hold_next_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once a held fetch is in flight.
    pub async fn wait_in_flight(&self) {
        self.entered.notified().await;
    }

    pub fn switch_selection_on_first_call(&self, tx: watch::Sender<Selection>, next: Selection) {
        *self.switch_on_first_call.lock().unwrap() = Some((tx, next));
    }
}

#[async_trait]
impl SpotPriceSource for ScriptedSpot {
    fn name(&self) -> &str {
        "scripted-spot"
    }

    async fn fetch_spot_price(&self, _reference: &str) -> Result<SpotPrice, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some((tx, next)) = self.switch_on_first_call.lock().unwrap().take() {
            tx.send_replace(next);
        }
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            gate.notified().await;
        }
        let answer = self.script.lock().unwrap().pop_front().unwrap_or(Ok(DEFAULT_SPOT));
        answer.map(|price_per_ounce| SpotPrice { price_per_ounce })
    }
}

/// FX source with a settable live answer and optional per-date series.
#[derive(Clone)]
pub struct ScriptedFx {
    live: Arc<Mutex<Result<RawRates, FetchError>>>,
    series: Arc<Mutex<BTreeMap<NaiveDate, RawRates>>>,
}

impl ScriptedFx {
    pub fn new(live: Result<RawRates, FetchError>) -> Self {
        Self {
            live: Arc::new(Mutex::new(live)),
            series: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn direct(pairs: &[(&str, f64)]) -> Self {
        Self::new(Ok(direct(pairs)))
    }

    pub fn failing() -> Self {
        Self::new(Err(FetchError::Transport("connection refused".to_string())))
    }

    pub fn set_live(&self, live: Result<RawRates, FetchError>) {
        *self.live.lock().unwrap() = live;
    }

    pub fn set_series(&self, series: BTreeMap<NaiveDate, RawRates>) {
        *self.series.lock().unwrap() = series;
    }
}

#[async_trait]
impl FxRateSource for ScriptedFx {
    fn name(&self) -> &str {
        "scripted-fx"
    }

    async fn fetch_rates(&self, _reference: &str, _targets: &[&str]) -> Result<RawRates, FetchError> {
        self.live.lock().unwrap().clone()
    }

    async fn fetch_historical_rates(
        &self,
        _reference: &str,
        _targets: &[&str],
        range: RangeInclusive<NaiveDate>,
    ) -> Result<BTreeMap<NaiveDate, RawRates>, FetchError> {
        let series = self.series.lock().unwrap();
        Ok(series.range(range).map(|(d, r)| (*d, r.clone())).collect())
    }
}

pub fn direct(pairs: &[(&str, f64)]) -> RawRates {
    RawRates::Direct(pairs.iter().map(|(c, r)| (*c, *r)).collect::<RateTable>())
}

pub fn selection(currency: &str, karat: u8) -> Selection {
    Selection { currency: currency.to_string(), karat }
}

pub struct Harness {
    pub oracle: PriceOracle,
    pub spot: ScriptedSpot,
    pub fx: ScriptedFx,
    pub store: Arc<MemoryStore>,
    pub clock: Arc<FixedClock>,
}

pub async fn harness(fx: ScriptedFx, settings: OracleSettings) -> Harness {
    let spot = ScriptedSpot::new();
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::new(t0()));
    let oracle = PriceOracle::load(
        Box::new(spot.clone()),
        Box::new(fx.clone()),
        store.clone(),
        clock.clone(),
        settings,
    )
    .await;
    Harness { oracle, spot, fx, store, clock }
}

/// Oracle on the wall clock, for tests that compare against real timer ticks.
pub async fn wall_clock_oracle(spot: ScriptedSpot, fx: ScriptedFx) -> PriceOracle {
    PriceOracle::load(
        Box::new(spot),
        Box::new(fx),
        Arc::new(MemoryStore::new()),
        Arc::new(SystemClock),
        OracleSettings::default(),
    )
    .await
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
