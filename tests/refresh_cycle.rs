mod common;

use chrono::{Duration as ChronoDuration, Local};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

use common::*;
use gold_tracker_lib::core::oracle::{OracleSettings, PriceOracle};
use gold_tracker_lib::core::persistence::{self, MemoryStore, StateStore};
use gold_tracker_lib::core::units::ounce_to_gram;
use gold_tracker_lib::error::{FetchError, TrackerError};
use gold_tracker_lib::models::{Granularity, HistoryKey, RateSource};

#[tokio::test]
async fn pegged_currency_at_22k() {
    let mut h = harness(ScriptedFx::failing(), OracleSettings::default()).await;

    let report = h.oracle.refresh(&selection("AED", 22)).await.unwrap();

    assert_eq!(report.quote.currency, "AED");
    assert_eq!(report.quote.rate_source, RateSource::Peg);
    assert!(approx(report.quote.rate, 3.6725));
    assert!((report.quote.price_per_gram - 216.47).abs() < 0.01, "got {}", report.quote.price_per_gram);
    assert!(!report.quote.degraded);
    assert!(report.notice.is_none());
    assert_eq!(h.oracle.state().history.len(), 1);
    assert_eq!(report.chart.len(), 1);
    assert!(approx(report.chart[0].value, report.quote.price_per_gram));
}

#[tokio::test]
async fn missing_fx_degrades_to_usd_but_records_spot() {
    let mut h = harness(ScriptedFx::failing(), OracleSettings::default()).await;

    let report = h.oracle.refresh(&selection("KWD", 21)).await.unwrap();

    let usd_per_gram = ounce_to_gram(DEFAULT_SPOT);
    assert_eq!(report.quote.currency, "USD");
    assert_eq!(report.quote.rate_source, RateSource::Identity);
    assert!(report.quote.degraded);
    assert!(approx(report.quote.price_per_gram, usd_per_gram * 21.0 / 24.0));
    assert_eq!(report.notice.as_deref(), Some("FX missing for KWD (showing USD)"));
    assert!(report.status.degraded);
    assert_eq!(report.status.notice, report.notice);

    // The selection itself is kept; only the display falls back.
    assert_eq!(h.oracle.state().selection, selection("KWD", 21));
    assert!(approx(h.oracle.state().history.latest().unwrap().usd_per_gram, usd_per_gram));
    // Nothing to draw in KWD without a rate.
    assert!(report.chart.is_empty());
}

#[tokio::test]
async fn spot_failure_leaves_state_untouched() {
    let mut h = harness(ScriptedFx::direct(&[("KWD", 0.307)]), OracleSettings::default()).await;
    h.oracle.refresh(&selection("KWD", 24)).await.unwrap();
    let before = h.oracle.state().clone();

    h.clock.advance(ChronoDuration::days(1));
    h.spot.push(Err(FetchError::Transport("timed out".to_string())));
    let err = h.oracle.refresh(&selection("KWD", 24)).await.unwrap_err();

    assert!(matches!(err, TrackerError::Transport(_)));
    assert_eq!(h.oracle.state(), &before);
}

#[tokio::test]
async fn malformed_spot_is_rejected() {
    let mut h = harness(ScriptedFx::failing(), OracleSettings::default()).await;
    h.spot.push(Ok(-5.0));

    let err = h.oracle.refresh(&selection("USD", 24)).await.unwrap_err();

    assert!(matches!(err, TrackerError::DataShape(_)));
    assert!(h.oracle.state().history.is_empty());
    assert!(h.oracle.state().quote.is_none());
}

#[tokio::test]
async fn quota_exhaustion_surfaces_as_quota_error() {
    let mut h = harness(ScriptedFx::failing(), OracleSettings::default()).await;
    h.spot.push(Err(FetchError::QuotaExceeded { provider: "MetalpriceAPI".to_string(), used: 100, limit: 100 }));

    let err = h.oracle.refresh(&selection("USD", 24)).await.unwrap_err();
    assert!(matches!(err, TrackerError::QuotaExceeded { used: 100, limit: 100, .. }));
}

#[tokio::test]
async fn refreshes_in_one_bucket_keep_the_latest_value() {
    let settings = OracleSettings {
        granularity: Granularity::Bucketed { width_secs: 600 },
        capacity: 720,
        historical_fx: false,
        ..OracleSettings::default()
    };
    let mut h = harness(ScriptedFx::failing(), settings).await;
    h.spot.push(Ok(2000.0)).push(Ok(2100.0)).push(Ok(2200.0));

    h.oracle.refresh(&selection("USD", 24)).await.unwrap();
    h.clock.advance(ChronoDuration::seconds(120));
    h.oracle.refresh(&selection("USD", 24)).await.unwrap();

    let history = &h.oracle.state().history;
    assert_eq!(history.len(), 1);
    assert!(approx(history.latest().unwrap().usd_per_gram, ounce_to_gram(2100.0)));

    h.clock.advance(ChronoDuration::seconds(600));
    h.oracle.refresh(&selection("USD", 24)).await.unwrap();
    let keys: Vec<HistoryKey> = h.oracle.state().history.points().iter().map(|p| p.key).collect();
    assert_eq!(keys.len(), 2);
    assert!(keys[0] < keys[1]);
}

#[tokio::test]
async fn last_known_rate_covers_a_later_fx_outage() {
    let mut h = harness(ScriptedFx::direct(&[("KWD", 0.307)]), OracleSettings::default()).await;

    let first = h.oracle.refresh(&selection("KWD", 24)).await.unwrap();
    assert_eq!(first.quote.rate_source, RateSource::Live);

    h.fx.set_live(Err(FetchError::DataShape("no rates".to_string())));
    h.clock.advance(ChronoDuration::days(1));
    let second = h.oracle.refresh(&selection("KWD", 24)).await.unwrap();

    assert_eq!(second.quote.currency, "KWD");
    assert_eq!(second.quote.rate_source, RateSource::LastKnown);
    assert!(approx(second.quote.rate, 0.307));
    assert!(!second.quote.degraded);
    assert_eq!(second.chart.len(), 2);
}

#[tokio::test]
async fn selection_change_mid_flight_reruns_for_latest_selection() {
    let mut h = harness(ScriptedFx::direct(&[("KWD", 0.307)]), OracleSettings::default()).await;
    let (tx, mut rx) = watch::channel(selection("USD", 24));
    h.spot.switch_selection_on_first_call(tx.clone(), selection("KWD", 21));

    let report = h.oracle.refresh_until_settled(&mut rx).await.unwrap();

    assert_eq!(h.spot.calls(), 2);
    assert_eq!(report.quote.currency, "KWD");
    assert_eq!(report.quote.karat, 21);
    assert_eq!(h.oracle.state().selection, selection("KWD", 21));
    assert_eq!(h.oracle.state().quote.as_ref(), Some(&report.quote));
    drop(tx);
}

#[tokio::test]
async fn chart_uses_rate_of_each_day() {
    let mut h = harness(ScriptedFx::direct(&[("KWD", 0.31)]), OracleSettings::default()).await;
    let day1 = t0().with_timezone(&Local).date_naive();
    h.fx.set_series(BTreeMap::from([(day1, direct(&[("KWD", 0.30)]))]));

    h.oracle.refresh(&selection("KWD", 24)).await.unwrap();
    h.clock.advance(ChronoDuration::days(1));
    let report = h.oracle.refresh(&selection("KWD", 24)).await.unwrap();

    let usd_per_gram = ounce_to_gram(DEFAULT_SPOT);
    assert_eq!(report.chart.len(), 2);
    assert!(approx(report.chart[0].value, usd_per_gram * 0.30));
    assert!(approx(report.chart[1].value, usd_per_gram * 0.31));
}

#[tokio::test]
async fn persistence_failure_is_not_fatal() {
    let mut h = harness(ScriptedFx::failing(), OracleSettings::default()).await;
    h.store.set_fail_writes(true);

    let report = h.oracle.refresh(&selection("SAR", 18)).await.unwrap();

    assert_eq!(h.oracle.state().quote.as_ref(), Some(&report.quote));
    assert!(h.store.get(persistence::KEY_HISTORY).is_none());
}

#[tokio::test]
async fn state_survives_reload() {
    let mut h = harness(ScriptedFx::direct(&[("KWD", 0.307), ("OMR", 0.385)]), OracleSettings::default()).await;
    h.oracle.refresh(&selection("OMR", 22)).await.unwrap();
    h.clock.advance(ChronoDuration::days(1));
    h.oracle.refresh(&selection("KWD", 21)).await.unwrap();

    let reloaded = PriceOracle::load(
        Box::new(h.spot.clone()),
        Box::new(h.fx.clone()),
        h.store.clone(),
        h.clock.clone(),
        OracleSettings::default(),
    )
    .await;

    assert_eq!(reloaded.state(), h.oracle.state());
    assert_eq!(reloaded.state().selection, selection("KWD", 21));
    assert_eq!(reloaded.state().resolver.last_known().len(), 2);
}

#[tokio::test]
async fn corrupt_persisted_state_falls_back_to_defaults() {
    let store = Arc::new(MemoryStore::new());
    persistence::save_json(store.as_ref(), persistence::KEY_SELECTION, &selection("EUR", 24)).await.unwrap();
    store.save(persistence::KEY_HISTORY, "{not json").await.unwrap();

    let h = harness(ScriptedFx::failing(), OracleSettings::default()).await;
    let oracle = PriceOracle::load(
        Box::new(h.spot.clone()),
        Box::new(h.fx.clone()),
        store,
        h.clock.clone(),
        OracleSettings::default(),
    )
    .await;

    assert_eq!(oracle.state().selection, selection("USD", 24));
    assert!(oracle.state().history.is_empty());
}

#[tokio::test]
async fn series_backfill_is_stale_and_not_cached() {
    let mut h = harness(ScriptedFx::failing(), OracleSettings::default()).await;
    let yesterday = t0().with_timezone(&Local).date_naive().pred_opt().unwrap();
    h.fx.set_series(BTreeMap::from([(yesterday, direct(&[("KWD", 0.30)]))]));

    let report = h.oracle.refresh(&selection("KWD", 24)).await.unwrap();

    assert_eq!(report.quote.currency, "KWD");
    assert_eq!(report.quote.rate_source, RateSource::LastKnown);
    assert!(approx(report.quote.rate, 0.30));
    assert!(!report.quote.degraded);
    assert!(h.oracle.state().resolver.last_known().is_empty());
}
