use serde::{Deserialize, Serialize};
use chrono::{DateTime, Local, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::fmt;

pub const REFERENCE_CURRENCY: &str = "USD";

/// Currency code -> rate. Only finite, positive values are ever stored;
/// a missing key means "unknown", never zero.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct RateTable(BTreeMap<String, f64>);

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `rate` under the upper-cased `code`. Invalid rates are dropped.
    pub fn insert(&mut self, code: &str, rate: f64) -> bool {
        if !is_valid_rate(rate) {
            return false;
        }
        self.0.insert(code.trim().to_ascii_uppercase(), rate);
        true
    }

    pub fn get(&self, code: &str) -> Option<f64> {
        self.0.get(code).copied().filter(|r| is_valid_rate(*r))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for RateTable {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut table = RateTable::new();
        for (code, rate) in iter {
            table.insert(code.as_ref(), rate);
        }
        table
    }
}

pub fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate > 0.0
}

/// Key of a history sample: a calendar day or an epoch-aligned time bucket (seconds).
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum HistoryKey {
    Day(NaiveDate),
    Bucket(i64),
}

impl HistoryKey {
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            HistoryKey::Day(d) => Some(*d),
            HistoryKey::Bucket(ts) => DateTime::from_timestamp(*ts, 0)
                .map(|dt| dt.with_timezone(&Local).date_naive()),
        }
    }
}

impl fmt::Display for HistoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryKey::Day(d) => write!(f, "{}", d.format("%m-%d")),
            HistoryKey::Bucket(ts) => match DateTime::from_timestamp(*ts, 0) {
                Some(dt) => write!(f, "{}", dt.with_timezone(&Local).format("%m-%d %H:%M")),
                None => write!(f, "{}", ts),
            },
        }
    }
}

/// Spot price in the reference unit: USD per gram of 24K.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct HistoryPoint {
    pub key: HistoryKey,
    pub usd_per_gram: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    Bucketed { width_secs: i64 },
}

impl Granularity {
    pub fn default_capacity(&self) -> usize {
        match self {
            Granularity::Daily => 90,
            Granularity::Bucketed { .. } => 720,
        }
    }

    pub fn key_for(&self, now: DateTime<Utc>) -> HistoryKey {
        match *self {
            Granularity::Daily => HistoryKey::Day(now.with_timezone(&Local).date_naive()),
            Granularity::Bucketed { width_secs } => {
                let width = width_secs.max(1);
                HistoryKey::Bucket(now.timestamp().div_euclid(width) * width)
            }
        }
    }

    pub fn matches(&self, key: &HistoryKey) -> bool {
        matches!(
            (self, key),
            (Granularity::Daily, HistoryKey::Day(_)) | (Granularity::Bucketed { .. }, HistoryKey::Bucket(_))
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Selection {
    pub currency: String,
    pub karat: u8,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            currency: REFERENCE_CURRENCY.to_string(),
            karat: 24,
        }
    }
}

impl Selection {
    pub fn purity_factor(&self) -> f64 {
        crate::core::units::karat_factor(self.karat)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RateSource {
    Identity,
    Peg,
    Live,
    LastKnown,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RefreshStatus {
    pub last_success_at: Option<DateTime<Utc>>,
    pub next_due_at: DateTime<Utc>,
    pub degraded: bool,
    /// Notice raised by the last completed cycle (e.g. FX fallback to USD).
    pub notice: Option<String>,
}

impl RefreshStatus {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            last_success_at: None,
            next_due_at: now,
            degraded: false,
            notice: None,
        }
    }
}

/// The currently displayed price.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PriceQuote {
    /// Currency the price is expressed in. `USD` when degraded.
    pub currency: String,
    pub karat: u8,
    pub usd_per_gram_24k: f64,
    pub rate: f64,
    pub rate_source: RateSource,
    pub price_per_gram: f64,
    pub degraded: bool,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct ChartPoint {
    pub key: HistoryKey,
    pub value: f64,
}
