use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::core::history::HistoryStore;
use crate::core::rates::RateResolver;
use crate::models::{ChartPoint, RateTable, Selection};

/// FX data available for converting history.
///
/// Chart accuracy is bounded by this: with `Uniform` every sample is converted
/// at today's rate.
#[derive(Debug, Clone, PartialEq)]
pub enum FxBasis {
    /// Normalized USD -> target tables per calendar date.
    PerDate(BTreeMap<NaiveDate, RateTable>),
    /// A single current table (or none) applied to every sample.
    Uniform(Option<RateTable>),
}

impl FxBasis {
    fn table_for(&self, date: Option<NaiveDate>) -> Option<&RateTable> {
        match self {
            FxBasis::PerDate(tables) => date.and_then(|d| tables.get(&d)),
            FxBasis::Uniform(table) => table.as_ref(),
        }
    }
}

/// Converts the last `window` history samples into chart values for `selection`.
///
/// Samples whose rate cannot be resolved are left out. No interpolation.
pub fn project(
    history: &HistoryStore,
    window: usize,
    selection: &Selection,
    resolver: &RateResolver,
    basis: &FxBasis,
) -> Vec<ChartPoint> {
    let factor = selection.purity_factor();

    history
        .window(window)
        .filter_map(|point| {
            let table = basis.table_for(point.key.date());
            let rate = resolver.resolve(&selection.currency, table).rate()?;
            let value = point.usd_per_gram * rate * factor;
            value.is_finite().then_some(ChartPoint { key: point.key, value })
        })
        .collect()
}
