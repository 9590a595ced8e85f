use std::collections::{BTreeMap, HashMap};

use crate::currencies::Catalog;
use crate::models::{is_valid_rate, RateSource, RateTable, REFERENCE_CURRENCY};

/// Rate payload as delivered by a provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawRates {
    /// `{ TARGET: target per 1 USD }`
    Direct(RateTable),
    /// Rates against a third currency; the table must carry a `USD` entry.
    CrossRate { via: String, table: RateTable },
    /// Lower-case keyed table expressing "target per 1 base".
    LowercaseKeyed { base: String, table: HashMap<String, f64> },
}

impl RawRates {
    pub fn empty() -> Self {
        RawRates::Direct(RateTable::new())
    }

    /// Canonical USD -> target table. Always contains `USD = 1`.
    pub fn normalize(&self) -> RateTable {
        let mut out = match self {
            RawRates::Direct(table) => table.clone(),
            RawRates::CrossRate { via, table } => from_cross(via, table),
            RawRates::LowercaseKeyed { base, table } => {
                let upper: RateTable = table
                    .iter()
                    .map(|(code, rate)| (code.to_ascii_uppercase(), *rate))
                    .collect();
                let base = base.to_ascii_uppercase();
                if base == REFERENCE_CURRENCY {
                    upper
                } else {
                    from_cross(&base, &upper)
                }
            }
        };
        out.insert(REFERENCE_CURRENCY, 1.0);
        out
    }
}

fn from_cross(via: &str, table: &RateTable) -> RateTable {
    let via = via.to_ascii_uppercase();
    if via == REFERENCE_CURRENCY {
        return table.clone();
    }
    let Some(usd_per_via) = table.get(REFERENCE_CURRENCY) else {
        return RateTable::new();
    };

    let mut out: RateTable = table
        .iter()
        .filter(|(code, _)| code.as_str() != REFERENCE_CURRENCY)
        .map(|(code, rate)| (code.clone(), rate / usd_per_via))
        .collect();
    // The pivot itself is only implied by the table.
    out.insert(&via, 1.0 / usd_per_via);
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Resolved { rate: f64, source: RateSource },
    Unavailable,
}

impl Resolution {
    pub fn rate(&self) -> Option<f64> {
        match self {
            Resolution::Resolved { rate, .. } => Some(*rate),
            Resolution::Unavailable => None,
        }
    }
}

/// Resolves "1 USD = ? target" with the fallback chain
/// identity -> peg -> live -> last known -> unavailable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateResolver {
    last_known: BTreeMap<String, f64>,
}

impl RateResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_last_known(last_known: BTreeMap<String, f64>) -> Self {
        Self { last_known }
    }

    pub fn last_known(&self) -> &BTreeMap<String, f64> {
        &self.last_known
    }

    /// Pure lookup; never touches the last-known cache.
    pub fn resolve(&self, target: &str, live: Option<&RateTable>) -> Resolution {
        if target == REFERENCE_CURRENCY {
            return Resolution::Resolved { rate: 1.0, source: RateSource::Identity };
        }

        if let Some(peg) = Catalog::usd_peg(target) {
            return Resolution::Resolved { rate: peg, source: RateSource::Peg };
        }

        if let Some(rate) = live.and_then(|t| t.get(target)) {
            return Resolution::Resolved { rate, source: RateSource::Live };
        }

        match self.last_known.get(target).copied() {
            Some(rate) if is_valid_rate(rate) => {
                Resolution::Resolved { rate, source: RateSource::LastKnown }
            }
            _ => Resolution::Unavailable,
        }
    }

    /// Write-through of a live resolution into the last-known cache.
    pub fn remember(&mut self, target: &str, resolution: &Resolution) {
        if let Resolution::Resolved { rate, source: RateSource::Live } = resolution {
            self.last_known.insert(target.to_string(), *rate);
        }
    }

    pub fn resolve_and_remember(&mut self, target: &str, live: Option<&RateTable>) -> Resolution {
        let resolution = self.resolve(target, live);
        self.remember(target, &resolution);
        resolution
    }
}
