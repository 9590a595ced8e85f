use once_cell::sync::Lazy;
use std::collections::HashMap;

// ============================================================================
// METADATA STRUCT
// ============================================================================

#[derive(Debug, Clone)]
pub struct CurrencyMetadata {
    pub code: String,
    pub name: String,
    /// Fixed USD peg, if the currency has one.
    pub usd_peg: Option<f64>,
}

macro_rules! cur {
    ($code:expr, $name:expr) => {
        CurrencyMetadata { code: $code.to_string(), name: $name.to_string(), usd_peg: None }
    };
    ($code:expr, $name:expr, $peg:expr) => {
        CurrencyMetadata { code: $code.to_string(), name: $name.to_string(), usd_peg: Some($peg) }
    };
}

// ============================================================================
// STATIC CURRENCY CATALOG
// ============================================================================

static CURRENCIES: Lazy<Vec<CurrencyMetadata>> = Lazy::new(|| {
    vec![
        cur!("USD", "US Dollar"),
        // Gulf currencies. AED, SAR and QAR are officially pegged to USD.
        cur!("AED", "UAE Dirham", 3.6725),
        cur!("SAR", "Saudi Riyal", 3.75),
        cur!("KWD", "Kuwaiti Dinar"),
        cur!("QAR", "Qatari Riyal", 3.64),
        cur!("BHD", "Bahraini Dinar"),
        cur!("OMR", "Omani Rial"),
    ]
});

static CURRENCY_MAP: Lazy<HashMap<String, usize>> = Lazy::new(|| {
    CURRENCIES
        .iter()
        .enumerate()
        .map(|(idx, c)| (c.code.clone(), idx))
        .collect()
});

pub struct Catalog;

impl Catalog {
    pub fn all() -> &'static [CurrencyMetadata] {
        &CURRENCIES
    }

    pub fn get(code: &str) -> Option<&'static CurrencyMetadata> {
        CURRENCY_MAP.get(code).map(|&idx| &CURRENCIES[idx])
    }

    pub fn is_supported(code: &str) -> bool {
        CURRENCY_MAP.contains_key(code)
    }

    pub fn usd_peg(code: &str) -> Option<f64> {
        Self::get(code).and_then(|c| c.usd_peg)
    }

    /// Codes to request from FX providers, reference currency first.
    pub fn codes() -> Vec<&'static str> {
        CURRENCIES.iter().map(|c| c.code.as_str()).collect()
    }
}
