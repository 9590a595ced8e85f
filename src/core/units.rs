/// Grams in one troy ounce.
pub const TROY_OUNCE_GRAMS: f64 = 31.1034768;

/// Fineness every stored history value is normalized to.
pub const REFERENCE_KARAT: u8 = 24;

/// Karats the selection accepts.
pub const ALLOWED_KARATS: [u8; 4] = [18, 21, 22, 24];

pub fn ounce_to_gram(price_per_ounce: f64) -> f64 {
    price_per_ounce / TROY_OUNCE_GRAMS
}

pub fn purity_factor(selected: f64, reference: f64) -> f64 {
    selected / reference
}

/// Scale factor from 24K to `karat`.
pub fn karat_factor(karat: u8) -> f64 {
    purity_factor(karat as f64, REFERENCE_KARAT as f64)
}

pub fn is_allowed_karat(karat: u8) -> bool {
    ALLOWED_KARATS.contains(&karat)
}
