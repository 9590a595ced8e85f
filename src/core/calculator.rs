use crate::models::PriceQuote;

/// Parses a user-entered weight in grams. Accepts `,` as decimal separator.
pub fn parse_grams(input: &str) -> Option<f64> {
    let grams: f64 = input.trim().replace(',', ".").parse().ok()?;
    (grams.is_finite() && grams > 0.0).then_some(grams)
}

/// Value of `grams` at the quote's per-gram price (selected karat and currency).
pub fn total_for_grams(grams: f64, quote: &PriceQuote) -> f64 {
    grams * quote.price_per_gram
}
