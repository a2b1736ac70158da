//! Odds format conversions
//!
//! Archived prices are American (e.g. +400 / -150). The replay engine works
//! with implied probabilities and decimal odds.

/// Default overround assumption for archived model-derived prices (~12% vig)
pub const DEFAULT_VIG_FACTOR: f64 = 0.88;

/// Ceiling applied to implied probabilities after vig inflation
pub const MAX_VIGGED_IMPLIED: f64 = 0.95;

/// Convert an American price to decimal odds. Returns None for a zero price.
pub fn american_to_decimal(price: i32) -> Option<f64> {
    if price > 0 {
        Some(1.0 + price as f64 / 100.0)
    } else if price < 0 {
        Some(1.0 + 100.0 / (price as f64).abs())
    } else {
        None
    }
}

/// Implied probability of an American price (no vig removal)
pub fn american_to_implied(price: i32) -> f64 {
    if price > 0 {
        100.0 / (price as f64 + 100.0)
    } else if price < 0 {
        let p = (price as f64).abs();
        p / (p + 100.0)
    } else {
        0.5
    }
}

/// Convert an implied probability back to an American price (truncated)
pub fn implied_to_american(implied: f64) -> i32 {
    let implied = implied.clamp(1e-6, 1.0 - 1e-6);
    if implied >= 0.5 {
        (-100.0 * implied / (1.0 - implied)) as i32
    } else {
        (100.0 * (1.0 - implied) / implied) as i32
    }
}

/// Shorten a price by inflating its implied probability by `1 / vig_factor`.
///
/// The inflated probability is capped at [`MAX_VIGGED_IMPLIED`].
pub fn apply_vig(price: i32, vig_factor: f64) -> i32 {
    let implied = american_to_implied(price);
    let factor = if vig_factor > 0.0 { vig_factor } else { 1.0 };
    let vigged = (implied / factor).min(MAX_VIGGED_IMPLIED);
    implied_to_american(vigged)
}

/// Parse odds text such as "+400", "-150" or "400" to decimal odds
pub fn parse_odds_to_decimal(text: &str) -> Option<f64> {
    let price: i32 = text.trim().trim_start_matches('+').parse().ok()?;
    american_to_decimal(price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_american_to_decimal() {
        assert!((american_to_decimal(400).unwrap() - 5.0).abs() < 1e-9);
        assert!((american_to_decimal(-150).unwrap() - 1.6667).abs() < 1e-3);
        assert!(american_to_decimal(0).is_none());
    }

    #[test]
    fn test_american_to_implied() {
        assert!((american_to_implied(400) - 0.2).abs() < 1e-9);
        assert!((american_to_implied(-150) - 0.6).abs() < 1e-9);
        assert_eq!(american_to_implied(0), 0.5);
    }

    #[test]
    fn test_implied_round_trip_is_close() {
        // Truncation may land one cent away from the exact price
        assert!((implied_to_american(0.2) - 400).abs() <= 1);
        assert!((implied_to_american(0.6) + 150).abs() <= 1);
    }

    #[test]
    fn test_apply_vig_shortens_price() {
        let vigged = apply_vig(400, DEFAULT_VIG_FACTOR);
        // 0.2 / 0.88 = 0.2273 -> +340
        assert!(vigged < 400);
        assert!((american_to_implied(vigged) - 0.2273).abs() < 1e-3);
    }

    #[test]
    fn test_apply_vig_caps_implied() {
        let vigged = apply_vig(-2000, DEFAULT_VIG_FACTOR);
        assert!(american_to_implied(vigged) <= MAX_VIGGED_IMPLIED + 1e-3);
    }

    #[test]
    fn test_parse_odds_to_decimal() {
        assert!((parse_odds_to_decimal("+400").unwrap() - 5.0).abs() < 1e-9);
        assert!((parse_odds_to_decimal("-200").unwrap() - 1.5).abs() < 1e-9);
        assert!(parse_odds_to_decimal("evens").is_none());
    }
}
