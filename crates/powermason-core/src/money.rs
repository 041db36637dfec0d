//! Peso amounts: bounds, parsing and display.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{PowermasonError, Result};

/// Largest amount a single ledger entry may carry (`DECIMAL(15,2)`).
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999_999, 2)
}

/// Check an allocation or expense amount: strictly positive and within
/// the column range.
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(PowermasonError::validation(
            "Amount must be greater than zero.",
        ));
    }
    if amount > max_amount() {
        return Err(PowermasonError::validation(format!(
            "Amount exceeds the maximum allowed ({}).",
            format_php(max_amount())
        )));
    }
    Ok(())
}

/// Parse a user-entered amount, tolerating thousands separators.
pub fn parse_amount(raw: &str) -> Result<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned.parse::<Decimal>().map_err(|_| {
        PowermasonError::validation("Invalid amount entered. Please enter a valid number.")
    })
}

/// `part / whole × 100` rounded to two places; zero when `whole` is not positive.
pub fn percentage(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
}

/// Render as `₱1,234,567.89`.
pub fn format_php(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{sign}₱{grouped}.{frac_part}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn rejects_zero_and_negative() {
        assert!(validate_amount(Decimal::ZERO).is_err());
        assert!(validate_amount(d("-5")).is_err());
        assert!(validate_amount(d("0.01")).is_ok());
    }

    #[test]
    fn max_amount_is_inclusive() {
        assert!(validate_amount(d("9999999999999.99")).is_ok());
        let err = validate_amount(d("10000000000000")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid input: Amount exceeds the maximum allowed (₱9,999,999,999,999.99)."
        );
    }

    #[test]
    fn formats_with_grouping() {
        assert_eq!(format_php(d("0")), "₱0.00");
        assert_eq!(format_php(d("999.5")), "₱999.50");
        assert_eq!(format_php(d("10000")), "₱10,000.00");
        assert_eq!(format_php(d("1234567.891")), "₱1,234,567.89");
        assert_eq!(format_php(d("-10000")), "-₱10,000.00");
    }

    #[test]
    fn parses_separators() {
        assert_eq!(parse_amount(" 40,000.50 ").unwrap(), d("40000.50"));
        assert!(parse_amount("forty").is_err());
    }

    #[test]
    fn percentage_of_zero_whole_is_zero() {
        assert_eq!(percentage(d("10"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(percentage(d("40000"), d("100000")), d("40"));
        assert_eq!(percentage(d("1"), d("3")), d("33.33"));
    }
}
