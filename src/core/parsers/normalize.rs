//! Shared text-normalization helpers for vendor parsers.
//!
//! OCR output is noisy in predictable ways: `E` for `9`, `O`/`o` for `0`,
//! stray currency symbols and thousands separators, pipes for capital I.
//! Every parser goes through these helpers so the repairs stay consistent.

use crate::models::{LineType, ParsedLine, ValidationWarning};
use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Tolerance for the line-sum vs. subtotal check.
const SUBTOTAL_TOLERANCE_CENTS: i64 = 10;

/// Cleans up OCR price errors and converts to a [`Decimal`].
///
/// Repairs applied: strip `$` and `,`, `E → 9`, `O/o → 0`; `(...)` or a
/// leading `-` mean negative.
///
/// # Errors
/// Returns the offending token when nothing parseable remains. Callers
/// record a `price_parse_failed` warning and skip the value rather than
/// failing the receipt.
pub fn normalize_price(raw: &str) -> Result<Decimal, String> {
    let mut cleaned: String = raw
        .trim()
        .replace(['$', ','], "")
        .replace('E', "9")
        .replace(['O', 'o'], "0");

    let negative = cleaned.contains('-') || cleaned.contains('(');
    cleaned.retain(|c| !matches!(c, '-' | '(' | ')'));

    let amount = Decimal::from_str(cleaned.trim()).map_err(|_| raw.to_string())?;
    Ok(if negative { -amount } else { amount })
}

/// Renders a decimal amount with two fractional digits, the inverse of
/// [`normalize_price`] for well-formed values.
#[must_use]
pub fn format_price(value: Decimal) -> String {
    format!("{:.2}", value)
}

/// Cleans an item description: collapse whitespace runs, `| → I`, strip
/// stray underscores.
#[must_use]
pub fn clean_description(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "I")
        .replace('_', "")
        .trim()
        .to_string()
}

/// Extracts a monetary amount using a regex with the amount in capture
/// group 1. Unparseable matches yield `None`.
#[must_use]
pub fn extract_amount(text: &str, pattern: &Regex) -> Option<Decimal> {
    let captures = pattern.captures(text)?;
    let token = captures.get(1)?.as_str();
    normalize_price(token).ok()
}

/// Checks whether item and fee lines (minus discounts) sum to the printed
/// subtotal within $0.10.
///
/// Never fabricates a balancing line: a mismatch produces a
/// `subtotal_mismatch` warning and the receipt goes to review, where the
/// bounding boxes let a human spot what the scanner missed.
#[must_use]
pub fn check_line_sum(lines: &[ParsedLine], subtotal: Decimal) -> Option<ValidationWarning> {
    let item_total: Decimal = lines
        .iter()
        .filter(|line| matches!(line.line_type, LineType::Item | LineType::Fee))
        .map(|line| line.line_total)
        .sum();
    let discount_total: Decimal = lines
        .iter()
        .filter(|line| line.line_type == LineType::Discount)
        .map(|line| line.line_total)
        .sum();

    let found = item_total - discount_total.abs();
    let tolerance = Decimal::new(SUBTOTAL_TOLERANCE_CENTS, 2);

    if (subtotal - found).abs() > tolerance {
        Some(ValidationWarning::subtotal_mismatch(found, subtotal))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LineType, ParsedLine};
    use rust_decimal_macros::dec;

    #[test]
    fn normalize_price_repairs_common_ocr_errors() {
        assert_eq!(normalize_price("9.9E").unwrap(), dec!(9.99));
        assert_eq!(normalize_price("10.0O").unwrap(), dec!(10.00));
        assert_eq!(normalize_price("1o.50").unwrap(), dec!(10.50));
        assert_eq!(normalize_price("$19.99").unwrap(), dec!(19.99));
        assert_eq!(normalize_price("1,234.56").unwrap(), dec!(1234.56));
    }

    #[test]
    fn normalize_price_handles_negative_forms() {
        assert_eq!(normalize_price("-4.50").unwrap(), dec!(-4.50));
        assert_eq!(normalize_price("(4.50)").unwrap(), dec!(-4.50));
        assert_eq!(normalize_price("2.90-").unwrap(), dec!(-2.90));
    }

    #[test]
    fn normalize_price_rejects_garbage() {
        assert!(normalize_price("N/A").is_err());
        assert!(normalize_price("").is_err());
    }

    #[test]
    fn price_round_trips_through_format() {
        for value in [dec!(0.00), dec!(14.99), dec!(-2.90), dec!(1234.50)] {
            assert_eq!(normalize_price(&format_price(value)).unwrap(), value);
        }
    }

    #[test]
    fn clean_description_strips_artifacts() {
        assert_eq!(clean_description("  CANADA   DRY  A "), "CANADA DRY A");
        assert_eq!(clean_description("M|LK 2%"), "MILK 2%");
        assert_eq!(clean_description("HOT_ROD 40CT"), "HOTROD 40CT");
    }

    fn line(line_type: LineType, total: Decimal) -> ParsedLine {
        ParsedLine::new(0, line_type, total)
    }

    #[test]
    fn line_sum_within_tolerance_passes() {
        let lines = vec![
            line(LineType::Item, dec!(10.00)),
            line(LineType::Fee, dec!(0.10)),
            line(LineType::Discount, dec!(-2.00)),
        ];
        assert!(check_line_sum(&lines, dec!(8.10)).is_none());
        assert!(check_line_sum(&lines, dec!(8.19)).is_none());
    }

    #[test]
    fn line_sum_mismatch_yields_warning_not_placeholder() {
        let lines = vec![line(LineType::Item, dec!(177.80))];
        let warning = check_line_sum(&lines, dec!(191.03)).unwrap();
        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["type"], "subtotal_mismatch");
        assert_eq!(value["data"]["difference"], 13.23);
    }
}
