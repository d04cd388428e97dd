//! Generic fallback parser for unknown vendors or poor-quality OCR.
//!
//! Best-effort extraction of vendor, date, totals and simple
//! description-price lines. Everything it produces is flagged for manual
//! review: it records a `vendor_unknown` warning and each line keeps only
//! what could be read. Missing totals are back-calculated assuming 15%
//! HST rather than failing the receipt.

use super::normalize::{clean_description, normalize_price};
use super::ReceiptParser;
use crate::errors::Result;
use crate::models::{
    EntityKind, LineType, NormalizedReceipt, ParsedLine, ReceiptSource, ValidationWarning,
    WarningType,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static VENDOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"([A-Z &]+(?:INC|LTD|LLC|CORP|CO)\.?)",
        r"([A-Z &]{3,})[ \t]+(?:RECEIPT|INVOICE)",
        r"(?:STORE|SHOP|MARKET)[ \t:]+([A-Z &]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("generic vendor pattern"))
    .collect()
});

static DATE_YMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[/-](\d{2})[/-](\d{2})").expect("generic date pattern"));
static DATE_MDY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})[/-](\d{2})[/-](\d{4})").expect("generic date pattern"));

static TOTAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?im)^[ \t]*TOTAL[ \t]+\$?([\d,]+\.\d{2})",
        r"(?im)^[ \t]*AMOUNT[ \t]+\$?([\d,]+\.\d{2})",
        r"(?im)^[ \t]*BALANCE[ \t]+\$?([\d,]+\.\d{2})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("generic total pattern"))
    .collect()
});
static SUBTOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)SUBTOTAL[ \t]+\$?([\d,]+\.\d{2})").expect("generic subtotal pattern")
});
static TAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:GST|HST|TAX)[ \t]+\$?([\d,]+\.\d{2})").expect("generic tax pattern")
});

/// Any line ending in a price.
static LINE_WITH_PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)[ \t]+\$?([\d,]+\.\d{2})$").expect("generic line pattern")
});

const FOOTER_KEYWORDS: &[&str] = &["TOTAL", "SUBTOTAL", "TAX", "HST", "GST", "BALANCE", "CASH", "CHANGE"];

/// One part in 1.15, for back-calculating a missing subtotal.
fn hst_divisor() -> Decimal {
    Decimal::new(115, 2)
}

pub struct GenericParser;

impl ReceiptParser for GenericParser {
    fn key(&self) -> &'static str {
        "generic"
    }

    /// The generic parser is the last resort: it always matches.
    fn detect_format(&self, _text: &str) -> bool {
        true
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let mut warnings = vec![ValidationWarning::new(
            WarningType::VendorUnknown,
            "No registered vendor matched; generic best-effort parse",
        )];

        let vendor_guess = guess_vendor(text);
        let purchase_date = match extract_date(text) {
            Some(date) => date,
            None => {
                warnings.push(ValidationWarning::date_parse_failed("no recognizable date"));
                chrono::Utc::now().date_naive()
            }
        };

        let total = TOTAL_PATTERNS
            .iter()
            .find_map(|re| re.captures(text))
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let mut tax_total = TAX
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let mut subtotal = SUBTOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);

        if subtotal == Decimal::ZERO && total > Decimal::ZERO {
            if tax_total > Decimal::ZERO {
                subtotal = total - tax_total;
            } else {
                // Assume 15% HST and back-calculate
                subtotal = (total / hst_divisor()).round_dp(2);
                tax_total = total - subtotal;
            }
        }

        let lines = extract_lines(text);

        tracing::warn!(
            vendor = vendor_guess.as_deref().unwrap_or("UNKNOWN"),
            lines = lines.len(),
            total = %total,
            "generic_parser_used"
        );

        let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
        receipt.vendor_guess = vendor_guess;
        receipt.subtotal = subtotal;
        receipt.tax_total = tax_total;
        receipt.total = total;
        receipt.lines = lines;
        receipt.validation_warnings = warnings;
        Ok(receipt)
    }
}

fn guess_vendor(text: &str) -> Option<String> {
    let header: String = text.chars().take(200).collect::<String>().to_uppercase();
    for pattern in VENDOR_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(&header) {
            let vendor = captures[1].trim().to_string();
            if vendor.len() > 3 {
                return Some(vendor);
            }
        }
    }
    None
}

fn extract_date(text: &str) -> Option<NaiveDate> {
    if let Some(c) = DATE_YMD.captures(text) {
        if let Some(date) = NaiveDate::from_ymd_opt(
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
        ) {
            return Some(date);
        }
    }
    if let Some(c) = DATE_MDY.captures(text) {
        let (first, second, year): (u32, u32, i32) =
            (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        // Ambiguous; assume M/D/Y unless the first number cannot be a month
        let (month, day) = if first <= 12 { (first, second) } else { (second, first) };
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(date);
        }
    }
    None
}

fn extract_lines(text: &str) -> Vec<ParsedLine> {
    let mut lines = Vec::new();

    for raw in text.lines() {
        let raw = raw.trim();
        if raw.len() < 5 {
            continue;
        }
        let Some(captures) = LINE_WITH_PRICE.captures(raw) else {
            continue;
        };
        let description = captures[1].trim().to_string();
        let upper = description.to_uppercase();
        if FOOTER_KEYWORDS.iter().any(|k| upper.contains(k)) {
            continue;
        }
        let Ok(price) = normalize_price(&captures[2]) else {
            continue;
        };

        let mut line = ParsedLine::new(lines.len() as i32, LineType::Item, price);
        line.raw_text = Some(raw.to_string());
        line.description = Some(clean_description(&description));
        lines.push(line);
    }

    tracing::info!(count = lines.len(), "generic_lines_extracted");
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn always_detects() {
        assert!(GenericParser.detect_format(""));
        assert!(GenericParser.detect_format("anything at all"));
    }

    #[test]
    fn best_effort_parse_flags_vendor_unknown() {
        let text = "CORNER MARKET INC.\n\
            2025-06-01\n\
            COFFEE LARGE 2.45\n\
            MUFFIN 3.10\n\
            SUBTOTAL 5.55\n\
            HST 0.83\n\
            TOTAL 6.38\n";

        let receipt = GenericParser.parse(text, EntityKind::Corp).unwrap();
        assert_eq!(receipt.vendor_guess.as_deref(), Some("CORNER MARKET INC."));
        assert_eq!(receipt.subtotal, dec!(5.55));
        assert_eq!(receipt.tax_total, dec!(0.83));
        assert_eq!(receipt.total, dec!(6.38));
        assert_eq!(receipt.lines.len(), 2);
        assert_eq!(
            receipt.validation_warnings[0].warning_type,
            WarningType::VendorUnknown
        );
    }

    #[test]
    fn missing_subtotal_is_back_calculated() {
        let text = "SOME PLACE\n2025-06-01\nTOTAL 11.50\n";
        let receipt = GenericParser.parse(text, EntityKind::Corp).unwrap();
        assert_eq!(receipt.subtotal, dec!(10.00));
        assert_eq!(receipt.tax_total, dec!(1.50));
        assert_eq!(receipt.total, dec!(11.50));
    }
}
