//! MacQuarries Pharmasave receipt parser.
//!
//! Till receipts with `Receipt:` numbers, long-form dates ("Date: Sat Oct
//! 04, 2025"), `SUB TOTAL`/`HST (865378210)`/`TOTAL` footers, and item
//! lines carrying EN/TN/TY tax codes (EN zero-rated, TN/TY taxable). Faded
//! receipts that fail the line-sum check get a `subtotal_mismatch`
//! warning; a balancing line is never fabricated.

use super::normalize::{check_line_sum, clean_description, normalize_price};
use super::ReceiptParser;
use crate::errors::Result;
use crate::models::{
    EntityKind, LineType, NormalizedReceipt, ParsedLine, ReceiptSource, TaxFlag,
    ValidationWarning,
};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

static RECEIPT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Receipt:[ \t]*([A-Z0-9]+)").expect("pharmasave receipt pattern"));
/// `Date: Sat Oct 04, 2025, 2:56:55 PM`
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)Date:[ \t]*\w+[ \t]+(\w+)[ \t]+(\d{1,2}),[ \t]+(\d{4})")
        .expect("pharmasave date pattern")
});
static SUBTOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)SUB[ \t]+TOTAL[ \t]+([0-9,.]+)").expect("pharmasave subtotal pattern")
});
/// `HST (865378210) 3.54`
static HST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)HST[ \t]*\([0-9]+\)[ \t]+([0-9,.]+)").expect("pharmasave hst pattern")
});
/// `TOTAL $92.96`, anchored so `SUB TOTAL` cannot match.
static TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*TOTAL[ \t]+\$([0-9,.]+)").expect("pharmasave total pattern")
});

/// `1 10035 SCOTSBURN COFFEE 5.05EN` (with quantity)
static ITEM_WITH_QTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<qty>\d+)[ \t]+(?P<sku>\d{5,})[ \t]+(?P<desc>.+?)[ \t]+(?P<amount>[0-9.]+)[ \t]*(?P<code>EN|TN|TY)[ \t]*$",
    )
    .expect("pharmasave qty item pattern")
});
/// `1004921 WALL TAP 2.30TN` (faded receipts drop the quantity column)
static ITEM_NO_QTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<sku>\d{5,})[ \t]+(?P<desc>.+?)[ \t]+(?P<amount>[0-9.]+)[ \t]*(?P<code>EN|TN|TY)[ \t]*$",
    )
    .expect("pharmasave item pattern")
});

pub struct PharmasaveParser;

impl ReceiptParser for PharmasaveParser {
    fn key(&self) -> &'static str {
        "pharmasave"
    }

    fn detect_format(&self, text: &str) -> bool {
        let text_up = text.to_uppercase();
        text_up.contains("MACQUARRIES PHARMASAVE") || text_up.contains("PHARMASAVE")
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let mut warnings = Vec::new();

        let receipt_number = RECEIPT_NUMBER.captures(text).map(|c| c[1].to_string());
        let purchase_date = match extract_date(text) {
            Some(date) => date,
            None => {
                warnings.push(ValidationWarning::date_parse_failed("no receipt date"));
                chrono::Utc::now().date_naive()
            }
        };

        let subtotal = SUBTOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let hst = HST
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let total = TOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(subtotal + hst);

        let lines = extract_lines(text, &mut warnings);

        // Faded receipts lose item lines; flag the gap for review instead
        // of inventing a balancing line.
        if let Some(warning) = check_line_sum(&lines, subtotal) {
            warnings.push(warning);
        }

        tracing::info!(
            receipt = receipt_number.as_deref().unwrap_or("UNKNOWN"),
            lines = lines.len(),
            total = %total,
            "pharmasave_parsed"
        );

        let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
        receipt.vendor_guess = Some("MacQuarries Pharmasave".to_string());
        receipt.invoice_number = receipt_number;
        receipt.subtotal = subtotal;
        receipt.tax_total = hst;
        receipt.total = total;
        receipt.lines = lines;
        receipt.validation_warnings = warnings;
        Ok(receipt)
    }
}

fn extract_date(text: &str) -> Option<NaiveDate> {
    let captures = DATE.captures(text)?;
    let month = &captures[1];
    let day = &captures[2];
    let year = &captures[3];
    NaiveDate::parse_from_str(&format!("{month} {day} {year}"), "%b %d %Y").ok()
}

fn extract_lines(text: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<ParsedLine> {
    let mut lines = Vec::new();

    for captures in ITEM_WITH_QTY.captures_iter(text) {
        push_line(&mut lines, warnings, &captures, true);
    }
    // Faded receipts drop the quantity column entirely
    if lines.is_empty() {
        for captures in ITEM_NO_QTY.captures_iter(text) {
            push_line(&mut lines, warnings, &captures, false);
        }
    }

    tracing::info!(count = lines.len(), "pharmasave_lines_extracted");
    lines
}

fn push_line(
    lines: &mut Vec<ParsedLine>,
    warnings: &mut Vec<ValidationWarning>,
    captures: &regex::Captures<'_>,
    with_qty: bool,
) {
    let amount = match normalize_price(&captures["amount"]) {
        Ok(amount) => amount,
        Err(token) => {
            warnings.push(ValidationWarning::price_parse_failed(&token));
            return;
        }
    };
    let quantity = if with_qty {
        captures["qty"].parse::<i64>().map(Decimal::from).unwrap_or(Decimal::ONE)
    } else {
        Decimal::ONE
    };
    // EN is zero-rated (groceries); TN and TY are HST taxable
    let tax_flag = if &captures["code"] == "EN" {
        TaxFlag::ZeroRated
    } else {
        TaxFlag::Taxable
    };

    let mut line = ParsedLine::new(lines.len() as i32, LineType::Item, amount);
    line.raw_text = Some(captures[0].trim().to_string());
    line.vendor_sku = Some(captures["sku"].to_string());
    line.description = Some(clean_description(captures["desc"].trim()));
    line.quantity = Some(quantity);
    line.unit_price = Some(amount);
    line.tax_flag = Some(tax_flag);
    lines.push(line);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WarningType;
    use rust_decimal_macros::dec;

    const RECEIPT: &str = "MacQUARRIES PHARMASAVE\n\
        Receipt: A38291\n\
        Date: Sat Oct 04, 2025, 2:56:55 PM\n\
        1 10035 SCOTSBURN COFFEE 5.05EN\n\
        1 267219 SCOTSBURN 2% MILK 2L 4.19EN\n\
        SUB TOTAL 9.24\n\
        HST (865378210) 0.00\n\
        TOTAL $9.24\n";

    #[test]
    fn parses_receipt_with_en_tax_codes() {
        let parser = PharmasaveParser;
        assert!(parser.detect_format(RECEIPT));
        let receipt = parser.parse(RECEIPT, EntityKind::Corp).unwrap();

        assert_eq!(receipt.invoice_number.as_deref(), Some("A38291"));
        assert_eq!(
            receipt.purchase_date,
            NaiveDate::from_ymd_opt(2025, 10, 4).unwrap()
        );
        assert_eq!(receipt.subtotal, dec!(9.24));
        assert_eq!(receipt.total, dec!(9.24));
        assert_eq!(receipt.lines.len(), 2);
        assert_eq!(receipt.lines[0].tax_flag, Some(TaxFlag::ZeroRated));
        assert!(receipt.validation_warnings.is_empty());
    }

    #[test]
    fn faded_receipt_warns_instead_of_inventing_lines() {
        let text = "PHARMASAVE AMHERST\n\
            Receipt: B10077\n\
            Date: Sat Oct 04, 2025, 2:56:55 PM\n\
            1004921 WALL TAP 2.30TN\n\
            996749 SWIFFER STARTER KIT 28.96 TN\n\
            SUB TOTAL 89.42\n\
            HST (865378210) 3.54\n\
            TOTAL $92.96\n";

        let receipt = PharmasaveParser.parse(text, EntityKind::Corp).unwrap();

        // Two readable lines survive; the missing $58.16 becomes a warning
        assert_eq!(receipt.lines.len(), 2);
        assert!(receipt
            .lines
            .iter()
            .all(|l| !l.description.as_deref().unwrap_or("").to_uppercase().contains("FADED")));

        let warning = receipt
            .validation_warnings
            .iter()
            .find(|w| w.warning_type == WarningType::SubtotalMismatch)
            .unwrap();
        assert_eq!(warning.data["expected_total"], 89.42);
        assert_eq!(receipt.lines[1].line_total, dec!(28.96));
    }
}
