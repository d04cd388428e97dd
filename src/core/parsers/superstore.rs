//! Atlantic Superstore (Loblaw) receipt parser.
//!
//! Till receipts with long UPCs and combined tax-code letters
//! (`HMRJ`/`MRJ`), optional `(qty)` prefixes, and the classic faded-digit
//! OCR failure where a trailing `9` reads as `E` (`10.9E` is `10.99`).

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

/// `(2)05870322321 NN DRY CLOTH ORI HMRJ 10.9E`
static ITEM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?:\((?P<qty>\d+)\))?[ \t]*(?P<sku>\d{11,13})[ \t]+(?P<desc>.*?)[ \t]+(?P<taxcode>H?M?R?J?)[ \t]+(?P<price>[\d.]+)(?P<suffix>[E9]?)[ \t]*$",
    )
    .expect("superstore item pattern")
});

static DATE_YMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[/-](\d{2})[/-](\d{2})").expect("superstore date pattern"));
static DATE_MDY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2})[/-](\d{2})[/-](\d{4})").expect("superstore date pattern"));
static TRANSACTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:TRANS|TXN|REG)[ \t#:]*(\d+)").expect("superstore txn pattern")
});
static SUBTOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)SUBTOTAL[ \t]+\$?([\d,]+\.\d{2})").expect("superstore subtotal pattern")
});
static TAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:HST|TAX|GST)[ \t]+\$?([\d,]+\.\d{2})").expect("superstore tax pattern")
});
static TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*TOTAL[ \t]+\$?([\d,]+\.\d{2})").expect("superstore total pattern")
});

const HST_RATE_BP: i64 = 15;

pub struct SuperstoreParser;

impl ReceiptParser for SuperstoreParser {
    fn key(&self) -> &'static str {
        "superstore"
    }

    fn detect_format(&self, text: &str) -> bool {
        let text_up = text.to_uppercase();
        if ["ATLANTIC SUPERSTORE", "SUPERSTORE", "LOBLAW"]
            .iter()
            .any(|p| text_up.contains(p))
        {
            return true;
        }
        ITEM_LINE.is_match(text)
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let mut warnings = Vec::new();

        let purchase_date = match extract_date(text) {
            Some(date) => date,
            None => {
                warnings.push(ValidationWarning::date_parse_failed("no purchase date"));
                chrono::Utc::now().date_naive()
            }
        };
        let transaction = TRANSACTION.captures(text).map(|c| c[1].to_string());

        let subtotal = SUBTOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let tax_total = TAX
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let total = TOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(subtotal + tax_total);

        let lines = extract_lines(text, &mut warnings);

        if let Some(warning) = check_line_sum(&lines, subtotal) {
            warnings.push(warning);
        }

        tracing::info!(
            transaction = transaction.as_deref().unwrap_or("UNKNOWN"),
            lines = lines.len(),
            total = %total,
            "superstore_parsed"
        );

        let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
        receipt.vendor_guess = Some("Atlantic Superstore".to_string());
        receipt.invoice_number = transaction;
        receipt.subtotal = subtotal;
        receipt.tax_total = tax_total;
        receipt.total = total;
        receipt.lines = lines;
        receipt.validation_warnings = warnings;
        Ok(receipt)
    }
}

fn extract_date(text: &str) -> Option<NaiveDate> {
    if let Some(c) = DATE_YMD.captures(text) {
        return NaiveDate::from_ymd_opt(
            c[1].parse().ok()?,
            c[2].parse().ok()?,
            c[3].parse().ok()?,
        );
    }
    let c = DATE_MDY.captures(text)?;
    NaiveDate::from_ymd_opt(c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?)
}

fn extract_lines(text: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<ParsedLine> {
    let mut lines = Vec::new();
    let mut index = 0;

    for captures in ITEM_LINE.captures_iter(text) {
        // Repair the faded trailing digit: "10.9E" and "10.99" both end 99
        let mut price_raw = captures["price"].to_string();
        if matches!(&captures["suffix"], "E" | "9") {
            price_raw.push('9');
        }
        let line_total = match normalize_price(&price_raw) {
            Ok(amount) => amount,
            Err(token) => {
                warnings.push(ValidationWarning::price_parse_failed(&token));
                continue;
            }
        };

        let quantity = captures
            .name("qty")
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .map_or(Decimal::ONE, Decimal::from);
        let unit_price = if quantity > Decimal::ZERO {
            (line_total / quantity).round_dp(2)
        } else {
            line_total
        };
        let taxcode = captures["taxcode"].to_string();
        let taxable = taxcode.contains('H');

        let mut line = ParsedLine::new(index, LineType::Item, line_total);
        line.raw_text = Some(captures[0].trim().to_string());
        line.vendor_sku = Some(captures["sku"].to_string());
        line.description = Some(clean_description(captures["desc"].trim()));
        line.quantity = Some(quantity);
        line.unit_price = Some(unit_price);
        line.tax_flag = Some(if taxable { TaxFlag::Taxable } else { TaxFlag::Exempt });
        line.tax_amount = Some(if taxable {
            (line_total * Decimal::new(HST_RATE_BP, 2)).round_dp(2)
        } else {
            Decimal::ZERO
        });
        lines.push(line);
        index += 1;
    }

    tracing::info!(count = lines.len(), "superstore_lines_extracted");
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RECEIPT: &str = "ATLANTIC SUPERSTORE\n\
        2025/02/11\n\
        TRANS# 4417\n\
        (2)05870322321 NN DRY CLOTH ORI HMRJ 10.9E\n\
        06038312901 PC OPTIMUM YOGURT MRJ 4.49\n\
        SUBTOTAL 15.48\n\
        HST 1.64\n\
        TOTAL 17.12\n";

    #[test]
    fn repairs_faded_price_digit() {
        let parser = SuperstoreParser;
        assert!(parser.detect_format(RECEIPT));
        let receipt = parser.parse(RECEIPT, EntityKind::Corp).unwrap();

        let cloth = &receipt.lines[0];
        assert_eq!(cloth.line_total, dec!(10.99));
        assert_eq!(cloth.quantity, Some(dec!(2)));
        assert_eq!(cloth.unit_price, Some(dec!(5.50)));
        assert_eq!(cloth.tax_flag, Some(TaxFlag::Taxable));
    }

    #[test]
    fn parses_metadata_and_totals() {
        let receipt = SuperstoreParser.parse(RECEIPT, EntityKind::Corp).unwrap();
        assert_eq!(receipt.invoice_number.as_deref(), Some("4417"));
        assert_eq!(
            receipt.purchase_date,
            NaiveDate::from_ymd_opt(2025, 2, 11).unwrap()
        );
        assert_eq!(receipt.subtotal, dec!(15.48));
        assert_eq!(receipt.tax_total, dec!(1.64));
        assert_eq!(receipt.total, dec!(17.12));

        let yogurt = &receipt.lines[1];
        assert_eq!(yogurt.tax_flag, Some(TaxFlag::Exempt));
    }
}
