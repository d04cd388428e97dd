//! Walmart Canada receipt parser.
//!
//! Handles Walmart / Walmart Supercentre till receipts: `DESC UPC $AMOUNT
//! CODE` item lines, multi-buy promo discount lines, HST/GST/PST/QST tax
//! components, deposit and eco-fee detection, and zero-rated grocery
//! inference. Line formats vary between stores; the patterns here cover
//! the common single-line item endings with an amount and optional tax
//! code letter. Weighted produce prints helper lines ("0.72kg @ 1.67/kg")
//! which carry no price of their own and are ignored.

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

/// Item line: `CANADA DRY A 062100008930 $6.98 J`
static ITEM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<desc>[A-Z][A-Z0-9 &%/.,()*'#-]*?)[ \t]+(?P<upc>\d{12})[ \t]+\$?(?P<amount>\d+\.\d{2})[ \t]*(?P<taxcode>[A-Z0-9])?[ \t]*$",
    )
    .expect("walmart item pattern")
});

/// Promo adjustment line: `PEPSI 2 FOR $14 006L $7.84-A`
static PROMO_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<desc>[A-Z][A-Z0-9 &]+?)[ \t]+(?P<promo>\d+[ \t]+FOR[ \t]+\$\d+(?:\.\d{1,2})?)[ \t]+(?P<size>[0-9L]+)[ \t]+\$?(?P<amount>\d+\.\d{2})-(?P<taxcode>[A-Z])[ \t]*$",
    )
    .expect("walmart promo pattern")
});

/// Footer/control lines that must never be read as items. The regex crate
/// has no lookahead, so candidates are filtered against this instead.
static NON_ITEM_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(SUB[ \t]*-?[ \t]*TOTAL|TOTAL\b|CHANGE\b|CASH\b|DEBIT\b|CREDIT\b|VISA\b|MASTERCARD\b|ROUND|AMOUNT[ \t]+TENDERED|BALANCE[ \t]+DUE|APPROVAL|AID:|RID:|A000|HST\b|GST\b|PST\b|QST\b|TAX\b|COUPON|SAVINGS?\b|RETURN|REFUND|NS[ \t]+DEPOSIT|DEPOSIT|MULTI[ \t]+DISCOUNT)",
    )
    .expect("walmart non-item pattern")
});

static SUBTOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*SUB[ \t]*-?[ \t]*TOTAL[ \t]*:?[ \t]*\$?([0-9][0-9,]*\.\d{2})")
        .expect("walmart subtotal pattern")
});

/// `TOTAL` on its own line; `SUBTOTAL` fails the anchor and
/// `TOTAL SAVINGS` fails the required amount.
static TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[ \t]*TOTAL[ \t]*:?[ \t]*\$?([0-9][0-9,]*\.\d{2})")
        .expect("walmart total pattern")
});

/// `HST 14.0000 % $13.00` - the dollar amount, not the rate.
static TAX_COMPONENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    ["HST", "GST", "PST", "QST"]
        .iter()
        .map(|label| {
            Regex::new(&format!(r"(?im)\b{label}\b[^$\n]*\$([0-9][0-9,]*\.\d{{2}})"))
                .expect("walmart tax pattern")
        })
        .collect()
});

static RECEIPT_NUMBER: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)\bTC#[ \t]*([0-9 -]+)", r"(?i)\bTR#[ \t]*([0-9 -]+)", r"(?i)\bTRANS#?[ \t]*([0-9 -]+)"]
        .iter()
        .map(|p| Regex::new(p).expect("walmart receipt number pattern"))
        .collect()
});

static DATE_YMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(20\d{2})[-/](\d{1,2})[-/](\d{1,2})").expect("walmart date"));
static DATE_MDY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[-/](\d{1,2})[-/](20\d{2})").expect("walmart date"));
static DATE_MDY_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})[-/](\d{1,2})[-/](\d{2})\b").expect("walmart date"));

const DEPOSIT_KEYWORDS: &[&str] = &[
    "DEPOSIT", "DEP ", "BOTTLE DEP", "CONTAINER", "CRF", "ECO FEE", "ECOFEE", "EHF", "ENV FEE",
    "ENVIRONMENTAL FEE", "BATTERY FEE",
];

const ZERO_RATED_KEYWORDS: &[&str] = &[
    "MILK", "BREAD", "BANANA", "APPLES", "APPLE", "LETTUCE", "CARROT", "EGG", "RICE", "FLOUR",
    "POTATO", "POTATOES", "TOMATO", "TOMATOES", "ONION", "ONIONS", "CUCUMBER",
];

pub struct WalmartParser;

impl ReceiptParser for WalmartParser {
    fn key(&self) -> &'static str {
        "walmart"
    }

    fn detect_format(&self, text: &str) -> bool {
        let text_up = text.to_uppercase();
        text_up.contains("WALMART")
            || text_up.contains("SAVE MONEY. LIVE BETTER")
            || RECEIPT_NUMBER.iter().any(|re| re.is_match(&text_up))
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let mut warnings = Vec::new();

        let purchase_date = match extract_date(text) {
            Some(date) => date,
            None => {
                warnings.push(ValidationWarning::date_parse_failed("no recognizable date"));
                chrono::Utc::now().date_naive()
            }
        };

        let subtotal = SUBTOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let total = TOTAL.captures(text).and_then(|c| normalize_price(&c[1]).ok());
        let tax_total = extract_tax_total(text, total, subtotal);
        let total = total.unwrap_or(subtotal + tax_total);

        let lines = extract_lines(text, &mut warnings);

        if let Some(warning) = check_line_sum(&lines, subtotal) {
            warnings.push(warning);
        }

        tracing::info!(
            date = %purchase_date,
            subtotal = %subtotal,
            tax = %tax_total,
            total = %total,
            lines = lines.len(),
            "walmart_parsed"
        );

        let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
        receipt.vendor_guess = Some(guess_vendor_name(text));
        receipt.invoice_number = extract_receipt_number(text);
        receipt.subtotal = subtotal;
        receipt.tax_total = tax_total;
        receipt.total = total;
        receipt.lines = lines;
        receipt.validation_warnings = warnings;
        Ok(receipt)
    }
}

fn guess_vendor_name(text: &str) -> String {
    if text.to_uppercase().contains("WALMART SUPERCENTRE") {
        "Walmart Supercentre".to_string()
    } else {
        "Walmart".to_string()
    }
}

fn extract_receipt_number(text: &str) -> Option<String> {
    RECEIPT_NUMBER
        .iter()
        .find_map(|re| re.captures(text))
        .map(|c| c[1].trim().to_string())
}

fn extract_date(text: &str) -> Option<NaiveDate> {
    if let Some(c) = DATE_YMD.captures(text) {
        let (y, m, d) = (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    if let Some(c) = DATE_MDY.captures(text) {
        let (mut m, mut d, y): (u32, u32, i32) =
            (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        // Flip when the receipt printed D/M/Y
        if m > 12 && d <= 12 {
            std::mem::swap(&mut m, &mut d);
        }
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }
    if let Some(c) = DATE_MDY_SHORT.captures(text) {
        let (mut m, mut d, yy): (u32, u32, i32) =
            (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
        if m > 12 && d <= 12 {
            std::mem::swap(&mut m, &mut d);
        }
        if let Some(date) = NaiveDate::from_ymd_opt(2000 + yy, m, d) {
            return Some(date);
        }
    }
    None
}

fn extract_tax_total(text: &str, total: Option<Decimal>, subtotal: Decimal) -> Decimal {
    let mut tax_total = Decimal::ZERO;
    for pattern in TAX_COMPONENTS.iter() {
        if let Some(amount) = pattern.captures(text).and_then(|c| normalize_price(&c[1]).ok()) {
            tax_total += amount;
        }
    }
    // Fallback when no explicit tax line carried a dollar amount
    if tax_total == Decimal::ZERO {
        if let Some(total) = total {
            let diff = total - subtotal;
            if diff.abs() <= Decimal::new(9_999_00, 2) {
                tax_total = diff;
            }
        }
    }
    tax_total
}

fn extract_lines(text: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<ParsedLine> {
    let mut lines = Vec::new();
    let mut index = 0;

    for captures in ITEM_LINE.captures_iter(text) {
        let desc_raw = captures["desc"].trim().to_string();
        if NON_ITEM_PREFIX.is_match(&desc_raw.to_uppercase()) {
            continue;
        }
        let amount = match normalize_price(&captures["amount"]) {
            Ok(amount) => amount,
            Err(token) => {
                warnings.push(ValidationWarning::price_parse_failed(&token));
                continue;
            }
        };
        let upc = captures["upc"].to_string();
        let taxcode = captures
            .name("taxcode")
            .map(|m| m.as_str().to_uppercase())
            .unwrap_or_default();

        let line_type = if is_deposit_or_fee(&desc_raw) {
            LineType::Fee
        } else {
            LineType::Item
        };

        let mut line = ParsedLine::new(index, line_type, amount);
        line.raw_text = Some(captures[0].trim().to_string());
        line.vendor_sku = Some(upc.clone());
        line.upc = Some(upc);
        line.description = Some(clean_description(&desc_raw));
        line.quantity = Some(Decimal::ONE);
        line.unit_price = Some(amount);
        line.tax_flag = Some(infer_tax_flag(&taxcode, &desc_raw));
        lines.push(line);
        index += 1;
    }

    // Multi-buy promo adjustments print the promo text mid-line and a
    // trailing negative amount; they are discounts.
    for captures in PROMO_LINE.captures_iter(text) {
        let desc_raw = captures["desc"].trim().to_string();
        let amount = match normalize_price(&captures["amount"]) {
            Ok(amount) => -amount,
            Err(token) => {
                warnings.push(ValidationWarning::price_parse_failed(&token));
                continue;
            }
        };
        let full_desc = format!("{desc_raw} ({} {})", &captures["promo"], &captures["size"]);

        let mut line = ParsedLine::new(index, LineType::Discount, amount);
        line.raw_text = Some(captures[0].trim().to_string());
        line.description = Some(clean_description(&full_desc));
        line.quantity = Some(Decimal::ONE);
        line.unit_price = Some(amount);
        line.tax_flag = Some(infer_tax_flag(&captures["taxcode"].to_uppercase(), &desc_raw));
        lines.push(line);
        index += 1;
    }

    tracing::info!(count = lines.len(), "walmart_lines_extracted");
    lines
}

fn is_deposit_or_fee(desc: &str) -> bool {
    let upper = desc.to_uppercase();
    DEPOSIT_KEYWORDS.iter().any(|k| upper.contains(k))
}

fn infer_tax_flag(taxcode: &str, desc: &str) -> TaxFlag {
    match taxcode {
        "T" | "A" | "B" => return TaxFlag::Taxable,
        "E" | "Z" => return TaxFlag::ZeroRated,
        _ => {}
    }
    // Common zero-rated groceries
    let upper = desc.to_uppercase();
    if ZERO_RATED_KEYWORDS.iter().any(|k| upper.contains(k)) {
        return TaxFlag::ZeroRated;
    }
    TaxFlag::Taxable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WarningType;
    use rust_decimal_macros::dec;
    use std::fmt::Write as _;

    #[test]
    fn parses_common_receipt() {
        let text = "WALMART SUPERCENTRE\n\
                    2025/10/04 14:23\n\
                    TC# 1234 5678 9012 34\n\
                    GREAT VALUE MILK 4L 062100008930 $5.78 E\n\
                    GATORADE ORANGE 069000149180 $1.88 T\n\
                    ECO FEE BATTERY 062100008931 $0.10 T\n\
                    SUBTOTAL 7.76\n\
                    HST 14.0000 % $1.09\n\
                    TOTAL 8.85\n";

        let parser = WalmartParser;
        assert!(parser.detect_format(text));
        let receipt = parser.parse(text, EntityKind::Corp).unwrap();

        assert_eq!(receipt.vendor_guess.as_deref(), Some("Walmart Supercentre"));
        assert_eq!(
            receipt.purchase_date,
            NaiveDate::from_ymd_opt(2025, 10, 4).unwrap()
        );
        assert_eq!(receipt.invoice_number.as_deref(), Some("1234 5678 9012 34"));
        assert_eq!(receipt.subtotal, dec!(7.76));
        assert_eq!(receipt.tax_total, dec!(1.09));
        assert_eq!(receipt.total, dec!(8.85));
        assert_eq!(receipt.lines.len(), 3);

        assert_eq!(receipt.lines[0].tax_flag, Some(TaxFlag::ZeroRated));
        assert_eq!(receipt.lines[1].line_type, LineType::Item);
        assert_eq!(receipt.lines[1].tax_flag, Some(TaxFlag::Taxable));
        assert_eq!(receipt.lines[2].line_type, LineType::Fee);
        assert!(receipt.validation_warnings.is_empty());
    }

    #[test]
    fn promo_line_becomes_negative_discount() {
        let text = "WALMART\n\
                    2025-01-15\n\
                    PEPSI 591ML 069000009918 $7.00 T\n\
                    PEPSI 2 FOR $14 006L $7.84-A\n\
                    SUBTOTAL 0.00\n\
                    TOTAL 0.00\n";
        let receipt = WalmartParser.parse(text, EntityKind::Corp).unwrap();
        let discount = receipt
            .lines
            .iter()
            .find(|l| l.line_type == LineType::Discount)
            .unwrap();
        assert_eq!(discount.line_total, dec!(-7.84));
        assert!(discount.description.as_deref().unwrap().contains("2 FOR $14"));
    }

    #[test]
    fn faded_receipt_gets_subtotal_mismatch_without_placeholder() {
        // 40 items summing to 177.80 against a printed subtotal of 191.03:
        // 39 at $4.44 plus one at $4.64.
        let mut text = String::from("WALMART SUPERCENTRE\n2024/03/08\nTC# 5555 1111 2222\n");
        for i in 0..39 {
            writeln!(text, "PANTRY ITEM {i} 06210000{i:04} $4.44 T").unwrap();
        }
        text.push_str("LAST ITEM 062100009999 $4.64 T\n");
        text.push_str("SUBTOTAL 191.03\nHST 14.0000 % $13.00\nTOTAL 204.03\n");

        let receipt = WalmartParser.parse(&text, EntityKind::Corp).unwrap();

        assert_eq!(receipt.lines.len(), 40, "no synthetic 41st line");
        assert!(receipt
            .lines
            .iter()
            .all(|l| !l.description.as_deref().unwrap_or("").contains("Faded")));

        let mismatches: Vec<_> = receipt
            .validation_warnings
            .iter()
            .filter(|w| w.warning_type == WarningType::SubtotalMismatch)
            .collect();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].data["found_total"], 177.80);
        assert_eq!(mismatches[0].data["expected_total"], 191.03);
        assert_eq!(mismatches[0].data["difference"], 13.23);
        assert_eq!(receipt.total, dec!(204.03));
    }

    #[test]
    fn footer_lines_are_not_items() {
        let text = "WALMART\n2025-01-02\n\
                    CANADA DRY A 062100008930 $6.98 J\n\
                    SUBTOTAL 6.98\nHST 14.0000 % $0.98\nTOTAL 7.96\n";
        let receipt = WalmartParser.parse(text, EntityKind::Corp).unwrap();
        assert_eq!(receipt.lines.len(), 1);
        assert_eq!(receipt.lines[0].description.as_deref(), Some("CANADA DRY A"));
    }
}
