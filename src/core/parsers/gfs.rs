//! Gordon Food Service (GFS Canada) invoice parser.
//!
//! Tabular PDF invoices: 7-digit item codes, category codes (GR grocery,
//! FR frozen, DY dairy, DS disposables, CP chemical/paper), `H` marks
//! HST-taxable lines at 15%, fuel surcharge arrives on the `Misc` line and
//! becomes a `fee` line. Net 14 terms, so every invoice is a bill.

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

/// `1229832 5 APPETIZER ONION RING BTD FR 22.52 112.60 CS 5 1X3 KG Kitche`
static ITEM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<code>\d{7})[ \t]+(?P<qty_ordered>\d+)[ \t]+(?P<desc>.+?)[ \t]+(?P<category>GR|FR|DY|DS|CP)[ \t]+(?P<unit_price>[\d.]+)[ \t]+(?P<extended>[\d.]+)[ \t]+(?P<tax>H)?[ \t]*(?P<unit>CS|EA)[ \t]+(?P<qty_shipped>\d+)[ \t]+(?P<pack>[\dXx.]+[ \t]*[A-Z]+)[ \t]+(?P<brand>\w+)",
    )
    .expect("gfs item pattern")
});

static INVOICE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Invoice[ \t]+(\d{10})").expect("gfs invoice pattern"));
static INVOICE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Invoice Date[ \t]*\r?\n?.*?(\d{2}/\d{2}/\d{4})").expect("gfs date pattern")
});
static DUE_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Due Date[ \t]+(\d{2}/\d{2}/\d{4})").expect("gfs due date pattern"));
static PRODUCT_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Product Total[ \t]+\$?([\d,]+\.\d{2})").expect("gfs subtotal pattern")
});
static MISC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Misc[ \t]+\$?([\d,]+\.\d{2})").expect("gfs misc pattern"));
static TAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"GST/HST[ \t]+\$?([\d,]+\.\d{2})").expect("gfs tax pattern"));
static TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Invoice Total[ \t]+\$?([\d,]+\.\d{2})").expect("gfs total pattern")
});

const HST_RATE_BP: i64 = 15;

pub struct GfsParser;

impl ReceiptParser for GfsParser {
    fn key(&self) -> &'static str {
        "gfs"
    }

    fn detect_format(&self, text: &str) -> bool {
        let text_up = text.to_uppercase();
        if ["GORDON FOOD SERVICE", "GFS CANADA", "GFSCANADA.COM"]
            .iter()
            .any(|p| text_up.contains(p))
        {
            return true;
        }
        INVOICE_NUMBER.is_match(text) && ITEM_LINE.is_match(text)
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let mut warnings = Vec::new();

        let invoice_number = INVOICE_NUMBER.captures(text).map(|c| c[1].to_string());
        let purchase_date = match INVOICE_DATE
            .captures(text)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%m/%d/%Y").ok())
        {
            Some(date) => date,
            None => {
                warnings.push(ValidationWarning::date_parse_failed("no invoice date"));
                chrono::Utc::now().date_naive()
            }
        };
        let due_date = DUE_DATE
            .captures(text)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%m/%d/%Y").ok());

        let subtotal = PRODUCT_TOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let fuel_charge = MISC
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
            .unwrap_or(subtotal + fuel_charge + tax_total);

        let mut lines = extract_lines(text, &mut warnings);

        // Fuel surcharge contributes to the subtotal as a fee line
        if fuel_charge > Decimal::ZERO {
            let mut fee = ParsedLine::new(lines.len() as i32, LineType::Fee, fuel_charge);
            fee.raw_text = Some("Fuel Charge".to_string());
            fee.description = Some("Fuel Surcharge".to_string());
            fee.quantity = Some(Decimal::ONE);
            fee.unit_price = Some(fuel_charge);
            fee.tax_flag = Some(TaxFlag::Taxable);
            fee.tax_amount = Some((fuel_charge * Decimal::new(HST_RATE_BP, 2)).round_dp(2));
            lines.push(fee);
        }

        if let Some(warning) = check_line_sum(&lines, subtotal + fuel_charge) {
            warnings.push(warning);
        }

        tracing::info!(
            invoice = invoice_number.as_deref().unwrap_or("UNKNOWN"),
            lines = lines.len(),
            total = %total,
            "gfs_parsed"
        );

        let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
        receipt.vendor_guess = Some("Gordon Food Service".to_string());
        receipt.invoice_number = invoice_number;
        receipt.due_date = due_date;
        receipt.subtotal = subtotal + fuel_charge;
        receipt.tax_total = tax_total;
        receipt.total = total;
        receipt.lines = lines;
        receipt.is_bill = true;
        receipt.payment_terms = Some("Net 14".to_string());
        receipt.validation_warnings = warnings;
        Ok(receipt)
    }
}

fn extract_lines(text: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<ParsedLine> {
    let mut lines = Vec::new();
    let mut index = 0;

    for captures in ITEM_LINE.captures_iter(text) {
        let extended = match normalize_price(&captures["extended"]) {
            Ok(amount) => amount,
            Err(token) => {
                warnings.push(ValidationWarning::price_parse_failed(&token));
                continue;
            }
        };
        let unit_price = normalize_price(&captures["unit_price"]).ok();
        let qty_shipped = captures["qty_shipped"].parse::<i64>().unwrap_or(0);
        let taxable = captures.name("tax").is_some();

        let mut line = ParsedLine::new(index, LineType::Item, extended);
        line.raw_text = Some(format!("{} {}", &captures["code"], captures["desc"].trim()));
        line.vendor_sku = Some(captures["code"].to_string());
        line.description = Some(format!(
            "{} ({})",
            clean_description(captures["desc"].trim()),
            captures["pack"].trim()
        ));
        line.quantity = Some(Decimal::from(qty_shipped));
        line.unit_price = unit_price;
        line.tax_flag = Some(if taxable { TaxFlag::Taxable } else { TaxFlag::Exempt });
        line.tax_amount = Some(if taxable {
            (extended * Decimal::new(HST_RATE_BP, 2)).round_dp(2)
        } else {
            Decimal::ZERO
        });
        lines.push(line);
        index += 1;
    }

    tracing::info!(count = lines.len(), "gfs_lines_extracted");
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const INVOICE: &str = "GORDON FOOD SERVICE\n\
        Invoice 9002081541\n\
        Invoice Date 01/10/2025\n\
        Due Date 01/24/2025\n\
        1229832 5 APPETIZER ONION RING BTD FR 22.52 112.60 CS 5 1X3 KG Kitche\n\
        1334455 2 MTN DEW 591ML GR 18.20 36.40 H CS 2 1X24 EA Pepsi\n\
        Product Total 149.00\n\
        Misc 12.50\n\
        GST/HST 7.34\n\
        Invoice Total 168.84\n";

    #[test]
    fn parses_invoice_with_fuel_surcharge() {
        let parser = GfsParser;
        assert!(parser.detect_format(INVOICE));
        let receipt = parser.parse(INVOICE, EntityKind::Corp).unwrap();

        assert_eq!(receipt.invoice_number.as_deref(), Some("9002081541"));
        assert_eq!(
            receipt.purchase_date,
            NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
        );
        assert_eq!(
            receipt.due_date,
            Some(NaiveDate::from_ymd_opt(2025, 1, 24).unwrap())
        );
        assert!(receipt.is_bill);
        assert_eq!(receipt.payment_terms.as_deref(), Some("Net 14"));

        // Product total plus fuel folds into the subtotal
        assert_eq!(receipt.subtotal, dec!(161.50));
        assert_eq!(receipt.total, dec!(168.84));

        assert_eq!(receipt.lines.len(), 3);
        let fee = receipt.lines.last().unwrap();
        assert_eq!(fee.line_type, LineType::Fee);
        assert_eq!(fee.line_total, dec!(12.50));
    }

    #[test]
    fn tax_flag_follows_h_column() {
        let receipt = GfsParser.parse(INVOICE, EntityKind::Corp).unwrap();
        let exempt = &receipt.lines[0];
        assert_eq!(exempt.tax_flag, Some(TaxFlag::Exempt));
        assert_eq!(exempt.quantity, Some(dec!(5)));

        let taxable = &receipt.lines[1];
        assert_eq!(taxable.tax_flag, Some(TaxFlag::Taxable));
        assert_eq!(taxable.tax_amount, Some(dec!(5.46)));
        assert!(taxable.description.as_deref().unwrap().contains("1X24 EA"));
    }
}
