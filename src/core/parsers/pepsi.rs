//! PepsiCo Canada Beverages invoice parser.
//!
//! Two formats: physical delivery invoices (`INVOICE #` plus an `ITEM
//! DETAIL` table) and monthly email summary PDFs (`Invoice Details` with
//! `CS`/`EA` quantity lines). Container-deposit charges bill pre-tax, so
//! they fold into the subtotal before validation. Paid by pre-authorized
//! debit on the 15th of the following month, so every invoice is a bill.

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

static INVOICE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)INVOICE[ \t]*#[ \t]*(\d+)").expect("pepsi invoice pattern"));
static DATE_MDY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}/\d{1,2}/\d{4})").expect("pepsi date pattern"));
static DATE_SHORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}/\d{1,2}/\d{2})\b").expect("pepsi short date pattern"));

static TOTAL_DUE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)Amount[ \t]+Due.*?\$[ \t]*([\d,]+\.?\d*)",
        r"(?is)for[ \t]+this[ \t]+Invoice.*?\$[ \t]*([\d,]+\.?\d*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("pepsi total pattern"))
    .collect()
});
static SALES_SUBTOTAL: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)Sales.*?Cases.*?\d+[ \t]+([\d,]+\.\d{2})",
        r"(?i)Subtotal.*?([\d,]+\.\d{2})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("pepsi subtotal pattern"))
    .collect()
});
/// `GST/HST On $1113.21 $ 155.84` - the second amount is the tax.
static HST: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)GST/HST[ \t]+On.*?\$[ \t]*[\d,]+\.?\d*[ \t]*\$[ \t]*([\d,]+\.?\d*)",
        r"(?is)GST/HST.*?\$[ \t]*([\d,]+\.?\d*)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("pepsi hst pattern"))
    .collect()
});
static CHARGES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)Charges\s+([\d,]+\.\d{2})").expect("pepsi charges pattern"));

/// Delivery table body between `ITEM DETAIL ... SALES` and the footer.
static ITEM_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)ITEM DETAIL.*?SALES(.*?)(?:CHARGES|Amount Due)")
        .expect("pepsi item section pattern")
});
/// `PEPSI 0-69000-00991-8  T  97.00  5  120  35.91  179.55`
static DELIVERY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<desc>[A-Z][A-Z0-9 /]+?)[ \t]+(?P<upc>[\d-]{11,})[ \t]+(?:T[ \t]+)?[\d.]+[ \t]+(?P<cases>\d+)[ \t]+\d+[ \t]+(?P<unit_price>[\d.]+)[ \t]+(?P<total>[\d.]+)[ \t]*$",
    )
    .expect("pepsi delivery line pattern")
});
/// `PEPSI COL COLA PET 591ML 1P24C 69000009918 2 CS $35.38 $70.76`
static SUMMARY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[ \t]*(?P<desc>[A-Z0-9 /]+?)[ \t]+(?P<upc>\d{8,})[ \t]+(?P<qty>\d+)[ \t]+(?:CS|EA)[ \t=$]*\$?(?P<unit_price>[\d.]+)[. \t]*\$?(?P<total>[\d.]+)",
    )
    .expect("pepsi summary line pattern")
});
static SUMMARY_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Total.*?\$?([\d,]+\.\d{2})").expect("pepsi summary total"));

pub struct PepsiParser;

impl ReceiptParser for PepsiParser {
    fn key(&self) -> &'static str {
        "pepsi"
    }

    fn detect_format(&self, text: &str) -> bool {
        let text_up = text.to_uppercase();
        // Company or invoice context is required; product UPC prefixes
        // alone are not enough (they show up on other stores' receipts).
        let company = text_up.contains("PEPSICO CANADA")
            || (text_up.contains("PEPSI") && text_up.contains("BEVERAGES"));
        let invoice_context = text_up.contains("INVOICE DETAILS")
            || text_up.contains("INVOICE SUMMARY")
            || (text_up.contains("INVOICE #") && text_up.contains("ITEM DETAIL"));
        company || invoice_context
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let text_up = text.to_uppercase();
        if text_up.contains("INVOICE DETAILS") || text_up.contains("INVOICE SUMMARY") {
            parse_email_summary(text, entity)
        } else {
            // Delivery invoices are the common case
            parse_delivery_invoice(text, entity)
        }
    }
}

fn parse_delivery_invoice(text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
    let mut warnings = Vec::new();

    let invoice_number = INVOICE_NUMBER.captures(text).map(|c| c[1].to_string());
    let purchase_date = match DATE_MDY
        .captures(text)
        .and_then(|c| NaiveDate::parse_from_str(&c[1], "%m/%d/%Y").ok())
    {
        Some(date) => date,
        None => {
            warnings.push(ValidationWarning::date_parse_failed("no invoice date"));
            chrono::Utc::now().date_naive()
        }
    };

    let total = TOTAL_DUE
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| normalize_price(&c[1]).ok())
        .unwrap_or(Decimal::ZERO);
    let sales_subtotal = SALES_SUBTOTAL
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| normalize_price(&c[1]).ok())
        .unwrap_or(Decimal::ZERO);
    let hst = HST
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|c| normalize_price(&c[1]).ok())
        .unwrap_or(Decimal::ZERO);
    let charges = CHARGES
        .captures(text)
        .and_then(|c| normalize_price(&c[1]).ok())
        .unwrap_or(Decimal::ZERO);

    let lines = extract_delivery_lines(text, &mut warnings);

    // Container deposits bill pre-tax: fold charges into the subtotal so
    // subtotal + tax == total holds.
    let subtotal = sales_subtotal + charges;

    if let Some(warning) = check_line_sum(&lines, sales_subtotal) {
        warnings.push(warning);
    }

    tracing::info!(
        invoice = invoice_number.as_deref().unwrap_or("UNKNOWN"),
        lines = lines.len(),
        total = %total,
        deposits = %charges,
        "pepsi_delivery_parsed"
    );

    let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
    receipt.vendor_guess = Some("PepsiCo Canada".to_string());
    receipt.invoice_number = invoice_number;
    receipt.subtotal = subtotal;
    receipt.tax_total = hst;
    receipt.total = total;
    receipt.lines = lines;
    receipt.is_bill = true;
    receipt.payment_terms = Some("Charge-PAD 15th next month".to_string());
    receipt.validation_warnings = warnings;
    Ok(receipt)
}

fn extract_delivery_lines(text: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<ParsedLine> {
    let Some(section) = ITEM_SECTION.captures(text) else {
        tracing::warn!("pepsi_item_detail_section_not_found");
        return Vec::new();
    };
    let body = &section[1];

    let mut lines = Vec::new();
    for captures in DELIVERY_LINE.captures_iter(body) {
        let line_total = match normalize_price(&captures["total"]) {
            Ok(amount) => amount,
            Err(token) => {
                warnings.push(ValidationWarning::price_parse_failed(&token));
                continue;
            }
        };
        let upc = captures["upc"].replace('-', "");
        let cases = captures["cases"].parse::<i64>().unwrap_or(0);

        let mut line = ParsedLine::new(lines.len() as i32, LineType::Item, line_total);
        line.raw_text = Some(captures[0].trim().to_string());
        line.vendor_sku = Some(upc.clone());
        line.upc = Some(upc);
        line.description = Some(clean_description(captures["desc"].trim()));
        line.quantity = Some(Decimal::from(cases));
        line.unit_price = normalize_price(&captures["unit_price"]).ok();
        line.tax_flag = Some(TaxFlag::Taxable);
        lines.push(line);
    }

    tracing::info!(count = lines.len(), "pepsi_delivery_lines_extracted");
    lines
}

fn parse_email_summary(text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
    let mut warnings = Vec::new();

    let invoice_number = Regex::new(r"(\d{8})")
        .ok()
        .and_then(|re| re.captures(text).map(|c| c[1].to_string()));
    let purchase_date = match extract_summary_date(text) {
        Some(date) => date,
        None => {
            warnings.push(ValidationWarning::date_parse_failed("no summary date"));
            chrono::Utc::now().date_naive()
        }
    };

    let lines = extract_summary_lines(text, &mut warnings);
    let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();

    let total = SUMMARY_TOTAL
        .captures(text)
        .and_then(|c| normalize_price(&c[1]).ok())
        .unwrap_or(subtotal);
    let tax_total = if total > subtotal {
        total - subtotal
    } else {
        Decimal::ZERO
    };

    tracing::info!(
        invoice = invoice_number.as_deref().unwrap_or("UNKNOWN"),
        lines = lines.len(),
        total = %total,
        "pepsi_email_parsed"
    );

    let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
    receipt.vendor_guess = Some("PepsiCo Canada".to_string());
    receipt.invoice_number = invoice_number;
    receipt.subtotal = subtotal;
    receipt.tax_total = tax_total;
    receipt.total = total;
    receipt.lines = lines;
    receipt.is_bill = true;
    receipt.payment_terms = Some("15th of next month".to_string());
    receipt.validation_warnings = warnings;
    Ok(receipt)
}

fn extract_summary_date(text: &str) -> Option<NaiveDate> {
    if let Some(c) = DATE_MDY.captures(text) {
        if let Ok(date) = NaiveDate::parse_from_str(&c[1], "%m/%d/%Y") {
            return Some(date);
        }
    }
    let c = DATE_SHORT.captures(text)?;
    NaiveDate::parse_from_str(&c[1], "%m/%d/%y").ok()
}

fn extract_summary_lines(text: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<ParsedLine> {
    let mut lines = Vec::new();
    for captures in SUMMARY_LINE.captures_iter(text) {
        let line_total = match normalize_price(&captures["total"]) {
            Ok(amount) => amount,
            Err(token) => {
                warnings.push(ValidationWarning::price_parse_failed(&token));
                continue;
            }
        };
        let upc = captures["upc"].to_string();

        let mut line = ParsedLine::new(lines.len() as i32, LineType::Item, line_total);
        line.raw_text = Some(captures[0].trim().to_string());
        line.vendor_sku = Some(upc.clone());
        line.upc = Some(upc);
        line.description = Some(clean_description(captures["desc"].trim()));
        line.quantity = captures["qty"].parse::<i64>().ok().map(Decimal::from);
        line.unit_price = normalize_price(&captures["unit_price"]).ok();
        line.tax_flag = Some(TaxFlag::Taxable);
        lines.push(line);
    }

    tracing::info!(count = lines.len(), "pepsi_summary_lines_extracted");
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const DELIVERY: &str = "PEPSICO CANADA BEVERAGES\n\
        INVOICE # 51314455\n\
        Route #: 8232\n\
        10/07/2025 53 AM\n\
        ITEM DETAIL\n\
        SALES\n\
        PEPSI 591ML PL 0-69000-00991-8 T 97.00 5 120 35.91 179.55\n\
        MTN DEW 591ML 0-69000-00992-5 T 97.00 3 72 35.91 107.73\n\
        CHARGES 12.00\n\
        Sales Cases 8 287.28\n\
        GST/HST On $287.28 $ 43.09\n\
        Amount Due $ 342.37\n";

    #[test]
    fn parses_delivery_invoice_with_deposits_in_subtotal() {
        let parser = PepsiParser;
        assert!(parser.detect_format(DELIVERY));
        let receipt = parser.parse(DELIVERY, EntityKind::Corp).unwrap();

        assert_eq!(receipt.invoice_number.as_deref(), Some("51314455"));
        assert_eq!(
            receipt.purchase_date,
            NaiveDate::from_ymd_opt(2025, 10, 7).unwrap()
        );
        assert!(receipt.is_bill);
        assert_eq!(
            receipt.payment_terms.as_deref(),
            Some("Charge-PAD 15th next month")
        );

        // Sales 287.28 + deposit charges 12.00
        assert_eq!(receipt.subtotal, dec!(299.28));
        assert_eq!(receipt.tax_total, dec!(43.09));
        assert_eq!(receipt.total, dec!(342.37));

        assert_eq!(receipt.lines.len(), 2);
        let first = &receipt.lines[0];
        assert_eq!(first.upc.as_deref(), Some("069000009918"));
        assert_eq!(first.quantity, Some(dec!(5)));
        assert_eq!(first.line_total, dec!(179.55));
    }

    #[test]
    fn parses_email_summary_lines() {
        let text = "Invoice Details\n\
            10/08/24\n\
            PEPSI COL COLA PET 591ML 1P24C 69000009918 2 CS $35.38 $70.76\n\
            MTN DEW PET 591ML 1P24C 69000009925 1 CS $35.38 $35.38\n";
        let receipt = PepsiParser.parse(text, EntityKind::Corp).unwrap();

        assert_eq!(receipt.lines.len(), 2);
        assert_eq!(receipt.subtotal, dec!(106.14));
        assert_eq!(receipt.lines[0].quantity, Some(dec!(2)));
        assert_eq!(receipt.lines[0].unit_price, Some(dec!(35.38)));
        assert_eq!(
            receipt.payment_terms.as_deref(),
            Some("15th of next month")
        );
    }
}
