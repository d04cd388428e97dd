//! Costco Wholesale receipt parser.
//!
//! Online order-history printouts: `SKU DESCRIPTION PRICE [Y/N]` item
//! lines, 12-digit member and transaction ids, container-deposit codes
//! (9484-9495) excluded from inventory, `TPD/` instant-savings lines as
//! discounts, HST at 15% on taxable items. Paid immediately, never a bill.

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

/// `306657 GATORADE 65.97 Y` / `1770709 TPD/PEPSI 2.90-`
static ITEM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<sku>\d{4,7})[ \t]+(?P<desc>[A-Z][A-Z0-9 */&.-]*?)[ \t]+(?P<amount>[\d.]+)(?P<neg>-?)[ \t]*(?P<taxflag>[YN])?[ \t]*$",
    )
    .expect("costco item pattern")
});

/// `09/08/2023 12:57 13451117081`
static DATE_WITH_TXN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2}/\d{2}/\d{4})[ \t]+\d{2}:\d{2}[ \t]+(\d{11,12})")
        .expect("costco date pattern")
});
static DATE_P7: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"P7[ \t]+(\d{2}/\d{2}/\d{4})").expect("costco p7 date pattern"));

static SUBTOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SUBTOTAL[ \t]+([\d,]+\.\d{2})").expect("costco subtotal pattern"));
/// `TAX` line; the 15% HST summary is the fallback.
static TAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*TAX[ \t]+([\d,]+\.\d{2})").expect("costco tax pattern"));
static TAX_HST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(A\)[ \t]+15%[ \t]+HST[ \t]+([\d,]+\.\d{2})").expect("costco hst pattern")
});
static TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\*+[ \t]*TOTAL[ \t]+([\d,]+\.\d{2})").expect("costco total pattern")
});
static INSTANT_SAVINGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"INSTANT SAVINGS[ \t]+\$?([\d,]+\.\d{2})").expect("costco savings pattern")
});
static MEMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Member[ \t#]*(\d{12})").expect("costco member pattern"));

/// Container deposit item codes, not inventory.
const DEPOSIT_CODES: &[&str] = &[
    "9484", "9485", "9486", "9487", "9488", "9489", "9490", "9491", "9492", "9493", "9494", "9495",
];

const HST_RATE_BP: i64 = 15; // 15%

pub struct CostcoParser;

impl ReceiptParser for CostcoParser {
    fn key(&self) -> &'static str {
        "costco"
    }

    fn detect_format(&self, text: &str) -> bool {
        let text_up = text.to_uppercase();
        if ["COSTCO WHOLESALE", "COSTCO.CA", "COSTCO.COM"]
            .iter()
            .any(|p| text_up.contains(p))
        {
            return true;
        }
        MEMBER.is_match(text) && DATE_WITH_TXN.is_match(text)
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let mut warnings = Vec::new();

        let (purchase_date, transaction_id) = match extract_date_and_txn(text) {
            Some(parsed) => parsed,
            None => {
                warnings.push(ValidationWarning::date_parse_failed("no transaction date"));
                (chrono::Utc::now().date_naive(), None)
            }
        };

        let subtotal = SUBTOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let tax_total = TAX
            .captures(text)
            .or_else(|| TAX_HST.captures(text))
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let total = TOTAL
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(subtotal + tax_total);
        let instant_savings = INSTANT_SAVINGS
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);

        let lines = extract_lines(text, &mut warnings);

        if let Some(warning) = check_line_sum(&lines, subtotal) {
            warnings.push(warning);
        }

        tracing::info!(
            transaction = transaction_id.as_deref().unwrap_or("UNKNOWN"),
            lines = lines.len(),
            total = %total,
            savings = %instant_savings,
            "costco_parsed"
        );

        let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
        receipt.vendor_guess = Some("Costco Wholesale".to_string());
        receipt.invoice_number = transaction_id;
        receipt.subtotal = subtotal;
        receipt.tax_total = tax_total;
        receipt.total = total;
        receipt.lines = lines;
        receipt.validation_warnings = warnings;
        Ok(receipt)
    }
}

fn extract_date_and_txn(text: &str) -> Option<(NaiveDate, Option<String>)> {
    if let Some(c) = DATE_WITH_TXN.captures(text) {
        let date = NaiveDate::parse_from_str(&c[1], "%m/%d/%Y").ok()?;
        return Some((date, Some(c[2].to_string())));
    }
    let c = DATE_P7.captures(text)?;
    let date = NaiveDate::parse_from_str(&c[1], "%m/%d/%Y").ok()?;
    Some((date, None))
}

fn extract_lines(text: &str, warnings: &mut Vec<ValidationWarning>) -> Vec<ParsedLine> {
    let mut lines = Vec::new();
    let mut index = 0;

    for captures in ITEM_LINE.captures_iter(text) {
        let sku = captures["sku"].to_string();
        // Container deposits are not inventory
        if DEPOSIT_CODES.contains(&sku.as_str()) {
            continue;
        }

        let description = captures["desc"].trim().to_string();
        let amount = match normalize_price(&captures["amount"]) {
            Ok(amount) => amount,
            Err(token) => {
                warnings.push(ValidationWarning::price_parse_failed(&token));
                continue;
            }
        };
        let negative = &captures["neg"] == "-";
        let flag = captures.name("taxflag").map(|m| m.as_str());

        let (line_type, line_total, tax_flag, tax_amount) = if description.contains("TPD/") {
            // Instant-savings discounts come through as TPD lines
            (
                LineType::Discount,
                -amount.abs(),
                TaxFlag::Exempt,
                Decimal::ZERO,
            )
        } else {
            let line_total = if negative { -amount } else { amount };
            if flag == Some("Y") {
                let hst = (line_total * Decimal::new(HST_RATE_BP, 2)).round_dp(2);
                (LineType::Item, line_total, TaxFlag::Taxable, hst)
            } else {
                (LineType::Item, line_total, TaxFlag::Exempt, Decimal::ZERO)
            }
        };

        let mut line = ParsedLine::new(index, line_type, line_total);
        line.raw_text = Some(format!("{sku} {description}"));
        line.vendor_sku = Some(sku);
        line.description = Some(clean_description(&description));
        // Costco prints extended prices, no per-line quantity
        line.quantity = Some(Decimal::ONE);
        line.unit_price = Some(line_total);
        line.tax_flag = Some(tax_flag);
        line.tax_amount = Some(tax_amount);
        lines.push(line);
        index += 1;
    }

    tracing::info!(count = lines.len(), "costco_lines_extracted");
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const RECEIPT: &str = "COSTCO WHOLESALE\n\
        Member 111222333444\n\
        306657 GATORADE 65.97 Y\n\
        1510576 OASIS APP G 15.99 N\n\
        9490 DEPOSIT/306 8.40\n\
        1770709 TPD/PEPSI 2.90-\n\
        SUBTOTAL 79.06\n\
        TAX 9.90\n\
        **** TOTAL 88.96\n\
        09/08/2023 12:57 134511170812\n";

    #[test]
    fn detects_and_parses_order_history_format() {
        let parser = CostcoParser;
        assert!(parser.detect_format(RECEIPT));
        let receipt = parser.parse(RECEIPT, EntityKind::Corp).unwrap();

        assert_eq!(receipt.vendor_guess.as_deref(), Some("Costco Wholesale"));
        assert_eq!(receipt.invoice_number.as_deref(), Some("134511170812"));
        assert_eq!(
            receipt.purchase_date,
            NaiveDate::from_ymd_opt(2023, 9, 8).unwrap()
        );
        assert_eq!(receipt.subtotal, dec!(79.06));
        assert_eq!(receipt.tax_total, dec!(9.90));
        assert_eq!(receipt.total, dec!(88.96));
    }

    #[test]
    fn deposit_codes_are_skipped_and_tpd_becomes_discount() {
        let receipt = CostcoParser.parse(RECEIPT, EntityKind::Corp).unwrap();

        assert!(receipt
            .lines
            .iter()
            .all(|l| l.vendor_sku.as_deref() != Some("9490")));

        let discount = receipt
            .lines
            .iter()
            .find(|l| l.line_type == LineType::Discount)
            .unwrap();
        assert_eq!(discount.line_total, dec!(-2.90));
        assert_eq!(discount.tax_flag, Some(TaxFlag::Exempt));

        let taxable = receipt
            .lines
            .iter()
            .find(|l| l.vendor_sku.as_deref() == Some("306657"))
            .unwrap();
        assert_eq!(taxable.tax_flag, Some(TaxFlag::Taxable));
        assert_eq!(taxable.tax_amount, Some(dec!(9.90)));

        // Dense 0-based indexes in source order
        let indexes: Vec<i32> = receipt.lines.iter().map(|l| l.line_index).collect();
        assert_eq!(indexes, vec![0, 1, 2]);
    }
}
