//! Grosnor Distribution invoice parser.
//!
//! Collectibles invoices (trading cards, Pokemon): alpha-numeric SKUs,
//! `(case/inner/unit)` configuration, `(SRP$X.XX)` and `(UPC nnn)` tokens
//! embedded in descriptions, freight and misc charges, HST at 15%.
//! Invoices carry payment terms, so they are bills.

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

/// `PO23PPT POKEMON 2023 TIN (SRP$34.99)(UPC 820650850241) (6/1) 6 6 0 EA 22.500 135.00`
static ITEM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*(?P<sku>[A-Z0-9]+)[ \t]+(?P<desc>.+?)[ \t]+\((?P<config>\d+/\d+(?:/\d+)?)\)[ \t]+(?P<ordered>\d+)[ \t]+(?P<shipped>\d+)[ \t]+(?P<backorder>\d+)[ \t]+(?P<uom>EA|BX)[ \t]+(?P<unit_price>[\d.]+)[ \t]+(?P<extended>[\d.]+)[ \t]*$",
    )
    .expect("grosnor item pattern")
});

static UPC_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(UPC[ \t]+(\d+)\)").expect("grosnor upc pattern"));
static SRP_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(SRP\$[\d.]+\)").expect("grosnor srp pattern"));
static REF_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#[\d-]+").expect("grosnor ref pattern"));

static INVOICE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"INVOICE NO\.[ \t]+(\d{6})").expect("grosnor invoice pattern"));
static ORDER_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"ORDER NO\.[ \t]+(\d{6})").expect("grosnor order pattern"));
static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"DATE[ \t]+(\d{2}/\d{2}/\d{2})\b").expect("grosnor date pattern"));
static TERMS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"TERMS[ \t]+([\w/]+)").expect("grosnor terms pattern"));
static SALES_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"SALES AMOUNT[ \t]+([\d.]+)").expect("grosnor sales pattern"));
static FREIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"FREIGHT[ \t]+([\d.]+)").expect("grosnor freight pattern"));
static MISC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"MISC[ \t]+([\d.]+)").expect("grosnor misc pattern"));
static TAX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"GST/HST[ \t]+([\d.]+)").expect("grosnor tax pattern"));
static TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)TOTAL[ \t]+([\d.]+)[ \t]*$").expect("grosnor total pattern"));

const HST_RATE_BP: i64 = 15;

pub struct GrosnorParser;

impl ReceiptParser for GrosnorParser {
    fn key(&self) -> &'static str {
        "grosnor"
    }

    fn detect_format(&self, text: &str) -> bool {
        let text_up = text.to_uppercase();
        if text_up.contains("GROSNOR") {
            return true;
        }
        // Configuration plus UPC tokens are unique to this layout
        Regex::new(r"\(\d+/\d+(?:/\d+)?\)")
            .map(|re| re.is_match(text) && UPC_TOKEN.is_match(text))
            .unwrap_or(false)
    }

    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt> {
        let mut warnings = Vec::new();

        let invoice_number = INVOICE_NUMBER.captures(text).map(|c| c[1].to_string());
        let order_number = ORDER_NUMBER.captures(text).map(|c| c[1].to_string());
        let purchase_date = match DATE
            .captures(text)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%m/%d/%y").ok())
        {
            Some(date) => date,
            None => {
                warnings.push(ValidationWarning::date_parse_failed("no invoice date"));
                chrono::Utc::now().date_naive()
            }
        };

        let sales_amount = SALES_AMOUNT
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let freight = FREIGHT
            .captures(text)
            .and_then(|c| normalize_price(&c[1]).ok())
            .unwrap_or(Decimal::ZERO);
        let misc = MISC
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
            .unwrap_or(sales_amount + freight + misc + tax_total);

        let mut lines = extract_lines(text, &mut warnings);

        // Freight and misc contribute to the subtotal as fee lines
        if freight > Decimal::ZERO {
            let mut fee = ParsedLine::new(lines.len() as i32, LineType::Fee, freight);
            fee.raw_text = Some("Freight Charge".to_string());
            fee.description = Some("Shipping - Canpar".to_string());
            fee.quantity = Some(Decimal::ONE);
            fee.unit_price = Some(freight);
            fee.tax_flag = Some(TaxFlag::Taxable);
            fee.tax_amount = Some((freight * Decimal::new(HST_RATE_BP, 2)).round_dp(2));
            lines.push(fee);
        }
        if misc > Decimal::ZERO {
            let mut fee = ParsedLine::new(lines.len() as i32, LineType::Fee, misc);
            fee.raw_text = Some("Miscellaneous Charges".to_string());
            fee.description = Some("Misc Fees".to_string());
            fee.quantity = Some(Decimal::ONE);
            fee.unit_price = Some(misc);
            fee.tax_flag = Some(TaxFlag::Taxable);
            fee.tax_amount = Some((misc * Decimal::new(HST_RATE_BP, 2)).round_dp(2));
            lines.push(fee);
        }

        if let Some(warning) = check_line_sum(&lines, sales_amount + freight + misc) {
            warnings.push(warning);
        }

        tracing::info!(
            invoice = invoice_number.as_deref().unwrap_or("UNKNOWN"),
            order = order_number.as_deref().unwrap_or("-"),
            lines = lines.len(),
            total = %total,
            "grosnor_parsed"
        );

        let mut receipt = NormalizedReceipt::new(entity, ReceiptSource::Manual, purchase_date);
        receipt.vendor_guess = Some("Grosnor Distribution".to_string());
        receipt.invoice_number = invoice_number;
        receipt.subtotal = sales_amount + freight + misc;
        receipt.tax_total = tax_total;
        receipt.total = total;
        receipt.lines = lines;
        receipt.is_bill = true;
        receipt.payment_terms = extract_payment_terms(text);
        receipt.validation_warnings = warnings;
        Ok(receipt)
    }
}

fn extract_payment_terms(text: &str) -> Option<String> {
    let terms = TERMS.captures(text).map(|c| c[1].to_string())?;
    if terms.contains("VISA") || terms.contains("MC") || terms.contains("VDCARD") {
        Some("Credit Card".to_string())
    } else {
        Some(terms)
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
        let qty_shipped = captures["shipped"].parse::<i64>().unwrap_or(0);

        let desc_raw = captures["desc"].trim().to_string();
        let upc = UPC_TOKEN.captures(&desc_raw).map(|c| c[1].to_string());
        // Strip SRP/UPC/reference tokens from the description
        let srp_stripped = SRP_TOKEN.replace_all(&desc_raw, "");
        let upc_stripped = UPC_TOKEN.replace_all(&srp_stripped, "");
        let description = REF_TOKEN.replace_all(&upc_stripped, "");

        let mut line = ParsedLine::new(index, LineType::Item, extended);
        line.raw_text = Some(format!(
            "{} {}",
            &captures["sku"],
            desc_raw.chars().take(50).collect::<String>()
        ));
        line.vendor_sku = Some(captures["sku"].to_string());
        line.upc = upc;
        line.description = Some(clean_description(&description));
        line.quantity = Some(Decimal::from(qty_shipped));
        line.unit_price = unit_price;
        line.tax_flag = Some(TaxFlag::Taxable);
        line.tax_amount = Some((extended * Decimal::new(HST_RATE_BP, 2)).round_dp(2));
        lines.push(line);
        index += 1;
    }

    tracing::info!(count = lines.len(), "grosnor_lines_extracted");
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const INVOICE: &str = "GROSNOR DISTRIBUTION AJAX INC.\n\
        INVOICE NO. 217427\n\
        ORDER NO. 229224\n\
        DATE 12/03/24\n\
        TERMS VISA/MC\n\
        PO23PPT POKEMON 2023 TIN (SRP$34.99)(UPC 820650850241) (6/1) 6 6 0 EA 22.500 135.00\n\
        SALES AMOUNT 135.00\n\
        FREIGHT 18.50\n\
        GST/HST 23.03\n\
        TOTAL 176.53\n";

    #[test]
    fn parses_collectibles_invoice() {
        let parser = GrosnorParser;
        assert!(parser.detect_format(INVOICE));
        let receipt = parser.parse(INVOICE, EntityKind::Soleprop).unwrap();

        assert_eq!(receipt.invoice_number.as_deref(), Some("217427"));
        assert_eq!(
            receipt.purchase_date,
            NaiveDate::from_ymd_opt(2024, 12, 3).unwrap()
        );
        assert!(receipt.is_bill);
        assert_eq!(receipt.payment_terms.as_deref(), Some("Credit Card"));
        assert_eq!(receipt.subtotal, dec!(153.50));
        assert_eq!(receipt.total, dec!(176.53));
    }

    #[test]
    fn upc_and_srp_tokens_are_extracted_from_description() {
        let receipt = GrosnorParser.parse(INVOICE, EntityKind::Soleprop).unwrap();
        let item = &receipt.lines[0];

        assert_eq!(item.vendor_sku.as_deref(), Some("PO23PPT"));
        assert_eq!(item.upc.as_deref(), Some("820650850241"));
        let description = item.description.as_deref().unwrap();
        assert!(description.contains("POKEMON 2023 TIN"));
        assert!(!description.contains("SRP"));
        assert!(!description.contains("UPC"));
        assert_eq!(item.quantity, Some(dec!(6)));

        let fee = receipt.lines.last().unwrap();
        assert_eq!(fee.line_type, LineType::Fee);
        assert_eq!(fee.line_total, dec!(18.50));
    }
}
