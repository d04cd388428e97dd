//! Core domain types shared across the pipeline.
//!
//! These are the framework-agnostic shapes that flow between the OCR layer,
//! the vendor parsers, the categorization stages, and persistence. Every
//! monetary value is a [`Decimal`]; confidences are `f64` in `[0, 1]`.

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Business entity. Selects one of the two persistence namespaces; the
/// categorization cache is shared across both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Corp,
    Soleprop,
}

impl EntityKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Corp => "corp",
            Self::Soleprop => "soleprop",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "corp" => Some(Self::Corp),
            "soleprop" => Some(Self::Soleprop),
            _ => None,
        }
    }
}

/// How the receipt entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptSource {
    Pwa,
    Email,
    Drive,
    Manual,
}

impl ReceiptSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pwa => "pwa",
            Self::Email => "email",
            Self::Drive => "drive",
            Self::Manual => "manual",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pwa" => Some(Self::Pwa),
            "email" => Some(Self::Email),
            "drive" => Some(Self::Drive),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// Receipt lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Pending,
    Processing,
    ReviewRequired,
    Approved,
    Posted,
    Rejected,
    Failed,
}

impl ReceiptStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::ReviewRequired => "review_required",
            Self::Approved => "approved",
            Self::Posted => "posted",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }
}

/// Type of a single line on a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineType {
    Item,
    Discount,
    Deposit,
    Fee,
    Subtotal,
    Tax,
    Total,
}

impl LineType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Discount => "discount",
            Self::Deposit => "deposit",
            Self::Fee => "fee",
            Self::Subtotal => "subtotal",
            Self::Tax => "tax",
            Self::Total => "total",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "item" => Some(Self::Item),
            "discount" => Some(Self::Discount),
            "deposit" => Some(Self::Deposit),
            "fee" => Some(Self::Fee),
            "subtotal" => Some(Self::Subtotal),
            "tax" => Some(Self::Tax),
            "total" => Some(Self::Total),
            _ => None,
        }
    }
}

/// Per-line tax treatment: `Y` taxable, `Z` zero-rated, `N` exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaxFlag {
    #[serde(rename = "Y")]
    Taxable,
    #[serde(rename = "Z")]
    ZeroRated,
    #[serde(rename = "N")]
    Exempt,
}

impl TaxFlag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Taxable => "Y",
            Self::ZeroRated => "Z",
            Self::Exempt => "N",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Y" => Some(Self::Taxable),
            "Z" => Some(Self::ZeroRated),
            "N" => Some(Self::Exempt),
            _ => None,
        }
    }
}

/// Closed taxonomy of non-fatal parse/recognition problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningType {
    SubtotalMismatch,
    TotalMismatch,
    PriceParseFailed,
    DateParseFailed,
    VendorUnknown,
    RecognizerTimeout,
    RecognizerOutputInvalid,
    OcrLowConfidence,
    BoundingBoxesUnavailable,
}

impl WarningType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SubtotalMismatch => "subtotal_mismatch",
            Self::TotalMismatch => "total_mismatch",
            Self::PriceParseFailed => "price_parse_failed",
            Self::DateParseFailed => "date_parse_failed",
            Self::VendorUnknown => "vendor_unknown",
            Self::RecognizerTimeout => "recognizer_timeout",
            Self::RecognizerOutputInvalid => "recognizer_output_invalid",
            Self::OcrLowConfidence => "ocr_low_confidence",
            Self::BoundingBoxesUnavailable => "bounding_boxes_unavailable",
        }
    }
}

/// A structured, non-fatal problem attached to a receipt. Stored as an
/// ordered JSON array on the receipt row and shown verbatim to reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    #[serde(rename = "type")]
    pub warning_type: WarningType,
    pub message: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl ValidationWarning {
    #[must_use]
    pub fn new(warning_type: WarningType, message: impl Into<String>) -> Self {
        Self {
            warning_type,
            message: message.into(),
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Line items summed to `found` but the receipt footer says `expected`.
    #[must_use]
    pub fn subtotal_mismatch(found: Decimal, expected: Decimal) -> Self {
        let difference = (expected - found).abs();
        Self::new(
            WarningType::SubtotalMismatch,
            format!(
                "Line items sum to ${found:.2} but receipt subtotal is ${expected:.2} (missing ${difference:.2})"
            ),
        )
        .with_data(serde_json::json!({
            "found_total": found.to_f64(),
            "expected_total": expected.to_f64(),
            "difference": difference.to_f64(),
        }))
    }

    /// `subtotal + tax_total` disagrees with the printed grand total.
    #[must_use]
    pub fn total_mismatch(computed: Decimal, printed: Decimal) -> Self {
        let difference = (printed - computed).abs();
        Self::new(
            WarningType::TotalMismatch,
            format!(
                "Subtotal plus tax is ${computed:.2} but receipt total is ${printed:.2}"
            ),
        )
        .with_data(serde_json::json!({
            "computed_total": computed.to_f64(),
            "printed_total": printed.to_f64(),
            "difference": difference.to_f64(),
        }))
    }

    #[must_use]
    pub fn price_parse_failed(token: &str) -> Self {
        Self::new(
            WarningType::PriceParseFailed,
            format!("Could not parse price token: {token:?}"),
        )
        .with_data(serde_json::json!({ "token": token }))
    }

    #[must_use]
    pub fn date_parse_failed(token: &str) -> Self {
        Self::new(
            WarningType::DateParseFailed,
            format!("Could not parse purchase date from: {token:?}"),
        )
        .with_data(serde_json::json!({ "token": token }))
    }
}

/// One token/line bounding box from OCR, coordinates normalized to `[0, 1]`
/// of the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrBox {
    pub page: i32,
    pub line_number: i32,
    pub text: String,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// One parsed line before categorization.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLine {
    /// Position on the source document, 0-based and dense.
    pub line_index: i32,
    pub line_type: LineType,
    pub raw_text: Option<String>,
    pub vendor_sku: Option<String>,
    pub upc: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    /// May be negative for discounts/refunds.
    pub line_total: Decimal,
    pub tax_flag: Option<TaxFlag>,
    pub tax_amount: Option<Decimal>,
}

impl ParsedLine {
    /// A bare line with only the required fields set.
    #[must_use]
    pub fn new(line_index: i32, line_type: LineType, line_total: Decimal) -> Self {
        Self {
            line_index,
            line_type,
            raw_text: None,
            vendor_sku: None,
            upc: None,
            description: None,
            quantity: None,
            unit_price: None,
            line_total,
            tax_flag: None,
            tax_amount: None,
        }
    }
}

/// Canonical post-parse receipt shape produced by every vendor parser.
#[derive(Debug, Clone)]
pub struct NormalizedReceipt {
    pub entity: EntityKind,
    pub source: ReceiptSource,
    /// Canonical name for the vendor registry, when known.
    pub vendor_guess: Option<String>,
    pub purchase_date: NaiveDate,
    pub invoice_number: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub lines: Vec<ParsedLine>,
    /// True for accounts-payable bills (payment terms), false for
    /// immediately paid receipts.
    pub is_bill: bool,
    pub payment_terms: Option<String>,
    pub validation_warnings: Vec<ValidationWarning>,
}

impl NormalizedReceipt {
    #[must_use]
    pub fn new(entity: EntityKind, source: ReceiptSource, purchase_date: NaiveDate) -> Self {
        Self {
            entity,
            source,
            vendor_guess: None,
            purchase_date,
            invoice_number: None,
            due_date: None,
            currency: "CAD".to_string(),
            subtotal: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total: Decimal::ZERO,
            lines: Vec::new(),
            is_bill: false,
            payment_terms: None,
            validation_warnings: Vec::new(),
        }
    }
}

/// Tolerance for the `subtotal + tax_total == total` invariant.
pub const TOTAL_TOLERANCE_CENTS: i64 = 2;

/// Returns the invariant-1 warning when `subtotal + tax - total` exceeds
/// the two-cent tolerance, `None` otherwise.
#[must_use]
pub fn check_totals(
    subtotal: Decimal,
    tax_total: Decimal,
    total: Decimal,
) -> Option<ValidationWarning> {
    let computed = subtotal + tax_total;
    let tolerance = Decimal::new(TOTAL_TOLERANCE_CENTS, 2);
    if (computed - total).abs() > tolerance {
        Some(ValidationWarning::total_mismatch(computed, total))
    } else {
        None
    }
}

/// Timestamp helper used everywhere a row is stamped.
#[must_use]
pub fn now_utc() -> NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn entity_round_trips_through_str() {
        for entity in [EntityKind::Corp, EntityKind::Soleprop] {
            assert_eq!(EntityKind::parse(entity.as_str()), Some(entity));
        }
        assert_eq!(EntityKind::parse("partnership"), None);
    }

    #[test]
    fn tax_flag_uses_single_letter_codes() {
        assert_eq!(TaxFlag::Taxable.as_str(), "Y");
        assert_eq!(TaxFlag::ZeroRated.as_str(), "Z");
        assert_eq!(TaxFlag::Exempt.as_str(), "N");
        assert_eq!(TaxFlag::parse("Z"), Some(TaxFlag::ZeroRated));
    }

    #[test]
    fn warning_serializes_with_type_tag() {
        let warning = ValidationWarning::subtotal_mismatch(dec!(177.80), dec!(191.03));
        let value = serde_json::to_value(&warning).unwrap();
        assert_eq!(value["type"], "subtotal_mismatch");
        assert_eq!(value["data"]["found_total"], 177.80);
        assert_eq!(value["data"]["expected_total"], 191.03);
        assert_eq!(value["data"]["difference"], 13.23);
    }

    #[test]
    fn check_totals_respects_two_cent_tolerance() {
        assert!(check_totals(dec!(10.00), dec!(1.50), dec!(11.52)).is_none());
        assert!(check_totals(dec!(10.00), dec!(1.50), dec!(11.48)).is_none());
        let warning = check_totals(dec!(10.00), dec!(1.50), dec!(11.60)).unwrap();
        assert_eq!(warning.warning_type, WarningType::TotalMismatch);
    }
}
