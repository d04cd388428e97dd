//! Receipt entity - one scanned document.
//!
//! A receipt row lives in exactly one entity namespace (`corp` or
//! `soleprop`), carried by the `entity` discriminator and enforced at the
//! repository seam. `validation_warnings` is an ordered JSON array of
//! `{type, message, data}` objects (see [`crate::models::ValidationWarning`]).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Receipt database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receipts")]
pub struct Model {
    /// Unique identifier for the receipt
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Entity namespace: "corp" or "soleprop"
    pub entity: String,
    /// Upload source: pwa, email, drive, manual
    pub source: String,
    /// SHA-256 of the original file, supplied by the uploader for dedup
    pub content_hash: Option<String>,
    /// Perceptual hash for similarity checks
    pub perceptual_hash: Option<String>,
    /// Path of the original under `<objects_root>/<entity>/<id>/`
    pub file_path: String,
    /// Canonical vendor name when identified
    pub vendor_guess: Option<String>,
    pub purchase_date: Option<Date>,
    pub invoice_number: Option<String>,
    /// Currency code, defaults to CAD
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    /// True for accounts-payable bills with payment terms
    pub is_bill: bool,
    pub payment_terms: Option<String>,
    /// OCR method used: textract, tesseract, pdf_text_extraction
    pub ocr_method: Option<String>,
    /// Overall OCR confidence in [0, 1]
    pub ocr_confidence: Option<f64>,
    pub page_count: i32,
    /// Ordered JSON array of validation warnings
    pub validation_warnings: Json,
    /// Lifecycle status: pending, processing, review_required, approved,
    /// posted, rejected, failed
    pub status: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each receipt owns its line items
    #[sea_orm(has_many = "super::receipt_line::Entity")]
    ReceiptLine,
}

impl Related<super::receipt_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ReceiptLine.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
