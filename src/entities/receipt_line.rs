//! Receipt line entity - one item on a receipt.
//!
//! Lines are densely indexed from 0 in source-document order. The
//! categorization fields are filled by the two-stage classifier; the
//! bounding box, when present, is page-normalized `[0, 1]` Textract geometry.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "receipt_lines")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub receipt_id: Uuid,
    /// Entity namespace, always equal to the parent receipt's
    pub entity: String,
    /// 0-based position on the source document, dense within a receipt
    pub line_index: i32,
    /// item, discount, deposit, fee, subtotal, tax, total
    pub line_type: String,
    pub vendor_sku: Option<String>,
    pub upc: Option<String>,
    pub raw_text: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    /// Negative for discounts/refunds
    pub line_total: Decimal,
    /// Y = taxable, Z = zero-rated, N = exempt
    pub tax_flag: Option<String>,
    pub tax_amount: Option<Decimal>,
    /// Expanded product name from Stage 1
    pub normalized_description: Option<String>,
    pub product_category: Option<String>,
    /// GL account code from Stage 2
    pub account_code: Option<String>,
    pub brand: Option<String>,
    /// Overall categorization confidence, min of the two stages
    pub confidence: Option<f64>,
    /// cache, ai, user, rule
    pub categorization_source: Option<String>,
    pub requires_review: bool,
    /// pending, approved, rejected, snoozed, needs_info, posted
    pub review_status: String,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime>,
    pub ai_cost_usd: Option<Decimal>,
    /// `{left, top, width, height}` in page-normalized coordinates
    pub bounding_box: Option<Json>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::receipt::Entity",
        from = "Column::ReceiptId",
        to = "super::receipt::Column::Id"
    )]
    Receipt,
}

impl Related<super::receipt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Receipt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
