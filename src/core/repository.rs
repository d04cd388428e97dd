//! Receipt repository - entity-routed persistence for receipts and lines.
//!
//! Every operation takes the business entity and scopes each statement
//! with it; nothing outside this module (and the review projection)
//! touches the receipt tables, so a `corp` receipt can never surface in a
//! `soleprop` read. Saves run inside the caller's transaction and re-saves
//! are idempotent per `(receipt_id, line_index)`: line ids derive from the
//! receipt id, and saving replaces the receipt's lines atomically.

use crate::core::categorize::accounts::ProductCategory;
use crate::core::review::reviewable_id;
use crate::core::cache;
use crate::entities::{receipt, receipt_line, review_activity, Receipt, ReceiptLine, ReviewActivity};
use crate::errors::{Error, Result};
use crate::models::{
    now_utc, EntityKind, LineType, ReceiptSource, ReceiptStatus, TaxFlag, ValidationWarning,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait, TryIntoModel,
};
use uuid::Uuid;

/// Receipt header ready to persist.
#[derive(Debug, Clone)]
pub struct ReceiptDraft {
    pub id: Uuid,
    pub entity: EntityKind,
    pub source: ReceiptSource,
    pub file_path: String,
    pub content_hash: Option<String>,
    pub perceptual_hash: Option<String>,
    pub vendor_guess: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    pub currency: String,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub is_bill: bool,
    pub payment_terms: Option<String>,
    pub ocr_method: Option<String>,
    pub ocr_confidence: Option<f64>,
    pub page_count: i32,
    pub status: ReceiptStatus,
    pub validation_warnings: Vec<ValidationWarning>,
}

/// One line ready to persist.
#[derive(Debug, Clone)]
pub struct LineDraft {
    pub line_index: i32,
    pub line_type: LineType,
    pub vendor_sku: Option<String>,
    pub upc: Option<String>,
    pub raw_text: Option<String>,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub line_total: Decimal,
    pub tax_flag: Option<TaxFlag>,
    pub tax_amount: Option<Decimal>,
    pub normalized_description: Option<String>,
    pub product_category: Option<String>,
    pub account_code: Option<String>,
    pub brand: Option<String>,
    pub confidence: Option<f64>,
    pub categorization_source: Option<String>,
    pub requires_review: bool,
    pub ai_cost_usd: Option<Decimal>,
    pub bounding_box: Option<serde_json::Value>,
}

/// Inserts or updates the receipt row. Warnings are stored as an ordered
/// JSON array on the row.
///
/// # Errors
/// Database errors.
pub async fn save_receipt<C: ConnectionTrait>(
    db: &C,
    draft: &ReceiptDraft,
) -> Result<receipt::Model> {
    let now = now_utc();
    let warnings = serde_json::to_value(&draft.validation_warnings).unwrap_or_default();

    let existing = Receipt::find()
        .filter(receipt::Column::Id.eq(draft.id))
        .filter(receipt::Column::Entity.eq(draft.entity.as_str()))
        .one(db)
        .await?;

    let mut active = match existing {
        Some(model) => {
            let mut active: receipt::ActiveModel = model.into();
            active.updated_at = Set(now);
            active
        }
        None => receipt::ActiveModel {
            id: Set(draft.id),
            entity: Set(draft.entity.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        },
    };

    active.source = Set(draft.source.as_str().to_string());
    active.file_path = Set(draft.file_path.clone());
    active.content_hash = Set(draft.content_hash.clone());
    active.perceptual_hash = Set(draft.perceptual_hash.clone());
    active.vendor_guess = Set(draft.vendor_guess.clone());
    active.purchase_date = Set(draft.purchase_date);
    active.invoice_number = Set(draft.invoice_number.clone());
    active.currency = Set(draft.currency.clone());
    active.subtotal = Set(draft.subtotal);
    active.tax_total = Set(draft.tax_total);
    active.total = Set(draft.total);
    active.is_bill = Set(draft.is_bill);
    active.payment_terms = Set(draft.payment_terms.clone());
    active.ocr_method = Set(draft.ocr_method.clone());
    active.ocr_confidence = Set(draft.ocr_confidence);
    active.page_count = Set(draft.page_count);
    active.validation_warnings = Set(warnings);
    active.status = Set(draft.status.as_str().to_string());

    let model = active.save(db).await?;
    model.try_into_model().map_err(Into::into)
}

/// Replaces the receipt's lines atomically. Line ids are derived from the
/// receipt id and index, so re-running a receipt produces identical rows.
///
/// # Errors
/// Database errors; run inside a transaction so a failure leaves no
/// partial lines.
pub async fn save_lines<C: ConnectionTrait>(
    db: &C,
    entity: EntityKind,
    receipt_id: Uuid,
    lines: &[LineDraft],
) -> Result<usize> {
    ReceiptLine::delete_many()
        .filter(receipt_line::Column::ReceiptId.eq(receipt_id))
        .filter(receipt_line::Column::Entity.eq(entity.as_str()))
        .exec(db)
        .await?;

    if lines.is_empty() {
        return Ok(0);
    }

    let now = now_utc();
    let rows: Vec<receipt_line::ActiveModel> = lines
        .iter()
        .map(|line| receipt_line::ActiveModel {
            id: Set(Uuid::new_v5(
                &receipt_id,
                format!("line:{}", line.line_index).as_bytes(),
            )),
            receipt_id: Set(receipt_id),
            entity: Set(entity.as_str().to_string()),
            line_index: Set(line.line_index),
            line_type: Set(line.line_type.as_str().to_string()),
            vendor_sku: Set(line.vendor_sku.clone()),
            upc: Set(line.upc.clone()),
            raw_text: Set(line.raw_text.clone()),
            description: Set(line.description.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            line_total: Set(line.line_total),
            tax_flag: Set(line.tax_flag.map(|flag| flag.as_str().to_string())),
            tax_amount: Set(line.tax_amount),
            normalized_description: Set(line.normalized_description.clone()),
            product_category: Set(line.product_category.clone()),
            account_code: Set(line.account_code.clone()),
            brand: Set(line.brand.clone()),
            confidence: Set(line.confidence),
            categorization_source: Set(line.categorization_source.clone()),
            requires_review: Set(line.requires_review),
            review_status: Set("pending".to_string()),
            reviewed_by: Set(None),
            reviewed_at: Set(None),
            ai_cost_usd: Set(line.ai_cost_usd),
            bounding_box: Set(line.bounding_box.clone()),
            created_at: Set(now),
            updated_at: Set(now),
        })
        .collect();

    let count = rows.len();
    ReceiptLine::insert_many(rows).exec(db).await?;

    tracing::info!(
        receipt_id = %receipt_id,
        entity = entity.as_str(),
        lines = count,
        "receipt_lines_saved"
    );
    Ok(count)
}

/// Loads one receipt within its entity namespace.
///
/// # Errors
/// Database errors.
pub async fn get_receipt<C: ConnectionTrait>(
    db: &C,
    entity: EntityKind,
    id: Uuid,
) -> Result<Option<receipt::Model>> {
    Receipt::find()
        .filter(receipt::Column::Id.eq(id))
        .filter(receipt::Column::Entity.eq(entity.as_str()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Loads a receipt's lines in source order.
///
/// # Errors
/// Database errors.
pub async fn get_lines<C: ConnectionTrait>(
    db: &C,
    entity: EntityKind,
    receipt_id: Uuid,
) -> Result<Vec<receipt_line::Model>> {
    ReceiptLine::find()
        .filter(receipt_line::Column::ReceiptId.eq(receipt_id))
        .filter(receipt_line::Column::Entity.eq(entity.as_str()))
        .order_by_asc(receipt_line::Column::LineIndex)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Filters for the review queue.
#[derive(Debug, Clone, Default)]
pub struct ReviewFilters {
    pub vendor: Option<String>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub max_confidence: Option<f64>,
    pub limit: Option<u64>,
}

/// Lines flagged for review in one entity namespace, newest first, with
/// their parent receipts.
///
/// # Errors
/// Database errors.
pub async fn get_lines_for_review<C: ConnectionTrait>(
    db: &C,
    entity: EntityKind,
    filters: &ReviewFilters,
) -> Result<Vec<(receipt_line::Model, Option<receipt::Model>)>> {
    let mut query = ReceiptLine::find()
        .find_also_related(Receipt)
        .filter(receipt_line::Column::Entity.eq(entity.as_str()))
        .filter(receipt_line::Column::RequiresReview.eq(true));

    if let Some(vendor) = &filters.vendor {
        query = query.filter(receipt::Column::VendorGuess.eq(vendor.clone()));
    }
    if let Some(from) = filters.date_from {
        query = query.filter(receipt::Column::PurchaseDate.gte(from));
    }
    if let Some(to) = filters.date_to {
        query = query.filter(receipt::Column::PurchaseDate.lte(to));
    }
    if let Some(max_confidence) = filters.max_confidence {
        query = query.filter(receipt_line::Column::Confidence.lte(max_confidence));
    }
    if let Some(limit) = filters.limit {
        query = query.limit(limit);
    }

    query
        .order_by_desc(receipt_line::Column::CreatedAt)
        .order_by_asc(receipt_line::Column::LineIndex)
        .all(db)
        .await
        .map_err(Into::into)
}

/// A reviewer's corrected categorization for one line.
#[derive(Debug, Clone)]
pub struct CategorizationFix {
    pub normalized_description: String,
    pub product_category: ProductCategory,
    pub account_code: String,
    pub account_name: String,
    pub brand: Option<String>,
}

/// Applies a human correction to a stored line and writes it through to
/// the cache in the same transaction, so the next receipt from the vendor
/// benefits immediately.
///
/// # Errors
/// `NotFound` when the line does not exist in this entity namespace;
/// database errors otherwise.
pub async fn update_line_categorization(
    db: &DatabaseConnection,
    entity: EntityKind,
    line_id: Uuid,
    fix: &CategorizationFix,
    actor: &str,
) -> Result<()> {
    let txn = db.begin().await?;

    let line = ReceiptLine::find()
        .filter(receipt_line::Column::Id.eq(line_id))
        .filter(receipt_line::Column::Entity.eq(entity.as_str()))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::NotFound {
            what: format!("receipt line {line_id} in {}", entity.as_str()),
        })?;

    let receipt = get_receipt(&txn, entity, line.receipt_id).await?;
    let vendor = receipt
        .as_ref()
        .and_then(|r| r.vendor_guess.clone())
        .unwrap_or_else(|| "Unknown".to_string());
    let sku = line.vendor_sku.clone();
    let id_for_audit = reviewable_id(entity, line_id);

    let now = now_utc();
    let mut active: receipt_line::ActiveModel = line.into();
    active.normalized_description = Set(Some(fix.normalized_description.clone()));
    active.product_category = Set(Some(fix.product_category.as_str().to_string()));
    active.account_code = Set(Some(fix.account_code.clone()));
    active.brand = Set(fix.brand.clone());
    active.confidence = Set(Some(1.0));
    active.categorization_source = Set(Some("user".to_string()));
    active.requires_review = Set(false);
    active.review_status = Set("approved".to_string());
    active.reviewed_by = Set(Some(actor.to_string()));
    active.reviewed_at = Set(Some(now));
    active.updated_at = Set(now);
    active.update(&txn).await?;

    match sku {
        // The feedback edge: cache::correct also writes the audit record
        Some(sku) => {
            cache::correct(
                &txn,
                entity,
                &id_for_audit,
                &cache::NewMapping {
                    vendor_canonical: vendor,
                    sku,
                    normalized_description: fix.normalized_description.clone(),
                    product_category: fix.product_category.as_str().to_string(),
                    account_code: fix.account_code.clone(),
                    brand: fix.brand.clone(),
                    confidence: 1.0,
                },
                actor,
            )
            .await?;
        }
        // No SKU means nothing cacheable; still leave an audit trail
        None => {
            let activity = review_activity::ActiveModel {
                id: Set(Uuid::new_v4()),
                reviewable_id: Set(id_for_audit),
                reviewable_type: Set("receipt_line_item".to_string()),
                entity: Set(entity.as_str().to_string()),
                action: Set("correct".to_string()),
                performed_by: Set(Some(actor.to_string())),
                reason: Set(None),
                payload: Set(Some(serde_json::json!({
                    "product_category": fix.product_category.as_str(),
                    "account_code": fix.account_code,
                }))),
                created_at: Set(now),
            };
            ReviewActivity::insert(activity).exec(&txn).await?;
        }
    }

    txn.commit().await?;
    tracing::info!(line_id = %line_id, entity = entity.as_str(), actor, "line_categorization_corrected");
    Ok(())
}
