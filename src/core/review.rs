//! Review projection - one generic "reviewable" shape over domain rows.
//!
//! The UI only ever sees [`Reviewable`]; adding a future reviewable type
//! (reimbursements, bank matches) means adding another projection source
//! with this same output shape, never new columns on callers. The
//! projection is built at query time from the receipt tables, so a line
//! insert is visible on the next read - well inside the freshness bound.
//! All mutations go through [`apply`], which dispatches on the reviewable
//! type and writes an audit record.

use crate::core::repository::{self, CategorizationFix, ReviewFilters};
use crate::entities::{receipt, receipt_line, review_activity, ReceiptLine, ReviewActivity};
use crate::errors::{Error, Result};
use crate::models::{now_utc, EntityKind};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::Serialize;
use uuid::Uuid;

/// The only reviewable type this core currently projects.
pub const RECEIPT_LINE_ITEM: &str = "receipt_line_item";

/// Stable reviewable id: `<source_table>:<namespace>:<pk>`.
#[must_use]
pub fn reviewable_id(entity: EntityKind, pk: Uuid) -> String {
    format!("receipt_lines:{}:{}", entity.as_str(), pk)
}

/// Parses a reviewable id back into its namespace and primary key.
///
/// # Errors
/// `InvalidReviewAction` on malformed ids or unknown source tables.
pub fn parse_reviewable_id(id: &str) -> Result<(EntityKind, Uuid)> {
    let mut parts = id.splitn(3, ':');
    let (table, entity, pk) = (parts.next(), parts.next(), parts.next());
    match (table, entity, pk) {
        (Some("receipt_lines"), Some(entity), Some(pk)) => {
            let entity = EntityKind::parse(entity).ok_or_else(|| Error::InvalidReviewAction {
                message: format!("unknown entity in reviewable id {id:?}"),
            })?;
            let pk = Uuid::parse_str(pk).map_err(|_| Error::InvalidReviewAction {
                message: format!("bad primary key in reviewable id {id:?}"),
            })?;
            Ok((entity, pk))
        }
        _ => Err(Error::InvalidReviewAction {
            message: format!("unrecognized reviewable id {id:?}"),
        }),
    }
}

/// Back-pointer to the source row.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub table: String,
    pub schema: String,
    pub pk: String,
}

/// Generic reviewable contract consumed by the review UI.
#[derive(Debug, Clone, Serialize)]
pub struct Reviewable {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub entity: EntityKind,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
    pub source_ref: SourceRef,
    /// Short human string, e.g. `"CANADA DRY A" → beverage_soda`.
    pub summary: String,
    /// Domain payload, including the parent receipt's warnings.
    pub details: serde_json::Value,
    pub confidence: Option<f64>,
    pub requires_review: bool,
    pub status: String,
    pub assignee: Option<String>,
    pub vendor: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Decimal,
    pub age_hours: f64,
}

fn project(line: receipt_line::Model, parent: Option<receipt::Model>) -> Reviewable {
    let entity = EntityKind::parse(&line.entity).unwrap_or(EntityKind::Corp);
    let summary = format!(
        "\"{}\" → {}",
        line.description
            .as_deref()
            .or(line.raw_text.as_deref())
            .unwrap_or("No description"),
        line.product_category.as_deref().unwrap_or("?")
    );

    let validation_warnings = parent
        .as_ref()
        .map(|receipt| receipt.validation_warnings.clone())
        .unwrap_or(serde_json::Value::Array(Vec::new()));

    let details = serde_json::json!({
        "receipt_id": line.receipt_id,
        "line_index": line.line_index,
        "line_type": line.line_type,
        "sku": line.vendor_sku,
        "upc": line.upc,
        "description": line.description,
        "normalized_description": line.normalized_description,
        "quantity": line.quantity,
        "unit_price": line.unit_price,
        "line_total": line.line_total,
        "product_category": line.product_category,
        "account_code": line.account_code,
        "brand": line.brand,
        "categorization_source": line.categorization_source,
        "ai_cost_usd": line.ai_cost_usd,
        "bounding_box": line.bounding_box,
        "validation_warnings": validation_warnings,
    });

    let age_seconds = (now_utc() - line.created_at).num_seconds().max(0);

    Reviewable {
        id: reviewable_id(entity, line.id),
        kind: RECEIPT_LINE_ITEM.to_string(),
        entity,
        created_at: line.created_at,
        updated_at: line.updated_at,
        source_ref: SourceRef {
            table: "receipt_lines".to_string(),
            schema: line.entity.clone(),
            pk: line.id.to_string(),
        },
        summary,
        details,
        confidence: line.confidence,
        requires_review: line.requires_review,
        status: line.review_status,
        assignee: line.reviewed_by,
        vendor: parent.as_ref().and_then(|r| r.vendor_guess.clone()),
        date: parent.as_ref().and_then(|r| r.purchase_date),
        amount: line.line_total,
        age_hours: age_seconds as f64 / 3600.0,
    }
}

/// Materializes the review queue for one entity.
///
/// # Errors
/// Database errors.
pub async fn reviewables(
    db: &DatabaseConnection,
    entity: EntityKind,
    filters: &ReviewFilters,
) -> Result<Vec<Reviewable>> {
    let rows = repository::get_lines_for_review(db, entity, filters).await?;
    Ok(rows
        .into_iter()
        .map(|(line, parent)| project(line, parent))
        .collect())
}

/// Actions a reviewer can perform.
#[derive(Debug, Clone)]
pub enum ReviewAction {
    Approve,
    Reject,
    Snooze,
    NeedsInfo,
    Correct(CategorizationFix),
}

impl ReviewAction {
    const fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Snooze => "snooze",
            Self::NeedsInfo => "needs_info",
            Self::Correct(_) => "correct",
        }
    }

    const fn target_status(&self) -> &'static str {
        match self {
            Self::Approve | Self::Correct(_) => "approved",
            Self::Reject => "rejected",
            Self::Snooze => "snoozed",
            Self::NeedsInfo => "needs_info",
        }
    }
}

/// Applies a review action, dispatching on the reviewable type encoded in
/// the id. Corrections update the line, audit, and write through to the
/// cache in one transaction.
///
/// # Errors
/// `InvalidReviewAction` for malformed ids, `NotFound` for missing lines,
/// database errors otherwise.
pub async fn apply(
    db: &DatabaseConnection,
    id: &str,
    action: ReviewAction,
    actor: &str,
    reason: Option<&str>,
) -> Result<()> {
    let (entity, line_id) = parse_reviewable_id(id)?;

    if let ReviewAction::Correct(fix) = &action {
        // Correction path owns its own transaction (line + cache + audit)
        return repository::update_line_categorization(db, entity, line_id, fix, actor).await;
    }

    let txn = db.begin().await?;

    let line = ReceiptLine::find()
        .filter(receipt_line::Column::Id.eq(line_id))
        .filter(receipt_line::Column::Entity.eq(entity.as_str()))
        .one(&txn)
        .await?
        .ok_or_else(|| Error::NotFound {
            what: format!("receipt line {line_id} in {}", entity.as_str()),
        })?;

    let now = now_utc();
    let mut active: receipt_line::ActiveModel = line.into();
    active.review_status = Set(action.target_status().to_string());
    if matches!(action, ReviewAction::Approve | ReviewAction::Reject) {
        active.requires_review = Set(false);
        active.reviewed_by = Set(Some(actor.to_string()));
        active.reviewed_at = Set(Some(now));
    }
    active.updated_at = Set(now);
    active.update(&txn).await?;

    let activity = review_activity::ActiveModel {
        id: Set(Uuid::new_v4()),
        reviewable_id: Set(id.to_string()),
        reviewable_type: Set(RECEIPT_LINE_ITEM.to_string()),
        entity: Set(entity.as_str().to_string()),
        action: Set(action.as_str().to_string()),
        performed_by: Set(Some(actor.to_string())),
        reason: Set(reason.map(str::to_string)),
        payload: Set(None),
        created_at: Set(now),
    };
    ReviewActivity::insert(activity).exec(&txn).await?;

    txn.commit().await?;
    tracing::info!(id, action = action.as_str(), actor, "review_action_applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_line_draft, sample_receipt_draft, setup_test_db};
    use rust_decimal_macros::dec;

    #[test]
    fn reviewable_ids_round_trip() {
        let pk = Uuid::new_v4();
        let id = reviewable_id(EntityKind::Soleprop, pk);
        assert_eq!(id, format!("receipt_lines:soleprop:{pk}"));
        assert_eq!(parse_reviewable_id(&id).unwrap(), (EntityKind::Soleprop, pk));

        assert!(parse_reviewable_id("bank_matches:corp:nope").is_err());
        assert!(parse_reviewable_id("receipt_lines:partnership:nope").is_err());
    }

    #[tokio::test]
    async fn flagged_line_is_projected_immediately() -> Result<()> {
        let db = setup_test_db().await?;
        let draft = sample_receipt_draft(EntityKind::Corp);
        repository::save_receipt(&db, &draft).await?;

        let mut line = sample_line_draft(0);
        line.requires_review = true;
        line.confidence = Some(0.74);
        line.description = Some("CANADA DRY A".to_string());
        line.product_category = Some("beverage_soda".to_string());
        repository::save_lines(&db, EntityKind::Corp, draft.id, &[line]).await?;

        let queue = reviewables(&db, EntityKind::Corp, &ReviewFilters::default()).await?;
        assert_eq!(queue.len(), 1);

        let item = &queue[0];
        assert!(item.id.starts_with("receipt_lines:corp:"));
        assert_eq!(item.kind, RECEIPT_LINE_ITEM);
        assert_eq!(item.confidence, Some(0.74));
        assert_eq!(item.summary, "\"CANADA DRY A\" → beverage_soda");
        assert_eq!(item.status, "pending");
        assert_eq!(item.vendor.as_deref(), Some("Walmart Supercentre"));
        assert_eq!(item.amount, dec!(6.98));
        // The parent receipt's warnings ride along in the details payload
        assert!(item.details["validation_warnings"].is_array());
        assert_eq!(
            item.details["validation_warnings"][0]["type"],
            "subtotal_mismatch"
        );
        Ok(())
    }

    #[tokio::test]
    async fn approve_clears_the_flag_and_audits() -> Result<()> {
        let db = setup_test_db().await?;
        let draft = sample_receipt_draft(EntityKind::Corp);
        repository::save_receipt(&db, &draft).await?;
        let mut line = sample_line_draft(0);
        line.requires_review = true;
        repository::save_lines(&db, EntityKind::Corp, draft.id, &[line]).await?;

        let queue = reviewables(&db, EntityKind::Corp, &ReviewFilters::default()).await?;
        apply(&db, &queue[0].id, ReviewAction::Approve, "tom@example.test", None).await?;

        let queue = reviewables(&db, EntityKind::Corp, &ReviewFilters::default()).await?;
        assert!(queue.is_empty());

        let stored = repository::get_lines(&db, EntityKind::Corp, draft.id).await?;
        assert_eq!(stored[0].review_status, "approved");
        assert_eq!(stored[0].reviewed_by.as_deref(), Some("tom@example.test"));

        let audit = ReviewActivity::find().all(&db).await?;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, "approve");
        Ok(())
    }

    #[tokio::test]
    async fn snooze_keeps_the_line_in_queue_with_new_status() -> Result<()> {
        let db = setup_test_db().await?;
        let draft = sample_receipt_draft(EntityKind::Corp);
        repository::save_receipt(&db, &draft).await?;
        let mut line = sample_line_draft(0);
        line.requires_review = true;
        repository::save_lines(&db, EntityKind::Corp, draft.id, &[line]).await?;

        let queue = reviewables(&db, EntityKind::Corp, &ReviewFilters::default()).await?;
        apply(
            &db,
            &queue[0].id,
            ReviewAction::Snooze,
            "tom@example.test",
            Some("waiting for vendor"),
        )
        .await?;

        let queue = reviewables(&db, EntityKind::Corp, &ReviewFilters::default()).await?;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].status, "snoozed");
        Ok(())
    }
}
