//! Categorization cache - durable `(vendor, sku) -> categorization` store.
//!
//! Shared across both business entities: the same vendor SKU is the same
//! product no matter who bought it, and sharing the learnings is the
//! system's dominant cost lever. Writers race safely through the unique
//! `(vendor_canonical, sku)` index plus upsert; entries are never deleted
//! here.
//!
//! All functions are generic over the connection so callers can compose
//! them into a larger transaction (human corrections update the line and
//! the cache atomically).

use crate::entities::{product_mapping, review_activity, ProductMapping, ReviewActivity};
use crate::errors::Result;
use crate::models::{now_utc, EntityKind};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

/// A categorization to remember for a vendor SKU.
#[derive(Debug, Clone)]
pub struct NewMapping {
    pub vendor_canonical: String,
    pub sku: String,
    pub normalized_description: String,
    pub product_category: String,
    pub account_code: String,
    pub brand: Option<String>,
    pub confidence: f64,
}

/// Looks up the cached categorization for a vendor SKU.
///
/// # Errors
/// Database errors only; a miss is `Ok(None)`.
pub async fn get<C: ConnectionTrait>(
    db: &C,
    vendor_canonical: &str,
    sku: &str,
) -> Result<Option<product_mapping::Model>> {
    ProductMapping::find()
        .filter(product_mapping::Column::VendorCanonical.eq(vendor_canonical))
        .filter(product_mapping::Column::Sku.eq(sku))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Records a cache hit: bumps `times_seen` and `last_seen`.
///
/// # Errors
/// Database errors.
pub async fn record_hit<C: ConnectionTrait>(
    db: &C,
    entry: product_mapping::Model,
) -> Result<product_mapping::Model> {
    let times_seen = entry.times_seen;
    let mut active: product_mapping::ActiveModel = entry.into();
    let now = now_utc();
    active.times_seen = Set(times_seen + 1);
    active.last_seen = Set(now);
    active.updated_at = Set(now);
    active.update(db).await.map_err(Into::into)
}

/// Upserts a model-produced categorization. On conflict the existing entry
/// wins: only `times_seen` and `last_seen` move, so a concurrent writer
/// never clobbers a human correction.
///
/// # Errors
/// Database errors.
pub async fn put<C: ConnectionTrait>(db: &C, entry: &NewMapping) -> Result<()> {
    let now = now_utc();
    let active = product_mapping::ActiveModel {
        id: Set(Uuid::new_v4()),
        vendor_canonical: Set(entry.vendor_canonical.clone()),
        sku: Set(entry.sku.clone()),
        normalized_description: Set(entry.normalized_description.clone()),
        product_category: Set(entry.product_category.clone()),
        account_code: Set(entry.account_code.clone()),
        brand: Set(entry.brand.clone()),
        user_confidence: Set(entry.confidence),
        times_seen: Set(1),
        first_seen: Set(now),
        last_seen: Set(now),
        created_at: Set(now),
        updated_at: Set(now),
    };

    ProductMapping::insert(active)
        .on_conflict(
            OnConflict::columns([
                product_mapping::Column::VendorCanonical,
                product_mapping::Column::Sku,
            ])
            .values([
                (
                    product_mapping::Column::TimesSeen,
                    Expr::cust("times_seen + 1"),
                ),
                (product_mapping::Column::LastSeen, Expr::value(now)),
                (product_mapping::Column::UpdatedAt, Expr::value(now)),
            ])
            .to_owned(),
        )
        .exec(db)
        .await?;

    tracing::info!(
        vendor = %entry.vendor_canonical,
        sku = %entry.sku,
        category = %entry.product_category,
        "cache_put"
    );
    Ok(())
}

/// Human correction: unconditional overwrite with `user_confidence = 1.0`
/// plus an audit record. This is the feedback edge - the next receipt from
/// the same vendor benefits immediately.
///
/// # Errors
/// Database errors.
pub async fn correct<C: ConnectionTrait>(
    db: &C,
    entity: EntityKind,
    reviewable_id: &str,
    entry: &NewMapping,
    actor: &str,
) -> Result<()> {
    let now = now_utc();

    let existing = get(db, &entry.vendor_canonical, &entry.sku).await?;
    match existing {
        Some(model) => {
            let times_seen = model.times_seen;
            let mut active: product_mapping::ActiveModel = model.into();
            active.normalized_description = Set(entry.normalized_description.clone());
            active.product_category = Set(entry.product_category.clone());
            active.account_code = Set(entry.account_code.clone());
            active.brand = Set(entry.brand.clone());
            active.user_confidence = Set(1.0);
            active.times_seen = Set(times_seen + 1);
            active.last_seen = Set(now);
            active.updated_at = Set(now);
            active.update(db).await?;
        }
        None => {
            let active = product_mapping::ActiveModel {
                id: Set(Uuid::new_v4()),
                vendor_canonical: Set(entry.vendor_canonical.clone()),
                sku: Set(entry.sku.clone()),
                normalized_description: Set(entry.normalized_description.clone()),
                product_category: Set(entry.product_category.clone()),
                account_code: Set(entry.account_code.clone()),
                brand: Set(entry.brand.clone()),
                user_confidence: Set(1.0),
                times_seen: Set(1),
                first_seen: Set(now),
                last_seen: Set(now),
                created_at: Set(now),
                updated_at: Set(now),
            };
            active.insert(db).await?;
        }
    }

    let activity = review_activity::ActiveModel {
        id: Set(Uuid::new_v4()),
        reviewable_id: Set(reviewable_id.to_string()),
        reviewable_type: Set("receipt_line_item".to_string()),
        entity: Set(entity.as_str().to_string()),
        action: Set("correct".to_string()),
        performed_by: Set(Some(actor.to_string())),
        reason: Set(None),
        payload: Set(Some(serde_json::json!({
            "vendor": entry.vendor_canonical,
            "sku": entry.sku,
            "product_category": entry.product_category,
            "account_code": entry.account_code,
        }))),
        created_at: Set(now),
    };
    ReviewActivity::insert(activity).exec(db).await?;

    tracing::info!(
        vendor = %entry.vendor_canonical,
        sku = %entry.sku,
        actor,
        "cache_corrected"
    );
    Ok(())
}

/// Cache usage metrics for monitoring.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub total_skus: u64,
    pub total_lookups: u64,
    pub single_use_skus: u64,
    pub frequent_skus: u64,
    /// Rough estimate: first lookup per SKU was a miss, the rest were hits.
    pub estimated_hit_rate_pct: f64,
}

/// Computes cache statistics.
///
/// # Errors
/// Database errors.
pub async fn stats<C: ConnectionTrait>(db: &C) -> Result<CacheStats> {
    let entries = ProductMapping::find().all(db).await?;

    let total_skus = entries.len() as u64;
    let total_lookups: u64 = entries.iter().map(|e| e.times_seen.max(0) as u64).sum();
    let single_use_skus = entries.iter().filter(|e| e.times_seen == 1).count() as u64;
    let frequent_skus = entries.iter().filter(|e| e.times_seen > 10).count() as u64;

    let estimated_hit_rate_pct = if total_lookups > 0 {
        let hits = total_lookups.saturating_sub(total_skus);
        (hits as f64 / total_lookups as f64) * 100.0
    } else {
        0.0
    };

    Ok(CacheStats {
        total_skus,
        total_lookups,
        single_use_skus,
        frequent_skus,
        estimated_hit_rate_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_test_db;

    fn sample() -> NewMapping {
        NewMapping {
            vendor_canonical: "Costco Wholesale".to_string(),
            sku: "54491".to_string(),
            normalized_description: "Hot Rod Pepperoni Sticks 40 Count".to_string(),
            product_category: "retail_snack".to_string(),
            account_code: "5031".to_string(),
            brand: Some("Hot Rod".to_string()),
            confidence: 0.92,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() -> Result<()> {
        let db = setup_test_db().await?;
        put(&db, &sample()).await?;

        let entry = get(&db, "Costco Wholesale", "54491").await?.unwrap();
        assert_eq!(entry.product_category, "retail_snack");
        assert_eq!(entry.times_seen, 1);
        assert_eq!(entry.user_confidence, 0.92);

        assert!(get(&db, "Costco Wholesale", "99999").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn conflicting_put_only_touches_counters() -> Result<()> {
        let db = setup_test_db().await?;
        put(&db, &sample()).await?;

        let mut second = sample();
        second.product_category = "food_meat".to_string();
        second.confidence = 0.50;
        put(&db, &second).await?;

        let entry = get(&db, "Costco Wholesale", "54491").await?.unwrap();
        assert_eq!(entry.times_seen, 2);
        // The original categorization survives a concurrent re-write
        assert_eq!(entry.product_category, "retail_snack");
        assert_eq!(entry.user_confidence, 0.92);
        Ok(())
    }

    #[tokio::test]
    async fn record_hit_bumps_counters() -> Result<()> {
        let db = setup_test_db().await?;
        put(&db, &sample()).await?;

        let entry = get(&db, "Costco Wholesale", "54491").await?.unwrap();
        let updated = record_hit(&db, entry).await?;
        assert_eq!(updated.times_seen, 2);
        Ok(())
    }

    #[tokio::test]
    async fn correct_overwrites_and_sets_full_confidence() -> Result<()> {
        let db = setup_test_db().await?;
        put(&db, &sample()).await?;

        let mut fix = sample();
        fix.product_category = "food_meat".to_string();
        fix.account_code = "5007".to_string();
        correct(
            &db,
            EntityKind::Corp,
            "receipt_line:corp:some-line",
            &fix,
            "tom@example.test",
        )
        .await?;

        let entry = get(&db, "Costco Wholesale", "54491").await?.unwrap();
        assert_eq!(entry.product_category, "food_meat");
        assert_eq!(entry.account_code, "5007");
        assert_eq!(entry.user_confidence, 1.0);

        let activity = ReviewActivity::find().all(&db).await?;
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].action, "correct");
        Ok(())
    }

    #[tokio::test]
    async fn stats_estimates_hit_rate() -> Result<()> {
        let db = setup_test_db().await?;
        put(&db, &sample()).await?;
        put(&db, &sample()).await?;
        put(&db, &sample()).await?;

        let stats = stats(&db).await?;
        assert_eq!(stats.total_skus, 1);
        assert_eq!(stats.total_lookups, 3);
        assert!((stats.estimated_hit_rate_pct - 66.66).abs() < 1.0);
        Ok(())
    }
}
