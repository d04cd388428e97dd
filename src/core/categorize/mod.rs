//! Two-stage categorization: model-backed recognition plus deterministic
//! account mapping.
//!
//! Stage 1 ([`recognizer`]) expands the raw description and picks a
//! product category, cache-first. Stage 2 ([`accounts`]) maps the category
//! to a GL account with pure rules. The combined confidence is the minimum
//! of the stages; low confidence, an `unknown` category, or a forced
//! Stage-2 review gates the line for a human.

pub mod accounts;
pub mod llm;
pub mod recognizer;

use crate::core::cache;
use crate::errors::Result;
use crate::models::ValidationWarning;
use self::accounts::{AccountMapper, ProductCategory};
use self::recognizer::{CategorizationSource, ItemRecognizer};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;

/// Complete categorization for one line, ready to persist.
#[derive(Debug, Clone)]
pub struct CategorizedLine {
    pub vendor: String,
    pub sku: Option<String>,
    pub raw_description: String,
    pub normalized_description: String,
    pub product_category: ProductCategory,
    pub brand: Option<String>,
    pub account_code: String,
    pub account_name: String,
    pub source: CategorizationSource,
    pub confidence: f64,
    pub requires_review: bool,
    pub ai_cost_usd: Option<Decimal>,
    /// Degraded-path warnings to attach to the parent receipt.
    pub warnings: Vec<ValidationWarning>,
}

/// Orchestrates the two stages and the cache write-through.
pub struct CategorizationService {
    recognizer: ItemRecognizer,
    mapper: AccountMapper,
    review_threshold: f64,
    cache_write_threshold: f64,
}

impl CategorizationService {
    #[must_use]
    pub fn new(
        recognizer: ItemRecognizer,
        mapper: AccountMapper,
        review_threshold: f64,
        cache_write_threshold: f64,
    ) -> Self {
        Self {
            recognizer,
            mapper,
            review_threshold,
            cache_write_threshold,
        }
    }

    /// Categorizes one line item.
    ///
    /// # Errors
    /// Database errors only; model failures surface as degraded results.
    pub async fn categorize_line<C: ConnectionTrait>(
        &self,
        db: &C,
        vendor: &str,
        sku: Option<&str>,
        raw_description: &str,
        line_total: Decimal,
    ) -> Result<CategorizedLine> {
        let recognized = self
            .recognizer
            .recognize(db, vendor, sku, raw_description)
            .await?;

        let mapping = self.mapper.map(recognized.product_category, line_total);

        let confidence = recognized.confidence.min(mapping.confidence);
        let requires_review = mapping.requires_review
            || recognized.confidence < self.review_threshold
            || recognized.product_category == ProductCategory::Unknown;

        // Write-through: confident, non-unknown model results with a SKU
        // seed the cache so the next receipt is free.
        if let Some(sku) = sku {
            if recognized.source == CategorizationSource::Ai
                && recognized.product_category != ProductCategory::Unknown
                && recognized.confidence >= self.cache_write_threshold
            {
                cache::put(
                    db,
                    &cache::NewMapping {
                        vendor_canonical: vendor.to_string(),
                        sku: sku.to_string(),
                        normalized_description: recognized.normalized_description.clone(),
                        product_category: recognized.product_category.as_str().to_string(),
                        account_code: mapping.account_code.to_string(),
                        brand: recognized.brand.clone(),
                        confidence: recognized.confidence,
                    },
                )
                .await?;
            }
        }

        tracing::info!(
            vendor,
            sku = sku.unwrap_or("-"),
            category = recognized.product_category.as_str(),
            account = mapping.account_code,
            source = recognized.source.as_str(),
            confidence,
            requires_review,
            "line_categorized"
        );

        Ok(CategorizedLine {
            vendor: vendor.to_string(),
            sku: sku.map(str::to_string),
            raw_description: raw_description.to_string(),
            normalized_description: recognized.normalized_description,
            product_category: recognized.product_category,
            brand: recognized.brand,
            account_code: mapping.account_code.to_string(),
            account_name: mapping.account_name.to_string(),
            source: recognized.source,
            confidence,
            requires_review,
            ai_cost_usd: recognized.ai_cost_usd,
            warnings: recognized.warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{setup_test_db, ScriptedModel};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn service(model: Arc<ScriptedModel>) -> CategorizationService {
        CategorizationService::new(
            ItemRecognizer::new(
                Some(model),
                Duration::from_millis(250),
                dec!(0.003),
                dec!(0.015),
            ),
            AccountMapper::new(dec!(2500.00)),
            0.80,
            0.80,
        )
    }

    #[tokio::test]
    async fn cold_cache_then_warm_cache() -> Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(ScriptedModel::replying(
            r#"{"normalized_description": "Hot Rod Pepperoni Sticks 40 Count", "brand": "Hot Rod", "category": "retail_snack", "confidence": 0.92}"#,
            1200,
            80,
        ));
        let service = service(model);

        // First call: miss, model call, mapped to 5031, cached
        let first = service
            .categorize_line(&db, "Costco", Some("54491"), "HOT ROD 40CT", dec!(14.99))
            .await?;
        assert_eq!(first.source, CategorizationSource::Ai);
        assert_eq!(first.account_code, "5031");
        assert!(!first.requires_review);
        assert!(first.ai_cost_usd.is_some());

        let entry = cache::get(&db, "Costco", "54491").await?.unwrap();
        assert_eq!(entry.times_seen, 1);
        assert_eq!(entry.account_code, "5031");

        // Second call with identical input: pure cache, zero cost
        let second = service
            .categorize_line(&db, "Costco", Some("54491"), "HOT ROD 40CT", dec!(14.99))
            .await?;
        assert_eq!(second.source, CategorizationSource::Cache);
        assert_eq!(second.ai_cost_usd, None);
        assert_eq!(second.account_code, "5031");

        let entry = cache::get(&db, "Costco", "54491").await?.unwrap();
        assert_eq!(entry.times_seen, 2);
        Ok(())
    }

    #[tokio::test]
    async fn low_confidence_flags_review_and_skips_cache() -> Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(ScriptedModel::replying(
            r#"{"normalized_description": "Alani Nu Energy Drink", "brand": "Alani Nu", "category": "beverage_energy", "confidence": 0.74}"#,
            500,
            60,
        ));
        let line = service(model)
            .categorize_line(&db, "Costco", Some("1868765"), "ALANI C&C", dec!(142.84))
            .await?;

        assert!(line.requires_review);
        assert_eq!(line.account_code, "5013");
        // Below the write threshold: nothing cached
        assert!(cache::get(&db, "Costco", "1868765").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn equipment_above_threshold_is_capitalized() -> Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(ScriptedModel::replying(
            r#"{"normalized_description": "Commercial Chest Freezer", "brand": null, "category": "equipment", "confidence": 0.97}"#,
            500,
            60,
        ));
        let line = service(model)
            .categorize_line(&db, "Costco", Some("777001"), "CHEST FREEZER", dec!(3499.99))
            .await?;

        assert_eq!(line.account_code, "1500");
        assert!(line.requires_review);
        assert_eq!(line.confidence, 0.97);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_category_routes_to_pending_account() -> Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(ScriptedModel::replying("not even json", 10, 10));
        let line = service(model)
            .categorize_line(&db, "GFS Canada", Some("1229832"), "EAST COAST", dec!(55.00))
            .await?;

        assert_eq!(line.account_code, "9100");
        assert!(line.requires_review);
        assert_eq!(line.confidence, 0.0);
        assert_eq!(line.warnings.len(), 1);
        // Unknown results are never cached
        assert!(cache::get(&db, "GFS Canada", "1229832").await?.is_none());
        Ok(())
    }
}
