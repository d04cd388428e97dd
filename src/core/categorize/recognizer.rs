//! Stage 1: item recognition with caching.
//!
//! Expands cryptic vendor abbreviations ("MTN DEW 591ML") into normalized
//! product names and assigns a product category. Cache-first: a known
//! `(vendor, sku)` pair never costs a model call. Misses go to the
//! recognition model with a structured prompt; malformed output or a
//! timeout degrades to `unknown` with a warning, never an error.

use super::accounts::ProductCategory;
use super::llm::RecognitionModel;
use crate::errors::Result;
use crate::models::{ValidationWarning, WarningType};
use crate::core::cache;
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Where a categorization decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategorizationSource {
    Cache,
    Ai,
    User,
    Rule,
}

impl CategorizationSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Ai => "ai",
            Self::User => "user",
            Self::Rule => "rule",
        }
    }
}

/// Result of Stage 1 recognition.
#[derive(Debug, Clone)]
pub struct RecognizedItem {
    pub normalized_description: String,
    pub product_category: ProductCategory,
    pub brand: Option<String>,
    pub source: CategorizationSource,
    pub confidence: f64,
    pub ai_cost_usd: Option<Decimal>,
    /// Degraded-path warnings (timeout, malformed output) for the receipt.
    pub warnings: Vec<ValidationWarning>,
}

impl RecognizedItem {
    fn unknown(raw_description: &str) -> Self {
        Self {
            normalized_description: raw_description.to_string(),
            product_category: ProductCategory::Unknown,
            brand: None,
            source: CategorizationSource::Ai,
            confidence: 0.0,
            ai_cost_usd: None,
            warnings: Vec::new(),
        }
    }
}

/// The model's required reply shape.
#[derive(Deserialize)]
struct ModelJson {
    normalized_description: Option<String>,
    brand: Option<String>,
    category: Option<String>,
    confidence: Option<f64>,
}

/// Cache-first item recognition.
pub struct ItemRecognizer {
    model: Option<Arc<dyn RecognitionModel>>,
    call_timeout: Duration,
    input_cost_per_1k: Decimal,
    output_cost_per_1k: Decimal,
}

impl ItemRecognizer {
    #[must_use]
    pub fn new(
        model: Option<Arc<dyn RecognitionModel>>,
        call_timeout: Duration,
        input_cost_per_1k: Decimal,
        output_cost_per_1k: Decimal,
    ) -> Self {
        Self {
            model,
            call_timeout,
            input_cost_per_1k,
            output_cost_per_1k,
        }
    }

    /// Recognizes one line item, consulting the cache first.
    ///
    /// # Errors
    /// Database errors only; model failures degrade to `unknown`.
    pub async fn recognize<C: ConnectionTrait>(
        &self,
        db: &C,
        vendor: &str,
        sku: Option<&str>,
        raw_description: &str,
    ) -> Result<RecognizedItem> {
        if let Some(sku) = sku {
            if let Some(entry) = cache::get(db, vendor, sku).await? {
                let entry = cache::record_hit(db, entry).await?;
                tracing::info!(
                    vendor,
                    sku,
                    category = %entry.product_category,
                    times_seen = entry.times_seen,
                    "recognizer_cache_hit"
                );
                return Ok(RecognizedItem {
                    normalized_description: entry.normalized_description,
                    product_category: ProductCategory::parse(&entry.product_category)
                        .unwrap_or(ProductCategory::Unknown),
                    brand: entry.brand,
                    source: CategorizationSource::Cache,
                    confidence: entry.user_confidence,
                    ai_cost_usd: None,
                    warnings: Vec::new(),
                });
            }
        }

        tracing::info!(vendor, sku = sku.unwrap_or("-"), raw_description, "recognizer_cache_miss");

        let Some(model) = &self.model else {
            tracing::error!("recognition model not configured; degrading to unknown");
            return Ok(RecognizedItem::unknown(raw_description));
        };

        let prompt = build_prompt(vendor, raw_description);
        let reply =
            match tokio::time::timeout(self.call_timeout, model.complete(&prompt)).await {
                Ok(Ok(reply)) => reply,
                Ok(Err(error)) => {
                    tracing::error!(%error, "recognition model call failed");
                    let mut item = RecognizedItem::unknown(raw_description);
                    item.warnings.push(
                        ValidationWarning::new(
                            WarningType::RecognizerOutputInvalid,
                            format!("Recognition model call failed: {error}"),
                        )
                        .with_data(serde_json::json!({ "description": raw_description })),
                    );
                    return Ok(item);
                }
                Err(_) => {
                    tracing::warn!(
                        timeout_s = self.call_timeout.as_secs_f64(),
                        "recognition model call timed out"
                    );
                    let mut item = RecognizedItem::unknown(raw_description);
                    item.warnings.push(
                        ValidationWarning::new(
                            WarningType::RecognizerTimeout,
                            format!(
                                "Recognition timed out after {:.0}s",
                                self.call_timeout.as_secs_f64()
                            ),
                        )
                        .with_data(serde_json::json!({ "description": raw_description })),
                    );
                    return Ok(item);
                }
            };

        let cost = self.call_cost(reply.input_tokens, reply.output_tokens);
        let mut item = parse_reply(&reply.text, raw_description);
        item.ai_cost_usd = Some(cost);

        tracing::info!(
            vendor,
            category = item.product_category.as_str(),
            confidence = item.confidence,
            cost_usd = %cost,
            "recognizer_model_complete"
        );
        Ok(item)
    }

    fn call_cost(&self, input_tokens: u32, output_tokens: u32) -> Decimal {
        let per_k = Decimal::new(1000, 0);
        (Decimal::from(input_tokens) / per_k) * self.input_cost_per_1k
            + (Decimal::from(output_tokens) / per_k) * self.output_cost_per_1k
    }
}

/// Extracts the JSON object from the model reply, tolerating markdown
/// fences, and maps it into a [`RecognizedItem`]. Anything malformed
/// degrades to `unknown` with a `recognizer_output_invalid` warning.
fn parse_reply(text: &str, raw_description: &str) -> RecognizedItem {
    let body = strip_fences(text);

    let parsed: std::result::Result<ModelJson, _> = serde_json::from_str(body);
    match parsed {
        Ok(json) => {
            let category = json
                .category
                .as_deref()
                .and_then(ProductCategory::parse)
                .unwrap_or(ProductCategory::Unknown);
            RecognizedItem {
                normalized_description: json
                    .normalized_description
                    .unwrap_or_else(|| raw_description.to_string()),
                product_category: category,
                brand: json.brand,
                source: CategorizationSource::Ai,
                confidence: json.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
                ai_cost_usd: None,
                warnings: Vec::new(),
            }
        }
        Err(error) => {
            tracing::error!(%error, reply = text, "recognizer output did not parse");
            let mut item = RecognizedItem::unknown(raw_description);
            item.warnings.push(
                ValidationWarning::new(
                    WarningType::RecognizerOutputInvalid,
                    "Recognition model returned malformed output",
                )
                .with_data(serde_json::json!({ "description": raw_description })),
            );
            item
        }
    }
}

fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.split_once("```json").map(|(_, rest)| rest) {
        rest.split("```").next().unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.split_once("```").map(|(_, rest)| rest) {
        rest.split("```").next().unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

fn build_prompt(vendor: &str, raw_description: &str) -> String {
    use std::fmt::Write as _;

    let mut prompt = format!(
        "You are a product recognition expert for a Canadian food service \
         and retail business.\n\n\
         Expand the abbreviated product description and categorize it.\n\n\
         VENDOR: {vendor}\n\
         RAW DESCRIPTION: {raw_description}\n\n\
         Your categorization is a first pass; a human reviews ambiguous \
         items and corrections improve the cache over time. When a \
         description is vague, guess reasonably and lower your confidence \
         instead of refusing.\n\n\
         Confidence calibration:\n\
         - 0.95-0.99: clear brand and product\n\
         - 0.80-0.94: clear product type, ambiguous brand\n\
         - 0.60-0.79: vague, multiple interpretations (always flagged)\n\
         - below 0.60: use the category \"unknown\"\n\n\
         Categories (choose exactly one identifier):\n"
    );
    for category in ProductCategory::ALL {
        let _ = writeln!(prompt, "- {}: {}", category.as_str(), category.gloss());
    }
    prompt.push_str(
        "\nReturn ONLY this JSON, no other text:\n\
         {\"normalized_description\": \"Full product name\", \
         \"brand\": \"Brand or null\", \
         \"category\": \"identifier_from_list\", \
         \"confidence\": 0.95}\n\n\
         Examples:\n\
         \"MTN DEW 591ML\" -> {\"normalized_description\": \"Mountain Dew \
         Citrus Soda 591mL\", \"brand\": \"Mountain Dew\", \"category\": \
         \"beverage_soda\", \"confidence\": 0.98}\n\
         \"HOT ROD 40CT\" -> {\"normalized_description\": \"Hot Rod \
         Pepperoni Sticks 40 Count\", \"brand\": \"Hot Rod\", \"category\": \
         \"retail_snack\", \"confidence\": 0.92}\n\
         \"EAST COAST\" -> {\"normalized_description\": \"East Coast Brand \
         Product\", \"brand\": \"East Coast\", \"category\": \"unknown\", \
         \"confidence\": 0.55}\n",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{setup_test_db, ScriptedModel, SlowModel};
    use rust_decimal_macros::dec;

    fn recognizer(model: Arc<dyn RecognitionModel>) -> ItemRecognizer {
        ItemRecognizer::new(
            Some(model),
            Duration::from_millis(250),
            dec!(0.003),
            dec!(0.015),
        )
    }

    #[tokio::test]
    async fn model_reply_is_parsed_and_costed() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(ScriptedModel::replying(
            r#"{"normalized_description": "Hot Rod Pepperoni Sticks 40 Count", "brand": "Hot Rod", "category": "retail_snack", "confidence": 0.92}"#,
            1000,
            100,
        ));
        let item = recognizer(model)
            .recognize(&db, "Costco Wholesale", Some("54491"), "HOT ROD 40CT")
            .await?;

        assert_eq!(item.product_category, ProductCategory::RetailSnack);
        assert_eq!(item.source, CategorizationSource::Ai);
        assert_eq!(item.confidence, 0.92);
        // 1000 in @ $0.003/1k + 100 out @ $0.015/1k
        assert_eq!(item.ai_cost_usd, Some(dec!(0.0045)));
        assert!(item.warnings.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn cache_hit_skips_the_model() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        cache::put(
            &db,
            &cache::NewMapping {
                vendor_canonical: "Costco Wholesale".to_string(),
                sku: "54491".to_string(),
                normalized_description: "Hot Rod Pepperoni Sticks 40 Count".to_string(),
                product_category: "retail_snack".to_string(),
                account_code: "5031".to_string(),
                brand: Some("Hot Rod".to_string()),
                confidence: 0.92,
            },
        )
        .await?;

        // A model that would blow up if called
        let model = Arc::new(ScriptedModel::failing("must not be called"));
        let item = recognizer(model)
            .recognize(&db, "Costco Wholesale", Some("54491"), "HOT ROD 40CT")
            .await?;

        assert_eq!(item.source, CategorizationSource::Cache);
        assert_eq!(item.ai_cost_usd, None);
        assert_eq!(item.confidence, 0.92);

        let entry = cache::get(&db, "Costco Wholesale", "54491").await?.unwrap();
        assert_eq!(entry.times_seen, 2);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_output_degrades_to_unknown() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(ScriptedModel::replying("certainly! here you go: soda", 10, 10));
        let item = recognizer(model)
            .recognize(&db, "GFS Canada", Some("1334455"), "MTN DEW 591ML")
            .await?;

        assert_eq!(item.product_category, ProductCategory::Unknown);
        assert_eq!(item.confidence, 0.0);
        assert_eq!(item.warnings.len(), 1);
        assert_eq!(
            item.warnings[0].warning_type,
            WarningType::RecognizerOutputInvalid
        );
        Ok(())
    }

    #[tokio::test]
    async fn timeout_degrades_with_warning() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(SlowModel::new(Duration::from_secs(5)));
        let recognizer = ItemRecognizer::new(
            Some(model),
            Duration::from_millis(20),
            dec!(0.003),
            dec!(0.015),
        );
        let item = recognizer
            .recognize(&db, "GFS Canada", None, "EAST COAST")
            .await?;

        assert_eq!(item.product_category, ProductCategory::Unknown);
        assert_eq!(item.warnings[0].warning_type, WarningType::RecognizerTimeout);
        Ok(())
    }

    #[tokio::test]
    async fn markdown_fenced_json_still_parses() -> crate::errors::Result<()> {
        let db = setup_test_db().await?;
        let model = Arc::new(ScriptedModel::replying(
            "```json\n{\"normalized_description\": \"Gatorade Cool Blue\", \"brand\": \"Gatorade\", \"category\": \"beverage_sports\", \"confidence\": 0.99}\n```",
            10,
            10,
        ));
        let item = recognizer(model)
            .recognize(&db, "Walmart", None, "GATORADE COOL BL")
            .await?;
        assert_eq!(item.product_category, ProductCategory::BeverageSports);
        Ok(())
    }
}
