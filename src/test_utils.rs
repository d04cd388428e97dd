//! Shared test utilities.
//!
//! In-memory database setup plus scripted fakes for the OCR provider and
//! the recognition model, so pipeline behavior is exercised end-to-end
//! without network access or external binaries.

use crate::config::database::create_tables;
use crate::core::categorize::llm::{ModelReply, RecognitionModel};
use crate::core::ocr::{OcrProvider, OcrResult};
use crate::core::repository::{LineDraft, ReceiptDraft};
use crate::errors::{Error, Result};
use crate::models::{
    EntityKind, LineType, ReceiptSource, ReceiptStatus, TaxFlag, ValidationWarning,
};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sea_orm::{Database, DatabaseConnection};
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Fresh in-memory database with all tables created.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    create_tables(&db).await?;
    Ok(db)
}

/// A receipt header draft shaped like scenario data: Walmart image with a
/// faded subtotal and a `subtotal_mismatch` warning.
#[must_use]
pub fn sample_receipt_draft(entity: EntityKind) -> ReceiptDraft {
    ReceiptDraft {
        id: Uuid::new_v4(),
        entity,
        source: ReceiptSource::Pwa,
        file_path: format!("data/objects/{}/test/original.jpg", entity.as_str()),
        content_hash: Some("b5bb9d8014a0f9b1d61e21e796d78dcc".to_string()),
        perceptual_hash: None,
        vendor_guess: Some("Walmart Supercentre".to_string()),
        purchase_date: NaiveDate::from_ymd_opt(2024, 3, 8),
        invoice_number: Some("5555 1111 2222".to_string()),
        currency: "CAD".to_string(),
        subtotal: Decimal::new(191_03, 2),
        tax_total: Decimal::new(13_00, 2),
        total: Decimal::new(204_03, 2),
        is_bill: false,
        payment_terms: None,
        ocr_method: Some("textract".to_string()),
        ocr_confidence: Some(0.97),
        page_count: 1,
        status: ReceiptStatus::ReviewRequired,
        validation_warnings: vec![ValidationWarning::subtotal_mismatch(
            Decimal::new(177_80, 2),
            Decimal::new(191_03, 2),
        )],
    }
}

/// One plain item line for repository tests.
#[must_use]
pub fn sample_line_draft(line_index: i32) -> LineDraft {
    LineDraft {
        line_index,
        line_type: LineType::Item,
        vendor_sku: Some(format!("06210000{line_index:04}")),
        upc: Some(format!("06210000{line_index:04}")),
        raw_text: Some("CANADA DRY A 062100008930 $6.98 J".to_string()),
        description: Some("CANADA DRY A".to_string()),
        quantity: Some(Decimal::ONE),
        unit_price: Some(Decimal::new(6_98, 2)),
        line_total: Decimal::new(6_98, 2),
        tax_flag: Some(TaxFlag::Taxable),
        tax_amount: None,
        normalized_description: Some("Canada Dry Ginger Ale".to_string()),
        product_category: Some("beverage_soda".to_string()),
        account_code: Some("5011".to_string()),
        brand: Some("Canada Dry".to_string()),
        confidence: Some(0.95),
        categorization_source: Some("ai".to_string()),
        requires_review: false,
        ai_cost_usd: Some(Decimal::new(21, 4)),
        bounding_box: None,
    }
}

enum ScriptedBehavior {
    Reply {
        text: String,
        input_tokens: u32,
        output_tokens: u32,
    },
    Fail {
        message: String,
    },
}

/// A recognition model that returns the same scripted reply every call.
pub struct ScriptedModel {
    behavior: ScriptedBehavior,
}

impl ScriptedModel {
    #[must_use]
    pub fn replying(text: &str, input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            behavior: ScriptedBehavior::Reply {
                text: text.to_string(),
                input_tokens,
                output_tokens,
            },
        }
    }

    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            behavior: ScriptedBehavior::Fail {
                message: message.to_string(),
            },
        }
    }
}

#[async_trait]
impl RecognitionModel for ScriptedModel {
    async fn complete(&self, _prompt: &str) -> Result<ModelReply> {
        match &self.behavior {
            ScriptedBehavior::Reply {
                text,
                input_tokens,
                output_tokens,
            } => Ok(ModelReply {
                text: text.clone(),
                input_tokens: *input_tokens,
                output_tokens: *output_tokens,
            }),
            ScriptedBehavior::Fail { message } => Err(Error::Recognition {
                message: message.clone(),
            }),
        }
    }
}

/// A recognition model that hangs long enough to trip any test timeout.
pub struct SlowModel {
    delay: Duration,
}

impl SlowModel {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl RecognitionModel for SlowModel {
    async fn complete(&self, _prompt: &str) -> Result<ModelReply> {
        tokio::time::sleep(self.delay).await;
        Ok(ModelReply {
            text: "{}".to_string(),
            input_tokens: 1,
            output_tokens: 1,
        })
    }
}

/// An OCR provider that returns a canned result for any path.
pub struct FakeOcr {
    result: OcrResult,
}

impl FakeOcr {
    #[must_use]
    pub fn new(result: OcrResult) -> Self {
        Self { result }
    }
}

#[async_trait]
impl OcrProvider for FakeOcr {
    async fn extract_text(&self, _path: &Path) -> Result<OcrResult> {
        Ok(self.result.clone())
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }
}

/// An OCR provider that always fails, for fatal-path tests.
pub struct FailingOcr;

#[async_trait]
impl OcrProvider for FailingOcr {
    async fn extract_text(&self, path: &Path) -> Result<OcrResult> {
        Err(Error::OcrFailed {
            message: format!("no text recovered from {}", path.display()),
        })
    }

    fn supports(&self, _path: &Path) -> bool {
        true
    }
}
