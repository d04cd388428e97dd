//! The receipt processing pipeline.
//!
//! One entry point: [`ReceiptPipeline::process_receipt`]. A receipt's
//! steps run in order and never interleave; concurrency across receipts is
//! the task runner's job. Only fatal conditions (no OCR text, storage
//! failure, cancellation) abort - everything else degrades into
//! validation warnings and a review-gated receipt. Persistence happens in
//! a single transaction at the end, so a cancelled pipeline leaves no
//! partial state.

use crate::config::Settings;
use crate::core::categorize::accounts::AccountMapper;
use crate::core::categorize::llm::RecognitionModel;
use crate::core::categorize::recognizer::ItemRecognizer;
use crate::core::categorize::{CategorizationService, CategorizedLine};
use crate::core::ocr::{raster, OcrEngine, OcrMethod, OcrProvider, OcrResult};
use crate::core::parsers::ParserSet;
use crate::core::repository::{self, LineDraft, ReceiptDraft};
use crate::core::vendors;
use crate::errors::{Error, Result};
use crate::models::{
    check_totals, EntityKind, LineType, NormalizedReceipt, OcrBox, ReceiptSource, ReceiptStatus,
    ValidationWarning, WarningType,
};
use rust_decimal::Decimal;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// OCR below this confidence flags the receipt.
const OCR_CONFIDENCE_FLOOR: f64 = 0.95;

/// Summary returned to the task runner.
#[derive(Debug, Clone)]
pub struct ProcessingOutcome {
    pub receipt_id: Uuid,
    pub entity: EntityKind,
    pub status: ReceiptStatus,
    pub vendor: Option<String>,
    pub total: Decimal,
    pub line_count: usize,
    pub warning_count: usize,
    pub ocr_method: &'static str,
    pub ocr_confidence: f64,
    pub cache_hits: usize,
    pub ai_calls: usize,
    pub ai_cost_usd: Decimal,
}

/// The assembled pipeline. Construct once and reuse across receipts.
pub struct ReceiptPipeline {
    db: DatabaseConnection,
    ocr: Arc<dyn OcrProvider>,
    parsers: ParserSet,
    categorizer: CategorizationService,
    ocr_timeout: Duration,
}

impl ReceiptPipeline {
    /// Builds the production pipeline with the real OCR engine.
    #[must_use]
    pub fn new(
        db: DatabaseConnection,
        settings: &Settings,
        model: Option<Arc<dyn RecognitionModel>>,
    ) -> Self {
        let engine: Arc<dyn OcrProvider> = Arc::new(OcrEngine::new(settings));
        Self::with_ocr(db, settings, model, engine)
    }

    /// Builds the pipeline around an explicit OCR provider.
    #[must_use]
    pub fn with_ocr(
        db: DatabaseConnection,
        settings: &Settings,
        model: Option<Arc<dyn RecognitionModel>>,
        ocr: Arc<dyn OcrProvider>,
    ) -> Self {
        let recognizer = ItemRecognizer::new(
            model,
            Duration::from_secs(settings.llm_call_timeout_s),
            settings.recognizer_input_cost_per_1k,
            settings.recognizer_output_cost_per_1k,
        );
        let categorizer = CategorizationService::new(
            recognizer,
            AccountMapper::new(settings.capitalization_threshold),
            settings.categorization_review_threshold,
            settings.categorization_cache_write_threshold,
        );
        Self {
            db,
            ocr,
            parsers: ParserSet::new(),
            categorizer,
            ocr_timeout: Duration::from_secs(settings.ocr_call_timeout_s),
        }
    }

    /// Processes one receipt end to end: OCR, vendor identification,
    /// parsing, per-line categorization, and a single transactional save.
    ///
    /// # Errors
    /// Fatal conditions only: OCR produced no text via any strategy, or
    /// the repository write failed. The receipt row is left in `failed`
    /// where possible; degraded conditions never error.
    pub async fn process_receipt(
        &self,
        file_path: &Path,
        entity: EntityKind,
        receipt_id: Uuid,
        source: ReceiptSource,
    ) -> Result<ProcessingOutcome> {
        tracing::info!(
            receipt_id = %receipt_id,
            entity = entity.as_str(),
            file = %file_path.display(),
            "receipt_processing_started"
        );

        // Step 1: OCR
        let ocr_result = match tokio::time::timeout(
            self.ocr_timeout,
            self.ocr.extract_text(file_path),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(error)) => {
                self.mark_failed(file_path, entity, receipt_id, source).await;
                return Err(error);
            }
            Err(_) => {
                self.mark_failed(file_path, entity, receipt_id, source).await;
                return Err(Error::Timeout {
                    operation: "OCR".to_string(),
                    seconds: self.ocr_timeout.as_secs(),
                });
            }
        };

        let mut warnings: Vec<ValidationWarning> = Vec::new();
        if ocr_result.method != OcrMethod::PdfTextExtraction
            && ocr_result.confidence < OCR_CONFIDENCE_FLOOR
        {
            warnings.push(
                ValidationWarning::new(
                    WarningType::OcrLowConfidence,
                    format!("OCR confidence {:.2} below {OCR_CONFIDENCE_FLOOR}", ocr_result.confidence),
                )
                .with_data(serde_json::json!({ "confidence": ocr_result.confidence })),
            );
        }

        // Step 1.5: normalized raster for the review UI (best effort)
        if crate::core::ocr::is_image(file_path) {
            if let Err(error) = raster::create_normalized_image(file_path).await {
                tracing::warn!(%error, "normalized_image_failed");
            }
        }

        // Step 2: vendor identification
        let profile = vendors::identify(&ocr_result.text);
        let vendor_key = profile.map(|p| p.key);

        // Step 3: vendor-routed parsing; a broken vendor parser falls back
        // to the generic one rather than failing the receipt
        let parsed = match self.parsers.parse(vendor_key, &ocr_result.text, entity) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::error!(%error, parser = vendor_key.unwrap_or("generic"), "parser_failed");
                self.parsers.parse(None, &ocr_result.text, entity)?
            }
        };
        warnings.extend(parsed.validation_warnings.iter().cloned());

        if let Some(warning) = check_totals(parsed.subtotal, parsed.tax_total, parsed.total) {
            warnings.push(warning);
        }

        // Step 4: per-line categorization, sequential per receipt
        let vendor_canonical = profile
            .map(|p| p.canonical_name.to_string())
            .or_else(|| parsed.vendor_guess.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut categorized: Vec<Option<CategorizedLine>> = Vec::with_capacity(parsed.lines.len());
        let mut cache_hits = 0;
        let mut ai_calls = 0;
        let mut ai_cost_usd = Decimal::ZERO;

        for line in &parsed.lines {
            let should_categorize = matches!(
                line.line_type,
                LineType::Item | LineType::Fee | LineType::Discount
            ) && line.description.as_deref().is_some_and(|d| !d.is_empty());

            if !should_categorize {
                categorized.push(None);
                continue;
            }

            let result = self
                .categorizer
                .categorize_line(
                    &self.db,
                    &vendor_canonical,
                    line.vendor_sku.as_deref(),
                    line.description.as_deref().unwrap_or_default(),
                    line.line_total,
                )
                .await?;

            warnings.extend(result.warnings.iter().cloned());
            match result.source {
                crate::core::categorize::recognizer::CategorizationSource::Cache => cache_hits += 1,
                _ => ai_calls += 1,
            }
            if let Some(cost) = result.ai_cost_usd {
                ai_cost_usd += cost;
            }
            categorized.push(Some(result));
        }

        // Step 5: bounding boxes
        if ocr_result.method == OcrMethod::Textract && ocr_result.bounding_boxes.is_empty() {
            warnings.push(ValidationWarning::new(
                WarningType::BoundingBoxesUnavailable,
                "Textract returned no line geometry for this receipt",
            ));
        }

        let line_drafts = build_line_drafts(&parsed, &categorized, &ocr_result);

        // Step 6: status and persistence in one transaction
        let any_line_review = line_drafts.iter().any(|line| line.requires_review);
        let status = if warnings.is_empty() && !any_line_review {
            ReceiptStatus::Approved
        } else {
            ReceiptStatus::ReviewRequired
        };

        let draft = ReceiptDraft {
            id: receipt_id,
            entity,
            source,
            file_path: file_path.display().to_string(),
            content_hash: None,
            perceptual_hash: None,
            vendor_guess: parsed
                .vendor_guess
                .clone()
                .or_else(|| profile.map(|p| p.canonical_name.to_string())),
            purchase_date: Some(parsed.purchase_date),
            invoice_number: parsed.invoice_number.clone(),
            currency: parsed.currency.clone(),
            subtotal: parsed.subtotal,
            tax_total: parsed.tax_total,
            total: parsed.total,
            is_bill: parsed.is_bill,
            payment_terms: parsed
                .payment_terms
                .clone()
                .or_else(|| profile.and_then(|p| p.payment_terms.map(str::to_string))),
            ocr_method: Some(ocr_result.method.as_str().to_string()),
            ocr_confidence: Some(ocr_result.confidence),
            page_count: ocr_result.page_count,
            status,
            validation_warnings: warnings.clone(),
        };

        let txn = self.db.begin().await?;
        repository::save_receipt(&txn, &draft).await?;
        let line_count = repository::save_lines(&txn, entity, receipt_id, &line_drafts).await?;
        txn.commit().await?;

        tracing::info!(
            receipt_id = %receipt_id,
            vendor = %vendor_canonical,
            status = status.as_str(),
            lines = line_count,
            warnings = warnings.len(),
            cache_hits,
            ai_calls,
            ai_cost_usd = %ai_cost_usd,
            "receipt_processing_complete"
        );

        Ok(ProcessingOutcome {
            receipt_id,
            entity,
            status,
            vendor: draft.vendor_guess,
            total: parsed.total,
            line_count,
            warning_count: warnings.len(),
            ocr_method: ocr_result.method.as_str(),
            ocr_confidence: ocr_result.confidence,
            cache_hits,
            ai_calls,
            ai_cost_usd,
        })
    }

    /// Best-effort `failed` marker; fatal errors still propagate.
    async fn mark_failed(
        &self,
        file_path: &Path,
        entity: EntityKind,
        receipt_id: Uuid,
        source: ReceiptSource,
    ) {
        let draft = ReceiptDraft {
            id: receipt_id,
            entity,
            source,
            file_path: file_path.display().to_string(),
            content_hash: None,
            perceptual_hash: None,
            vendor_guess: None,
            purchase_date: None,
            invoice_number: None,
            currency: "CAD".to_string(),
            subtotal: Decimal::ZERO,
            tax_total: Decimal::ZERO,
            total: Decimal::ZERO,
            is_bill: false,
            payment_terms: None,
            ocr_method: None,
            ocr_confidence: None,
            page_count: 0,
            status: ReceiptStatus::Failed,
            validation_warnings: Vec::new(),
        };
        if let Err(error) = repository::save_receipt(&self.db, &draft).await {
            tracing::error!(%error, receipt_id = %receipt_id, "failed_status_not_persisted");
        }
    }
}

fn build_line_drafts(
    parsed: &NormalizedReceipt,
    categorized: &[Option<CategorizedLine>],
    ocr_result: &OcrResult,
) -> Vec<LineDraft> {
    parsed
        .lines
        .iter()
        .zip(categorized.iter())
        .map(|(line, categorization)| {
            let bounding_box = line
                .description
                .as_deref()
                .and_then(|desc| match_line_to_box(desc, &ocr_result.bounding_boxes))
                .and_then(|bbox| {
                    serde_json::to_value(serde_json::json!({
                        "left": bbox.left,
                        "top": bbox.top,
                        "width": bbox.width,
                        "height": bbox.height,
                    }))
                    .ok()
                });

            match categorization {
                Some(c) => LineDraft {
                    line_index: line.line_index,
                    line_type: line.line_type,
                    vendor_sku: line.vendor_sku.clone(),
                    upc: line.upc.clone(),
                    raw_text: line.raw_text.clone(),
                    description: line.description.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    line_total: line.line_total,
                    tax_flag: line.tax_flag,
                    tax_amount: line.tax_amount,
                    normalized_description: Some(c.normalized_description.clone()),
                    product_category: Some(c.product_category.as_str().to_string()),
                    account_code: Some(c.account_code.clone()),
                    brand: c.brand.clone(),
                    confidence: Some(c.confidence),
                    categorization_source: Some(c.source.as_str().to_string()),
                    requires_review: c.requires_review,
                    ai_cost_usd: c.ai_cost_usd,
                    bounding_box,
                },
                None => LineDraft {
                    line_index: line.line_index,
                    line_type: line.line_type,
                    vendor_sku: line.vendor_sku.clone(),
                    upc: line.upc.clone(),
                    raw_text: line.raw_text.clone(),
                    description: line.description.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    line_total: line.line_total,
                    tax_flag: line.tax_flag,
                    tax_amount: line.tax_amount,
                    normalized_description: None,
                    product_category: None,
                    account_code: None,
                    brand: None,
                    confidence: None,
                    categorization_source: Some("parser".to_string()),
                    requires_review: true,
                    ai_cost_usd: None,
                    bounding_box,
                },
            }
        })
        .collect()
}

/// Finds the OCR line whose tokens overlap the description best; at least
/// two shared words are required to accept a match.
fn match_line_to_box<'a>(description: &str, boxes: &'a [OcrBox]) -> Option<&'a OcrBox> {
    if description.is_empty() || boxes.is_empty() {
        return None;
    }
    let desc_words: std::collections::HashSet<String> = description
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();

    let mut best: Option<(&OcrBox, usize)> = None;
    for bbox in boxes {
        let matches = bbox
            .text
            .to_lowercase()
            .split_whitespace()
            .filter(|word| desc_words.contains(*word))
            .count();
        match best {
            Some((_, score)) if matches <= score => {}
            _ => best = Some((bbox, matches)),
        }
    }

    best.and_then(|(bbox, score)| (score >= 2).then_some(bbox))
}
