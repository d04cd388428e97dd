//! Direct PDF text-layer extraction.
//!
//! Text-bearing PDFs (emailed invoices, web-printed order histories) skip
//! OCR entirely: `pdftotext -layout` preserves the column structure the
//! vendor parsers key on, and the result is exact, so confidence is 1.0.

use super::{OcrMethod, OcrProvider, OcrResult};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::process::Command;

static PAGES_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^Pages:\s+(\d+)").expect("pdfinfo pages pattern"));

pub struct PdfTextProvider;

#[async_trait]
impl OcrProvider for PdfTextProvider {
    async fn extract_text(&self, path: &Path) -> Result<OcrResult> {
        if !self.supports(path) {
            return Err(Error::UnsupportedFileType {
                extension: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        let output = Command::new("pdftotext")
            .arg("-layout")
            .arg(path)
            .arg("-")
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::OcrFailed {
                message: format!(
                    "pdftotext failed on {}: {}",
                    path.display(),
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        if text.trim().is_empty() {
            // Scanned PDF; the factory moves on to OCR
            return Err(Error::OcrFailed {
                message: format!("{} has no embedded text layer", path.display()),
            });
        }

        let page_count = page_count(path).await;

        tracing::info!(
            chars = text.len(),
            pages = page_count,
            "pdf_text_extraction_complete"
        );

        Ok(OcrResult {
            text,
            confidence: 1.0,
            page_count,
            method: OcrMethod::PdfTextExtraction,
            bounding_boxes: Vec::new(),
        })
    }

    fn supports(&self, path: &Path) -> bool {
        super::is_pdf(path)
    }
}

async fn page_count(path: &Path) -> i32 {
    let Ok(output) = Command::new("pdfinfo").arg(path).output().await else {
        return 1;
    };
    if !output.status.success() {
        return 1;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    PAGES_LINE
        .captures(&stdout)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(1)
}
