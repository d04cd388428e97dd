//! Local Tesseract provider for PDFs.
//!
//! Optional: availability of the `tesseract` and `pdftoppm` binaries is
//! probed at runtime. Pages are rasterized at 300 DPI and OCR'd one at a
//! time; word confidences come from Tesseract's TSV output and the overall
//! score is the mean per-page confidence in `[0, 1]`. No bounding boxes:
//! TSV geometry is in pixels and does not normalize reliably across
//! rotated scans, and PDFs handled locally never reach the review crop UI.

use super::{OcrMethod, OcrProvider, OcrResult};
use crate::errors::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use uuid::Uuid;

const RASTER_DPI: &str = "300";

pub struct TesseractProvider;

impl TesseractProvider {
    /// Probes for the binaries this provider shells out to.
    pub async fn available() -> bool {
        let tesseract = Command::new("tesseract")
            .arg("--version")
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false);
        let pdftoppm = Command::new("pdftoppm")
            .arg("-v")
            .output()
            .await
            .map(|out| out.status.success() || !out.stderr.is_empty())
            .unwrap_or(false);

        if !(tesseract && pdftoppm) {
            tracing::info!(tesseract, pdftoppm, "tesseract_provider_unavailable");
        }
        tesseract && pdftoppm
    }
}

#[async_trait]
impl OcrProvider for TesseractProvider {
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

        let work_dir = std::env::temp_dir().join(format!("ledgerbox-ocr-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&work_dir).await?;

        let result = ocr_all_pages(path, &work_dir).await;
        let _ = tokio::fs::remove_dir_all(&work_dir).await;
        result
    }

    fn supports(&self, path: &Path) -> bool {
        super::is_pdf(path)
    }
}

async fn ocr_all_pages(pdf: &Path, work_dir: &Path) -> Result<OcrResult> {
    let prefix = work_dir.join("page");
    let output = Command::new("pdftoppm")
        .arg("-r")
        .arg(RASTER_DPI)
        .arg("-png")
        .arg(pdf)
        .arg(&prefix)
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::OcrFailed {
            message: format!(
                "pdftoppm failed: {}",
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }

    let mut pages = Vec::new();
    let mut entries = tokio::fs::read_dir(work_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("png") {
            pages.push(path);
        }
    }
    pages.sort();

    if pages.is_empty() {
        return Err(Error::OcrFailed {
            message: format!("pdftoppm produced no pages for {}", pdf.display()),
        });
    }

    let mut page_texts = Vec::new();
    let mut page_confidences = Vec::new();

    for page in &pages {
        let output = Command::new("tesseract")
            .arg(page)
            .arg("stdout")
            .arg("tsv")
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::OcrFailed {
                message: format!(
                    "tesseract failed on {}: {}",
                    page.display(),
                    String::from_utf8_lossy(&output.stderr)
                ),
            });
        }
        let (text, confidence) = parse_tsv(&String::from_utf8_lossy(&output.stdout));
        page_texts.push(text);
        page_confidences.push(confidence);
    }

    let confidence = page_confidences.iter().sum::<f64>() / page_confidences.len() as f64;

    tracing::info!(
        pages = pages.len(),
        confidence,
        "tesseract_complete"
    );

    Ok(OcrResult {
        text: page_texts.join("\n"),
        confidence,
        page_count: pages.len() as i32,
        method: OcrMethod::Tesseract,
        bounding_boxes: Vec::new(),
    })
}

/// Rebuilds line text and mean word confidence from Tesseract TSV output.
///
/// Columns: level, page, block, par, line, word, left, top, width, height,
/// conf, text. Level-5 rows are words; a change in the (block, par, line)
/// key starts a new output line.
fn parse_tsv(tsv: &str) -> (String, f64) {
    let mut text = String::new();
    let mut confidences = Vec::new();
    let mut current_line_key: Option<(String, String, String)> = None;

    for row in tsv.lines().skip(1) {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let word = cols[11].trim();
        if word.is_empty() {
            continue;
        }
        if let Ok(conf) = cols[10].parse::<f64>() {
            if conf >= 0.0 {
                confidences.push(conf / 100.0);
            }
        }

        let key = (cols[2].to_string(), cols[3].to_string(), cols[4].to_string());
        if current_line_key.as_ref() == Some(&key) {
            text.push(' ');
        } else {
            if !text.is_empty() {
                text.push('\n');
            }
            current_line_key = Some(key);
        }
        text.push_str(word);
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f64>() / confidences.len() as f64
    };
    (text, confidence)
}

/// Rasterizes page 1 of a PDF to a JPEG for the Textract fallback path.
///
/// # Errors
/// `OcrFailed` when `pdftoppm` fails or produces nothing.
pub async fn rasterize_first_page(pdf: &Path) -> Result<PathBuf> {
    let prefix = std::env::temp_dir().join(format!("ledgerbox-page-{}", Uuid::new_v4()));
    let output = Command::new("pdftoppm")
        .arg("-r")
        .arg(RASTER_DPI)
        .arg("-jpeg")
        .arg("-f")
        .arg("1")
        .arg("-l")
        .arg("1")
        .arg(pdf)
        .arg(&prefix)
        .output()
        .await?;
    if !output.status.success() {
        return Err(Error::OcrFailed {
            message: format!(
                "pdftoppm failed rasterizing {}: {}",
                pdf.display(),
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }

    // pdftoppm names single-page output `<prefix>-1.jpg` (or -01 with
    // zero padding depending on page count digits)
    for candidate in [
        PathBuf::from(format!("{}-1.jpg", prefix.display())),
        PathBuf::from(format!("{}-01.jpg", prefix.display())),
    ] {
        if tokio::fs::try_exists(&candidate).await.unwrap_or(false) {
            return Ok(candidate);
        }
    }
    Err(Error::OcrFailed {
        message: format!("pdftoppm produced no page image for {}", pdf.display()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_words_group_into_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
            5\t1\t1\t1\t1\t1\t0\t0\t10\t10\t96.5\tSUBTOTAL\n\
            5\t1\t1\t1\t1\t2\t12\t0\t10\t10\t97.5\t191.03\n\
            5\t1\t1\t1\t2\t1\t0\t12\t10\t10\t98.0\tTOTAL\n\
            4\t1\t1\t1\t3\t0\t0\t24\t10\t10\t-1\t\n";
        let (text, confidence) = parse_tsv(tsv);
        assert_eq!(text, "SUBTOTAL 191.03\nTOTAL");
        assert!((confidence - 0.97333).abs() < 1e-4);
    }

    #[test]
    fn empty_tsv_has_zero_confidence() {
        let (text, confidence) = parse_tsv("header\n");
        assert!(text.is_empty());
        assert_eq!(confidence, 0.0);
    }
}
