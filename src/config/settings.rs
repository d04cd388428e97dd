//! Runtime settings loaded from environment variables.
//!
//! The recognized option set is closed; anything else in the environment is
//! ignored. Call [`Settings::from_env`] once at startup (after `dotenvy` has
//! loaded `.env`) and pass the result down by reference.

use crate::errors::{Error, Result};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;

/// OCR backend preference. `Auto` lets the factory pick per file type;
/// images force Textract regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrBackend {
    Auto,
    Textract,
    Tesseract,
}

impl OcrBackend {
    fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "textract" => Ok(Self::Textract),
            "tesseract" => Ok(Self::Tesseract),
            other => Err(Error::Config {
                message: format!("OCR_BACKEND must be auto, textract or tesseract, got {other:?}"),
            }),
        }
    }
}

/// Application settings from environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ocr_backend: OcrBackend,
    pub textract_enabled: bool,
    pub textract_region: String,
    /// Gate for returning Tesseract output on PDFs.
    pub tesseract_min_confidence: f64,
    /// Stage-1 confidence below this flags the line for review.
    pub categorization_review_threshold: f64,
    /// Cache write-through only at or above this confidence.
    pub categorization_cache_write_threshold: f64,
    /// Equipment at or above this amount is capitalized to account 1500.
    pub capitalization_threshold: Decimal,
    pub ocr_call_timeout_s: u64,
    pub llm_call_timeout_s: u64,
    /// Root directory for receipt object storage.
    pub objects_root: PathBuf,
    pub anthropic_api_key: Option<String>,
    pub recognizer_model: String,
    pub recognizer_input_cost_per_1k: Decimal,
    pub recognizer_output_cost_per_1k: Decimal,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr_backend: OcrBackend::Auto,
            textract_enabled: true,
            textract_region: "us-east-1".to_string(),
            tesseract_min_confidence: 0.96,
            categorization_review_threshold: 0.80,
            categorization_cache_write_threshold: 0.80,
            capitalization_threshold: Decimal::new(2_500_00, 2),
            ocr_call_timeout_s: 60,
            llm_call_timeout_s: 30,
            objects_root: PathBuf::from("data/objects"),
            anthropic_api_key: None,
            recognizer_model: "claude-sonnet-4-5".to_string(),
            // Claude Sonnet pricing: $3 / $15 per 1M tokens
            recognizer_input_cost_per_1k: Decimal::new(3, 3),
            recognizer_output_cost_per_1k: Decimal::new(15, 3),
        }
    }
}

impl Settings {
    /// Loads settings from the process environment, falling back to the
    /// defaults above for anything unset.
    ///
    /// # Errors
    /// Returns a configuration error when a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            ocr_backend: match std::env::var("OCR_BACKEND") {
                Ok(value) => OcrBackend::parse(&value)?,
                Err(_) => defaults.ocr_backend,
            },
            textract_enabled: env_parse("TEXTRACT_ENABLED", defaults.textract_enabled)?,
            textract_region: std::env::var("TEXTRACT_REGION")
                .unwrap_or(defaults.textract_region),
            tesseract_min_confidence: env_parse(
                "TESSERACT_MIN_CONFIDENCE",
                defaults.tesseract_min_confidence,
            )?,
            categorization_review_threshold: env_parse(
                "CATEGORIZATION_REVIEW_THRESHOLD",
                defaults.categorization_review_threshold,
            )?,
            categorization_cache_write_threshold: env_parse(
                "CATEGORIZATION_CACHE_WRITE_THRESHOLD",
                defaults.categorization_cache_write_threshold,
            )?,
            capitalization_threshold: env_parse(
                "CAPITALIZATION_THRESHOLD",
                defaults.capitalization_threshold,
            )?,
            ocr_call_timeout_s: env_parse("OCR_CALL_TIMEOUT_S", defaults.ocr_call_timeout_s)?,
            llm_call_timeout_s: env_parse("LLM_CALL_TIMEOUT_S", defaults.llm_call_timeout_s)?,
            objects_root: std::env::var("OBJECTS_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.objects_root),
            anthropic_api_key: std::env::var("ANTHROPIC_API_KEY").ok(),
            recognizer_model: std::env::var("RECOGNIZER_MODEL")
                .unwrap_or(defaults.recognizer_model),
            recognizer_input_cost_per_1k: env_parse(
                "RECOGNIZER_INPUT_COST_PER_1K",
                defaults.recognizer_input_cost_per_1k,
            )?,
            recognizer_output_cost_per_1k: env_parse(
                "RECOGNIZER_OUTPUT_COST_PER_1K",
                defaults.recognizer_output_cost_per_1k,
            )?,
        })
    }
}

fn env_parse<T: FromStr>(key: &str, fallback: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| Error::Config {
            message: format!("{key} has invalid value {raw:?}"),
        }),
        Err(_) => Ok(fallback),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.ocr_backend, OcrBackend::Auto);
        assert!(settings.textract_enabled);
        assert_eq!(settings.tesseract_min_confidence, 0.96);
        assert_eq!(settings.categorization_review_threshold, 0.80);
        assert_eq!(settings.categorization_cache_write_threshold, 0.80);
        assert_eq!(settings.capitalization_threshold, dec!(2500.00));
        assert_eq!(settings.ocr_call_timeout_s, 60);
        assert_eq!(settings.llm_call_timeout_s, 30);
    }

    #[test]
    fn backend_parse_rejects_unknown_values() {
        assert!(OcrBackend::parse("auto").is_ok());
        assert!(OcrBackend::parse("Textract").is_ok());
        assert!(OcrBackend::parse("easyocr").is_err());
    }
}
