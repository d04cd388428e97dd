//! Raster helpers: HEIC transcoding and the normalized review image.

use crate::errors::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use uuid::Uuid;

/// Maximum width of the normalized review image.
const NORMALIZED_MAX_WIDTH: u32 = 800;

/// Transcodes a HEIC/HEIF photo to PNG with the external `heif-convert`
/// binary. The caller owns (and removes) the returned temp file.
///
/// # Errors
/// `OcrFailed` when the converter is missing or exits nonzero.
pub async fn transcode_heic_to_png(path: &Path) -> Result<PathBuf> {
    let target = std::env::temp_dir().join(format!("ledgerbox-{}.png", Uuid::new_v4()));
    let output = Command::new("heif-convert")
        .arg(path)
        .arg(&target)
        .output()
        .await
        .map_err(|e| Error::OcrFailed {
            message: format!("heif-convert not runnable: {e}"),
        })?;
    if !output.status.success() {
        return Err(Error::OcrFailed {
            message: format!(
                "heif-convert failed on {}: {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr)
            ),
        });
    }
    Ok(target)
}

/// Writes `normalized.jpg` next to the original, resized to at most 800 px
/// wide for the review UI. Failures here are informational; the caller
/// logs and continues.
///
/// # Errors
/// Decode/encode failures or I/O errors.
pub async fn create_normalized_image(original: &Path) -> Result<PathBuf> {
    // HEIC photos go through the PNG transcode first
    let ext = original
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let (source, transcoded) = if matches!(ext.as_str(), "heic" | "heif") {
        let png = transcode_heic_to_png(original).await?;
        (png.clone(), Some(png))
    } else {
        (original.to_path_buf(), None)
    };

    let target = original
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join("normalized.jpg");
    let target_for_worker = target.clone();

    let result = tokio::task::spawn_blocking(move || -> Result<()> {
        let img = image::open(&source).map_err(|e| Error::OcrFailed {
            message: format!("could not decode {}: {e}", source.display()),
        })?;
        let img = if img.width() > NORMALIZED_MAX_WIDTH {
            let ratio = f64::from(NORMALIZED_MAX_WIDTH) / f64::from(img.width());
            let height = (f64::from(img.height()) * ratio) as u32;
            img.resize(
                NORMALIZED_MAX_WIDTH,
                height.max(1),
                image::imageops::FilterType::Lanczos3,
            )
        } else {
            img
        };
        img.to_rgb8()
            .save(&target_for_worker)
            .map_err(|e| Error::OcrFailed {
                message: format!("could not write normalized image: {e}"),
            })
    })
    .await
    .map_err(|e| Error::OcrFailed {
        message: format!("normalize worker failed: {e}"),
    })?;

    if let Some(png) = transcoded {
        let _ = tokio::fs::remove_file(&png).await;
    }
    result?;

    tracing::info!(path = %target.display(), "normalized_image_created");
    Ok(target)
}
