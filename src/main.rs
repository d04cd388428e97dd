use dotenvy::dotenv;
use ledgerbox::config::{self, Settings};
use ledgerbox::core::categorize::llm::{AnthropicModel, RecognitionModel};
use ledgerbox::core::pipeline::ReceiptPipeline;
use ledgerbox::errors::Error;
use ledgerbox::models::{EntityKind, ReceiptSource};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load environment variables from .env file
    dotenv().ok();

    init_tracing();
    info!("ledgerbox v0.2.0 starting...");

    let (file_path, entity, source, receipt_id) = parse_args()?;

    let settings = Settings::from_env()?;

    // Relative paths resolve against the receipt object store
    let file_path = if file_path.is_absolute() || file_path.exists() {
        file_path
    } else {
        settings.objects_root.join(&file_path)
    };

    info!("Connecting to database...");
    let db = config::database::create_connection().await?;
    config::database::create_tables(&db).await?;
    info!("Database connected");

    let model: Option<Arc<dyn RecognitionModel>> = match &settings.anthropic_api_key {
        Some(api_key) => Some(Arc::new(AnthropicModel::new(
            api_key.clone(),
            settings.recognizer_model.clone(),
        ))),
        None => {
            warn!("ANTHROPIC_API_KEY not set; uncached lines will be marked unknown");
            None
        }
    };

    let pipeline = ReceiptPipeline::new(db, &settings, model);
    let outcome = pipeline
        .process_receipt(&file_path, entity, receipt_id, source)
        .await?;

    info!(
        receipt_id = %outcome.receipt_id,
        status = outcome.status.as_str(),
        vendor = outcome.vendor.as_deref().unwrap_or("unknown"),
        total = %outcome.total,
        lines = outcome.line_count,
        warnings = outcome.warning_count,
        ocr_method = outcome.ocr_method,
        cache_hits = outcome.cache_hits,
        ai_calls = outcome.ai_calls,
        ai_cost_usd = %outcome.ai_cost_usd,
        "Receipt processed"
    );

    Ok(())
}

/// Initializes the tracing subscriber for logging
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stdout))
        .init();
}

/// Parses `<file> <entity> [source] [receipt-id]` from the command line
fn parse_args() -> Result<(PathBuf, EntityKind, ReceiptSource, Uuid), Error> {
    let mut args = std::env::args().skip(1);

    let file_path = args.next().map(PathBuf::from).ok_or_else(|| Error::Config {
        message: "usage: ledgerbox <file> <corp|soleprop> [pwa|email|drive|manual] [receipt-id]"
            .to_string(),
    })?;

    let entity_raw = args.next().ok_or_else(|| Error::Config {
        message: "missing entity (corp or soleprop)".to_string(),
    })?;
    let entity = EntityKind::parse(&entity_raw).ok_or_else(|| Error::Config {
        message: format!("entity must be corp or soleprop, got {entity_raw:?}"),
    })?;

    let source = match args.next() {
        Some(raw) => ReceiptSource::parse(&raw).ok_or_else(|| Error::Config {
            message: format!("source must be pwa, email, drive or manual, got {raw:?}"),
        })?,
        None => ReceiptSource::Manual,
    };

    let receipt_id = match args.next() {
        Some(raw) => Uuid::parse_str(&raw).map_err(|_| Error::Config {
            message: format!("receipt id must be a UUID, got {raw:?}"),
        })?,
        None => Uuid::new_v4(),
    };

    Ok((file_path, entity, source, receipt_id))
}
