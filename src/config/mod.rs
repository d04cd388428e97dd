/// Database configuration and connection management
pub mod database;

/// Runtime settings loaded from environment variables
pub mod settings;

pub use settings::{OcrBackend, Settings};
