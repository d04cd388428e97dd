//! Core business logic - the receipt ingestion pipeline and its parts.
//!
//! Dataflow: OCR ([`ocr`]) → vendor identification ([`vendors`]) →
//! vendor-routed parsing ([`parsers`]) → two-stage categorization
//! ([`categorize`]) backed by the shared learning cache ([`cache`]) →
//! entity-routed persistence ([`repository`]) → review projection
//! ([`review`]). [`pipeline`] ties the stages together behind one entry
//! point; review corrections feed back into the cache.

pub mod cache;
pub mod categorize;
pub mod ocr;
pub mod parsers;
pub mod pipeline;
pub mod repository;
pub mod review;
pub mod vendors;
