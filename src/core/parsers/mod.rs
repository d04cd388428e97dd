//! Vendor-routed receipt parsers.
//!
//! Dispatch is decided by the vendor identifier ([`crate::core::vendors`]);
//! parsers assume they were chosen correctly. `detect_format` exists only
//! as a sanity check - a mismatch is logged, never used for routing. The
//! generic parser always matches and is the fallback for unidentified
//! vendors.

pub mod costco;
pub mod generic;
pub mod gfs;
pub mod grosnor;
pub mod normalize;
pub mod pepsi;
pub mod pharmasave;
pub mod superstore;
pub mod walmart;

use crate::errors::Result;
use crate::models::{EntityKind, NormalizedReceipt};

/// Contract implemented by every vendor parser.
pub trait ReceiptParser: Send + Sync {
    /// Dispatch key, matching the vendor registry (`walmart`, `gfs`, ...).
    fn key(&self) -> &'static str;

    /// Sanity check only: does this text look like this vendor's format?
    fn detect_format(&self, text: &str) -> bool;

    /// Parses OCR text into the canonical receipt shape. Degraded parses
    /// populate `validation_warnings` instead of failing.
    ///
    /// # Errors
    /// Only for conditions no parser can recover from; ordinary noise is
    /// downgraded to warnings.
    fn parse(&self, text: &str, entity: EntityKind) -> Result<NormalizedReceipt>;
}

/// The full parser library, keyed for dispatch.
pub struct ParserSet {
    parsers: Vec<Box<dyn ReceiptParser>>,
    generic: generic::GenericParser,
}

impl Default for ParserSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ParserSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            parsers: vec![
                Box::new(grosnor::GrosnorParser),
                Box::new(costco::CostcoParser),
                Box::new(gfs::GfsParser),
                Box::new(pepsi::PepsiParser),
                Box::new(superstore::SuperstoreParser),
                Box::new(pharmasave::PharmasaveParser),
                Box::new(walmart::WalmartParser),
            ],
            generic: generic::GenericParser,
        }
    }

    /// Resolves the parser for an identified vendor key; `None` (vendor
    /// unidentified) or an unknown key falls back to the generic parser.
    #[must_use]
    pub fn for_vendor(&self, key: Option<&str>) -> &dyn ReceiptParser {
        let Some(key) = key else {
            return &self.generic;
        };
        self.parsers
            .iter()
            .find(|parser| parser.key() == key)
            .map_or(&self.generic as &dyn ReceiptParser, |parser| {
                parser.as_ref()
            })
    }

    /// Parses with the vendor-selected parser, logging (but not acting on)
    /// a `detect_format` disagreement.
    ///
    /// # Errors
    /// Propagates the parser's error.
    pub fn parse(
        &self,
        vendor_key: Option<&str>,
        text: &str,
        entity: EntityKind,
    ) -> Result<NormalizedReceipt> {
        let parser = self.for_vendor(vendor_key);
        if !parser.detect_format(text) {
            tracing::warn!(
                parser = parser.key(),
                "parser_format_sanity_mismatch"
            );
        }
        parser.parse(text, entity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_prefers_keyed_parser_and_falls_back_to_generic() {
        let set = ParserSet::new();
        assert_eq!(set.for_vendor(Some("walmart")).key(), "walmart");
        assert_eq!(set.for_vendor(Some("gfs")).key(), "gfs");
        assert_eq!(set.for_vendor(Some("no_such_vendor")).key(), "generic");
        assert_eq!(set.for_vendor(None).key(), "generic");
    }
}
