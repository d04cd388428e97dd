//! Vendor identification - routes OCR text to a parser via a weighted
//! marker registry.
//!
//! Detection lives here, not in the parsers: each registry profile scores
//! the case-folded OCR text against weighted marker categories and the
//! highest-scoring vendor above the threshold wins. Markers must hold
//! across every outlet of a vendor - store numbers, street addresses and
//! phone numbers are banned, so a Walmart receipt full of Pepsi UPCs still
//! routes to the Walmart parser (the brand tokens alone can never reach
//! the threshold without a name match).

use crate::models::EntityKind;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

/// Marker category weights.
const WEIGHT_NAME: u32 = 10;
const WEIGHT_TAX_ID: u32 = 7;
const WEIGHT_FORMAT: u32 = 5;
const WEIGHT_SLOGAN: u32 = 3;
const WEIGHT_BRAND: u32 = 2;

/// Minimum score to accept a vendor.
const ACCEPT_THRESHOLD: u32 = 10;

/// One vendor in the registry.
pub struct VendorProfile {
    /// Stable key used for parser dispatch (e.g. `walmart`).
    pub key: &'static str,
    /// Canonical display name (e.g. `Walmart`).
    pub canonical_name: &'static str,
    /// Hint for upstream entity selection; `None` when the vendor serves
    /// both businesses.
    pub typical_entity: Option<EntityKind>,
    /// Known annual spend; breaks score ties, highest first.
    pub annual_spend: Decimal,
    /// Default payment terms when the vendor issues bills.
    pub payment_terms: Option<&'static str>,
    /// At least one name marker must match for the vendor to score at all.
    name_markers: Vec<Regex>,
    tax_id_markers: Vec<Regex>,
    format_markers: Vec<Regex>,
    slogan_markers: Vec<Regex>,
    brand_markers: Vec<Regex>,
}

impl VendorProfile {
    /// Scores this profile against case-folded OCR text. Returns `None`
    /// when no name marker matches.
    #[must_use]
    pub fn score(&self, text_upper: &str) -> Option<u32> {
        if !any_match(&self.name_markers, text_upper) {
            return None;
        }
        let mut score = WEIGHT_NAME;
        if any_match(&self.tax_id_markers, text_upper) {
            score += WEIGHT_TAX_ID;
        }
        if any_match(&self.format_markers, text_upper) {
            score += WEIGHT_FORMAT;
        }
        if any_match(&self.slogan_markers, text_upper) {
            score += WEIGHT_SLOGAN;
        }
        if any_match(&self.brand_markers, text_upper) {
            score += WEIGHT_BRAND;
        }
        Some(score)
    }
}

fn any_match(markers: &[Regex], text: &str) -> bool {
    markers.iter().any(|marker| marker.is_match(text))
}

fn patterns(raw: &[&str]) -> Vec<Regex> {
    raw.iter()
        .map(|p| Regex::new(p).expect("registry marker pattern"))
        .collect()
}

static REGISTRY: Lazy<Vec<VendorProfile>> = Lazy::new(|| {
    vec![
        VendorProfile {
            key: "grosnor",
            canonical_name: "Grosnor Distribution",
            typical_entity: Some(EntityKind::Soleprop),
            annual_spend: Decimal::new(65_425_36, 2),
            payment_terms: None,
            name_markers: patterns(&[r"GROSNOR"]),
            tax_id_markers: patterns(&[]),
            format_markers: patterns(&[
                r"INVOICE NO\.",
                r"\(\d+/\d+(?:/\d+)?\)",
                r"\(UPC\s+\d+\)",
                r"\(SRP\$[\d.]+\)",
            ]),
            slogan_markers: patterns(&[r"GROSNOR\.COM"]),
            brand_markers: patterns(&[]),
        },
        VendorProfile {
            key: "costco",
            canonical_name: "Costco Wholesale",
            typical_entity: None,
            annual_spend: Decimal::new(47_431_07, 2),
            payment_terms: None,
            name_markers: patterns(&[r"COSTCO", r"COSTCO\s+WHOLESALE", r"COSTCO\.(CA|COM)"]),
            tax_id_markers: patterns(&[]),
            format_markers: patterns(&[r"MEMBER\s*#?\s*\d{12}", r"TPD/", r"\*{2,}\s*TOTAL"]),
            slogan_markers: patterns(&[r"WHOLESALE"]),
            brand_markers: patterns(&[r"KIRKLAND"]),
        },
        VendorProfile {
            key: "gfs",
            canonical_name: "Gordon Food Service",
            typical_entity: Some(EntityKind::Corp),
            annual_spend: Decimal::new(40_619_82, 2),
            payment_terms: Some("Net 14"),
            name_markers: patterns(&[
                r"GORDON\s+FOOD\s+SERVICE",
                r"GFS\s+CANADA",
                r"GFSCANADA\.COM",
            ]),
            tax_id_markers: patterns(&[]),
            format_markers: patterns(&[r"INVOICE\s+\d{10}", r"PRODUCT TOTAL", r"\b(GR|FR|DY|DS)\b"]),
            slogan_markers: patterns(&[]),
            brand_markers: patterns(&[]),
        },
        VendorProfile {
            key: "superstore",
            canonical_name: "Atlantic Superstore",
            typical_entity: Some(EntityKind::Corp),
            annual_spend: Decimal::new(8_376_08, 2),
            payment_terms: None,
            name_markers: patterns(&[r"ATLANTIC\s+SUPERSTORE", r"\bSUPERSTORE\b", r"LOBLAW"]),
            tax_id_markers: patterns(&[]),
            format_markers: patterns(&[r"\bH?MRJ\b"]),
            slogan_markers: patterns(&[]),
            brand_markers: patterns(&[r"PC\s+OPTIMUM", r"NO\s+NAME"]),
        },
        VendorProfile {
            key: "pepsi",
            canonical_name: "PepsiCo Canada",
            typical_entity: Some(EntityKind::Corp),
            annual_spend: Decimal::new(6_244_62, 2),
            payment_terms: Some("Charge-PAD 15th next month"),
            // Company and invoice context is required; bare 69000 UPC
            // prefixes are only a brand marker and can never clear the
            // threshold on their own.
            name_markers: patterns(&[
                r"PEPSICO\s+CANADA",
                r"PEPSI.*BEVERAGES",
                r"BEVERAGES.*BREUVAGES",
            ]),
            tax_id_markers: patterns(&[]),
            format_markers: patterns(&[
                r"INVOICE\s+DETAILS",
                r"INVOICE\s+SUMMARY",
                r"ITEM\s+DETAIL",
                r"ROUTE\s*#?\s*\d+",
            ]),
            slogan_markers: patterns(&[]),
            brand_markers: patterns(&[r"69000\d{6}"]),
        },
        VendorProfile {
            key: "pharmasave",
            canonical_name: "MacQuarries Pharmasave",
            typical_entity: None,
            annual_spend: Decimal::new(3_241_40, 2),
            payment_terms: None,
            name_markers: patterns(&[r"PHARMASAVE", r"MACQUARRIES"]),
            tax_id_markers: patterns(&[r"865378210"]),
            format_markers: patterns(&[r"RECEIPT:\s*[A-Z0-9]+", r"SUB\s+TOTAL"]),
            slogan_markers: patterns(&[]),
            brand_markers: patterns(&[]),
        },
        VendorProfile {
            key: "walmart",
            canonical_name: "Walmart",
            typical_entity: None,
            annual_spend: Decimal::new(2_975_36, 2),
            payment_terms: None,
            name_markers: patterns(&[r"\bWALMART\b", r"WAL-MART"]),
            tax_id_markers: patterns(&[r"137466199"]),
            format_markers: patterns(&[r"\bTC#", r"\bTR#", r"\bTRANS\s*#"]),
            slogan_markers: patterns(&[r"SAVE\s+MONEY\.?\s+LIVE\s+BETTER"]),
            brand_markers: patterns(&[r"GREAT\s+VALUE", r"EQUATE"]),
        },
    ]
});

/// All registered vendors, priority order by annual spend.
#[must_use]
pub fn registry() -> &'static [VendorProfile] {
    &REGISTRY
}

/// Looks up a profile by its dispatch key.
#[must_use]
pub fn find(key: &str) -> Option<&'static VendorProfile> {
    REGISTRY.iter().find(|profile| profile.key == key)
}

/// Identifies the vendor for a piece of OCR text, or `None` when no vendor
/// reaches the acceptance threshold (the caller falls back to the generic
/// parser and records a `vendor_unknown` warning).
#[must_use]
pub fn identify(text: &str) -> Option<&'static VendorProfile> {
    let text_upper = text.to_uppercase();

    let mut best: Option<(&'static VendorProfile, u32)> = None;
    for profile in REGISTRY.iter() {
        let Some(score) = profile.score(&text_upper) else {
            continue;
        };
        if score < ACCEPT_THRESHOLD {
            continue;
        }
        let better = match best {
            None => true,
            // Ties break by priority order: highest annual spend first.
            Some((current, current_score)) => {
                score > current_score
                    || (score == current_score && profile.annual_spend > current.annual_spend)
            }
        };
        if better {
            best = Some((profile, score));
        }
    }

    if let Some((profile, score)) = best {
        tracing::info!(vendor = profile.key, score, "vendor_identified");
        Some(profile)
    } else {
        tracing::info!("vendor_not_identified");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walmart_receipt_with_pepsi_upcs_routes_to_walmart() {
        // Five PepsiCo GS1-prefixed UPCs, but the header is unmistakably
        // Walmart: name + tax id + receipt-format markers.
        let text = "WALMART SUPERCENTRE\n\
                    GST/HST 137466199\n\
                    TC# 1234 5678 9012\n\
                    BUBLY LIME 069000149180 $5.97 J\n\
                    PEPSI 24PK 069000123457 $8.97 J\n\
                    MTN DEW 069000987651 $2.50 J\n\
                    GATORADE 069000555111 $1.88 J\n\
                    7UP 2L 069000444222 $2.47 J\n";

        let profile = identify(text).unwrap();
        assert_eq!(profile.key, "walmart");
        let score = profile.score(&text.to_uppercase()).unwrap();
        assert!(score >= 22, "expected name+tax+format, got {score}");

        // Pepsi never even scores: its name markers are absent.
        let pepsi = find("pepsi").unwrap();
        assert_eq!(pepsi.score(&text.to_uppercase()), None);
    }

    #[test]
    fn pepsi_invoice_with_context_is_identified() {
        let text = "PEPSICO CANADA BEVERAGES\n\
                    INVOICE # 51314455\n\
                    Route #: 8232\n\
                    ITEM DETAIL\n\
                    PEPSI 0-69000-00991-8 T 97.00 5 120 35.91 179.55\n";
        assert_eq!(identify(text).unwrap().key, "pepsi");
    }

    #[test]
    fn costco_receipt_is_identified() {
        let text = "COSTCO WHOLESALE\nMember 111222333444\n306657 GATORADE 65.97 Y";
        assert_eq!(identify(text).unwrap().key, "costco");
    }

    #[test]
    fn unknown_text_returns_none() {
        assert!(identify("CORNER STORE\nTOTAL 4.20").is_none());
    }

    #[test]
    fn registry_markers_are_location_independent() {
        // No profile may key on street addresses, phone numbers or store
        // numbers; spot-check that no marker contains digits shaped like a
        // phone number.
        let phone = Regex::new(r"\d{3}[- ]\d{4}").unwrap();
        for profile in registry() {
            for marker in profile
                .name_markers
                .iter()
                .chain(&profile.format_markers)
                .chain(&profile.slogan_markers)
            {
                assert!(
                    !phone.is_match(marker.as_str()),
                    "{} marker {:?} looks location-bound",
                    profile.key,
                    marker.as_str()
                );
            }
        }
    }
}
