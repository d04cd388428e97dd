//! Product mapping entity - the durable categorization cache.
//!
//! Shared across both business entities: the same vendor SKU means the same
//! product regardless of who bought it. Unique on `(vendor_canonical, sku)`
//! via an explicit index (see `config::database::create_tables`). Entries
//! are never deleted by the pipeline.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_mappings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Canonical vendor name from the registry
    pub vendor_canonical: String,
    /// Vendor SKU code; a line without a SKU is never cached
    pub sku: String,
    pub normalized_description: String,
    pub product_category: String,
    pub account_code: String,
    pub brand: Option<String>,
    /// 1.0 after a human correction, otherwise the model confidence at
    /// write time
    pub user_confidence: f64,
    pub times_seen: i32,
    pub first_seen: DateTime,
    pub last_seen: DateTime,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
