//! Database connection and table creation using `SeaORM`.
//!
//! Tables are generated from the entity definitions via
//! `Schema::create_table_from_entity`, so the database schema always matches
//! the Rust struct definitions. The composite unique index that backs cache
//! upserts and the warning filter index cannot be expressed on the entities
//! and are created with explicit statements.

use crate::entities::{ProductMapping, Receipt, ReceiptLine, ReviewActivity};
use crate::errors::Result;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Schema, Statement};

/// Gets the database URL from environment variable or returns the default
/// local `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://data/ledgerbox.sqlite?mode=rwc".to_string())
}

/// Establishes a connection using `DATABASE_URL`, falling back to a local
/// `SQLite` file.
///
/// # Errors
/// Returns an error when the connection cannot be established.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(get_database_url()).await.map_err(Into::into)
}

/// Creates all tables and indexes if they do not exist yet.
///
/// # Errors
/// Returns an error when a statement fails to execute.
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let mut receipt_table = schema.create_table_from_entity(Receipt);
    let mut line_table = schema.create_table_from_entity(ReceiptLine);
    let mut mapping_table = schema.create_table_from_entity(ProductMapping);
    let mut activity_table = schema.create_table_from_entity(ReviewActivity);

    db.execute(builder.build(receipt_table.if_not_exists())).await?;
    db.execute(builder.build(line_table.if_not_exists())).await?;
    db.execute(builder.build(mapping_table.if_not_exists())).await?;
    db.execute(builder.build(activity_table.if_not_exists())).await?;

    // Cache upserts rely on this; concurrent writers for the same key are
    // linearized by it.
    db.execute(Statement::from_string(
        builder,
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_product_mappings_vendor_sku \
         ON product_mappings (vendor_canonical, sku)",
    ))
    .await?;

    db.execute(Statement::from_string(
        builder,
        "CREATE INDEX IF NOT EXISTS idx_receipt_lines_review \
         ON receipt_lines (entity, requires_review)",
    ))
    .await?;

    // Fast "has any warning" filtering for the review surface.
    db.execute(Statement::from_string(
        builder,
        "CREATE INDEX IF NOT EXISTS idx_receipts_has_warnings \
         ON receipts (entity) WHERE json_array_length(validation_warnings) > 0",
    ))
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{receipt, receipt_line};
    use sea_orm::{EntityTrait, QuerySelect};

    #[tokio::test]
    async fn test_create_tables() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;

        // Tables exist and are queryable
        let _: Vec<receipt::Model> = Receipt::find().limit(1).all(&db).await?;
        let _: Vec<receipt_line::Model> = ReceiptLine::find().limit(1).all(&db).await?;
        let _ = ProductMapping::find().limit(1).all(&db).await?;
        let _ = ReviewActivity::find().limit(1).all(&db).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_create_tables_is_idempotent() -> Result<()> {
        let db = Database::connect("sqlite::memory:").await?;
        create_tables(&db).await?;
        create_tables(&db).await?;
        Ok(())
    }
}
