//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod product_mapping;
pub mod receipt;
pub mod receipt_line;
pub mod review_activity;

// Re-export specific types to avoid conflicts
pub use product_mapping::{
    Column as ProductMappingColumn, Entity as ProductMapping, Model as ProductMappingModel,
};
pub use receipt::{Column as ReceiptColumn, Entity as Receipt, Model as ReceiptModel};
pub use receipt_line::{
    Column as ReceiptLineColumn, Entity as ReceiptLine, Model as ReceiptLineModel,
};
pub use review_activity::{
    Column as ReviewActivityColumn, Entity as ReviewActivity, Model as ReviewActivityModel,
};
