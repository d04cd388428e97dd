//! Review activity entity - append-only audit log of review actions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "review_activity")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    /// Stable reviewable id, e.g. `receipt_line:corp:<uuid>`
    pub reviewable_id: String,
    pub reviewable_type: String,
    pub entity: String,
    /// approve, reject, correct, snooze, needs_info
    pub action: String,
    pub performed_by: Option<String>,
    pub reason: Option<String>,
    /// Action-specific payload (e.g. the corrected categorization)
    pub payload: Option<Json>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
