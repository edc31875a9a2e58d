//! Rate limit counter entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Fixed-window counter for one `scope:identity` key.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_limits")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,

    /// Requests counted in the current window, saturating at the limit.
    pub count: i32,

    /// When the current window ends.
    pub reset_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
