//! Shop entity - the sending identity a campaign is delivered under.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Shop database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "shops")]
pub struct Model {
    /// Unique identifier for the shop
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Seller that owns and pays for this shop
    pub seller_id: i64,
    /// Display name
    pub name: String,
    /// Free-form category (e.g. "coffee", "books")
    pub category: String,
    /// Inactive shops keep their data but cannot start new sends
    pub is_active: bool,
    /// When the shop was created
    pub created_at: DateTimeUtc,
}

/// Each shop belongs to one seller
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning seller
    #[sea_orm(
        belongs_to = "super::seller::Entity",
        from = "Column::SellerId",
        to = "super::seller::Column::Id"
    )]
    Seller,
}

impl Related<super::seller::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seller.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
