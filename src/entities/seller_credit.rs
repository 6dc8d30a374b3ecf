//! Seller credit entity - the current prepaid balance of a seller.
//!
//! One row per seller. The balance is only ever changed together with an
//! inserted ledger transaction, so it always equals the running sum of deltas.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger balance model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "seller_credits")]
pub struct Model {
    /// Owning seller; also the primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub seller_id: i64,
    /// Available credits, never negative
    pub balance: i64,
    /// Last time the balance moved
    pub updated_at: DateTimeUtc,
}

/// Each balance row belongs to one seller
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning seller
    #[sea_orm(
        belongs_to = "super::seller::Entity",
        from = "Column::SellerId",
        to = "super::seller::Column::Id",
        on_delete = "Cascade"
    )]
    Seller,
}

impl Related<super::seller::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Seller.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
