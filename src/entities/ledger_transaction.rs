//! Ledger transaction entity - immutable history of balance movements.
//!
//! Rows are inserted once and never updated. `balance_after` records the
//! balance that resulted from applying `delta`, which makes the log
//! self-auditing. `campaign_id` is a plain column rather than a foreign key so
//! that deleting a campaign never rewrites the ledger.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Ledger transaction model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "ledger_transactions")]
pub struct Model {
    /// Unique, monotonically increasing identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Seller whose balance moved
    pub seller_id: i64,
    /// Signed change (negative for debits)
    pub delta: i64,
    /// Machine-readable reason, e.g. `"campaign_payment"` or `"free_signup"`
    pub reason: String,
    /// Balance immediately after this transaction
    pub balance_after: i64,
    /// Campaign this movement paid for, if any
    pub campaign_id: Option<i64>,
    /// Charge identifier from the external payment provider, if any
    pub external_charge_id: Option<String>,
    /// When the transaction was written
    pub created_at: DateTimeUtc,
}

/// Each transaction belongs to one seller
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
