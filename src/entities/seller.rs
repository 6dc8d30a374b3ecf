//! Seller entity - the paying party behind one or more shops.
//!
//! A seller owns exactly one ledger balance row (`seller_credits`) and an
//! append-only list of ledger transactions.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Seller database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sellers")]
pub struct Model {
    /// Unique identifier for the seller
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Identity on the messaging platform (e.g. a Discord user id)
    #[sea_orm(unique)]
    pub external_user_id: String,
    /// When the seller first appeared
    pub created_at: DateTimeUtc,
}

/// Sellers are referenced by balances, transactions and shops; the foreign
/// keys live on those tables.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
