//! Subscription entity - opt-in state of one customer for one shop.
//!
//! Only rows with status `subscribed` are recipients at fan-out time.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Opt-in state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum SubscriptionStatus {
    /// Receives campaigns
    #[sea_orm(string_value = "subscribed")]
    Subscribed,
    /// Opted out
    #[sea_orm(string_value = "unsubscribed")]
    Unsubscribed,
}

/// Subscription database model, keyed by (shop, customer)
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subscriptions")]
pub struct Model {
    /// Shop half of the key
    #[sea_orm(primary_key, auto_increment = false)]
    pub shop_id: i64,
    /// Customer half of the key
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: i64,
    /// Current opt-in state
    pub status: SubscriptionStatus,
    /// Last transition to `subscribed`
    pub subscribed_at: Option<DateTimeUtc>,
    /// Last transition to `unsubscribed`
    pub unsubscribed_at: Option<DateTimeUtc>,
}

/// A subscription links a shop and a customer
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Shop the customer opted in to
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id",
        on_delete = "Cascade"
    )]
    Shop,
    /// The opted-in customer
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id",
        on_delete = "Cascade"
    )]
    Customer,
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
