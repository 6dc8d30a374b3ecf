//! Customer entity - a person who may opt in to one or more shops.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Customer database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Unique identifier for the customer
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Identity on the messaging platform; messages are addressed to it
    #[sea_orm(unique)]
    pub external_user_id: String,
    /// Optional profile fields
    pub first_name: Option<String>,
    /// Optional profile fields
    pub last_name: Option<String>,
    /// Optional profile fields
    pub phone: Option<String>,
    /// When the customer first appeared
    pub created_at: DateTimeUtc,
}

/// Customers are referenced by subscriptions, deliveries and clicks
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
