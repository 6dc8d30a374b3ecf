//! Delivery entity - one row per (campaign, customer); the unit of queued work.
//!
//! A row is eligible for dequeue while `status = pending` and
//! `next_attempt_at <= now`. Claiming moves `next_attempt_at` forward by the
//! lease window and stamps `claim_token`, so an abandoned claim becomes
//! eligible again on its own once the lease runs out.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Delivery state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum DeliveryStatus {
    /// Waiting for (another) attempt
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Accepted by the messaging platform
    #[sea_orm(string_value = "sent")]
    Sent,
    /// Retry budget exhausted
    #[sea_orm(string_value = "failed")]
    Failed,
    /// Recipient blocked the sender or is unknown to the platform
    #[sea_orm(string_value = "blocked")]
    Blocked,
}

impl DeliveryStatus {
    /// `sent`, `failed` and `blocked` are final
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Delivery database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deliveries")]
pub struct Model {
    /// Row id; breaks ties in dequeue order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Owning campaign
    pub campaign_id: i64,
    /// Recipient
    pub customer_id: i64,
    /// Current state
    pub status: DeliveryStatus,
    /// Attempts processed so far
    pub attempt_count: i32,
    /// Earliest instant the row may be claimed
    pub next_attempt_at: DateTimeUtc,
    /// Token of the worker currently holding the lease
    pub claim_token: Option<String>,
    /// Most recent failure description
    pub last_error: Option<String>,
    /// When the platform accepted the message (or the row became terminal)
    pub sent_at: Option<DateTimeUtc>,
    /// Message identifier assigned by the platform
    pub external_message_id: Option<String>,
    /// When fan-out created the row
    pub created_at: DateTimeUtc,
}

/// Each delivery belongs to a campaign and a customer
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning campaign; deleting it deletes the row
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id",
        on_delete = "Cascade"
    )]
    Campaign,
    /// Recipient
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
}

impl Related<super::campaign::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Campaign.def()
    }
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
