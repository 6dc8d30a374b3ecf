//! Campaign entity - marketing content, lifecycle state and aggregate counters.
//!
//! The five counters are derived data: each one equals the number of delivery
//! rows in the matching terminal state (clicks for `click_count`). They are
//! only moved by atomic `col = col + 1` updates issued in the same database
//! transaction as the row change they summarize.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Campaign lifecycle state
///
/// ```text
/// draft -> awaiting_payment -> paid -> sending -> completed
///   \___________\_______________\---> canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum CampaignStatus {
    /// Being authored
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Submitted, waiting for the seller to pay
    #[sea_orm(string_value = "awaiting_payment")]
    AwaitingPayment,
    /// Paid, not yet fanned out
    #[sea_orm(string_value = "paid")]
    Paid,
    /// Deliveries exist and are being drained
    #[sea_orm(string_value = "sending")]
    Sending,
    /// No delivery remains pending
    #[sea_orm(string_value = "completed")]
    Completed,
    /// Abandoned before sending started
    #[sea_orm(string_value = "canceled")]
    Canceled,
}

impl CampaignStatus {
    /// Stable lowercase name, identical to the stored value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Paid => "paid",
            Self::Sending => "sending",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    /// `completed` and `canceled` admit no further transition
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// `paid -> completed` is the empty fan-out shortcut.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::AwaitingPayment)
                | (Self::AwaitingPayment, Self::Paid)
                | (Self::Paid, Self::Sending | Self::Completed)
                | (Self::Sending, Self::Completed)
                | (Self::Draft | Self::AwaitingPayment | Self::Paid, Self::Canceled)
        )
    }
}

impl fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Campaign database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "campaigns")]
pub struct Model {
    /// Unique identifier for the campaign
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Shop the campaign is sent on behalf of
    pub shop_id: i64,
    /// Lifecycle state
    pub status: CampaignStatus,
    /// Message body
    pub text: String,
    /// Optional button label (present together with `button_url`)
    pub button_title: Option<String>,
    /// Optional button target (present together with `button_title`)
    pub button_url: Option<String>,
    /// Optional image reference understood by the sender
    pub image_ref: Option<String>,
    /// Price in ledger credits
    pub price: i64,
    /// Number of deliveries created at fan-out
    pub total_recipients: i64,
    /// Deliveries in `sent`
    pub sent_count: i64,
    /// Deliveries in terminal `failed`
    pub failed_count: i64,
    /// Deliveries in `blocked`
    pub blocked_count: i64,
    /// Unique recipients that clicked
    pub click_count: i64,
    /// Payment provider charge recorded by `mark_paid`
    pub external_charge_id: Option<String>,
    /// When the draft was created
    pub created_at: DateTimeUtc,
    /// When payment was confirmed
    pub paid_at: Option<DateTimeUtc>,
    /// When fan-out happened; set exactly once
    pub fanned_out_at: Option<DateTimeUtc>,
    /// When the queue drained
    pub completed_at: Option<DateTimeUtc>,
    /// When the campaign was canceled
    pub canceled_at: Option<DateTimeUtc>,
}

/// Each campaign belongs to one shop
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Sending shop
    #[sea_orm(
        belongs_to = "super::shop::Entity",
        from = "Column::ShopId",
        to = "super::shop::Column::Id"
    )]
    Shop,
}

impl Related<super::shop::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shop.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
