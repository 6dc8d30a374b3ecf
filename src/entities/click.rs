//! Click entity - at most one recorded click per (campaign, customer).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Click database model; the composite key enforces uniqueness
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clicks")]
pub struct Model {
    /// Clicked campaign
    #[sea_orm(primary_key, auto_increment = false)]
    pub campaign_id: i64,
    /// Clicking customer
    #[sea_orm(primary_key, auto_increment = false)]
    pub customer_id: i64,
    /// First click time
    pub clicked_at: DateTimeUtc,
}

/// Each click belongs to a campaign and a customer
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Owning campaign; deleting it deletes the click
    #[sea_orm(
        belongs_to = "super::campaign::Entity",
        from = "Column::CampaignId",
        to = "super::campaign::Column::Id",
        on_delete = "Cascade"
    )]
    Campaign,
    /// Clicking customer
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
