//! Click tracker - at most one counted click per (campaign, customer).

use crate::{
    core::campaign::find_campaign,
    entities::{Campaign, Click, Customer, campaign, click},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::Expr, sea_query::OnConflict};
use tracing::{debug, instrument};

/// Records a click and bumps `click_count` on the first click of the pair.
///
/// Returns `true` when this call recorded the click, `false` for a repeat.
#[instrument(skip(db))]
pub async fn record_click(db: &DatabaseConnection, campaign_id: i64, customer_id: i64) -> Result<bool> {
    let txn = db.begin().await?;
    find_campaign(&txn, campaign_id).await?;
    if Customer::find_by_id(customer_id).one(&txn).await?.is_none() {
        return Err(Error::CustomerNotFound { customer_id });
    }

    let inserted = Click::insert(click::ActiveModel {
        campaign_id: Set(campaign_id),
        customer_id: Set(customer_id),
        clicked_at: Set(Utc::now()),
    })
    .on_conflict(
        OnConflict::columns([click::Column::CampaignId, click::Column::CustomerId])
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&txn)
    .await?;

    if inserted == 0 {
        debug!(campaign_id, customer_id, "Repeat click ignored");
        return Ok(false);
    }

    Campaign::update_many()
        .col_expr(
            campaign::Column::ClickCount,
            Expr::col(campaign::Column::ClickCount).add(1),
        )
        .filter(campaign::Column::Id.eq(campaign_id))
        .exec(&txn)
        .await?;

    txn.commit().await?;
    Ok(true)
}
