//! Fan-out - materializes one delivery row per subscribed recipient.
//!
//! The recipient snapshot, the row inserts, `total_recipients` and the
//! `paid -> sending` transition commit together, so a campaign is never seen
//! in `sending` with a partially populated queue. Re-running fan-out is a
//! no-op: a campaign with `fanned_out_at` set is returned untouched, and the
//! unique `(campaign_id, customer_id)` index makes the inserts themselves
//! idempotent.

use crate::{
    core::{
        campaign::{find_campaign, get_campaign_for_seller},
        registry,
    },
    entities::{Campaign, CampaignStatus, Delivery, DeliveryStatus, Shop, campaign, delivery},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use tracing::{info, instrument};

/// Rows per INSERT statement, well under SQLite's bound-parameter limit.
const INSERT_CHUNK: usize = 500;

/// Starts sending a paid campaign.
///
/// Moves the campaign to `sending`, or straight to `completed` when the shop
/// has no subscribed customers, and returns the updated campaign.
///
/// # Errors
/// * [`Error::InvalidTransition`] - campaign is not `paid` and was never fanned out
/// * [`Error::ShopInactive`] - the shop has been deactivated
#[instrument(skip(db))]
pub async fn start_sending(db: &DatabaseConnection, campaign_id: i64) -> Result<campaign::Model> {
    let txn = db.begin().await?;
    let campaign = find_campaign(&txn, campaign_id).await?;

    if campaign.fanned_out_at.is_some() {
        return Ok(campaign);
    }
    if campaign.status != CampaignStatus::Paid {
        return Err(Error::InvalidTransition {
            campaign_id,
            from: campaign.status,
            to: CampaignStatus::Sending,
        });
    }

    let shop = Shop::find_by_id(campaign.shop_id)
        .one(&txn)
        .await?
        .ok_or(Error::ShopNotFound {
            shop_id: campaign.shop_id,
        })?;
    if !shop.is_active {
        return Err(Error::ShopInactive { shop_id: shop.id });
    }

    let recipients = registry::subscribed_customers(&txn, shop.id).await?;
    let now = Utc::now();

    for chunk in recipients.chunks(INSERT_CHUNK) {
        let rows = chunk.iter().map(|&customer_id| delivery::ActiveModel {
            campaign_id: Set(campaign_id),
            customer_id: Set(customer_id),
            status: Set(DeliveryStatus::Pending),
            attempt_count: Set(0),
            next_attempt_at: Set(now),
            claim_token: Set(None),
            last_error: Set(None),
            sent_at: Set(None),
            external_message_id: Set(None),
            created_at: Set(now),
            ..Default::default()
        });

        Delivery::insert_many(rows)
            .on_conflict(
                OnConflict::columns([delivery::Column::CampaignId, delivery::Column::CustomerId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;
    }

    let total = i64::try_from(
        Delivery::find()
            .filter(delivery::Column::CampaignId.eq(campaign_id))
            .count(&txn)
            .await?,
    )
    .unwrap_or(i64::MAX);

    let (status, completed_at) = if total == 0 {
        (CampaignStatus::Completed, Some(now))
    } else {
        (CampaignStatus::Sending, None)
    };

    let updated = Campaign::update_many()
        .set(campaign::ActiveModel {
            status: Set(status),
            total_recipients: Set(total),
            fanned_out_at: Set(Some(now)),
            completed_at: Set(completed_at),
            ..Default::default()
        })
        .filter(campaign::Column::Id.eq(campaign_id))
        .filter(campaign::Column::Status.eq(CampaignStatus::Paid))
        .exec(&txn)
        .await?;
    if updated.rows_affected == 0 {
        let current = find_campaign(&txn, campaign_id).await?;
        return Err(Error::InvalidTransition {
            campaign_id,
            from: current.status,
            to: status,
        });
    }

    let started = find_campaign(&txn, campaign_id).await?;
    txn.commit().await?;

    info!(campaign_id, shop_id = shop.id, total, status = %status, "Campaign fanned out");
    Ok(started)
}

/// Starts sending on behalf of a seller, who must own the campaign's shop.
///
/// # Errors
/// Same as [`start_sending`]; a campaign of another seller is
/// [`Error::CampaignNotFound`].
#[instrument(skip(db))]
pub async fn start_sending_for_seller(
    db: &DatabaseConnection,
    seller_id: i64,
    campaign_id: i64,
) -> Result<campaign::Model> {
    if get_campaign_for_seller(db, seller_id, campaign_id).await?.is_none() {
        return Err(Error::CampaignNotFound { campaign_id });
    }
    start_sending(db, campaign_id).await
}
