//! Campaign business logic - authoring, the lifecycle state machine, payment
//! and completion.
//!
//! Every transition is a conditional update guarded by the state it leaves
//! (`UPDATE ... WHERE id = ? AND status = <from>`). When the guard matches no
//! row the campaign is re-read and the caller gets
//! [`Error::InvalidTransition`] naming the state it actually found, so a
//! transition raced by another writer fails visibly and changes nothing.

use crate::{
    core::{ledger, shop},
    entities::{
        Campaign, CampaignStatus, Click, Delivery, DeliveryStatus, Shop, campaign, click,
        delivery, shop as shop_entity,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use tracing::{debug, info, instrument, warn};

/// Optional call-to-action attached to a campaign message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    /// Label shown to the recipient
    pub title: String,
    /// Destination opened on click
    pub url: String,
}

/// Message content of a new campaign
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignContent {
    /// Message body, required
    pub text: String,
    /// Optional link button
    pub button: Option<Button>,
    /// Optional image reference (URL or platform file id)
    pub image_ref: Option<String>,
}

impl CampaignContent {
    /// Plain text campaign without button or image.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            button: None,
            image_ref: None,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(Error::InvalidContent {
                message: "text must not be empty".to_string(),
            });
        }
        if let Some(button) = &self.button {
            if button.title.trim().is_empty() || button.url.trim().is_empty() {
                return Err(Error::InvalidContent {
                    message: "button title and URL must be given together".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Payment notification handed over by the external payment flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// Credits confirmed by the payment flow; must equal the campaign price
    pub amount: i64,
    /// Charge identifier of the payment provider
    pub external_charge_id: String,
}

/// Counters of a campaign plus the number of rows still queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CampaignStats {
    /// Lifecycle state
    pub status: CampaignStatus,
    /// Rows created by fan-out
    pub total_recipients: i64,
    /// Rows delivered
    pub sent: i64,
    /// Rows that exhausted their attempts
    pub failed: i64,
    /// Rows whose recipient cannot be reached
    pub blocked: i64,
    /// Unique recipients who clicked
    pub clicks: i64,
    /// Rows still queued
    pub pending: u64,
}

/// Creates a campaign in `draft` for a shop.
///
/// # Errors
/// * [`Error::InvalidContent`] - empty text, or a button without title/URL
/// * [`Error::InvalidAmount`] - price is not positive
/// * [`Error::ShopNotFound`] - unknown shop
#[instrument(skip(db, content))]
pub async fn create_draft(
    db: &DatabaseConnection,
    shop_id: i64,
    content: CampaignContent,
    price: i64,
) -> Result<campaign::Model> {
    content.validate()?;
    if price <= 0 {
        return Err(Error::InvalidAmount { amount: price });
    }
    if Shop::find_by_id(shop_id).one(db).await?.is_none() {
        return Err(Error::ShopNotFound { shop_id });
    }

    let (button_title, button_url) = content
        .button
        .map_or((None, None), |b| (Some(b.title), Some(b.url)));

    let campaign = campaign::ActiveModel {
        shop_id: Set(shop_id),
        status: Set(CampaignStatus::Draft),
        text: Set(content.text),
        button_title: Set(button_title),
        button_url: Set(button_url),
        image_ref: Set(content.image_ref),
        price: Set(price),
        total_recipients: Set(0),
        sent_count: Set(0),
        failed_count: Set(0),
        blocked_count: Set(0),
        click_count: Set(0),
        external_charge_id: Set(None),
        created_at: Set(Utc::now()),
        paid_at: Set(None),
        fanned_out_at: Set(None),
        completed_at: Set(None),
        canceled_at: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(campaign_id = campaign.id, shop_id, price, "Created campaign draft");
    Ok(campaign)
}

/// Creates a draft on behalf of a seller, who must own the shop.
///
/// # Errors
/// Same as [`create_draft`]; a shop of another seller is
/// [`Error::ShopNotFound`].
#[instrument(skip(db, content))]
pub async fn create_seller_draft(
    db: &DatabaseConnection,
    seller_id: i64,
    shop_id: i64,
    content: CampaignContent,
    price: i64,
) -> Result<campaign::Model> {
    shop::find_owned_shop(db, seller_id, shop_id).await?;
    create_draft(db, shop_id, content, price).await
}

pub(crate) async fn find_campaign<C: ConnectionTrait>(
    conn: &C,
    campaign_id: i64,
) -> Result<campaign::Model> {
    Campaign::find_by_id(campaign_id)
        .one(conn)
        .await?
        .ok_or(Error::CampaignNotFound { campaign_id })
}

/// Moves a campaign from `from` to `to`, applying `changes` in the same update.
///
/// `changes` must leave `status` unset; it carries the timestamps and other
/// fields that belong to the transition.
pub(crate) async fn transition_in<C: ConnectionTrait>(
    conn: &C,
    campaign_id: i64,
    from: CampaignStatus,
    to: CampaignStatus,
    mut changes: campaign::ActiveModel,
) -> Result<()> {
    if !from.can_transition_to(to) {
        return Err(Error::InvalidTransition {
            campaign_id,
            from,
            to,
        });
    }

    changes.status = Set(to);
    let updated = Campaign::update_many()
        .set(changes)
        .filter(campaign::Column::Id.eq(campaign_id))
        .filter(campaign::Column::Status.eq(from))
        .exec(conn)
        .await?;

    if updated.rows_affected == 0 {
        let current = find_campaign(conn, campaign_id).await?;
        return Err(Error::InvalidTransition {
            campaign_id,
            from: current.status,
            to,
        });
    }

    debug!(campaign_id, %from, %to, "Campaign transitioned");
    Ok(())
}

/// Submits a draft for payment: `draft -> awaiting_payment`.
#[instrument(skip(db))]
pub async fn submit(db: &DatabaseConnection, campaign_id: i64) -> Result<campaign::Model> {
    let current = find_campaign(db, campaign_id).await?;
    transition_in(
        db,
        campaign_id,
        current.status,
        CampaignStatus::AwaitingPayment,
        campaign::ActiveModel {
            ..Default::default()
        },
    )
    .await?;
    find_campaign(db, campaign_id).await
}

/// Cancels a campaign that has not started sending.
#[instrument(skip(db))]
pub async fn cancel(db: &DatabaseConnection, campaign_id: i64) -> Result<campaign::Model> {
    let current = find_campaign(db, campaign_id).await?;
    transition_in(
        db,
        campaign_id,
        current.status,
        CampaignStatus::Canceled,
        campaign::ActiveModel {
            canceled_at: Set(Some(Utc::now())),
            ..Default::default()
        },
    )
    .await?;
    info!(campaign_id, "Campaign canceled");
    find_campaign(db, campaign_id).await
}

/// Records a confirmed payment: `awaiting_payment -> paid`.
///
/// In one transaction the campaign price is debited from the owning seller's
/// ledger (linked to the campaign and the charge), and the campaign records
/// the charge id and `paid_at`. Any failure rolls back both, so the seller is
/// charged exactly once per paid campaign. Replaying the same confirmation for
/// a campaign already past payment returns it unchanged.
///
/// # Errors
/// * [`Error::PriceMismatch`] - amount differs from the campaign price
/// * [`Error::InsufficientCredit`] - seller balance below the price; campaign
///   stays in `awaiting_payment`
/// * [`Error::InvalidTransition`] - campaign is not awaiting payment
#[instrument(skip(db, payment), fields(charge = %payment.external_charge_id))]
pub async fn mark_paid(
    db: &DatabaseConnection,
    campaign_id: i64,
    payment: PaymentConfirmation,
) -> Result<campaign::Model> {
    let txn = db.begin().await?;
    let campaign = find_campaign(&txn, campaign_id).await?;

    let already_paid = matches!(
        campaign.status,
        CampaignStatus::Paid | CampaignStatus::Sending | CampaignStatus::Completed
    );
    if already_paid
        && campaign.external_charge_id.as_deref() == Some(payment.external_charge_id.as_str())
    {
        debug!(campaign_id, "Payment already recorded");
        return Ok(campaign);
    }
    if campaign.status != CampaignStatus::AwaitingPayment {
        return Err(Error::InvalidTransition {
            campaign_id,
            from: campaign.status,
            to: CampaignStatus::Paid,
        });
    }
    if payment.amount != campaign.price {
        return Err(Error::PriceMismatch {
            expected: campaign.price,
            actual: payment.amount,
        });
    }

    let shop = Shop::find_by_id(campaign.shop_id)
        .one(&txn)
        .await?
        .ok_or(Error::ShopNotFound {
            shop_id: campaign.shop_id,
        })?;

    ledger::debit_in(
        &txn,
        shop.seller_id,
        campaign.price,
        ledger::REASON_CAMPAIGN_PAYMENT,
        Some(campaign_id),
        Some(payment.external_charge_id.clone()),
    )
    .await?;

    transition_in(
        &txn,
        campaign_id,
        CampaignStatus::AwaitingPayment,
        CampaignStatus::Paid,
        campaign::ActiveModel {
            external_charge_id: Set(Some(payment.external_charge_id)),
            paid_at: Set(Some(Utc::now())),
            ..Default::default()
        },
    )
    .await?;

    let paid = find_campaign(&txn, campaign_id).await?;
    txn.commit().await?;

    info!(campaign_id, seller_id = shop.seller_id, price = paid.price, "Campaign paid");
    Ok(paid)
}

/// Completes a `sending` campaign once none of its deliveries is pending.
///
/// Returns `true` only for the caller that performed the transition; a
/// campaign that still has pending rows, or was already completed by a
/// concurrent check, yields `false`.
pub async fn complete_if_drained<C: ConnectionTrait>(conn: &C, campaign_id: i64) -> Result<bool> {
    let pending = Delivery::find()
        .filter(delivery::Column::CampaignId.eq(campaign_id))
        .filter(delivery::Column::Status.eq(DeliveryStatus::Pending))
        .count(conn)
        .await?;
    if pending > 0 {
        return Ok(false);
    }

    let updated = Campaign::update_many()
        .set(campaign::ActiveModel {
            status: Set(CampaignStatus::Completed),
            completed_at: Set(Some(Utc::now())),
            ..Default::default()
        })
        .filter(campaign::Column::Id.eq(campaign_id))
        .filter(campaign::Column::Status.eq(CampaignStatus::Sending))
        .exec(conn)
        .await?;

    if updated.rows_affected > 0 {
        info!(campaign_id, "Campaign completed");
    }
    Ok(updated.rows_affected > 0)
}

/// Sweeps every `sending` campaign and completes the drained ones.
///
/// Returns the ids of the campaigns completed by this call.
#[instrument(skip(db))]
pub async fn finalize_completed_campaigns(db: &DatabaseConnection) -> Result<Vec<i64>> {
    let sending: Vec<i64> = Campaign::find()
        .select_only()
        .column(campaign::Column::Id)
        .filter(campaign::Column::Status.eq(CampaignStatus::Sending))
        .into_tuple()
        .all(db)
        .await?;

    let mut completed = Vec::new();
    for campaign_id in sending {
        if complete_if_drained(db, campaign_id).await? {
            completed.push(campaign_id);
        }
    }
    Ok(completed)
}

/// Looks up a campaign by id.
pub async fn get_campaign(
    db: &DatabaseConnection,
    campaign_id: i64,
) -> Result<Option<campaign::Model>> {
    Campaign::find_by_id(campaign_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Looks up a campaign only if it belongs to one of the seller's shops.
pub async fn get_campaign_for_seller(
    db: &DatabaseConnection,
    seller_id: i64,
    campaign_id: i64,
) -> Result<Option<campaign::Model>> {
    Campaign::find_by_id(campaign_id)
        .inner_join(Shop)
        .filter(shop_entity::Column::SellerId.eq(seller_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// The most recent campaigns across all shops of a seller, newest first.
pub async fn list_seller_campaigns(
    db: &DatabaseConnection,
    seller_id: i64,
    limit: u64,
) -> Result<Vec<campaign::Model>> {
    Campaign::find()
        .inner_join(Shop)
        .filter(shop_entity::Column::SellerId.eq(seller_id))
        .order_by_desc(campaign::Column::CreatedAt)
        .order_by_desc(campaign::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// The most recent campaigns of a shop, newest first.
pub async fn list_shop_campaigns(
    db: &DatabaseConnection,
    shop_id: i64,
    limit: u64,
) -> Result<Vec<campaign::Model>> {
    Campaign::find()
        .filter(campaign::Column::ShopId.eq(shop_id))
        .order_by_desc(campaign::Column::CreatedAt)
        .order_by_desc(campaign::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Destination URL of the campaign's button, if it has one.
pub async fn campaign_url(db: &DatabaseConnection, campaign_id: i64) -> Result<Option<String>> {
    Ok(find_campaign(db, campaign_id).await?.button_url)
}

/// Counters of a campaign together with the pending row count.
pub async fn campaign_stats(db: &DatabaseConnection, campaign_id: i64) -> Result<CampaignStats> {
    let campaign = find_campaign(db, campaign_id).await?;
    let pending = Delivery::find()
        .filter(delivery::Column::CampaignId.eq(campaign_id))
        .filter(delivery::Column::Status.eq(DeliveryStatus::Pending))
        .count(db)
        .await?;

    Ok(CampaignStats {
        status: campaign.status,
        total_recipients: campaign.total_recipients,
        sent: campaign.sent_count,
        failed: campaign.failed_count,
        blocked: campaign.blocked_count,
        clicks: campaign.click_count,
        pending,
    })
}

/// Deletes a finished campaign together with its deliveries and clicks.
///
/// # Errors
/// Returns [`Error::CampaignActive`] unless the campaign is `completed`
/// or `canceled`; in-flight campaigns keep their rows.
#[instrument(skip(db))]
pub async fn delete_campaign(db: &DatabaseConnection, campaign_id: i64) -> Result<()> {
    let txn = db.begin().await?;
    let campaign = find_campaign(&txn, campaign_id).await?;
    if !campaign.status.is_terminal() {
        warn!(campaign_id, status = %campaign.status, "Refusing to delete active campaign");
        return Err(Error::CampaignActive {
            campaign_id,
            status: campaign.status,
        });
    }

    Delivery::delete_many()
        .filter(delivery::Column::CampaignId.eq(campaign_id))
        .exec(&txn)
        .await?;
    Click::delete_many()
        .filter(click::Column::CampaignId.eq(campaign_id))
        .exec(&txn)
        .await?;
    Campaign::delete_by_id(campaign_id).exec(&txn).await?;
    txn.commit().await?;

    info!(campaign_id, "Campaign deleted");
    Ok(())
}
