//! Delivery queue - lease-based claiming and outcome recording.
//!
//! The queue is the set of delivery rows with `status = pending` and
//! `next_attempt_at <= now` whose campaign is `sending`. Claiming is a
//! visibility timeout: the claimer pushes `next_attempt_at` to the end of its
//! lease and stamps a `claim_token`. No other claimer can see the row until
//! the lease runs out, and if the claimer dies the row simply becomes
//! eligible again.
//!
//! Every outcome write is guarded by `claim_token = <token> AND status =
//! pending`. A worker whose lease expired and whose row was re-claimed by
//! someone else therefore records nothing; the row outcome and the campaign
//! counter increment commit in the same transaction.

use crate::{
    entities::{
        Campaign, CampaignStatus, Customer, Delivery, DeliveryStatus, campaign, customer,
        delivery,
    },
    errors::Result,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr,
};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Upper bound on the stored error text.
const MAX_ERROR_LEN: usize = 5000;

/// A delivery row owned by one worker until `lease_until`.
#[derive(Debug, Clone)]
pub struct ClaimedDelivery {
    /// Row as it was after the claim
    pub delivery: delivery::Model,
    /// Campaign content and owning shop
    pub campaign: campaign::Model,
    /// Recipient
    pub recipient: customer::Model,
    /// Token stamped by the claim; required for every outcome write
    pub claim_token: String,
}

impl ClaimedDelivery {
    /// Id of the delivery row
    #[must_use]
    pub const fn id(&self) -> i64 {
        self.delivery.id
    }

    /// Shop the message is sent as
    #[must_use]
    pub const fn shop_id(&self) -> i64 {
        self.campaign.shop_id
    }
}

/// Delivery rows of one campaign by status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    /// Rows still queued
    pub pending: u64,
    /// Rows delivered
    pub sent: u64,
    /// Rows out of attempts
    pub failed: u64,
    /// Rows with an unreachable recipient
    pub blocked: u64,
}

impl DeliveryCounts {
    /// Rows in a terminal state
    #[must_use]
    pub const fn terminal(&self) -> u64 {
        self.sent + self.failed + self.blocked
    }
}

fn truncate_error(error: &str) -> String {
    error.chars().take(MAX_ERROR_LEN).collect()
}

/// Claims up to `batch_size` due rows for `claim_token` until `lease_until`.
///
/// Candidates are read in `(next_attempt_at, id)` order and each one is then
/// claimed with its own conditional update. A candidate taken by a concurrent
/// claimer between the read and the update affects no row and is skipped.
#[instrument(skip(db, claim_token))]
pub async fn claim_due(
    db: &DatabaseConnection,
    now: DateTime<Utc>,
    lease_until: DateTime<Utc>,
    batch_size: u64,
    claim_token: &str,
) -> Result<Vec<ClaimedDelivery>> {
    let candidates: Vec<i64> = Delivery::find()
        .select_only()
        .column(delivery::Column::Id)
        .inner_join(Campaign)
        .filter(delivery::Column::Status.eq(DeliveryStatus::Pending))
        .filter(delivery::Column::NextAttemptAt.lte(now))
        .filter(campaign::Column::Status.eq(CampaignStatus::Sending))
        .order_by_asc(delivery::Column::NextAttemptAt)
        .order_by_asc(delivery::Column::Id)
        .limit(batch_size)
        .into_tuple()
        .all(db)
        .await?;

    let mut claimed_ids = Vec::with_capacity(candidates.len());
    for id in candidates {
        let result = Delivery::update_many()
            .set(delivery::ActiveModel {
                next_attempt_at: Set(lease_until),
                claim_token: Set(Some(claim_token.to_string())),
                ..Default::default()
            })
            .filter(delivery::Column::Id.eq(id))
            .filter(delivery::Column::Status.eq(DeliveryStatus::Pending))
            .filter(delivery::Column::NextAttemptAt.lte(now))
            .exec(db)
            .await?;
        if result.rows_affected == 1 {
            claimed_ids.push(id);
        } else {
            debug!(delivery_id = id, "Lost claim race");
        }
    }

    if claimed_ids.is_empty() {
        return Ok(Vec::new());
    }
    load_claimed(db, &claimed_ids, claim_token).await
}

async fn load_claimed(
    db: &DatabaseConnection,
    ids: &[i64],
    claim_token: &str,
) -> Result<Vec<ClaimedDelivery>> {
    let rows = Delivery::find()
        .filter(delivery::Column::Id.is_in(ids.iter().copied()))
        .filter(delivery::Column::ClaimToken.eq(claim_token))
        .order_by_asc(delivery::Column::NextAttemptAt)
        .order_by_asc(delivery::Column::Id)
        .all(db)
        .await?;

    let campaign_ids: Vec<i64> = rows.iter().map(|r| r.campaign_id).collect();
    let customer_ids: Vec<i64> = rows.iter().map(|r| r.customer_id).collect();

    let campaigns: HashMap<i64, campaign::Model> = Campaign::find()
        .filter(campaign::Column::Id.is_in(campaign_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();
    let customers: HashMap<i64, customer::Model> = Customer::find()
        .filter(customer::Column::Id.is_in(customer_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|c| (c.id, c))
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|delivery| {
            let campaign = campaigns.get(&delivery.campaign_id)?.clone();
            let recipient = customers.get(&delivery.customer_id)?.clone();
            Some(ClaimedDelivery {
                delivery,
                campaign,
                recipient,
                claim_token: claim_token.to_string(),
            })
        })
        .collect())
}

/// Applies `changes` to the claimed row if the claim still holds, and bumps
/// `counter` on the campaign in the same transaction.
async fn finish(
    db: &DatabaseConnection,
    claim: &ClaimedDelivery,
    mut changes: delivery::ActiveModel,
    consume_attempt: bool,
    counter: Option<campaign::Column>,
) -> Result<bool> {
    let txn = db.begin().await?;

    changes.claim_token = Set(None);
    let mut update = Delivery::update_many().set(changes);
    if consume_attempt {
        update = update.col_expr(
            delivery::Column::AttemptCount,
            Expr::col(delivery::Column::AttemptCount).add(1),
        );
    }
    let result = update
        .filter(delivery::Column::Id.eq(claim.id()))
        .filter(delivery::Column::ClaimToken.eq(claim.claim_token.as_str()))
        .filter(delivery::Column::Status.eq(DeliveryStatus::Pending))
        .exec(&txn)
        .await?;

    if result.rows_affected == 0 {
        debug!(delivery_id = claim.id(), "Claim no longer held, outcome dropped");
        return Ok(false);
    }

    if let Some(column) = counter {
        Campaign::update_many()
            .col_expr(column, Expr::col(column).add(1))
            .filter(campaign::Column::Id.eq(claim.campaign.id))
            .exec(&txn)
            .await?;
    }

    txn.commit().await?;
    Ok(true)
}

/// Marks the row `sent` and increments `sent_count`.
pub async fn record_sent(
    db: &DatabaseConnection,
    claim: &ClaimedDelivery,
    external_message_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<bool> {
    finish(
        db,
        claim,
        delivery::ActiveModel {
            status: Set(DeliveryStatus::Sent),
            sent_at: Set(Some(now)),
            external_message_id: Set(external_message_id),
            last_error: Set(None),
            ..Default::default()
        },
        true,
        Some(campaign::Column::SentCount),
    )
    .await
}

/// Marks the row `blocked` and increments `blocked_count`.
pub async fn record_blocked(
    db: &DatabaseConnection,
    claim: &ClaimedDelivery,
    reason: &str,
) -> Result<bool> {
    finish(
        db,
        claim,
        delivery::ActiveModel {
            status: Set(DeliveryStatus::Blocked),
            last_error: Set(Some(truncate_error(reason))),
            ..Default::default()
        },
        true,
        Some(campaign::Column::BlockedCount),
    )
    .await
}

/// Consumes an attempt and keeps the row pending until `next_attempt_at`.
pub async fn record_retry(
    db: &DatabaseConnection,
    claim: &ClaimedDelivery,
    next_attempt_at: DateTime<Utc>,
    error: &str,
) -> Result<bool> {
    finish(
        db,
        claim,
        delivery::ActiveModel {
            next_attempt_at: Set(next_attempt_at),
            last_error: Set(Some(truncate_error(error))),
            ..Default::default()
        },
        true,
        None,
    )
    .await
}

/// Consumes the final attempt, marks the row `failed` and increments
/// `failed_count`.
pub async fn record_failed(
    db: &DatabaseConnection,
    claim: &ClaimedDelivery,
    error: &str,
) -> Result<bool> {
    finish(
        db,
        claim,
        delivery::ActiveModel {
            status: Set(DeliveryStatus::Failed),
            last_error: Set(Some(truncate_error(error))),
            ..Default::default()
        },
        true,
        Some(campaign::Column::FailedCount),
    )
    .await
}

/// Gives the row back without consuming an attempt, eligible again at
/// `next_attempt_at`.
pub async fn release(
    db: &DatabaseConnection,
    claim: &ClaimedDelivery,
    next_attempt_at: DateTime<Utc>,
    note: Option<&str>,
) -> Result<bool> {
    let mut changes = delivery::ActiveModel {
        next_attempt_at: Set(next_attempt_at),
        ..Default::default()
    };
    if let Some(note) = note {
        changes.last_error = Set(Some(truncate_error(note)));
    }
    finish(db, claim, changes, false, None).await
}

/// Counts a campaign's delivery rows by status.
pub async fn count_by_status(db: &DatabaseConnection, campaign_id: i64) -> Result<DeliveryCounts> {
    let rows: Vec<(DeliveryStatus, i64)> = Delivery::find()
        .select_only()
        .column(delivery::Column::Status)
        .column_as(Expr::col(delivery::Column::Id).count(), "count")
        .filter(delivery::Column::CampaignId.eq(campaign_id))
        .group_by(delivery::Column::Status)
        .into_tuple()
        .all(db)
        .await?;

    let mut counts = DeliveryCounts::default();
    for (status, count) in rows {
        let count = u64::try_from(count).unwrap_or_default();
        match status {
            DeliveryStatus::Pending => counts.pending = count,
            DeliveryStatus::Sent => counts.sent = count,
            DeliveryStatus::Failed => counts.failed = count,
            DeliveryStatus::Blocked => counts.blocked = count,
        }
    }
    Ok(counts)
}
