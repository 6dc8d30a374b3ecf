//! Shared test utilities for the delivery engine.
//!
//! This module provides common helper functions for setting up test databases,
//! seeding sellers, shops, subscribers and campaigns in a given lifecycle
//! state, and a scripted [`Sender`] double for dispatcher tests.

use crate::{
    core::{
        campaign::{self, CampaignContent, PaymentConfirmation},
        fanout, ledger, registry, shop,
    },
    dispatcher::{OutboundMessage, SendError, SendOutcome, Sender},
    entities,
    errors::Result,
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

static NEXT_IDENTITY: AtomicUsize = AtomicUsize::new(1);

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", NEXT_IDENTITY.fetch_add(1, Ordering::Relaxed))
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Creates a seller holding exactly `balance` credits.
///
/// No signup grant is applied; a positive balance is written as a single
/// `purchase` credit so the transaction log still sums to the balance.
pub async fn create_test_seller(
    db: &DatabaseConnection,
    external_user_id: &str,
    balance: i64,
) -> Result<entities::seller::Model> {
    let seller = ledger::ensure_seller(db, external_user_id, 0).await?;
    if balance > 0 {
        ledger::credit(db, seller.id, balance, ledger::REASON_PURCHASE, None).await?;
    }
    Ok(seller)
}

/// Seller without credits plus one active shop.
pub async fn setup_with_shop(
    db: &DatabaseConnection,
) -> Result<(entities::seller::Model, entities::shop::Model)> {
    setup_with_shop_and_balance(db, 0).await
}

/// Seller holding `balance` credits plus one active shop.
pub async fn setup_with_shop_and_balance(
    db: &DatabaseConnection,
    balance: i64,
) -> Result<(entities::seller::Model, entities::shop::Model)> {
    let seller = create_test_seller(db, &unique("seller"), balance).await?;
    let shop = shop::create_shop(db, seller.id, "Test Shop".into(), "general".into()).await?;
    Ok((seller, shop))
}

/// Creates `count` new customers subscribed to the shop and returns their ids
/// in creation order.
pub async fn create_subscribers(
    db: &DatabaseConnection,
    shop_id: i64,
    count: usize,
) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        let customer = registry::ensure_customer(db, &unique("buyer")).await?;
        registry::subscribe(db, shop_id, customer.id).await?;
        ids.push(customer.id);
    }
    Ok(ids)
}

/// Campaign in `awaiting_payment` with plain text content.
pub async fn create_submitted_campaign(
    db: &DatabaseConnection,
    shop_id: i64,
    price: i64,
) -> Result<entities::campaign::Model> {
    let draft = campaign::create_draft(db, shop_id, CampaignContent::text("Test campaign"), price)
        .await?;
    campaign::submit(db, draft.id).await
}

/// Campaign in `paid`; the seller must hold at least `price` credits.
pub async fn create_paid_campaign(
    db: &DatabaseConnection,
    shop_id: i64,
    price: i64,
) -> Result<entities::campaign::Model> {
    let submitted = create_submitted_campaign(db, shop_id, price).await?;
    campaign::mark_paid(
        db,
        submitted.id,
        PaymentConfirmation {
            amount: price,
            external_charge_id: unique("charge"),
        },
    )
    .await
}

/// Paid campaign that has been fanned out to the shop's current subscribers.
pub async fn create_sending_campaign(
    db: &DatabaseConnection,
    shop_id: i64,
    price: i64,
) -> Result<entities::campaign::Model> {
    let paid = create_paid_campaign(db, shop_id, price).await?;
    fanout::start_sending(db, paid.id).await
}

/// Shorthand for a successful send outcome.
pub fn delivered(external_id: &str) -> SendOutcome {
    SendOutcome::Delivered {
        external_id: Some(external_id.to_string()),
    }
}

/// [`Sender`] that replays a script of replies in call order.
///
/// Once the script is exhausted every call gets the fallback reply, which is
/// a delivery unless built with [`ScriptedSender::always`]. Every message is
/// recorded for later inspection.
pub struct ScriptedSender {
    script: Mutex<VecDeque<std::result::Result<SendOutcome, SendError>>>,
    fallback: std::result::Result<SendOutcome, SendError>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl ScriptedSender {
    /// Replays `outcomes`, then delivers everything.
    pub fn new(outcomes: Vec<SendOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into_iter().map(Ok).collect()),
            fallback: Ok(delivered("scripted")),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with `reply`.
    pub fn always(reply: std::result::Result<SendOutcome, SendError>) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: reply,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Messages passed to `send`, in call order.
    #[allow(clippy::unwrap_used)]
    pub fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sender for ScriptedSender {
    #[allow(clippy::unwrap_used)]
    async fn send(&self, message: &OutboundMessage) -> std::result::Result<SendOutcome, SendError> {
        self.sent.lock().unwrap().push(message.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// [`Sender`] whose first `stalls` calls never return; later calls deliver.
pub struct StallingSender {
    stalls: usize,
    calls: AtomicUsize,
    delivered: Mutex<Vec<OutboundMessage>>,
}

impl StallingSender {
    /// Stalls the first `stalls` calls forever.
    pub const fn new(stalls: usize) -> Self {
        Self {
            stalls,
            calls: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }

    /// Messages that got a reply, in call order.
    #[allow(clippy::unwrap_used)]
    pub fn delivered_messages(&self) -> Vec<OutboundMessage> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sender for StallingSender {
    #[allow(clippy::unwrap_used)]
    async fn send(&self, message: &OutboundMessage) -> std::result::Result<SendOutcome, SendError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.stalls {
            std::future::pending::<()>().await;
        }
        self.delivered.lock().unwrap().push(message.clone());
        Ok(delivered("stalled-then-sent"))
    }
}
