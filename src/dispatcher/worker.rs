//! Delivery worker - claims due rows, sends them and records the outcomes.

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use chrono::Utc;
use futures::{StreamExt, stream};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    core::{
        campaign,
        queue::{self, ClaimedDelivery},
    },
    dispatcher::{
        DispatcherConfig,
        retry::RetryDecision,
        sender::{OutboundMessage, SendOutcome, Sender},
        throttle::ShopThrottle,
    },
    errors::Result,
};

/// Pause after a failed batch before polling again.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// What one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Rows claimed by this batch
    pub claimed: usize,
    /// Rows delivered
    pub sent: usize,
    /// Rows whose recipient cannot be reached
    pub blocked: usize,
    /// Transient failures rescheduled with backoff
    pub retried: usize,
    /// Transient failures that exhausted the attempt budget
    pub failed: usize,
    /// Rows handed back because the shop is rate limited
    pub released: usize,
    /// Outcomes discarded because the claim expired underneath us
    pub dropped: usize,
    /// Campaigns this batch moved to `completed`
    pub completed_campaigns: Vec<i64>,
}

impl BatchReport {
    fn tally(&mut self, processed: Processed) {
        match processed {
            Processed::Sent => self.sent += 1,
            Processed::Blocked => self.blocked += 1,
            Processed::Retried => self.retried += 1,
            Processed::Failed => self.failed += 1,
            Processed::Released => self.released += 1,
            Processed::Dropped => self.dropped += 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Processed {
    Sent,
    Blocked,
    Retried,
    Failed,
    Released,
    Dropped,
}

impl Processed {
    const fn recorded(recorded: bool, outcome: Self) -> Self {
        if recorded { outcome } else { Self::Dropped }
    }
}

/// One worker of the dispatcher pool.
pub struct DeliveryWorker {
    id: usize,
    db: DatabaseConnection,
    config: DispatcherConfig,
    sender: Arc<dyn Sender>,
    throttle: Arc<ShopThrottle>,
    cancellation_token: CancellationToken,
}

impl DeliveryWorker {
    /// Creates a worker sharing the pool's sender and throttle.
    pub fn new(
        id: usize,
        db: DatabaseConnection,
        config: DispatcherConfig,
        sender: Arc<dyn Sender>,
        throttle: Arc<ShopThrottle>,
        cancellation_token: CancellationToken,
    ) -> Self {
        Self {
            id,
            db,
            config,
            sender,
            throttle,
            cancellation_token,
        }
    }

    /// Claims and processes batches until cancelled.
    ///
    /// Batch errors (storage unavailable) are logged and the worker retries
    /// after a short pause; all progress lives in the database, so nothing is
    /// lost when a batch fails halfway.
    pub async fn run(&self) {
        info!(worker_id = self.id, "Delivery worker starting");

        loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            let wait = match self.process_batch().await {
                Ok(report) if report.claimed > 0 => continue,
                Ok(_) => {
                    if let Err(e) = campaign::finalize_completed_campaigns(&self.db).await {
                        warn!(worker_id = self.id, error = %e, "Completion sweep failed");
                    }
                    self.config.poll_interval
                }
                Err(e) => {
                    error!(worker_id = self.id, error = %e, "Batch processing failed");
                    ERROR_BACKOFF
                }
            };

            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = self.cancellation_token.cancelled() => break,
            }
        }

        info!(worker_id = self.id, "Delivery worker stopped");
    }

    /// Claims one batch of due rows, processes them concurrently and
    /// completes every campaign the batch drained.
    ///
    /// # Errors
    /// Returns an error when the claim or the completion check fails.
    /// Failures of individual rows are logged and leave the row to its lease.
    pub async fn process_batch(&self) -> Result<BatchReport> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(self.config.lease_duration)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));
        let claim_token = Uuid::new_v4().to_string();

        let claims = queue::claim_due(
            &self.db,
            now,
            now + lease,
            self.config.batch_size,
            &claim_token,
        )
        .await?;

        let mut report = BatchReport {
            claimed: claims.len(),
            ..BatchReport::default()
        };
        if claims.is_empty() {
            return Ok(report);
        }
        debug!(worker_id = self.id, claimed = claims.len(), "Claimed delivery batch");

        let campaigns: BTreeSet<i64> = claims.iter().map(|c| c.campaign.id).collect();

        let results: Vec<(i64, Result<Processed>)> = stream::iter(claims)
            .map(|claim| async move { (claim.id(), self.process_claim(&claim).await) })
            .buffer_unordered(self.config.max_concurrent_sends)
            .collect()
            .await;

        for (delivery_id, result) in results {
            match result {
                Ok(processed) => report.tally(processed),
                Err(e) => error!(
                    worker_id = self.id,
                    delivery_id,
                    error = %e,
                    "Failed to record delivery outcome"
                ),
            }
        }

        for campaign_id in campaigns {
            if campaign::complete_if_drained(&self.db, campaign_id).await? {
                report.completed_campaigns.push(campaign_id);
            }
        }

        info!(
            worker_id = self.id,
            claimed = report.claimed,
            sent = report.sent,
            blocked = report.blocked,
            retried = report.retried,
            failed = report.failed,
            released = report.released,
            "Processed delivery batch"
        );
        Ok(report)
    }

    async fn process_claim(&self, claim: &ClaimedDelivery) -> Result<Processed> {
        let shop_id = claim.shop_id();

        if let Some(until) = self.throttle.paused_until(shop_id, Utc::now()) {
            return self.release(claim, until).await;
        }
        self.throttle.acquire(shop_id).await;
        if let Some(until) = self.throttle.paused_until(shop_id, Utc::now()) {
            return self.release(claim, until).await;
        }

        let message = OutboundMessage::from(claim);
        let outcome =
            match tokio::time::timeout(self.config.send_timeout, self.sender.send(&message)).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => SendOutcome::Transient {
                    reason: e.to_string(),
                },
                Err(_) => {
                    warn!(
                        worker_id = self.id,
                        delivery_id = claim.id(),
                        timeout_ms = self.config.send_timeout.as_millis(),
                        "Send timed out"
                    );
                    SendOutcome::Transient {
                        reason: format!(
                            "send timed out after {} ms",
                            self.config.send_timeout.as_millis()
                        ),
                    }
                }
            };
        let now = Utc::now();

        match outcome {
            SendOutcome::Delivered { external_id } => {
                debug!(worker_id = self.id, delivery_id = claim.id(), "Delivered");
                let recorded = queue::record_sent(&self.db, claim, external_id, now).await?;
                Ok(Processed::recorded(recorded, Processed::Sent))
            }
            SendOutcome::Blocked { reason } => {
                debug!(worker_id = self.id, delivery_id = claim.id(), %reason, "Recipient blocked");
                let recorded = queue::record_blocked(&self.db, claim, &reason).await?;
                Ok(Processed::recorded(recorded, Processed::Blocked))
            }
            SendOutcome::Transient { reason } => {
                let attempts = u32::try_from(claim.delivery.attempt_count)
                    .unwrap_or_default()
                    .saturating_add(1);
                match self.config.retry_policy.decide(attempts, now) {
                    RetryDecision::Retry { next_attempt_at } => {
                        debug!(
                            worker_id = self.id,
                            delivery_id = claim.id(),
                            attempts,
                            %next_attempt_at,
                            %reason,
                            "Transient failure, rescheduled"
                        );
                        let recorded =
                            queue::record_retry(&self.db, claim, next_attempt_at, &reason).await?;
                        Ok(Processed::recorded(recorded, Processed::Retried))
                    }
                    RetryDecision::GiveUp { reason: why } => {
                        warn!(
                            worker_id = self.id,
                            delivery_id = claim.id(),
                            campaign_id = claim.campaign.id,
                            attempts,
                            %reason,
                            "Delivery failed permanently"
                        );
                        let error = format!("{reason} ({why})");
                        let recorded = queue::record_failed(&self.db, claim, &error).await?;
                        Ok(Processed::recorded(recorded, Processed::Failed))
                    }
                }
            }
            SendOutcome::RateLimited { retry_after } => {
                let until = now
                    + chrono::Duration::from_std(retry_after)
                        .unwrap_or_else(|_| chrono::Duration::seconds(1));
                self.throttle.pause(shop_id, until);
                self.release(claim, until).await
            }
        }
    }

    async fn release(
        &self,
        claim: &ClaimedDelivery,
        until: chrono::DateTime<Utc>,
    ) -> Result<Processed> {
        let recorded = queue::release(&self.db, claim, until, Some("shop rate limited")).await?;
        Ok(Processed::recorded(recorded, Processed::Released))
    }
}
