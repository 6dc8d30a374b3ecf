//! Dispatcher - the worker pool draining the delivery queue.
//!
//! Workers share one [`Sender`] and one [`ShopThrottle`] and coordinate only
//! through the database: each batch is claimed under a fresh lease token, so
//! any number of workers (in this process or others) can poll the same
//! queue without sending a row twice while its lease holds.

pub mod retry;
pub mod sender;
pub mod throttle;
mod worker;

pub use retry::{RetryDecision, RetryPolicy};
pub use sender::{OutboundButton, OutboundMessage, SendError, SendOutcome, Sender};
pub use throttle::ShopThrottle;
pub use worker::{BatchReport, DeliveryWorker};

use std::{sync::Arc, time::Duration};

use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::errors::Result;

/// Runtime settings of the worker pool.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of concurrent workers
    pub worker_count: usize,
    /// Maximum rows claimed per batch
    pub batch_size: u64,
    /// Wait between polls of an empty queue
    pub poll_interval: Duration,
    /// How long a claim hides a row from other workers
    pub lease_duration: Duration,
    /// Longest wait for one send; a send still running after it counts as a
    /// transient failure. Must stay below `lease_duration`
    pub send_timeout: Duration,
    /// Backoff for transient failures
    pub retry_policy: RetryPolicy,
    /// Outbound messages per second allowed per shop; 0 disables throttling
    pub shop_rate_per_second: u32,
    /// Rows of one batch sent concurrently
    pub max_concurrent_sends: usize,
    /// Maximum wait for workers on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 2,
            batch_size: 50,
            poll_interval: Duration::from_secs(1),
            lease_duration: Duration::from_secs(300),
            send_timeout: Duration::from_secs(30),
            retry_policy: RetryPolicy::default(),
            shop_rate_per_second: 25,
            max_concurrent_sends: 8,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Worker pool with graceful shutdown.
pub struct Dispatcher {
    db: DatabaseConnection,
    config: DispatcherConfig,
    sender: Arc<dyn Sender>,
    throttle: Arc<ShopThrottle>,
    cancellation_token: CancellationToken,
    worker_handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Creates a stopped dispatcher.
    pub fn new(db: DatabaseConnection, config: DispatcherConfig, sender: Arc<dyn Sender>) -> Self {
        let throttle = Arc::new(ShopThrottle::new(config.shop_rate_per_second));
        Self {
            db,
            config,
            sender,
            throttle,
            cancellation_token: CancellationToken::new(),
            worker_handles: Vec::new(),
        }
    }

    fn worker(&self, id: usize) -> DeliveryWorker {
        DeliveryWorker::new(
            id,
            self.db.clone(),
            self.config.clone(),
            Arc::clone(&self.sender),
            Arc::clone(&self.throttle),
            self.cancellation_token.clone(),
        )
    }

    /// Spawns the configured number of workers and returns immediately.
    pub fn start(&mut self) {
        if !self.worker_handles.is_empty() {
            warn!("Dispatcher already started");
            return;
        }

        info!(
            worker_count = self.config.worker_count,
            batch_size = self.config.batch_size,
            "Starting dispatcher"
        );
        for worker_id in 0..self.config.worker_count {
            let worker = self.worker(worker_id);
            self.worker_handles
                .push(tokio::spawn(async move { worker.run().await }));
        }
    }

    /// Claims and processes exactly one batch on the calling task.
    ///
    /// # Errors
    /// Returns an error if the batch could not be claimed.
    pub async fn run_once(&self) -> Result<BatchReport> {
        self.worker(0).process_batch().await
    }

    /// Signals every worker to stop and waits up to the shutdown timeout.
    ///
    /// In-flight sends finish and record their outcome; workers still running
    /// after the timeout are aborted and their claimed rows come back when
    /// the lease expires.
    pub async fn shutdown(mut self) {
        info!(
            worker_count = self.worker_handles.len(),
            timeout_seconds = self.config.shutdown_timeout.as_secs(),
            "Shutting down dispatcher"
        );
        self.cancellation_token.cancel();

        let handles = std::mem::take(&mut self.worker_handles);
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let join_all = futures::future::join_all(handles);

        match tokio::time::timeout(self.config.shutdown_timeout, join_all).await {
            Ok(results) => {
                for (worker_id, result) in results.into_iter().enumerate() {
                    if let Err(e) = result {
                        error!(worker_id, error = %e, "Delivery worker panicked");
                    }
                }
                info!("Dispatcher stopped");
            }
            Err(_) => {
                warn!("Shutdown timeout exceeded, aborting remaining workers");
                for abort in aborts {
                    abort.abort();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::{
        core::{campaign::get_campaign, queue::count_by_status},
        entities::{CampaignStatus, Delivery, DeliveryStatus, delivery},
        test_utils::*,
    };
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
    use std::collections::HashMap;

    fn test_config() -> DispatcherConfig {
        DispatcherConfig {
            worker_count: 2,
            batch_size: 50,
            poll_interval: Duration::from_millis(10),
            lease_duration: Duration::from_secs(300),
            send_timeout: Duration::from_secs(5),
            retry_policy: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                jitter_factor: 0.0,
            },
            shop_rate_per_second: 0,
            max_concurrent_sends: 1,
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    async fn rows(db: &DatabaseConnection, campaign_id: i64) -> Result<Vec<delivery::Model>> {
        Ok(Delivery::find()
            .filter(delivery::Column::CampaignId.eq(campaign_id))
            .all(db)
            .await?)
    }

    #[tokio::test]
    async fn test_delivered_delivered_blocked_completes_campaign() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 3).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(ScriptedSender::new(vec![
            delivered("m-1"),
            delivered("m-2"),
            SendOutcome::Blocked {
                reason: "bot blocked by user".into(),
            },
        ]));
        let dispatcher = Dispatcher::new(db.clone(), test_config(), sender.clone());

        let report = dispatcher.run_once().await?;
        assert_eq!(report.claimed, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.blocked, 1);
        assert_eq!(report.completed_campaigns, vec![campaign.id]);

        let campaign = get_campaign(&db, campaign.id).await?.unwrap();
        assert_eq!(campaign.status, CampaignStatus::Completed);
        assert_eq!(campaign.sent_count, 2);
        assert_eq!(campaign.blocked_count, 1);
        assert_eq!(campaign.failed_count, 0);
        assert_eq!(sender.sent_messages().len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_transient_then_delivered() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 1).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(ScriptedSender::new(vec![SendOutcome::Transient {
            reason: "timeout".into(),
        }]));
        let dispatcher = Dispatcher::new(db.clone(), test_config(), sender);

        let first = dispatcher.run_once().await?;
        assert_eq!(first.retried, 1);
        assert!(first.completed_campaigns.is_empty());

        let second = dispatcher.run_once().await?;
        assert_eq!(second.sent, 1);

        let row = &rows(&db, campaign.id).await?[0];
        assert_eq!(row.status, DeliveryStatus::Sent);
        assert_eq!(row.attempt_count, 2);
        assert!(row.sent_at.is_some());
        assert_eq!(
            get_campaign(&db, campaign.id).await?.unwrap().status,
            CampaignStatus::Completed
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_attempt_budget_exhaustion_fails_row() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 1).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(ScriptedSender::always(Err(SendError::Unreachable {
            message: "connection reset".into(),
        })));
        let dispatcher = Dispatcher::new(db.clone(), test_config(), sender.clone());

        assert_eq!(dispatcher.run_once().await?.retried, 1);
        assert_eq!(dispatcher.run_once().await?.retried, 1);
        let last = dispatcher.run_once().await?;
        assert_eq!(last.failed, 1);
        assert_eq!(last.completed_campaigns, vec![campaign.id]);

        // nothing left to claim, the row never comes back
        assert_eq!(dispatcher.run_once().await?.claimed, 0);
        assert_eq!(sender.sent_messages().len(), 3);

        let row = &rows(&db, campaign.id).await?[0];
        assert_eq!(row.status, DeliveryStatus::Failed);
        assert_eq!(row.attempt_count, 3);
        assert!(row.last_error.as_deref().unwrap().contains("connection reset"));

        let campaign = get_campaign(&db, campaign.id).await?.unwrap();
        assert_eq!(campaign.failed_count, 1);
        assert_eq!(campaign.status, CampaignStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_backoff_defers_retry() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 1).await?;
        create_sending_campaign(&db, shop.id, 1).await?;

        let mut config = test_config();
        config.retry_policy.base_delay = Duration::from_secs(30);
        config.retry_policy.max_delay = Duration::from_secs(3600);
        let sender = Arc::new(ScriptedSender::always(Ok(SendOutcome::Transient {
            reason: "503".into(),
        })));
        let dispatcher = Dispatcher::new(db.clone(), config, sender);

        assert_eq!(dispatcher.run_once().await?.retried, 1);
        assert_eq!(dispatcher.run_once().await?.claimed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_platform_rate_limit_pauses_shop_without_consuming_attempts() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 3).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(ScriptedSender::new(vec![SendOutcome::RateLimited {
            retry_after: Duration::from_secs(60),
        }]));
        let dispatcher = Dispatcher::new(db.clone(), test_config(), sender.clone());

        let report = dispatcher.run_once().await?;
        assert_eq!(report.released, 3);
        assert_eq!(sender.sent_messages().len(), 1);

        let now = chrono::Utc::now();
        for row in rows(&db, campaign.id).await? {
            assert_eq!(row.status, DeliveryStatus::Pending);
            assert_eq!(row.attempt_count, 0);
            assert!(row.next_attempt_at > now);
            assert!(row.claim_token.is_none());
        }
        assert_eq!(dispatcher.run_once().await?.claimed, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_workers_send_each_row_once() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 20).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(ScriptedSender::new(Vec::new()));
        let mut config = test_config();
        config.batch_size = 7;
        config.max_concurrent_sends = 4;
        let dispatcher = Dispatcher::new(db.clone(), config, sender.clone());

        loop {
            let (a, b) = tokio::join!(dispatcher.run_once(), dispatcher.run_once());
            if a?.claimed + b?.claimed == 0 {
                break;
            }
        }

        let mut per_delivery: HashMap<i64, usize> = HashMap::new();
        for message in sender.sent_messages() {
            *per_delivery.entry(message.delivery_id).or_default() += 1;
        }
        assert_eq!(per_delivery.len(), 20);
        assert!(per_delivery.values().all(|&n| n == 1));

        let counts = count_by_status(&db, campaign.id).await?;
        assert_eq!(counts.sent, 20);
        let campaign = get_campaign(&db, campaign.id).await?.unwrap();
        assert_eq!(campaign.sent_count, 20);
        assert_eq!(campaign.status, CampaignStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn test_stalled_send_times_out_and_batch_moves_on() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 4).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(StallingSender::new(1));
        let mut config = test_config();
        config.send_timeout = Duration::from_millis(100);
        let dispatcher = Dispatcher::new(db.clone(), config, sender.clone());

        let first = tokio::time::timeout(Duration::from_secs(5), dispatcher.run_once())
            .await
            .expect("batch must not wait on a stalled send")?;
        assert_eq!(first.claimed, 4);
        assert_eq!(first.sent, 3);
        assert_eq!(first.retried, 1);

        let stalled = rows(&db, campaign.id)
            .await?
            .into_iter()
            .find(|r| r.status == DeliveryStatus::Pending)
            .unwrap();
        assert_eq!(stalled.attempt_count, 1);
        assert!(stalled.last_error.as_deref().unwrap().contains("timed out"));

        let second = dispatcher.run_once().await?;
        assert_eq!(second.sent, 1);
        assert_eq!(second.completed_campaigns, vec![campaign.id]);
        assert_eq!(sender.delivered_messages().len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_stalled_send_does_not_block_running_worker() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 4).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(StallingSender::new(1));
        let mut config = test_config();
        config.worker_count = 1;
        config.batch_size = 1;
        config.send_timeout = Duration::from_millis(100);
        let mut dispatcher = Dispatcher::new(db.clone(), config, sender.clone());
        dispatcher.start();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let status = get_campaign(&db, campaign.id).await?.unwrap().status;
            if status == CampaignStatus::Completed {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "worker stuck on stalled send");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        dispatcher.shutdown().await;

        let counts = count_by_status(&db, campaign.id).await?;
        assert_eq!(counts.sent, 4);
        assert_eq!(sender.delivered_messages().len(), 4);
        Ok(())
    }

    #[tokio::test]
    async fn test_started_pool_drains_queue_and_shuts_down() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop_and_balance(&db, 10).await?;
        create_subscribers(&db, shop.id, 5).await?;
        let campaign = create_sending_campaign(&db, shop.id, 1).await?;

        let sender = Arc::new(ScriptedSender::new(Vec::new()));
        let mut dispatcher = Dispatcher::new(db.clone(), test_config(), sender.clone());
        dispatcher.start();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let status = get_campaign(&db, campaign.id).await?.unwrap().status;
            if status == CampaignStatus::Completed {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "queue not drained");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        dispatcher.shutdown().await;
        assert_eq!(sender.sent_messages().len(), 5);
        Ok(())
    }
}
