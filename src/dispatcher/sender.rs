//! The boundary to the external messaging platform.
//!
//! The dispatcher only knows the [`Sender`] trait. Implementations classify
//! each platform reply into a [`SendOutcome`]; any [`SendError`] they return
//! instead is treated as a transient failure and retried.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::core::queue::ClaimedDelivery;

/// Link button attached to an outbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundButton {
    /// Button label
    pub title: String,
    /// Link opened by the button
    pub url: String,
}

/// Everything a [`Sender`] needs to deliver one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Delivery row the message belongs to
    pub delivery_id: i64,
    /// Campaign, used by platforms that attach click callbacks
    pub campaign_id: i64,
    /// Shop the message is sent as
    pub shop_id: i64,
    /// Platform identity of the recipient
    pub recipient: String,
    /// Message body
    pub text: String,
    /// Optional link button
    pub button: Option<OutboundButton>,
    /// Optional image (URL or platform file id)
    pub image_ref: Option<String>,
}

impl From<&ClaimedDelivery> for OutboundMessage {
    fn from(claim: &ClaimedDelivery) -> Self {
        let campaign = &claim.campaign;
        let button = match (&campaign.button_title, &campaign.button_url) {
            (Some(title), Some(url)) => Some(OutboundButton {
                title: title.clone(),
                url: url.clone(),
            }),
            _ => None,
        };

        Self {
            delivery_id: claim.delivery.id,
            campaign_id: campaign.id,
            shop_id: campaign.shop_id,
            recipient: claim.recipient.external_user_id.clone(),
            text: campaign.text.clone(),
            button,
            image_ref: campaign.image_ref.clone(),
        }
    }
}

/// Classified result of one send attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The platform accepted the message.
    Delivered {
        /// Platform message id, when the platform returns one
        external_id: Option<String>,
    },
    /// The recipient blocked the sender or does not exist. Not retried.
    Blocked {
        /// Platform explanation
        reason: String,
    },
    /// Timeout, 5xx or similar. Retried with backoff.
    Transient {
        /// Platform explanation
        reason: String,
    },
    /// The platform throttled the sending identity as a whole. The shop is
    /// paused for `retry_after` and no attempt is consumed.
    RateLimited {
        /// How long the platform asked us to wait
        retry_after: Duration,
    },
}

/// Failure of the sender itself rather than a classified platform reply
#[derive(Debug, Clone, Error)]
pub enum SendError {
    /// The platform could not be reached
    #[error("platform unreachable: {message}")]
    Unreachable {
        /// Transport error
        message: String,
    },

    /// The platform answered with something the sender could not classify
    #[error("unexpected platform reply: {message}")]
    Unexpected {
        /// Description of the reply
        message: String,
    },
}

/// Capability to deliver one message through the external platform.
#[async_trait]
pub trait Sender: Send + Sync {
    /// Sends `message` and classifies the platform reply.
    ///
    /// # Errors
    /// Returns a [`SendError`] when no classification is possible; the
    /// dispatcher retries such attempts like a transient failure.
    async fn send(&self, message: &OutboundMessage) -> Result<SendOutcome, SendError>;
}
