//! Discord implementation of the dispatcher's [`Sender`].
//!
//! Campaign messages go out as direct messages. The optional button carries a
//! `campaign:click:<id>` custom id so the click can be recorded before the
//! recipient is shown the link; the optional image is attached as an embed.

use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::{sync::Arc, time::Duration};
use tracing::debug;

use crate::{
    bot::handlers::clicks::click_custom_id,
    dispatcher::{OutboundMessage, SendError, SendOutcome, Sender},
};

/// "Cannot send messages to this user"
const CANNOT_MESSAGE_USER: isize = 50007;
/// "Unknown user"
const UNKNOWN_USER: isize = 10013;
/// Pause applied when Discord throttles us without saying for how long
const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(5);

/// Sends campaign messages as Discord direct messages
pub struct DiscordSender {
    http: Arc<serenity::Http>,
}

impl DiscordSender {
    /// Creates a sender on top of an authenticated HTTP client.
    #[must_use]
    pub const fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }

    fn build_message(message: &OutboundMessage) -> serenity::CreateMessage {
        let mut builder = serenity::CreateMessage::new().content(&message.text);

        if let Some(image) = &message.image_ref {
            builder = builder.embed(serenity::CreateEmbed::new().image(image));
        }
        if let Some(button) = &message.button {
            let click = serenity::CreateButton::new(click_custom_id(message.campaign_id))
                .label(&button.title)
                .style(serenity::ButtonStyle::Primary);
            builder = builder.components(vec![serenity::CreateActionRow::Buttons(vec![click])]);
        }
        builder
    }
}

/// Maps a Discord failure onto the dispatcher's outcome buckets.
pub fn classify_error(error: &serenity::Error) -> SendOutcome {
    if let serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) = error {
        if response.status_code.as_u16() == 429 {
            return SendOutcome::RateLimited {
                retry_after: DEFAULT_RATE_LIMIT_PAUSE,
            };
        }
        if matches!(response.error.code, CANNOT_MESSAGE_USER | UNKNOWN_USER) {
            return SendOutcome::Blocked {
                reason: response.error.message.clone(),
            };
        }
    }
    SendOutcome::Transient {
        reason: error.to_string(),
    }
}

#[async_trait]
impl Sender for DiscordSender {
    async fn send(&self, message: &OutboundMessage) -> Result<SendOutcome, SendError> {
        let Some(user_id) = message
            .recipient
            .parse::<u64>()
            .ok()
            .filter(|id| *id != 0)
            .map(serenity::UserId::new)
        else {
            return Ok(SendOutcome::Blocked {
                reason: format!("not a Discord user id: {}", message.recipient),
            });
        };

        let channel = match user_id.create_dm_channel(self.http.as_ref()).await {
            Ok(channel) => channel,
            Err(e) => return Ok(classify_error(&e)),
        };

        match channel
            .send_message(self.http.as_ref(), Self::build_message(message))
            .await
        {
            Ok(sent) => {
                debug!(delivery_id = message.delivery_id, message_id = %sent.id, "DM sent");
                Ok(SendOutcome::Delivered {
                    external_id: Some(sent.id.to_string()),
                })
            }
            Err(e) => Ok(classify_error(&e)),
        }
    }
}
