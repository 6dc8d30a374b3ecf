//! Campaign button clicks.
//!
//! Campaign messages carry a button whose custom id names the campaign. When
//! a recipient presses it the click is recorded (once per recipient) and the
//! campaign link is sent back as an ephemeral reply.

use poise::serenity_prelude as serenity;
use tracing::{debug, warn};

use crate::{
    bot::BotData,
    core::{campaign, clicks, registry},
    errors::{Error, Result},
};

const CLICK_PREFIX: &str = "campaign:click:";

/// Custom id of the button attached to a campaign message.
#[must_use]
pub fn click_custom_id(campaign_id: i64) -> String {
    format!("{CLICK_PREFIX}{campaign_id}")
}

/// Campaign id encoded in a button custom id, if it is a campaign click.
#[must_use]
pub fn parse_click_id(custom_id: &str) -> Option<i64> {
    custom_id.strip_prefix(CLICK_PREFIX)?.parse().ok()
}

/// Records the click behind a component interaction and replies with the link.
pub async fn handle_component(
    ctx: &serenity::Context,
    component: &serenity::ComponentInteraction,
    data: &BotData,
) -> Result<()> {
    let Some(campaign_id) = parse_click_id(&component.data.custom_id) else {
        return Ok(());
    };
    let db = &data.database;
    let user = component.user.id.to_string();

    let reply = match registry::ensure_customer(db, &user).await {
        Ok(customer) => match clicks::record_click(db, campaign_id, customer.id).await {
            Ok(first) => {
                debug!(campaign_id, customer_id = customer.id, first, "Campaign click");
                campaign::campaign_url(db, campaign_id)
                    .await?
                    .unwrap_or_else(|| "Thanks for your interest!".to_string())
            }
            Err(Error::CampaignNotFound { .. }) => "This offer is no longer available.".to_string(),
            Err(e) => return Err(e),
        },
        Err(e) => {
            warn!(campaign_id, error = %e, "Could not resolve clicking customer");
            return Err(e);
        }
    };

    component
        .create_response(
            &ctx.http,
            serenity::CreateInteractionResponse::Message(
                serenity::CreateInteractionResponseMessage::new()
                    .content(reply)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}
