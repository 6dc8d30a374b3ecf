//! Discord interaction handlers
//!
//! This module provides handlers for Discord interactions that are not slash
//! commands, such as campaign button clicks.

/// Campaign button clicks
pub mod clicks;

use poise::serenity_prelude as serenity;

use crate::{
    bot::BotData,
    errors::{Error, Result},
};

/// Framework-wide event hook; routes component interactions to their handler.
pub async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, BotData, Error>,
    data: &BotData,
) -> Result<()> {
    if let serenity::FullEvent::InteractionCreate { interaction } = event {
        if let Some(component) = interaction.as_message_component() {
            clicks::handle_component(ctx, component, data).await?;
        }
    }
    Ok(())
}
