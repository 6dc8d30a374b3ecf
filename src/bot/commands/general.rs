//! General Discord commands - ping, help, and other utility commands.
//! This module contains simple commands that don't require database operations
//! and provide basic bot functionality and user assistance.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        errors::{Error, Result},
    };

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays help information about available commands.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "**Loyalty Courier Help**\n\
        Shops use this bot to send offers to customers who opted in.\n\n\
        **Customers**\n\
        • `/subscribe <shop>` - Receive offers from a shop.\n\
        • `/unsubscribe <shop>` - Stop receiving offers from a shop.\n\n\
        **Sellers**\n\
        • `/credits` - Shows your campaign credit balance.\n\
        • `/campaign <shop> <text>` - Drafts a campaign for one of your shops.\n\
        • `/campaigns` - Lists your recent campaigns.\n\n\
        **Utility Commands**\n\
        • `/ping` - Checks if the bot is responsive.\n\
        • `/help` - Shows this help message.";

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
