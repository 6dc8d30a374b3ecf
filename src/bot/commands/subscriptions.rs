//! Customer opt-in and opt-out commands.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        core::{registry, shop},
        errors::{Error, Result},
    };

    /// Subscribe to offers from a shop.
    #[poise::command(slash_command, prefix_command)]
    pub async fn subscribe(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Shop number"] shop_id: i64,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let Some(shop) = shop::get_shop(db, shop_id).await?.filter(|s| s.is_active) else {
            ctx.say(format!("❌ Shop #{shop_id} does not exist.")).await?;
            return Ok(());
        };

        let customer = registry::ensure_customer(db, &ctx.author().id.to_string()).await?;
        registry::subscribe(db, shop.id, customer.id).await?;

        ctx.say(format!(
            "✅ You will now receive offers from **{}**. Use `/unsubscribe {}` to stop.",
            shop.name, shop.id
        ))
        .await?;
        Ok(())
    }

    /// Stop receiving offers from a shop.
    #[poise::command(slash_command, prefix_command)]
    pub async fn unsubscribe(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Shop number"] shop_id: i64,
    ) -> Result<()> {
        let db = &ctx.data().database;
        let Some(shop) = shop::get_shop(db, shop_id).await? else {
            ctx.say(format!("❌ Shop #{shop_id} does not exist.")).await?;
            return Ok(());
        };

        let customer = registry::ensure_customer(db, &ctx.author().id.to_string()).await?;
        registry::unsubscribe(db, shop.id, customer.id).await?;

        ctx.say(format!("👋 You will no longer receive offers from **{}**.", shop.name))
            .await?;
        Ok(())
    }
}

pub use inner::*;
