//! Seller commands - credit balance and recent ledger activity.

mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        core::{ledger, shop},
        errors::{Error, Result},
    };
    use std::fmt::Write;

    /// Number of ledger entries shown by `/credits`
    const RECENT_ENTRIES: usize = 5;

    /// Shows your credit balance, your shops and the latest ledger entries.
    ///
    /// The first call registers you as a seller and grants the signup credits.
    #[poise::command(slash_command, prefix_command)]
    pub async fn credits(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let db = &ctx.data().database;
        let grant = ctx.data().config.free_signup_credits;

        let seller = ledger::ensure_seller(db, &ctx.author().id.to_string(), grant).await?;
        let balance = ledger::balance(db, seller.id).await?;
        let shops = shop::list_seller_shops(db, seller.id).await?;
        let history = ledger::transactions(db, seller.id).await?;

        let mut reply = format!("💳 **Balance:** {balance} credits\n");
        if !shops.is_empty() {
            reply.push_str("\n**Shops**\n");
            for s in &shops {
                let state = if s.is_active { "active" } else { "inactive" };
                let _ = writeln!(reply, "• #{} {} ({state})", s.id, s.name);
            }
        }
        if !history.is_empty() {
            reply.push_str("\n**Recent activity**\n");
            for entry in history.iter().take(RECENT_ENTRIES) {
                let _ = writeln!(
                    reply,
                    "• {:+} {} → {} ({})",
                    entry.delta,
                    entry.reason,
                    entry.balance_after,
                    entry.created_at.format("%Y-%m-%d")
                );
            }
        }

        ctx.say(reply).await?;
        Ok(())
    }
}

pub use inner::*;
