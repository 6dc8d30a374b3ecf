//! Seller campaign commands - draft a campaign and list recent ones.

use crate::{
    config::AppConfig,
    core::{
        campaign::{self, CampaignContent},
        ledger,
    },
    entities::campaign::Model as Campaign,
    errors::Result,
};
use sea_orm::DatabaseConnection;

/// Drafts a campaign for the seller behind `seller_external_id` at the
/// configured price and submits it for payment.
///
/// # Errors
/// Fails when the shop is not the seller's or the content is invalid.
pub async fn draft_campaign(
    db: &DatabaseConnection,
    config: &AppConfig,
    seller_external_id: &str,
    shop_id: i64,
    content: CampaignContent,
) -> Result<Campaign> {
    let seller = ledger::ensure_seller(db, seller_external_id, config.free_signup_credits).await?;
    let draft =
        campaign::create_seller_draft(db, seller.id, shop_id, content, config.price_per_campaign)
            .await?;
    campaign::submit(db, draft.id).await
}

mod inner {
    #![allow(missing_docs)]

    use super::draft_campaign;
    use crate::{
        bot::BotData,
        core::{
            campaign::{Button, CampaignContent, list_seller_campaigns},
            ledger,
        },
        errors::{Error, Result},
    };
    use std::fmt::Write;

    /// Campaigns shown by `/campaigns`
    const LISTED_CAMPAIGNS: u64 = 10;

    /// Drafts a campaign for one of your shops.
    #[poise::command(slash_command, prefix_command)]
    pub async fn campaign(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Shop number"] shop_id: i64,
        #[description = "Message text"] text: String,
        #[description = "Button label"] button_title: Option<String>,
        #[description = "Button link"] button_url: Option<String>,
        #[description = "Image URL"] image_url: Option<String>,
    ) -> Result<()> {
        let button = match (button_title, button_url) {
            (None, None) => None,
            (title, url) => Some(Button {
                title: title.unwrap_or_default(),
                url: url.unwrap_or_default(),
            }),
        };
        let content = CampaignContent {
            text,
            button,
            image_ref: image_url,
        };

        let data = ctx.data();
        let draft = draft_campaign(
            &data.database,
            &data.config,
            &ctx.author().id.to_string(),
            shop_id,
            content,
        )
        .await?;

        ctx.say(format!(
            "📝 Campaign #{} created for shop #{}.\nPrice: {} credits. It will be sent once paid.",
            draft.id, draft.shop_id, draft.price
        ))
        .await?;
        Ok(())
    }

    /// Lists your most recent campaigns.
    #[poise::command(slash_command, prefix_command)]
    pub async fn campaigns(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let db = &ctx.data().database;
        let grant = ctx.data().config.free_signup_credits;
        let seller = ledger::ensure_seller(db, &ctx.author().id.to_string(), grant).await?;

        let listed = list_seller_campaigns(db, seller.id, LISTED_CAMPAIGNS).await?;
        if listed.is_empty() {
            ctx.say("You have no campaigns yet.").await?;
            return Ok(());
        }

        let mut reply = String::from("**Your campaigns**\n");
        for c in &listed {
            let _ = writeln!(
                reply,
                "• #{} shop #{} {} ({}/{} sent, {} clicks)",
                c.id, c.shop_id, c.status, c.sent_count, c.total_recipients, c.click_count
            );
        }
        ctx.say(reply).await?;
        Ok(())
    }
}

pub use inner::*;
