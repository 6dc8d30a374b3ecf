use loyalty_courier::{
    bot::{self, DiscordSender},
    config::{self, database},
    dispatcher::Dispatcher,
    errors::{Error, Result},
};
use dotenvy::dotenv;
use poise::serenity_prelude as serenity;
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Load the application configuration
    let app_config = Arc::new(config::load_app_configuration()?);
    let dispatcher_config = app_config.dispatcher.to_dispatcher_config()?;

    // 4. Connect and create the schema
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    // DISCORD_BOT_TOKEN is read here, directly before use, not stored in AppConfig
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {}", e))
        .map_err(Error::EnvVar)?;

    // 5. Start the dispatcher on its own HTTP client
    let sender = Arc::new(DiscordSender::new(Arc::new(serenity::Http::new(&token))));
    let mut dispatcher = Dispatcher::new(db.clone(), dispatcher_config, sender);
    dispatcher.start();

    // 6. Run the bot until the gateway connection ends
    let bot_result = bot::run_bot(&token, Arc::clone(&app_config), db).await;
    if let Err(e) = &bot_result {
        error!("Bot stopped with error: {}", e);
    }

    dispatcher.shutdown().await;
    bot_result
}
