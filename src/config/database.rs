//! Database configuration module.
//!
//! This module handles the `SQLite` connection and schema creation using `SeaORM`.
//! Tables are generated from the entity definitions with
//! `Schema::create_table_from_entity`, parents before children so foreign keys
//! resolve. Composite uniqueness and the queue index are added as explicit
//! index statements because they cannot be expressed on a single column.

use crate::entities::{
    Campaign, Click, Customer, Delivery, LedgerTransaction, Seller, SellerCredit, Shop,
    Subscription, delivery, ledger_transaction,
};
use crate::errors::Result;
use sea_orm::sea_query::Index;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/loyalty_courier.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    debug!("Connecting to database at {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

async fn create_table<C, E>(db: &C, schema: &Schema, entity: E) -> Result<()>
where
    C: ConnectionTrait,
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    db.execute(builder.build(&table)).await?;
    Ok(())
}

/// Creates all tables and indexes if they do not exist yet.
///
/// Safe to call on every start: existing tables and indexes are left alone.
#[instrument(skip(db))]
pub async fn create_tables<C: ConnectionTrait>(db: &C) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table(db, &schema, Seller).await?;
    create_table(db, &schema, SellerCredit).await?;
    create_table(db, &schema, LedgerTransaction).await?;
    create_table(db, &schema, Shop).await?;
    create_table(db, &schema, Customer).await?;
    create_table(db, &schema, Subscription).await?;
    create_table(db, &schema, Campaign).await?;
    create_table(db, &schema, Delivery).await?;
    create_table(db, &schema, Click).await?;

    // One delivery per recipient per campaign; fan-out relies on this for ON CONFLICT.
    let unique_recipient = Index::create()
        .name("idx_deliveries_campaign_customer")
        .table(Delivery)
        .col(delivery::Column::CampaignId)
        .col(delivery::Column::CustomerId)
        .unique()
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&unique_recipient)).await?;

    // Dequeue order: pending rows by eligibility time.
    let queue_index = Index::create()
        .name("idx_deliveries_status_next_attempt")
        .table(Delivery)
        .col(delivery::Column::Status)
        .col(delivery::Column::NextAttemptAt)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&queue_index)).await?;

    let ledger_index = Index::create()
        .name("idx_ledger_transactions_seller")
        .table(LedgerTransaction)
        .col(ledger_transaction::Column::SellerId)
        .col(ledger_transaction::Column::Id)
        .if_not_exists()
        .to_owned();
    db.execute(builder.build(&ledger_index)).await?;

    info!("Database tables ensured");
    Ok(())
}
