//! Unified error type for the campaign delivery engine.
//!
//! Every fallible operation in the crate returns [`Result`]. Variants carry the
//! identifiers needed to act on the failure, so callers can surface a precise
//! message without re-querying the database.

use crate::entities::campaign::CampaignStatus;
use thiserror::Error;

/// Errors produced by the engine and its surfaces.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration could not be read or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// What went wrong
        message: String,
    },

    /// Storage layer failure
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// A credit amount that must be positive was zero or negative
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: i64,
    },

    /// Ledger authorization refused because the balance is too low
    #[error("Insufficient credit: balance {balance}, required {required}")]
    InsufficientCredit {
        /// Balance at the time of the refusal
        balance: i64,
        /// Amount that was requested
        required: i64,
    },

    /// Seller (or its ledger balance row) does not exist
    #[error("Seller {seller_id} not found")]
    SellerNotFound {
        /// Requested seller id
        seller_id: i64,
    },

    /// Shop does not exist
    #[error("Shop {shop_id} not found")]
    ShopNotFound {
        /// Requested shop id
        shop_id: i64,
    },

    /// Shop exists but has been deactivated
    #[error("Shop {shop_id} is inactive")]
    ShopInactive {
        /// Inactive shop id
        shop_id: i64,
    },

    /// Customer does not exist
    #[error("Customer {customer_id} not found")]
    CustomerNotFound {
        /// Requested customer id
        customer_id: i64,
    },

    /// Campaign does not exist
    #[error("Campaign {campaign_id} not found")]
    CampaignNotFound {
        /// Requested campaign id
        campaign_id: i64,
    },

    /// Campaign state machine refused the transition; state is unchanged
    #[error("Campaign {campaign_id} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Campaign id
        campaign_id: i64,
        /// Current state
        from: CampaignStatus,
        /// Requested state
        to: CampaignStatus,
    },

    /// Operation needs a finished campaign but this one is still live
    #[error("Campaign {campaign_id} is still {status}")]
    CampaignActive {
        /// Campaign id
        campaign_id: i64,
        /// Current, non-terminal state
        status: CampaignStatus,
    },

    /// Payment confirmation amount differs from the campaign price
    #[error("Payment amount {actual} does not match campaign price {expected}")]
    PriceMismatch {
        /// Campaign price
        expected: i64,
        /// Amount carried by the confirmation
        actual: i64,
    },

    /// Campaign content failed validation
    #[error("Invalid campaign content: {message}")]
    InvalidContent {
        /// Validation failure
        message: String,
    },

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing or unreadable environment variable
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Serenity/Poise framework failure
    #[error("Serenity/Poise framework error: {0}")]
    Framework(Box<poise::serenity_prelude::Error>),
}

impl From<poise::serenity_prelude::Error> for Error {
    fn from(value: poise::serenity_prelude::Error) -> Self {
        Self::Framework(Box::new(value))
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
