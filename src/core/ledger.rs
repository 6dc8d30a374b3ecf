//! Ledger business logic - prepaid seller credits and their transaction log.
//!
//! The balance row and the transaction log move together: every change to
//! `seller_credits.balance` happens in the same database transaction as the
//! insert of the matching `ledger_transactions` row, whose `balance_after`
//! records the result. Debits use a conditional update
//! (`balance = balance - n WHERE balance >= n`), so two concurrent
//! authorizations can never both succeed against the same credits and the
//! balance never goes negative.

use crate::{
    entities::{
        LedgerTransaction, Seller, SellerCredit, ledger_transaction, seller, seller_credit,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{
    QueryOrder, Set, TransactionTrait, prelude::*, sea_query::Expr, sea_query::OnConflict,
};
use tracing::{debug, info, instrument};

/// Reason recorded for the one-time signup grant
pub const REASON_FREE_SIGNUP: &str = "free_signup";
/// Reason recorded when a campaign payment is debited
pub const REASON_CAMPAIGN_PAYMENT: &str = "campaign_payment";
/// Reason recorded for purchased credits
pub const REASON_PURCHASE: &str = "purchase";

/// Makes sure a seller with this platform identity exists.
///
/// The balance row is created together with the seller. When the seller is
/// new and `free_signup_credits` is positive, the grant is written as a
/// `free_signup` transaction so the log still sums to the balance. Calling this
/// again for an existing seller never grants credits a second time.
#[instrument(skip(db))]
pub async fn ensure_seller(
    db: &DatabaseConnection,
    external_user_id: &str,
    free_signup_credits: i64,
) -> Result<seller::Model> {
    let txn = db.begin().await?;
    let now = Utc::now();

    let inserted = Seller::insert(seller::ActiveModel {
        external_user_id: Set(external_user_id.to_string()),
        created_at: Set(now),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(seller::Column::ExternalUserId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(&txn)
    .await?;

    let seller = Seller::find()
        .filter(seller::Column::ExternalUserId.eq(external_user_id))
        .one(&txn)
        .await?
        .ok_or_else(|| {
            Error::Database(DbErr::RecordNotFound(format!(
                "seller {external_user_id} after insert"
            )))
        })?;

    if inserted > 0 {
        let grant = free_signup_credits.max(0);
        seller_credit::ActiveModel {
            seller_id: Set(seller.id),
            balance: Set(grant),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        if grant > 0 {
            ledger_transaction::ActiveModel {
                seller_id: Set(seller.id),
                delta: Set(grant),
                reason: Set(REASON_FREE_SIGNUP.to_string()),
                balance_after: Set(grant),
                campaign_id: Set(None),
                external_charge_id: Set(None),
                created_at: Set(now),
                ..Default::default()
            }
            .insert(&txn)
            .await?;
        }
        info!(seller_id = seller.id, grant, "Created seller");
    }

    txn.commit().await?;
    Ok(seller)
}

/// Debits `amount` credits inside the caller's transaction.
///
/// The caller owns the transaction so the debit can commit or roll back
/// together with other writes (e.g. the campaign `awaiting_payment -> paid`
/// transition). Fails with [`Error::InsufficientCredit`] without touching the
/// balance when it is below `amount`.
pub(crate) async fn debit_in<C>(
    conn: &C,
    seller_id: i64,
    amount: i64,
    reason: &str,
    campaign_id: Option<i64>,
    external_charge_id: Option<String>,
) -> Result<ledger_transaction::Model>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let now = Utc::now();
    let updated = SellerCredit::update_many()
        .col_expr(
            seller_credit::Column::Balance,
            Expr::col(seller_credit::Column::Balance).sub(amount),
        )
        .col_expr(seller_credit::Column::UpdatedAt, Expr::value(now))
        .filter(seller_credit::Column::SellerId.eq(seller_id))
        .filter(seller_credit::Column::Balance.gte(amount))
        .exec(conn)
        .await?;

    if updated.rows_affected == 0 {
        let credit = SellerCredit::find_by_id(seller_id)
            .one(conn)
            .await?
            .ok_or(Error::SellerNotFound { seller_id })?;
        return Err(Error::InsufficientCredit {
            balance: credit.balance,
            required: amount,
        });
    }

    append_transaction(conn, seller_id, -amount, reason, campaign_id, external_charge_id).await
}

/// Adds `amount` credits inside the caller's transaction.
pub(crate) async fn credit_in<C>(
    conn: &C,
    seller_id: i64,
    amount: i64,
    reason: &str,
    external_charge_id: Option<String>,
) -> Result<ledger_transaction::Model>
where
    C: ConnectionTrait,
{
    if amount <= 0 {
        return Err(Error::InvalidAmount { amount });
    }

    let updated = SellerCredit::update_many()
        .col_expr(
            seller_credit::Column::Balance,
            Expr::col(seller_credit::Column::Balance).add(amount),
        )
        .col_expr(seller_credit::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(seller_credit::Column::SellerId.eq(seller_id))
        .exec(conn)
        .await?;

    if updated.rows_affected == 0 {
        return Err(Error::SellerNotFound { seller_id });
    }

    append_transaction(conn, seller_id, amount, reason, None, external_charge_id).await
}

/// Reads the balance that the preceding update produced and logs it.
async fn append_transaction<C>(
    conn: &C,
    seller_id: i64,
    delta: i64,
    reason: &str,
    campaign_id: Option<i64>,
    external_charge_id: Option<String>,
) -> Result<ledger_transaction::Model>
where
    C: ConnectionTrait,
{
    let balance_after = SellerCredit::find_by_id(seller_id)
        .one(conn)
        .await?
        .ok_or(Error::SellerNotFound { seller_id })?
        .balance;

    let entry = ledger_transaction::ActiveModel {
        seller_id: Set(seller_id),
        delta: Set(delta),
        reason: Set(reason.to_string()),
        balance_after: Set(balance_after),
        campaign_id: Set(campaign_id),
        external_charge_id: Set(external_charge_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(conn)
    .await?;

    debug!(seller_id, delta, balance_after, reason, "Ledger transaction written");
    Ok(entry)
}

/// Atomically checks that the seller holds at least `amount` credits,
/// decrements the balance and appends the transaction.
///
/// # Errors
/// * [`Error::InvalidAmount`] - `amount` is not positive
/// * [`Error::InsufficientCredit`] - balance below `amount`; nothing changes
/// * [`Error::SellerNotFound`] - no balance row for the seller
#[instrument(skip(db))]
pub async fn authorize(
    db: &DatabaseConnection,
    seller_id: i64,
    amount: i64,
    reason: &str,
    linked_campaign: Option<i64>,
) -> Result<ledger_transaction::Model> {
    let txn = db.begin().await?;
    let entry = debit_in(&txn, seller_id, amount, reason, linked_campaign, None).await?;
    txn.commit().await?;
    Ok(entry)
}

/// Adds purchased or refunded credits.
///
/// When `external_charge_id` is given and a credit with that charge already
/// exists for the seller, the existing transaction is returned and the
/// balance is left alone, so a replayed payment notification credits once.
/// Debits carrying the same charge id (campaign payments) do not count.
#[instrument(skip(db))]
pub async fn credit(
    db: &DatabaseConnection,
    seller_id: i64,
    amount: i64,
    reason: &str,
    external_charge_id: Option<String>,
) -> Result<ledger_transaction::Model> {
    let txn = db.begin().await?;

    if let Some(charge_id) = external_charge_id.as_deref() {
        let existing = LedgerTransaction::find()
            .filter(ledger_transaction::Column::SellerId.eq(seller_id))
            .filter(ledger_transaction::Column::ExternalChargeId.eq(charge_id))
            .filter(ledger_transaction::Column::Delta.gt(0))
            .one(&txn)
            .await?;
        if let Some(existing) = existing {
            debug!(seller_id, charge_id, "Charge already credited");
            return Ok(existing);
        }
    }

    let entry = credit_in(&txn, seller_id, amount, reason, external_charge_id).await?;
    txn.commit().await?;
    Ok(entry)
}

/// Current balance of a seller.
pub async fn balance(db: &DatabaseConnection, seller_id: i64) -> Result<i64> {
    SellerCredit::find_by_id(seller_id)
        .one(db)
        .await?
        .map(|credit| credit.balance)
        .ok_or(Error::SellerNotFound { seller_id })
}

/// Balance for a platform identity; unknown identities have no credits.
pub async fn balance_for_user(db: &DatabaseConnection, external_user_id: &str) -> Result<i64> {
    let Some(seller) = Seller::find()
        .filter(seller::Column::ExternalUserId.eq(external_user_id))
        .one(db)
        .await?
    else {
        return Ok(0);
    };

    Ok(SellerCredit::find_by_id(seller.id)
        .one(db)
        .await?
        .map_or(0, |credit| credit.balance))
}

/// Full transaction history of a seller, newest first.
pub async fn transactions(
    db: &DatabaseConnection,
    seller_id: i64,
) -> Result<Vec<ledger_transaction::Model>> {
    LedgerTransaction::find()
        .filter(ledger_transaction::Column::SellerId.eq(seller_id))
        .order_by_desc(ledger_transaction::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
