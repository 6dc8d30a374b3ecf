//! Recipient registry - customers and their per-shop opt-in state.
//!
//! A customer is a recipient of a shop's campaigns exactly when a
//! subscription row for the pair exists with status `subscribed` at the moment
//! the campaign fans out. Opt-out takes effect for every later fan-out; rows
//! already queued for earlier campaigns are not touched.

use crate::{
    entities::{Customer, Shop, Subscription, SubscriptionStatus, customer, subscription},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use tracing::{debug, instrument};

/// Subscriber counts for one shop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubscriptionStats {
    /// Customers currently opted in
    pub subscribed: u64,
    /// Customers who opted out
    pub unsubscribed: u64,
    /// All subscription rows of the shop
    pub total: u64,
}

/// Optional profile fields; `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct CustomerProfile {
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub last_name: Option<String>,
    /// Contact phone number
    pub phone: Option<String>,
}

/// Finds or creates the customer for a platform identity.
#[instrument(skip(db))]
pub async fn ensure_customer(
    db: &DatabaseConnection,
    external_user_id: &str,
) -> Result<customer::Model> {
    Customer::insert(customer::ActiveModel {
        external_user_id: Set(external_user_id.to_string()),
        first_name: Set(None),
        last_name: Set(None),
        phone: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    })
    .on_conflict(
        OnConflict::column(customer::Column::ExternalUserId)
            .do_nothing()
            .to_owned(),
    )
    .exec_without_returning(db)
    .await?;

    Customer::find()
        .filter(customer::Column::ExternalUserId.eq(external_user_id))
        .one(db)
        .await?
        .ok_or_else(|| {
            Error::Database(DbErr::RecordNotFound(format!(
                "customer {external_user_id} after insert"
            )))
        })
}

/// Looks up a customer by platform identity.
pub async fn get_customer_by_external_id(
    db: &DatabaseConnection,
    external_user_id: &str,
) -> Result<Option<customer::Model>> {
    Customer::find()
        .filter(customer::Column::ExternalUserId.eq(external_user_id))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Updates whichever profile fields are given.
pub async fn update_customer_profile(
    db: &DatabaseConnection,
    customer_id: i64,
    profile: CustomerProfile,
) -> Result<customer::Model> {
    let customer = Customer::find_by_id(customer_id)
        .one(db)
        .await?
        .ok_or(Error::CustomerNotFound { customer_id })?;

    let mut active: customer::ActiveModel = customer.into();
    if let Some(first_name) = profile.first_name {
        active.first_name = Set(Some(first_name));
    }
    if let Some(last_name) = profile.last_name {
        active.last_name = Set(Some(last_name));
    }
    if let Some(phone) = profile.phone {
        active.phone = Set(Some(phone));
    }
    Ok(active.update(db).await?)
}

async fn ensure_shop_and_customer<C: ConnectionTrait>(
    conn: &C,
    shop_id: i64,
    customer_id: i64,
) -> Result<()> {
    if Shop::find_by_id(shop_id).one(conn).await?.is_none() {
        return Err(Error::ShopNotFound { shop_id });
    }
    if Customer::find_by_id(customer_id).one(conn).await?.is_none() {
        return Err(Error::CustomerNotFound { customer_id });
    }
    Ok(())
}

/// Opts a customer in to a shop. Subscribing again after an opt-out clears
/// `unsubscribed_at`; subscribing while already subscribed is a no-op.
#[instrument(skip(db))]
pub async fn subscribe(
    db: &DatabaseConnection,
    shop_id: i64,
    customer_id: i64,
) -> Result<subscription::Model> {
    let txn = db.begin().await?;
    ensure_shop_and_customer(&txn, shop_id, customer_id).await?;

    let existing = Subscription::find_by_id((shop_id, customer_id))
        .one(&txn)
        .await?;
    let now = Utc::now();

    let model = match existing {
        Some(row) if row.status == SubscriptionStatus::Subscribed => row,
        Some(row) => {
            let mut active: subscription::ActiveModel = row.into();
            active.status = Set(SubscriptionStatus::Subscribed);
            active.subscribed_at = Set(Some(now));
            active.unsubscribed_at = Set(None);
            active.update(&txn).await?
        }
        None => {
            subscription::ActiveModel {
                shop_id: Set(shop_id),
                customer_id: Set(customer_id),
                status: Set(SubscriptionStatus::Subscribed),
                subscribed_at: Set(Some(now)),
                unsubscribed_at: Set(None),
            }
            .insert(&txn)
            .await?
        }
    };

    txn.commit().await?;
    debug!(shop_id, customer_id, "Customer subscribed");
    Ok(model)
}

/// Opts a customer out of a shop.
///
/// When the pair was never subscribed an `unsubscribed` row is written anyway,
/// so the explicit opt-out is remembered.
#[instrument(skip(db))]
pub async fn unsubscribe(
    db: &DatabaseConnection,
    shop_id: i64,
    customer_id: i64,
) -> Result<subscription::Model> {
    let txn = db.begin().await?;
    ensure_shop_and_customer(&txn, shop_id, customer_id).await?;

    let existing = Subscription::find_by_id((shop_id, customer_id))
        .one(&txn)
        .await?;
    let now = Utc::now();

    let model = match existing {
        Some(row) if row.status == SubscriptionStatus::Unsubscribed => row,
        Some(row) => {
            let mut active: subscription::ActiveModel = row.into();
            active.status = Set(SubscriptionStatus::Unsubscribed);
            active.unsubscribed_at = Set(Some(now));
            active.update(&txn).await?
        }
        None => {
            subscription::ActiveModel {
                shop_id: Set(shop_id),
                customer_id: Set(customer_id),
                status: Set(SubscriptionStatus::Unsubscribed),
                subscribed_at: Set(None),
                unsubscribed_at: Set(Some(now)),
            }
            .insert(&txn)
            .await?
        }
    };

    txn.commit().await?;
    debug!(shop_id, customer_id, "Customer unsubscribed");
    Ok(model)
}

/// Counts of subscribed and unsubscribed customers for a shop.
pub async fn subscription_stats(db: &DatabaseConnection, shop_id: i64) -> Result<SubscriptionStats> {
    let subscribed = Subscription::find()
        .filter(subscription::Column::ShopId.eq(shop_id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Subscribed))
        .count(db)
        .await?;
    let unsubscribed = Subscription::find()
        .filter(subscription::Column::ShopId.eq(shop_id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Unsubscribed))
        .count(db)
        .await?;

    Ok(SubscriptionStats {
        subscribed,
        unsubscribed,
        total: subscribed + unsubscribed,
    })
}

/// Ids of the customers currently opted in to a shop, in ascending order.
pub async fn subscribed_customers<C: ConnectionTrait>(conn: &C, shop_id: i64) -> Result<Vec<i64>> {
    Subscription::find()
        .select_only()
        .column(subscription::Column::CustomerId)
        .filter(subscription::Column::ShopId.eq(shop_id))
        .filter(subscription::Column::Status.eq(SubscriptionStatus::Subscribed))
        .order_by_asc(subscription::Column::CustomerId)
        .into_tuple::<i64>()
        .all(conn)
        .await
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_ensure_customer_is_idempotent() -> Result<()> {
        let db = setup_test_db().await?;
        let first = ensure_customer(&db, "buyer-1").await?;
        let second = ensure_customer(&db, "buyer-1").await?;
        assert_eq!(first.id, second.id);
        assert_eq!(
            get_customer_by_external_id(&db, "buyer-1").await?.unwrap().id,
            first.id
        );
        assert!(get_customer_by_external_id(&db, "buyer-2").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_update_customer_profile_keeps_unset_fields() -> Result<()> {
        let db = setup_test_db().await?;
        let customer = ensure_customer(&db, "buyer").await?;

        update_customer_profile(
            &db,
            customer.id,
            CustomerProfile {
                first_name: Some("Ada".into()),
                phone: Some("+100".into()),
                ..Default::default()
            },
        )
        .await?;
        let updated = update_customer_profile(
            &db,
            customer.id,
            CustomerProfile {
                last_name: Some("Lovelace".into()),
                ..Default::default()
            },
        )
        .await?;

        assert_eq!(updated.first_name.as_deref(), Some("Ada"));
        assert_eq!(updated.last_name.as_deref(), Some("Lovelace"));
        assert_eq!(updated.phone.as_deref(), Some("+100"));

        assert!(matches!(
            update_customer_profile(&db, 999, CustomerProfile::default()).await,
            Err(Error::CustomerNotFound { customer_id: 999 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_unsubscribe_resubscribe() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop(&db).await?;
        let customer = ensure_customer(&db, "buyer").await?;

        let sub = subscribe(&db, shop.id, customer.id).await?;
        assert_eq!(sub.status, SubscriptionStatus::Subscribed);
        assert_eq!(subscribed_customers(&db, shop.id).await?, vec![customer.id]);

        let unsub = unsubscribe(&db, shop.id, customer.id).await?;
        assert_eq!(unsub.status, SubscriptionStatus::Unsubscribed);
        assert!(unsub.unsubscribed_at.is_some());
        assert!(subscribed_customers(&db, shop.id).await?.is_empty());

        let again = subscribe(&db, shop.id, customer.id).await?;
        assert_eq!(again.status, SubscriptionStatus::Subscribed);
        assert!(again.unsubscribed_at.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_unsubscribe_without_prior_subscription() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop(&db).await?;
        let customer = ensure_customer(&db, "buyer").await?;

        let row = unsubscribe(&db, shop.id, customer.id).await?;
        assert_eq!(row.status, SubscriptionStatus::Unsubscribed);
        assert!(row.subscribed_at.is_none());

        let stats = subscription_stats(&db, shop.id).await?;
        assert_eq!(
            stats,
            SubscriptionStats {
                subscribed: 0,
                unsubscribed: 1,
                total: 1
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_subscription_stats_and_membership() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop(&db).await?;
        let ids = create_subscribers(&db, shop.id, 3).await?;
        unsubscribe(&db, shop.id, ids[1]).await?;

        let stats = subscription_stats(&db, shop.id).await?;
        assert_eq!(stats.subscribed, 2);
        assert_eq!(stats.unsubscribed, 1);
        assert_eq!(stats.total, 3);
        assert_eq!(
            subscribed_customers(&db, shop.id).await?,
            vec![ids[0], ids[2]]
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_subscribe_unknown_parties() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop(&db).await?;
        assert!(matches!(
            subscribe(&db, shop.id, 77).await,
            Err(Error::CustomerNotFound { customer_id: 77 })
        ));
        let customer = ensure_customer(&db, "buyer").await?;
        assert!(matches!(
            subscribe(&db, 88, customer.id).await,
            Err(Error::ShopNotFound { shop_id: 88 })
        ));
        Ok(())
    }
}
