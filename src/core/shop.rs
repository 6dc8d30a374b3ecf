//! Shop business logic - the sending identities owned by sellers.

use crate::{
    entities::{Seller, Shop, shop},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{info, instrument};

/// Creates an active shop for a seller.
///
/// # Errors
/// * [`Error::SellerNotFound`] - the seller does not exist
/// * [`Error::InvalidContent`] - the name is blank
#[instrument(skip(db))]
pub async fn create_shop(
    db: &DatabaseConnection,
    seller_id: i64,
    name: String,
    category: String,
) -> Result<shop::Model> {
    if name.trim().is_empty() {
        return Err(Error::InvalidContent {
            message: "shop name must not be empty".to_string(),
        });
    }
    if Seller::find_by_id(seller_id).one(db).await?.is_none() {
        return Err(Error::SellerNotFound { seller_id });
    }

    let shop = shop::ActiveModel {
        seller_id: Set(seller_id),
        name: Set(name.trim().to_string()),
        category: Set(category),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(shop_id = shop.id, seller_id, "Created shop");
    Ok(shop)
}

/// Looks up a shop by id.
pub async fn get_shop(db: &DatabaseConnection, shop_id: i64) -> Result<Option<shop::Model>> {
    Shop::find_by_id(shop_id).one(db).await.map_err(Into::into)
}

/// Looks up a shop only if `seller_id` owns it.
///
/// A shop owned by someone else is reported as [`Error::ShopNotFound`], the
/// same as a missing one.
pub async fn find_owned_shop<C: ConnectionTrait>(
    conn: &C,
    seller_id: i64,
    shop_id: i64,
) -> Result<shop::Model> {
    Shop::find_by_id(shop_id)
        .filter(shop::Column::SellerId.eq(seller_id))
        .one(conn)
        .await?
        .ok_or(Error::ShopNotFound { shop_id })
}

/// All shops of a seller, oldest first.
pub async fn list_seller_shops(db: &DatabaseConnection, seller_id: i64) -> Result<Vec<shop::Model>> {
    Shop::find()
        .filter(shop::Column::SellerId.eq(seller_id))
        .order_by_asc(shop::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Renames or recategorizes a shop. `None` keeps the current value.
///
/// # Errors
/// * [`Error::ShopNotFound`] - unknown shop
/// * [`Error::InvalidContent`] - the new name is blank
#[instrument(skip(db))]
pub async fn update_shop(
    db: &DatabaseConnection,
    shop_id: i64,
    name: Option<String>,
    category: Option<String>,
) -> Result<shop::Model> {
    let shop = Shop::find_by_id(shop_id)
        .one(db)
        .await?
        .ok_or(Error::ShopNotFound { shop_id })?;

    let mut active: shop::ActiveModel = shop.into();
    if let Some(name) = name {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidContent {
                message: "shop name must not be empty".to_string(),
            });
        }
        active.name = Set(name.to_string());
    }
    if let Some(category) = category {
        active.category = Set(category);
    }
    Ok(active.update(db).await?)
}

/// Activates or deactivates a shop. Inactive shops cannot start sending.
#[instrument(skip(db))]
pub async fn set_shop_active(
    db: &DatabaseConnection,
    shop_id: i64,
    is_active: bool,
) -> Result<shop::Model> {
    let shop = Shop::find_by_id(shop_id)
        .one(db)
        .await?
        .ok_or(Error::ShopNotFound { shop_id })?;

    let mut active: shop::ActiveModel = shop.into();
    active.is_active = Set(is_active);
    Ok(active.update(db).await?)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[tokio::test]
    async fn test_create_and_list_shops() -> Result<()> {
        let db = setup_test_db().await?;
        let seller = create_test_seller(&db, "seller", 0).await?;

        let first = create_shop(&db, seller.id, "Bakery".into(), "food".into()).await?;
        let second = create_shop(&db, seller.id, "  Florist ".into(), "gifts".into()).await?;
        assert!(first.is_active);
        assert_eq!(second.name, "Florist");

        let shops = list_seller_shops(&db, seller.id).await?;
        assert_eq!(shops.len(), 2);
        assert_eq!(shops[0].id, first.id);
        assert_eq!(get_shop(&db, second.id).await?.unwrap().category, "gifts");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_shop_validation() -> Result<()> {
        let db = setup_test_db().await?;
        assert!(matches!(
            create_shop(&db, 42, "Shop".into(), "misc".into()).await,
            Err(Error::SellerNotFound { seller_id: 42 })
        ));

        let seller = create_test_seller(&db, "seller", 0).await?;
        assert!(matches!(
            create_shop(&db, seller.id, "   ".into(), "misc".into()).await,
            Err(Error::InvalidContent { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_shop() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop(&db).await?;

        let renamed = update_shop(&db, shop.id, Some(" Bakery ".into()), None).await?;
        assert_eq!(renamed.name, "Bakery");
        assert_eq!(renamed.category, shop.category);

        let moved = update_shop(&db, shop.id, None, Some("food".into())).await?;
        assert_eq!(moved.name, "Bakery");
        assert_eq!(moved.category, "food");

        assert!(matches!(
            update_shop(&db, shop.id, Some("  ".into()), None).await,
            Err(Error::InvalidContent { .. })
        ));
        assert!(matches!(
            update_shop(&db, 999, None, None).await,
            Err(Error::ShopNotFound { shop_id: 999 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_find_owned_shop_hides_foreign_shops() -> Result<()> {
        let db = setup_test_db().await?;
        let (owner, shop) = setup_with_shop(&db).await?;
        let (stranger, _) = setup_with_shop(&db).await?;

        assert_eq!(find_owned_shop(&db, owner.id, shop.id).await?.id, shop.id);
        assert!(matches!(
            find_owned_shop(&db, stranger.id, shop.id).await,
            Err(Error::ShopNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_set_shop_active() -> Result<()> {
        let db = setup_test_db().await?;
        let (_, shop) = setup_with_shop(&db).await?;

        let updated = set_shop_active(&db, shop.id, false).await?;
        assert!(!updated.is_active);
        assert!(matches!(
            set_shop_active(&db, 999, true).await,
            Err(Error::ShopNotFound { shop_id: 999 })
        ));
        Ok(())
    }
}
