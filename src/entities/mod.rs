//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the persisted contract of the engine: ledger,
//! recipient registry, campaigns, the delivery queue and clicks.

pub mod campaign;
pub mod click;
pub mod customer;
pub mod delivery;
pub mod ledger_transaction;
pub mod seller;
pub mod seller_credit;
pub mod shop;
pub mod subscription;

// Re-export specific types to avoid conflicts
pub use campaign::{
    CampaignStatus, Column as CampaignColumn, Entity as Campaign, Model as CampaignModel,
};
pub use click::{Column as ClickColumn, Entity as Click, Model as ClickModel};
pub use customer::{Column as CustomerColumn, Entity as Customer, Model as CustomerModel};
pub use delivery::{
    Column as DeliveryColumn, DeliveryStatus, Entity as Delivery, Model as DeliveryModel,
};
pub use ledger_transaction::{
    Column as LedgerTransactionColumn, Entity as LedgerTransaction,
    Model as LedgerTransactionModel,
};
pub use seller::{Column as SellerColumn, Entity as Seller, Model as SellerModel};
pub use seller_credit::{
    Column as SellerCreditColumn, Entity as SellerCredit, Model as SellerCreditModel,
};
pub use shop::{Column as ShopColumn, Entity as Shop, Model as ShopModel};
pub use subscription::{
    Column as SubscriptionColumn, Entity as Subscription, Model as SubscriptionModel,
    SubscriptionStatus,
};
