//! Persistence seams for the checkout workflow.
//!
//! Every store is constructed with its own handle and passed in explicitly;
//! [`orm::OrmStore`] backs production and [`memory::InMemoryStore`] backs tests.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Cart, CartItem, Customer, Order, Product, Transaction};

pub mod memory;
pub mod orm;

pub use memory::InMemoryStore;
pub use orm::OrmStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("product {0} not found")]
    ProductMissing(Uuid),

    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    StockConflict {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("state conflict: {0}")]
    StateConflict(String),

    #[error("invalid payment status: {0}")]
    InvalidPaymentStatus(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A page of records plus the total count across all pages.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn get_product(&self, id: Uuid) -> StoreResult<Product>;

    async fn list_products(
        &self,
        category: Option<&str>,
        limit: u64,
        offset: u64,
    ) -> StoreResult<Page<Product>>;

    async fn insert_product(&self, product: &Product) -> StoreResult<()>;

    /// Overwrites the stock count. Negative values are rejected.
    async fn update_stock(&self, id: Uuid, new_stock: i32) -> StoreResult<()>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    /// Fails with [`StoreError::NotFound`] when the customer has never had a cart.
    async fn get_cart_by_customer(&self, customer_id: Uuid) -> StoreResult<Cart>;

    async fn create_cart(&self, customer_id: Uuid) -> StoreResult<Cart>;

    /// Adds `quantity` to the line for `product_id`, creating it if needed.
    async fn add_cart_item(
        &self,
        cart_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> StoreResult<CartItem>;

    async fn remove_cart_item(&self, cart_id: Uuid, product_id: Uuid) -> StoreResult<()>;

    async fn clear_cart(&self, cart_id: Uuid) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, order: &Order) -> StoreResult<()>;

    async fn update_order(&self, order: &Order) -> StoreResult<()>;

    async fn get_order_by_id(&self, id: Uuid) -> StoreResult<Order>;

    async fn list_orders_by_customer(
        &self,
        customer_id: Uuid,
        limit: u64,
        offset: u64,
    ) -> StoreResult<Page<Order>>;

    async fn create_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    async fn update_transaction(&self, transaction: &Transaction) -> StoreResult<()>;

    async fn get_transaction_by_id(&self, id: &str) -> StoreResult<Transaction>;
}

#[async_trait]
pub trait CustomerStore: Send + Sync {
    async fn find_customer_by_email(&self, email: &str) -> StoreResult<Option<Customer>>;

    async fn create_customer(&self, customer: &Customer) -> StoreResult<()>;
}

/// Everything a payment confirmation writes, applied as one unit.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
    /// The order already transitioned to paid. Its items drive the stock
    /// decrements.
    pub order: Order,
    pub transaction: Transaction,
    /// Owner of the cart to clear once stock is taken.
    pub customer_id: Uuid,
}

#[async_trait]
pub trait CommerceStore: ProductStore + CartStore + OrderStore {
    /// Applies a settlement atomically: the order update only lands if the
    /// stored order is still pending, every stock decrement is conditional on
    /// sufficient stock, and the customer's cart is emptied. Any failure
    /// leaves all records as they were.
    async fn settle_payment(&self, settlement: &PaymentSettlement) -> StoreResult<()>;

    /// Removes an order and its items. Used to compensate a checkout whose
    /// transaction could not be recorded.
    async fn discard_order(&self, order_id: Uuid) -> StoreResult<()>;
}
