//! Persistence seams.
//!
//! [`OrderStore`] and [`OfferStore`] are implemented by PostgreSQL
//! ([`postgres::PgStore`]) and by an in-process store ([`memory::MemoryStore`])
//! used for tests and local runs. Everything an order confirmation writes goes
//! through one [`OrderTransaction`]; dropping it without calling
//! [`OrderTransaction::commit`] rolls the work back.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::aggregates::{Customer, Offer, OfferType, Order, OrderedProduct, Product, ReviewStatus};
use crate::domain::value_objects::{PhoneNumber, Quantity};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt {table} row: {detail}")]
    Corrupt { table: &'static str, detail: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Identifies one order line for review purposes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineKey {
    pub product_id: String,
    pub order_id: String,
    pub size: String,
}

/// A review as listed on a product page.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReviewEntry {
    pub order_id: String,
    pub product_id: String,
    pub product_size: String,
    pub rating: Option<Decimal>,
    pub review: Option<String>,
    pub review_status: ReviewStatus,
    #[serde(skip)]
    pub customer_id: Option<Uuid>,
}

#[async_trait]
pub trait OrderTransaction: Send {
    async fn order_id_exists(&mut self, order_id: &str) -> Result<bool, StoreError>;
    /// Writes the order shell. Returns `false`, writing nothing, when another
    /// order already holds the same idempotency key; a concurrent holder is
    /// waited for.
    async fn insert_order(&mut self, order: &Order) -> Result<bool, StoreError>;
    async fn find_product(&mut self, product_id: &str) -> Result<Option<Product>, StoreError>;
    /// Stock ledger reservation: takes `min(available, requested)` from the
    /// (product, size) row, serialized against concurrent reservations, and
    /// returns the amount taken. A missing row reserves nothing.
    async fn reserve_stock(&mut self, product_id: &str, size: &str, requested: Quantity) -> Result<Quantity, StoreError>;
    async fn insert_ordered_product(&mut self, line: &OrderedProduct) -> Result<(), StoreError>;
    async fn update_order_totals(&mut self, order: &Order) -> Result<(), StoreError>;
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError>;

    async fn find_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError>;
    async fn get_or_create_customer(&self, phone: &PhoneNumber) -> Result<Customer, StoreError>;
    /// Deletes every cart line of the customer, returning how many went.
    async fn clear_cart(&self, customer_id: Uuid) -> Result<u64, StoreError>;

    /// Order with its line items.
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, StoreError>;
    async fn find_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError>;
    /// Newest first.
    async fn list_orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>, StoreError>;

    async fn find_ordered_product(&self, key: &LineKey) -> Result<Option<OrderedProduct>, StoreError>;
    /// Writes the review fields of `line` only if the stored status still
    /// equals `expected`. Returns whether the write happened.
    async fn save_review(&self, line: &OrderedProduct, expected: ReviewStatus) -> Result<bool, StoreError>;
    /// Every line of the product that carries a review (status other than unsubmitted).
    async fn reviews_for_product(&self, product_id: &str) -> Result<Vec<ReviewEntry>, StoreError>;
}

#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Offers of `offer_type` active on `day`, optionally restricted to a
    /// promo code, in insertion order.
    async fn active_offers(&self, offer_type: OfferType, day: NaiveDate, promo_code: Option<&str>) -> Result<Vec<Offer>, StoreError>;
}
