//! OpenSASE Orders
//!
//! Order confirmation engine for the e-commerce back office.
//!
//! ## Features
//! - Stock reservation per product and size, never overselling
//! - Coupon and store-wide flat discount resolution with a TTL cache
//! - Deterministic price breakdown (delivery tiers, volume and rounding discounts)
//! - Atomic order assembly with per-line outcome reporting
//! - Order retrieval with staff/customer views, review submission and moderation

use std::time::Duration;
use thiserror::Error;

pub mod api;
pub mod cache;
pub mod config;
pub mod discounts;
pub mod domain;
pub mod orders;
pub mod pricing;
pub mod publisher;
pub mod store;

pub use config::{Config, ConfigError};
pub use discounts::{CouponResolution, DiscountResolver, FlatDiscountResolution};
pub use orders::{Caller, Confirmation, EngineSettings, LineOutcome, OrderService};
pub use pricing::{DeliveryPolicy, PriceBreakdown, PricingEngine};
pub use store::{MemoryStore, PgStore, StoreError};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Phone no is not correct.")]
    InvalidPhone,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("None of the cart items are available.")]
    NothingReserved,

    #[error("Order not found")]
    OrderNotFound,

    #[error("Ordered product not found")]
    OrderedProductNotFound,

    #[error("Customer not found")]
    CustomerNotFound,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Not allowed")]
    Forbidden,

    #[error(transparent)]
    Review(#[from] domain::aggregates::ReviewError),

    #[error("Could not allocate an order id after {0} attempts")]
    OrderIdExhausted(u32),

    #[error("Order confirmation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self { EngineError::InvalidRequest(errors.to_string()) }
}

pub type Result<T> = std::result::Result<T, EngineError>;
