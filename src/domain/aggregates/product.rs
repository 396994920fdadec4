//! Product read model and the per-size stock ledger row

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::value_objects::Quantity;

/// Catalog product as seen by the order engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub category_id: Option<String>,
    pub product_name: String,
    pub base_price: Decimal,
    pub selling_price: Decimal,
    /// Percentage in `0..=100`.
    pub discount_pct: Decimal,
    pub is_archived: bool,
    pub total_stock: i64,
}

impl Product {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        base_price: Decimal,
        selling_price: Decimal,
        discount_pct: Decimal,
    ) -> Result<Self, ProductError> {
        if base_price.is_sign_negative() || selling_price.is_sign_negative() {
            return Err(ProductError::NegativePrice);
        }
        if discount_pct < Decimal::ZERO || discount_pct > Decimal::ONE_HUNDRED {
            return Err(ProductError::DiscountOutOfRange);
        }
        Ok(Self {
            product_id: product_id.into(), category_id: None, product_name: product_name.into(),
            base_price, selling_price, discount_pct, is_archived: false, total_stock: 0,
        })
    }

    /// Discount taken off one unit of the selling price.
    pub fn unit_discount(&self) -> Decimal { self.selling_price * self.discount_pct / Decimal::ONE_HUNDRED }

    /// What the customer pays per unit before order level discounts.
    pub fn unit_price(&self) -> Decimal { self.selling_price - self.unit_discount() }

    pub fn archive(&mut self) { self.is_archived = true; }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum ProductError { NegativePrice, DiscountOutOfRange }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NegativePrice => write!(f, "Price must not be negative"),
            Self::DiscountOutOfRange => write!(f, "Discount must be between 0 and 100"),
        }
    }
}

/// Stock for one (product, size) pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    pub product_id: String,
    pub size: String,
    pub count: i32,
}

impl StockEntry {
    pub fn new(product_id: impl Into<String>, size: impl Into<String>, count: i32) -> Self {
        Self { product_id: product_id.into(), size: size.into(), count: count.max(0) }
    }

    pub fn available(&self) -> Quantity { Quantity::new(self.count.max(0) as u32) }

    /// Takes as much of `requested` as is on hand and returns what was taken.
    pub fn reserve(&mut self, requested: Quantity) -> Quantity {
        let reserved = self.available().min(requested);
        // reserved <= count, so this cannot go below zero
        self.count -= reserved.value() as i32;
        reserved
    }
}
