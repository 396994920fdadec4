//! Inbound payloads.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::domain::aggregates::DeliverySnapshot;
use crate::domain::value_objects::PhoneNumber;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ConfirmOrderRequest {
    #[validate(length(min = 1, message = "Cart is empty."))]
    pub cart_item_list: Vec<CartItemRequest>,
    #[validate]
    pub delivery_details: DeliveryDetails,
    #[serde(default)]
    pub applied_coupon: Option<AppliedCoupon>,
    #[serde(default)]
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,
}

impl ConfirmOrderRequest {
    /// Promo code as typed, if any survived trimming.
    pub fn promo_code(&self) -> Option<&str> {
        self.applied_coupon.as_ref().map(|c| c.promo_code.trim()).filter(|c| !c.is_empty())
    }

    /// Cart lines with repeated (product, size) pairs folded together, first
    /// occurrence order kept.
    pub fn merged_items(&self) -> Vec<CartItemRequest> {
        let mut merged: Vec<CartItemRequest> = Vec::with_capacity(self.cart_item_list.len());
        for item in &self.cart_item_list {
            match merged.iter_mut().find(|m| m.product.product_id == item.product.product_id && m.size == item.size) {
                Some(existing) => existing.count = existing.count.max(0).saturating_add(item.count.max(0)),
                None => merged.push(item.clone()),
            }
        }
        merged
    }
}

/// Indexes into `items` sorted by (product, size). Reserving in this order
/// makes concurrent confirmations lock stock rows in the same sequence.
pub fn reservation_order(items: &[CartItemRequest]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| {
        let (x, y) = (&items[a], &items[b]);
        (&x.product.product_id, &x.size).cmp(&(&y.product.product_id, &y.size))
    });
    order
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CartItemRequest {
    pub product: ProductRef,
    #[serde(default = "default_size")]
    pub size: String,
    /// Negative counts are clamped to zero.
    pub count: i64,
}

fn default_size() -> String { "default".to_string() }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductRef {
    pub product_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct DeliveryDetails {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub phone: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 1))]
    pub address: String,
    #[validate(length(min = 1, max = 64))]
    pub district: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub note: Option<String>,
}

impl DeliveryDetails {
    /// Snapshot stored on the order, with the phone in its normalized form.
    pub fn snapshot(&self, phone: &PhoneNumber) -> DeliverySnapshot {
        DeliverySnapshot {
            customer_name: self.name.trim().to_string(),
            customer_phone: phone.to_string(),
            customer_email: self.email.clone(),
            customer_address: format!("{}, {}", self.address.trim(), self.district.trim()),
            customer_district: self.district.trim().to_string(),
            customer_note: self.note.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppliedCoupon {
    pub promo_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct SubmitReviewRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub order_id: String,
    #[validate(length(min = 1))]
    pub size: String,
    pub rating: Decimal,
    #[validate(length(max = 2000))]
    pub review: String,
}

fn blank_as_none<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty()))
}
