//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent, ReviewEvent};
use crate::domain::value_objects::Quantity;

coded_enum! {
    #[derive(Default)]
    pub enum OrderStatus {
        #[default]
        Placed = 0 => "Placed",
        Processing = 1 => "Processing",
        Confirmed = 2 => "Confirmed",
        Packing = 3 => "Packing",
        ReadyToShip = 4 => "Ready to Ship",
        Shipped = 5 => "Shipped",
        Cancelled = 6 => "Cancelled",
        PickupRequested = 7 => "Pickup Requested",
        AssignedForPickup = 8 => "Assigned for Pickup",
        Picked = 9 => "Picked",
        PickupFailed = 10 => "Pickup Failed",
        PickupCancelled = 11 => "Pickup Cancelled",
        AtTheSortingHub = 12 => "At the Sorting HUB",
        InTransit = 13 => "In Transit",
        ReceivedAtLastMileHub = 14 => "Received at Last Mile HUB",
        AssignedForDelivery = 15 => "Assigned for Delivery",
        Delivered = 16 => "Delivered",
        PartialDelivery = 17 => "Partial Delivery",
        Return = 18 => "Return",
        DeliveryFailed = 19 => "Delivery Failed",
        OnHold = 20 => "On Hold",
        PaymentInvoice = 21 => "Payment Invoice",
        PaidReturn = 22 => "Paid Return",
        Exchange = 23 => "Exchange",
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum PaymentStatus {
        #[default]
        Pending = 0 => "Pending",
        Paid = 1 => "Paid",
        PartiallyPaid = 2 => "Partially Paid",
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum PaymentMethod {
        #[default]
        CashOnDelivery = 1 => "Cash On Delivery",
        SslCommerz = 2 => "SSLCommerz",
        Bkash = 3 => "bKash",
    }
}

coded_enum! {
    pub enum CourierOption {
        Pathao = 1 => "Pathao Courier",
        Redx = 2 => "RedX Courier",
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum DeliveryType {
        #[default]
        Regular = 48 => "Regular delivery",
        OnDemand = 12 => "On Demand delivery",
    }
}

coded_enum! {
    #[derive(Default)]
    pub enum ReviewStatus {
        #[default]
        Unsubmitted = 0 => "Unsubmitted",
        Submitted = 1 => "Submitted",
        Approved = 2 => "Approved",
    }
}

/// Delivery details copied onto the order at confirmation time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliverySnapshot {
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    /// "address, district"
    pub customer_address: String,
    pub customer_district: String,
    pub customer_note: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub products_base_value: Decimal,
    pub products_regular_value: Decimal,
    pub products_discount: Decimal,
    pub flat_discount: Decimal,
    pub additional_discount: Decimal,
    pub customers_delivery_charge: Decimal,
    pub amount_to_collect: Decimal,
    pub delivery_cost: Decimal,
    pub order_profit: Decimal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub order_id: String,
    pub customer_id: Option<Uuid>,
    pub delivery: DeliverySnapshot,
    pub totals: OrderTotals,
    pub applied_promo_code: Option<String>,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub courier: Option<CourierOption>,
    pub delivery_type: DeliveryType,
    pub delivery_consignment_id: Option<String>,
    pub delivery_tracking_url: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ordered_products: Vec<OrderedProduct>,
}

impl Order {
    /// Empty order shell; line items and totals are filled in while the
    /// confirmation transaction runs.
    pub fn place(order_id: impl Into<String>, customer_id: Option<Uuid>, delivery: DeliverySnapshot, idempotency_key: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            order_id: order_id.into(), customer_id, delivery, totals: OrderTotals::default(), applied_promo_code: None,
            order_status: OrderStatus::Placed, payment_status: PaymentStatus::Pending, payment_method: PaymentMethod::CashOnDelivery,
            courier: None, delivery_type: DeliveryType::Regular, delivery_consignment_id: None, delivery_tracking_url: None,
            idempotency_key, created_at: now, updated_at: now, ordered_products: vec![],
        }
    }

    pub fn add_line(&mut self, line: OrderedProduct) { self.ordered_products.push(line); self.touch(); }

    pub fn apply_totals(&mut self, totals: OrderTotals, applied_promo_code: Option<String>) {
        self.totals = totals;
        self.applied_promo_code = applied_promo_code;
        self.touch();
    }

    pub fn item_count(&self) -> u32 { self.ordered_products.iter().map(|l| l.product_quantity.value()).sum() }

    pub fn confirmed_event(&self) -> DomainEvent {
        DomainEvent::Order(OrderEvent::Confirmed {
            order_id: self.order_id.clone(),
            customer_id: self.customer_id,
            amount_to_collect: self.totals.amount_to_collect,
            item_count: self.item_count(),
        })
    }

    /// Serializable view. Cost and profit figures are only included for staff.
    pub fn view(&self, include_costs: bool) -> OrderView {
        let t = &self.totals;
        OrderView {
            order_id: self.order_id.clone(),
            customer_id: self.customer_id,
            delivery: self.delivery.clone(),
            products_base_value: include_costs.then_some(t.products_base_value),
            products_regular_value: t.products_regular_value,
            products_discount: t.products_discount,
            flat_discount: t.flat_discount,
            additional_discount: t.additional_discount,
            customers_delivery_charge: t.customers_delivery_charge,
            amount_to_collect: t.amount_to_collect,
            delivery_cost: t.delivery_cost,
            order_profit: include_costs.then_some(t.order_profit),
            applied_promo_code: self.applied_promo_code.clone(),
            order_status: self.order_status,
            payment_status: self.payment_status,
            payment_method: self.payment_method,
            courier: self.courier,
            delivery_type: self.delivery_type,
            delivery_consignment_id: self.delivery_consignment_id.clone(),
            delivery_tracking_url: self.delivery_tracking_url.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            ordered_products: self.ordered_products.clone(),
        }
    }

    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OrderView {
    pub order_id: String,
    pub customer_id: Option<Uuid>,
    #[serde(flatten)]
    pub delivery: DeliverySnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub products_base_value: Option<Decimal>,
    pub products_regular_value: Decimal,
    pub products_discount: Decimal,
    pub flat_discount: Decimal,
    pub additional_discount: Decimal,
    pub customers_delivery_charge: Decimal,
    pub amount_to_collect: Decimal,
    pub delivery_cost: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_profit: Option<Decimal>,
    pub applied_promo_code: Option<String>,
    pub order_status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub courier: Option<CourierOption>,
    pub delivery_type: DeliveryType,
    pub delivery_consignment_id: Option<String>,
    pub delivery_tracking_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ordered_products: Vec<OrderedProduct>,
}

/// One order line, plus the customer's review of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderedProduct {
    pub id: Uuid,
    pub order_id: String,
    pub product_id: String,
    pub product_size: String,
    pub product_quantity: Quantity,
    /// Unit price after the product's own discount.
    pub product_price: Decimal,
    pub rating: Option<Decimal>,
    pub review: Option<String>,
    pub review_status: ReviewStatus,
}

impl OrderedProduct {
    pub fn new(order_id: impl Into<String>, product_id: impl Into<String>, product_size: impl Into<String>, product_quantity: Quantity, product_price: Decimal) -> Self {
        Self {
            id: Uuid::now_v7(), order_id: order_id.into(), product_id: product_id.into(), product_size: product_size.into(),
            product_quantity, product_price, rating: None, review: None, review_status: ReviewStatus::Unsubmitted,
        }
    }

    /// Records (or replaces) the customer's review. Approved reviews are frozen.
    pub fn submit_review(&mut self, rating: Decimal, review: impl Into<String>) -> Result<DomainEvent, ReviewError> {
        if self.review_status == ReviewStatus::Approved {
            return Err(ReviewError::AlreadyApproved);
        }
        if rating <= Decimal::ZERO || rating > max_rating() {
            return Err(ReviewError::InvalidRating(rating));
        }
        self.rating = Some(rating);
        self.review = Some(review.into());
        self.review_status = ReviewStatus::Submitted;
        Ok(DomainEvent::Review(ReviewEvent::Submitted {
            order_id: self.order_id.clone(), product_id: self.product_id.clone(), rating,
        }))
    }

    pub fn approve_review(&mut self) -> Result<DomainEvent, ReviewError> {
        match self.review_status {
            ReviewStatus::Submitted => {
                self.review_status = ReviewStatus::Approved;
                Ok(DomainEvent::Review(ReviewEvent::Approved { order_id: self.order_id.clone(), product_id: self.product_id.clone() }))
            }
            ReviewStatus::Approved => Err(ReviewError::AlreadyApproved),
            ReviewStatus::Unsubmitted => Err(ReviewError::NotSubmitted),
        }
    }
}

pub fn max_rating() -> Decimal { Decimal::new(5, 0) }

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReviewError {
    #[error("Review has already been approved")]
    AlreadyApproved,
    #[error("No review has been submitted")]
    NotSubmitted,
    #[error("Rating {0} is out of range")]
    InvalidRating(Decimal),
    #[error("Review was changed concurrently")]
    Conflict,
}
