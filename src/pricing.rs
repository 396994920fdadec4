//! Pricing Engine
//!
//! Turns accumulated line values plus the resolved discounts into the full
//! breakdown stored on an order. All money is `Decimal`; the only rounding is
//! `floor`, applied by the down-to-ten normalization and the final amount.
//!
//! Calculation steps:
//! 1. `subtotal = regular - product discounts - flat discount`
//! 2. delivery charge (free at or above the threshold) is added
//! 3. `additional_discount = volume component + (subtotal mod 10)`
//! 4. `amount_to_collect = floor(subtotal - additional_discount)`, never negative

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::{Discount, OrderTotals, Product};
use crate::domain::value_objects::Quantity;

/// Running totals over the reserved order lines.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LineTotals {
    pub products_base_value: Decimal,
    pub products_regular_value: Decimal,
    pub products_discount: Decimal,
}

impl LineTotals {
    pub fn add_line(&mut self, product: &Product, quantity: Quantity) {
        let qty = Decimal::from(quantity.value());
        self.products_base_value += product.base_price * qty;
        self.products_regular_value += product.selling_price * qty;
        self.products_discount += product.unit_discount() * qty;
    }

    /// Value after per-product discounts; what order level discounts apply to.
    pub fn discounted_subtotal(&self) -> Decimal { self.products_regular_value - self.products_discount }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPolicy {
    /// Orders at or above this subtotal ship free.
    pub free_threshold: Decimal,
    pub inside_charge: Decimal,
    pub outside_charge: Decimal,
    pub home_district: String,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            free_threshold: Decimal::new(999, 0),
            inside_charge: Decimal::new(60, 0),
            outside_charge: Decimal::new(120, 0),
            home_district: "Dhaka".to_string(),
        }
    }
}

impl DeliveryPolicy {
    pub fn charge_for(&self, subtotal: Decimal, district: &str) -> Decimal {
        if subtotal >= self.free_threshold {
            Decimal::ZERO
        } else if district.trim().eq_ignore_ascii_case(&self.home_district) {
            self.inside_charge
        } else {
            self.outside_charge
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountSource {
    None,
    Coupon,
    FlatDiscount,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PriceBreakdown {
    #[serde(flatten)]
    pub lines: LineTotals,
    pub flat_discount: Decimal,
    pub discount_source: DiscountSource,
    pub customers_delivery_charge: Decimal,
    /// Subtotal after order discounts, delivery included.
    pub order_subtotal: Decimal,
    pub volume_discount: Decimal,
    pub rounding_discount: Decimal,
    pub additional_discount: Decimal,
    pub amount_to_collect: Decimal,
}

impl PriceBreakdown {
    /// Order row figures. Courier cost is unknown at confirmation time.
    pub fn to_totals(&self) -> OrderTotals {
        let delivery_cost = Decimal::ZERO;
        OrderTotals {
            products_base_value: self.lines.products_base_value,
            products_regular_value: self.lines.products_regular_value,
            products_discount: self.lines.products_discount,
            flat_discount: self.flat_discount,
            additional_discount: self.additional_discount,
            customers_delivery_charge: self.customers_delivery_charge,
            amount_to_collect: self.amount_to_collect,
            delivery_cost,
            order_profit: self.amount_to_collect - self.lines.products_base_value - delivery_cost,
        }
    }
}

const VOLUME_THRESHOLD: Decimal = Decimal::from_parts(999, 0, 0, false, 0);
const VOLUME_STEP: Decimal = Decimal::ONE_THOUSAND;
const VOLUME_UNIT: Decimal = Decimal::ONE_HUNDRED;
const ROUND_TO: Decimal = Decimal::TEN;

#[derive(Clone, Debug, Default)]
pub struct PricingEngine {
    delivery: DeliveryPolicy,
}

impl PricingEngine {
    pub fn new(delivery: DeliveryPolicy) -> Self { Self { delivery } }

    /// The coupon wins when it yields a positive amount; otherwise the flat
    /// discount is tried. The two are never combined.
    pub fn price(&self, lines: &LineTotals, coupon: Option<&Discount>, flat: Option<&Discount>, district: &str) -> PriceBreakdown {
        let base = lines.discounted_subtotal();

        let coupon_amount = coupon.map_or(Decimal::ZERO, |d| d.amount_for(base));
        let (flat_discount, discount_source) = if coupon_amount > Decimal::ZERO {
            (coupon_amount, DiscountSource::Coupon)
        } else {
            match flat.map(|d| d.amount_for(base)) {
                Some(amount) if amount > Decimal::ZERO => (amount, DiscountSource::FlatDiscount),
                _ => (Decimal::ZERO, DiscountSource::None),
            }
        };

        let mut order_subtotal = base - flat_discount;
        let customers_delivery_charge = self.delivery.charge_for(order_subtotal, district);
        order_subtotal += customers_delivery_charge;

        let rounding_discount = order_subtotal - floor_to(order_subtotal, ROUND_TO);
        let volume_discount = if order_subtotal >= VOLUME_THRESHOLD {
            ((order_subtotal - VOLUME_THRESHOLD) / VOLUME_STEP).floor() * VOLUME_UNIT
        } else {
            Decimal::ZERO
        };
        let additional_discount = volume_discount + rounding_discount;
        let amount_to_collect = (order_subtotal - additional_discount).floor().max(Decimal::ZERO);

        PriceBreakdown {
            lines: lines.clone(),
            flat_discount,
            discount_source,
            customers_delivery_charge,
            order_subtotal,
            volume_discount,
            rounding_discount,
            additional_discount,
            amount_to_collect,
        }
    }
}

/// Largest multiple of `step` not above `value`.
fn floor_to(value: Decimal, step: Decimal) -> Decimal { (value / step).floor() * step }
