//! Marketing offers: promo codes and store-wide flat discounts

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

coded_enum! {
    pub enum OfferType {
        FlatDiscount = 0 => "Flat Discount",
        ClearanceSale = 1 => "Clearance Sale",
        FreeDelivery = 2 => "Free Delivery",
        PromoCode = 3 => "Promo Code",
    }
}

coded_enum! {
    pub enum DiscountType {
        Percentage = 0 => "Percentage",
        Fixed = 1 => "Fixed",
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    /// Insertion order; the first matching offer wins.
    pub id: i64,
    pub offer_type: OfferType,
    pub title: String,
    pub promo_code: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_purchase: Decimal,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl Offer {
    pub fn is_active_on(&self, day: NaiveDate) -> bool { self.starts_on <= day && day <= self.ends_on }

    pub fn matches(&self, offer_type: OfferType, day: NaiveDate, promo_code: Option<&str>) -> bool {
        self.offer_type == offer_type
            && self.is_active_on(day)
            && promo_code.map_or(true, |code| self.promo_code.as_deref() == Some(code))
    }

    pub fn discount(&self) -> Discount {
        Discount { discount_type: self.discount_type, discount_value: self.discount_value, minimum_purchase: self.minimum_purchase }
    }
}

/// A resolved discount rule, independent of where it came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub minimum_purchase: Decimal,
}

impl Discount {
    /// Amount taken off `subtotal`. Never negative and never more than `subtotal`.
    pub fn amount_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal <= Decimal::ZERO || subtotal < self.minimum_purchase {
            return Decimal::ZERO;
        }
        let value = self.discount_value.max(Decimal::ZERO);
        match self.discount_type {
            DiscountType::Percentage => subtotal * value.min(Decimal::ONE_HUNDRED) / Decimal::ONE_HUNDRED,
            DiscountType::Fixed => value.min(subtotal),
        }
    }
}
