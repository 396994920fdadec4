//! Discount Resolver
//!
//! Looks up the promo code a customer typed in and the store-wide flat
//! discount. Both lookups are cached for `ttl`; a coupon that expires
//! mid-window may be honoured until its entry ages out.

use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::cache::TtlCache;
use crate::domain::aggregates::{Discount, OfferType};
use crate::store::{OfferStore, StoreError};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CouponResolution {
    pub is_valid: bool,
    #[serde(flatten)]
    pub discount: Option<Discount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promo_code: Option<String>,
}

impl CouponResolution {
    fn invalid() -> Self { Self { is_valid: false, discount: None, promo_code: None } }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlatDiscountResolution {
    pub is_available: bool,
    #[serde(flatten)]
    pub discount: Option<Discount>,
}

pub struct DiscountResolver {
    offers: Arc<dyn OfferStore>,
    coupons: TtlCache<String, CouponResolution>,
    flat: TtlCache<(), FlatDiscountResolution>,
}

impl DiscountResolver {
    pub fn new(offers: Arc<dyn OfferStore>, ttl: Duration) -> Self {
        Self { offers, coupons: TtlCache::new(ttl), flat: TtlCache::new(ttl) }
    }

    /// Valid when a promo-code offer with exactly this code is active today.
    /// With several matches the earliest inserted offer wins.
    #[instrument(skip(self))]
    pub async fn resolve_coupon(&self, code: &str) -> Result<CouponResolution, StoreError> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(CouponResolution::invalid());
        }
        self.coupons
            .get_or_try_load(code.to_string(), || async {
                let offers = self.offers.active_offers(OfferType::PromoCode, today(), Some(code)).await?;
                let resolution = match offers.first() {
                    Some(offer) => CouponResolution { is_valid: true, discount: Some(offer.discount()), promo_code: Some(code.to_string()) },
                    None => CouponResolution::invalid(),
                };
                debug!(code, valid = resolution.is_valid, "coupon loaded from store");
                Ok(resolution)
            })
            .await
    }

    /// The first flat-discount offer active today.
    #[instrument(skip(self))]
    pub async fn resolve_flat_discount(&self) -> Result<FlatDiscountResolution, StoreError> {
        self.flat
            .get_or_try_load((), || async {
                let offers = self.offers.active_offers(OfferType::FlatDiscount, today(), None).await?;
                let resolution = FlatDiscountResolution { is_available: !offers.is_empty(), discount: offers.first().map(|o| o.discount()) };
                debug!(available = resolution.is_available, "flat discount loaded from store");
                Ok(resolution)
            })
            .await
    }
}

fn today() -> NaiveDate { Local::now().date_naive() }
