//! Order Assembler and order/review queries.
//!
//! Confirmation runs validation, identity resolution and discount lookup up
//! front, then one store transaction that creates the order shell, reserves
//! stock line by line, prices the result and writes the totals. Cart clearing
//! and event publishing happen after commit and never undo the order.

pub mod order_id;
pub mod request;

use chrono::Local;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

pub use request::{reservation_order, AppliedCoupon, CartItemRequest, ConfirmOrderRequest, DeliveryDetails, ProductRef, SubmitReviewRequest};

use crate::discounts::DiscountResolver;
use crate::domain::aggregates::{Discount, Order, OrderedProduct, ReviewError, ReviewStatus};
use crate::domain::events::DomainEvent;
use crate::domain::value_objects::{PhoneNumber, Quantity};
use crate::pricing::{DiscountSource, LineTotals, PriceBreakdown, PricingEngine};
use crate::publisher::EventPublisher;
use crate::store::{LineKey, OrderStore, OrderTransaction, ReviewEntry};
use crate::{EngineError, Result};

/// Who is calling, as asserted by the gateway in front of the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Caller {
    pub customer_id: Option<Uuid>,
    pub is_staff: bool,
}

impl Caller {
    pub fn anonymous() -> Self { Self::default() }
    pub fn customer(id: Uuid) -> Self { Self { customer_id: Some(id), is_staff: false } }
    pub fn staff(id: Uuid) -> Self { Self { customer_id: Some(id), is_staff: true } }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EngineSettings {
    pub confirm_timeout: Duration,
    pub order_id_max_attempts: u32,
}

impl Default for EngineSettings {
    fn default() -> Self { Self { confirm_timeout: Duration::from_millis(5000), order_id_max_attempts: 5 } }
}

/// What happened to one cart line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineOutcome {
    Reserved { product_id: String, size: String, requested: u32, reserved: u32 },
    ProductNotFound { product_id: String, size: String },
    ProductArchived { product_id: String, size: String },
    OutOfStock { product_id: String, size: String, requested: u32 },
}

#[derive(Clone, Debug)]
pub struct Confirmation {
    pub order: Order,
    pub lines: Vec<LineOutcome>,
    /// `None` when an earlier order was replayed for the idempotency key.
    pub breakdown: Option<PriceBreakdown>,
    pub replayed: bool,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    discounts: Arc<DiscountResolver>,
    pricing: PricingEngine,
    events: Arc<dyn EventPublisher>,
    settings: EngineSettings,
}

enum Assembled {
    Placed { order: Order, lines: Vec<LineOutcome>, breakdown: PriceBreakdown },
    /// A concurrent confirmation committed an order under the same idempotency key.
    KeyTaken,
}

struct ResolvedDiscounts {
    coupon: Option<(String, Discount)>,
    flat: Option<Discount>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        discounts: Arc<DiscountResolver>,
        pricing: PricingEngine,
        events: Arc<dyn EventPublisher>,
        settings: EngineSettings,
    ) -> Self {
        Self { store, discounts, pricing, events, settings }
    }

    // =========================================================================
    // Confirmation
    // =========================================================================

    #[instrument(skip(self, request), fields(lines = request.cart_item_list.len()))]
    pub async fn confirm(&self, caller: &Caller, request: ConfirmOrderRequest) -> Result<Confirmation> {
        let phone = PhoneNumber::parse(&request.delivery_details.phone).map_err(|_| EngineError::InvalidPhone)?;
        request.validate()?;

        if let Some(order) = self.replayable(request.idempotency_key.as_deref()).await? {
            return Ok(replay(order));
        }

        let customer_id = match caller.customer_id {
            Some(id) => self.store.find_customer(id).await?.ok_or(EngineError::CustomerNotFound)?.id,
            None => self.store.get_or_create_customer(&phone).await?.id,
        };
        let discounts = self.resolve_discounts(request.promo_code()).await;

        let timeout = self.settings.confirm_timeout;
        let assembled = tokio::time::timeout(timeout, self.assemble(customer_id, &phone, &request, discounts))
            .await
            .map_err(|_| EngineError::Timeout(timeout))??;
        let (order, lines, breakdown) = match assembled {
            Assembled::Placed { order, lines, breakdown } => (order, lines, breakdown),
            Assembled::KeyTaken => {
                let order = self.replayable(request.idempotency_key.as_deref()).await?.ok_or(EngineError::OrderNotFound)?;
                return Ok(replay(order));
            }
        };

        info!(
            order_id = %order.order_id,
            amount_to_collect = %order.totals.amount_to_collect,
            additional_discount = %order.totals.additional_discount,
            delivery_charge = %order.totals.customers_delivery_charge,
            items = order.item_count(),
            "order confirmed"
        );

        if caller.customer_id.is_some() {
            match self.store.clear_cart(customer_id).await {
                Ok(removed) => info!(%customer_id, removed, "cart cleared"),
                Err(e) => warn!(%customer_id, error = %e, "cart clear failed"),
            }
        }
        self.publish(order.confirmed_event()).await;

        Ok(Confirmation { order, lines, breakdown: Some(breakdown), replayed: false })
    }

    async fn replayable(&self, key: Option<&str>) -> Result<Option<Order>> {
        match key {
            Some(key) => Ok(self.store.find_order_by_idempotency_key(key).await?),
            None => Ok(None),
        }
    }

    /// Coupon and flat discount lookups. Lookup failures are logged and the
    /// discount is treated as absent.
    async fn resolve_discounts(&self, promo_code: Option<&str>) -> ResolvedDiscounts {
        let coupon = match promo_code {
            None => None,
            Some(code) => match self.discounts.resolve_coupon(code).await {
                Ok(resolution) => resolution.discount.filter(|_| resolution.is_valid).map(|d| (code.to_string(), d)),
                Err(e) => {
                    warn!(code, error = %e, "coupon lookup failed");
                    None
                }
            },
        };
        let flat = match self.discounts.resolve_flat_discount().await {
            Ok(resolution) => resolution.discount.filter(|_| resolution.is_available),
            Err(e) => {
                warn!(error = %e, "flat discount lookup failed");
                None
            }
        };
        ResolvedDiscounts { coupon, flat }
    }

    /// The transactional part. Returning early drops the transaction, which
    /// rolls it back.
    async fn assemble(
        &self,
        customer_id: Uuid,
        phone: &PhoneNumber,
        request: &ConfirmOrderRequest,
        discounts: ResolvedDiscounts,
    ) -> Result<Assembled> {
        let mut tx = self.store.begin().await?;

        let order_id = self.allocate_order_id(&mut *tx, phone).await?;
        let delivery = request.delivery_details.snapshot(phone);
        let mut order = Order::place(order_id, Some(customer_id), delivery, request.idempotency_key.clone());
        if !tx.insert_order(&order).await? {
            info!("idempotency key claimed by a concurrent confirmation");
            return Ok(Assembled::KeyTaken);
        }

        let items = request.merged_items();
        let mut totals = LineTotals::default();
        let mut outcomes: Vec<Option<LineOutcome>> = vec![None; items.len()];
        for idx in reservation_order(&items) {
            outcomes[idx] = Some(self.reserve_line(&mut *tx, &mut order, &mut totals, &items[idx]).await?);
        }

        if order.ordered_products.is_empty() {
            return Err(EngineError::NothingReserved);
        }

        let coupon = discounts.coupon.as_ref();
        let breakdown = self.pricing.price(&totals, coupon.map(|(_, d)| d), discounts.flat.as_ref(), &order.delivery.customer_district);
        let applied_code = match breakdown.discount_source {
            DiscountSource::Coupon => coupon.map(|(code, _)| code.clone()),
            _ => None,
        };
        order.apply_totals(breakdown.to_totals(), applied_code);
        tx.update_order_totals(&order).await?;
        tx.commit().await?;

        Ok(Assembled::Placed { order, lines: outcomes.into_iter().flatten().collect(), breakdown })
    }

    async fn reserve_line(
        &self,
        tx: &mut dyn OrderTransaction,
        order: &mut Order,
        totals: &mut LineTotals,
        item: &CartItemRequest,
    ) -> Result<LineOutcome> {
        let product_id = item.product.product_id.clone();
        let size = item.size.clone();
        let requested = Quantity::clamped(item.count);

        let Some(product) = tx.find_product(&product_id).await? else {
            warn!(%product_id, %size, "cart line skipped: unknown product");
            return Ok(LineOutcome::ProductNotFound { product_id, size });
        };
        if product.is_archived {
            warn!(%product_id, %size, "cart line skipped: archived product");
            return Ok(LineOutcome::ProductArchived { product_id, size });
        }

        let reserved = tx.reserve_stock(&product_id, &size, requested).await?;
        if reserved.is_zero() {
            warn!(%product_id, %size, requested = requested.value(), "cart line skipped: no stock");
            return Ok(LineOutcome::OutOfStock { product_id, size, requested: requested.value() });
        }

        let line = OrderedProduct::new(&order.order_id, &product_id, &size, reserved, product.unit_price());
        tx.insert_ordered_product(&line).await?;
        totals.add_line(&product, reserved);
        order.add_line(line);
        Ok(LineOutcome::Reserved { product_id, size, requested: requested.value(), reserved: reserved.value() })
    }

    async fn allocate_order_id(&self, tx: &mut dyn OrderTransaction, phone: &PhoneNumber) -> Result<String> {
        let today = Local::now().date_naive();
        for attempt in 1..=self.settings.order_id_max_attempts {
            let candidate = order_id::new_order_id(today, phone);
            if !tx.order_id_exists(&candidate).await? {
                return Ok(candidate);
            }
            warn!(%candidate, attempt, "order id collision");
        }
        error!(attempts = self.settings.order_id_max_attempts, "order id space exhausted");
        Err(EngineError::OrderIdExhausted(self.settings.order_id_max_attempts))
    }

    async fn publish(&self, event: DomainEvent) {
        if let Err(e) = self.events.publish(&event).await {
            warn!(subject = event.subject(), error = %e, "event publish failed");
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[instrument(skip(self))]
    pub async fn get_order(&self, caller: &Caller, order_id: &str) -> Result<Order> {
        if caller.customer_id.is_none() && !caller.is_staff {
            return Err(EngineError::Unauthorized);
        }
        let order = self.store.find_order(order_id).await?.ok_or(EngineError::OrderNotFound)?;
        if !caller.is_staff && order.customer_id != caller.customer_id {
            return Err(EngineError::Forbidden);
        }
        Ok(order)
    }

    /// The caller's own orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self, caller: &Caller) -> Result<Vec<Order>> {
        let customer_id = caller.customer_id.ok_or(EngineError::Unauthorized)?;
        Ok(self.store.list_orders_for_customer(customer_id).await?)
    }

    // =========================================================================
    // Reviews
    // =========================================================================

    /// Records or replaces the caller's review of one of their order lines.
    #[instrument(skip(self, request), fields(order_id = %request.order_id, product_id = %request.product_id))]
    pub async fn submit_review(&self, caller: &Caller, request: SubmitReviewRequest) -> Result<OrderedProduct> {
        request.validate()?;
        let order = self.get_order(caller, &request.order_id).await.map_err(|e| match e {
            EngineError::OrderNotFound => EngineError::OrderedProductNotFound,
            other => other,
        })?;
        let mut line = order
            .ordered_products
            .into_iter()
            .find(|l| l.product_id == request.product_id && l.product_size == request.size)
            .ok_or(EngineError::OrderedProductNotFound)?;

        let expected = line.review_status;
        let event = line.submit_review(request.rating, request.review.trim())?;
        self.save_review(&line, expected).await?;
        info!(rating = %request.rating, "review submitted");
        self.publish(event).await;
        Ok(line)
    }

    /// Staff moderation: `Submitted` to `Approved`.
    #[instrument(skip(self))]
    pub async fn approve_review(&self, caller: &Caller, key: &LineKey) -> Result<OrderedProduct> {
        if !caller.is_staff {
            return Err(EngineError::Forbidden);
        }
        let mut line = self.store.find_ordered_product(key).await?.ok_or(EngineError::OrderedProductNotFound)?;
        let event = line.approve_review()?;
        self.save_review(&line, ReviewStatus::Submitted).await?;
        info!("review approved");
        self.publish(event).await;
        Ok(line)
    }

    async fn save_review(&self, line: &OrderedProduct, expected: ReviewStatus) -> Result<()> {
        if self.store.save_review(line, expected).await? {
            Ok(())
        } else {
            Err(ReviewError::Conflict.into())
        }
    }

    /// Approved reviews plus the caller's own in any state; staff see all.
    /// Highest rating first, unrated last.
    #[instrument(skip(self))]
    pub async fn list_reviews(&self, caller: &Caller, product_id: &str) -> Result<Vec<ReviewEntry>> {
        let mut reviews: Vec<ReviewEntry> = self
            .store
            .reviews_for_product(product_id)
            .await?
            .into_iter()
            .filter(|r| {
                caller.is_staff
                    || r.review_status == ReviewStatus::Approved
                    || (caller.customer_id.is_some() && r.customer_id == caller.customer_id)
            })
            .collect();
        reviews.sort_by(|a, b| match (a.rating, b.rating) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        Ok(reviews)
    }
}

fn replay(order: Order) -> Confirmation {
    info!(order_id = %order.order_id, "idempotent replay");
    Confirmation { order, lines: vec![], breakdown: None, replayed: true }
}
