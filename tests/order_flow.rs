mod common;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use common::*;
use opensase_orders::domain::aggregates::{
    Customer, DiscountType, Offer, OfferType, Order, OrderStatus, OrderedProduct, PaymentMethod, Product, ReviewError,
    ReviewStatus,
};
use opensase_orders::domain::value_objects::{PhoneNumber, Quantity};
use opensase_orders::orders::SubmitReviewRequest;
use opensase_orders::publisher::MemoryPublisher;
use opensase_orders::store::{LineKey, OfferStore, OrderStore, OrderTransaction, ReviewEntry, StoreError};
use opensase_orders::{Caller, EngineError, EngineSettings, LineOutcome};

#[tokio::test]
async fn test_small_order_in_dhaka() {
    let f = fixture().await;
    let confirmation = f.service.confirm(&Caller::anonymous(), request(&[("P1", "M", 5)], PHONE, "Dhaka")).await.unwrap();
    let order = &confirmation.order;

    assert!(!confirmation.replayed);
    assert_eq!(order.totals.products_base_value, d(400));
    assert_eq!(order.totals.products_regular_value, d(500));
    assert_eq!(order.totals.products_discount, d(25));
    assert_eq!(order.totals.customers_delivery_charge, d(60));
    assert_eq!(order.totals.additional_discount, d(5));
    assert_eq!(order.totals.amount_to_collect, d(530));
    assert_eq!(order.totals.order_profit, d(130));
    assert_eq!(order.order_status, OrderStatus::Placed);
    assert_eq!(order.payment_method, PaymentMethod::CashOnDelivery);
    assert_eq!(order.delivery.customer_address, "House 12, Road 5, Dhaka");

    let breakdown = confirmation.breakdown.as_ref().unwrap();
    assert_eq!(breakdown.order_subtotal, d(535));

    assert_eq!(order.ordered_products.len(), 1);
    assert_eq!(order.ordered_products[0].product_quantity.value(), 5);
    assert_eq!(order.ordered_products[0].product_price, d(90));
    assert_eq!(f.store.stock_count("P1", "M").await, Some(5));
    assert_eq!(f.store.product("P1").await.unwrap().total_stock, 5);

    let stored = f.store.find_order(&order.order_id).await.unwrap().unwrap();
    assert_eq!(&stored, order);

    let events = f.events.events().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].subject(), "order.confirmed");
}

#[tokio::test]
async fn test_order_id_shape_and_customer_creation() {
    let f = fixture().await;
    let order = f.service.confirm(&Caller::anonymous(), request(&[("P1", "M", 1)], "+8801712345678", "Dhaka")).await.unwrap().order;

    assert!(order.order_id.starts_with('F'));
    assert!(order.order_id.ends_with("-5678"));
    assert_eq!(order.order_id.len(), "F20240101-ABCD-5678".len());
    assert_eq!(order.delivery.customer_phone, PHONE);

    let customer = f.store.get_or_create_customer(&PhoneNumber::parse(PHONE).unwrap()).await.unwrap();
    assert_eq!(order.customer_id, Some(customer.id));
}

#[tokio::test]
async fn test_partial_stock_is_reserved() {
    let f = fixture().await;
    f.store.set_stock("P1", "M", 2).await;
    let confirmation = f.service.confirm(&Caller::anonymous(), request(&[("P1", "M", 5)], PHONE, "Dhaka")).await.unwrap();

    assert_eq!(confirmation.order.ordered_products[0].product_quantity.value(), 2);
    assert_eq!(f.store.stock_count("P1", "M").await, Some(0));
    assert_eq!(
        confirmation.lines,
        vec![LineOutcome::Reserved { product_id: "P1".into(), size: "M".into(), requested: 5, reserved: 2 }]
    );
    // 2 x 90 + 60
    assert_eq!(confirmation.order.totals.amount_to_collect, d(240));
}

#[tokio::test]
async fn test_free_delivery_over_threshold() {
    let f = fixture().await;
    let order = f.service.confirm(&Caller::anonymous(), request(&[("P2", "L", 1)], PHONE, "Rajshahi")).await.unwrap().order;
    assert_eq!(order.totals.customers_delivery_charge, Decimal::ZERO);
    assert_eq!(order.totals.additional_discount, Decimal::ZERO);
    assert_eq!(order.totals.amount_to_collect, d(1050));
}

#[tokio::test]
async fn test_invalid_phone_creates_nothing() {
    let f = fixture().await;
    let err = f.service.confirm(&Caller::anonymous(), request(&[("P1", "M", 5)], "12345", "Dhaka")).await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidPhone));
    assert_eq!(err.to_string(), "Phone no is not correct.");
    assert_eq!(f.store.order_count().await, 0);
    assert_eq!(f.store.stock_count("P1", "M").await, Some(10));
    assert!(f.events.events().await.is_empty());
}

#[tokio::test]
async fn test_skipped_lines_are_reported() {
    let f = fixture().await;
    let mut archived = f.store.product("P2").await.unwrap();
    archived.archive();
    f.store.add_product(archived).await;

    let req = request(&[("P1", "M", 1), ("GHOST", "M", 1), ("P2", "L", 1), ("P1", "XL", 3), ("P1", "M", -4)], PHONE, "Dhaka");
    let confirmation = f.service.confirm(&Caller::anonymous(), req).await.unwrap();

    assert_eq!(
        confirmation.lines,
        vec![
            LineOutcome::Reserved { product_id: "P1".into(), size: "M".into(), requested: 1, reserved: 1 },
            LineOutcome::ProductNotFound { product_id: "GHOST".into(), size: "M".into() },
            LineOutcome::ProductArchived { product_id: "P2".into(), size: "L".into() },
            LineOutcome::OutOfStock { product_id: "P1".into(), size: "XL".into(), requested: 3 },
        ]
    );
    assert_eq!(confirmation.order.ordered_products.len(), 1);
    assert_eq!(f.store.stock_count("P2", "L").await, Some(10));
}

#[tokio::test]
async fn test_nothing_reserved_rolls_back() {
    let f = fixture().await;
    f.store.set_stock("P1", "M", 0).await;
    let err = f.service.confirm(&Caller::anonymous(), request(&[("P1", "M", 2), ("GHOST", "S", 1)], PHONE, "Dhaka")).await.unwrap_err();

    assert!(matches!(err, EngineError::NothingReserved));
    assert_eq!(err.to_string(), "None of the cart items are available.");
    assert_eq!(f.store.order_count().await, 0);
    assert!(f.events.events().await.is_empty());
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let f = fixture().await;
    let err = f.service.confirm(&Caller::anonymous(), request(&[], PHONE, "Dhaka")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));
    assert_eq!(f.store.order_count().await, 0);
}

// =============================================================================
// Discounts
// =============================================================================

#[tokio::test]
async fn test_coupon_wins_over_flat_discount() {
    let f = fixture().await;
    f.store.add_offer(active_offer(OfferType::PromoCode, Some("EID10"), DiscountType::Percentage, 10)).await;
    f.store.add_offer(active_offer(OfferType::FlatDiscount, None, DiscountType::Fixed, 100)).await;

    let mut req = request(&[("P1", "M", 5)], PHONE, "Dhaka");
    req.applied_coupon = Some(opensase_orders::orders::AppliedCoupon { promo_code: "EID10".into() });
    let order = f.service.confirm(&Caller::anonymous(), req).await.unwrap().order;

    assert_eq!(order.totals.flat_discount, Decimal::new(475, 1));
    assert_eq!(order.totals.amount_to_collect, d(480));
    assert_eq!(order.applied_promo_code.as_deref(), Some("EID10"));
}

#[tokio::test]
async fn test_flat_discount_without_coupon() {
    let f = fixture().await;
    f.store.add_offer(active_offer(OfferType::FlatDiscount, None, DiscountType::Fixed, 75)).await;

    let mut req = request(&[("P1", "M", 5)], PHONE, "Dhaka");
    req.applied_coupon = Some(opensase_orders::orders::AppliedCoupon { promo_code: "NOSUCHCODE".into() });
    let order = f.service.confirm(&Caller::anonymous(), req).await.unwrap().order;

    assert_eq!(order.totals.flat_discount, d(75));
    assert_eq!(order.totals.amount_to_collect, d(460));
    assert_eq!(order.applied_promo_code, None);
}

#[tokio::test]
async fn test_minimum_purchase_is_enforced() {
    let f = fixture().await;
    let mut offer = active_offer(OfferType::FlatDiscount, None, DiscountType::Fixed, 100);
    offer.minimum_purchase = d(1000);
    f.store.add_offer(offer).await;

    let order = f.service.confirm(&Caller::anonymous(), request(&[("P1", "M", 5)], PHONE, "Dhaka")).await.unwrap().order;
    assert_eq!(order.totals.flat_discount, Decimal::ZERO);
    assert_eq!(order.totals.amount_to_collect, d(530));
}

// =============================================================================
// Idempotency, carts, concurrency, timeouts
// =============================================================================

#[tokio::test]
async fn test_idempotent_replay() {
    let f = fixture().await;
    let mut req = request(&[("P1", "M", 3)], PHONE, "Dhaka");
    req.idempotency_key = Some("checkout-7f3a".into());

    let first = f.service.confirm(&Caller::anonymous(), req.clone()).await.unwrap();
    let second = f.service.confirm(&Caller::anonymous(), req).await.unwrap();

    assert!(second.replayed);
    assert!(second.breakdown.is_none());
    assert_eq!(first.order.order_id, second.order.order_id);
    assert_eq!(f.store.order_count().await, 1);
    assert_eq!(f.store.stock_count("P1", "M").await, Some(7));
}

#[tokio::test]
async fn test_authenticated_cart_is_cleared() {
    let f = fixture().await;
    let customer = register_customer(&f.store, "01912345678").await;
    f.store.add_cart_line(customer.id, cart_line("P1", "M", 2)).await;
    f.store.add_cart_line(customer.id, cart_line("P2", "L", 1)).await;

    let order = f.service.confirm(&Caller::customer(customer.id), request(&[("P1", "M", 2)], "01912345678", "Dhaka")).await.unwrap().order;

    assert_eq!(order.customer_id, Some(customer.id));
    assert_eq!(f.store.cart_len(customer.id).await, 0);
}

#[tokio::test]
async fn test_cart_clear_failure_keeps_order() {
    let f = fixture().await;
    let customer = register_customer(&f.store, "01912345678").await;
    f.store.add_cart_line(customer.id, cart_line("P1", "M", 2)).await;
    f.store.set_cart_clear_failure(true);

    let confirmation = f.service.confirm(&Caller::customer(customer.id), request(&[("P1", "M", 2)], "01912345678", "Dhaka")).await;

    assert!(confirmation.is_ok());
    assert_eq!(f.store.order_count().await, 1);
    assert_eq!(f.store.cart_len(customer.id).await, 1);
}

#[tokio::test]
async fn test_unknown_authenticated_customer() {
    let f = fixture().await;
    let err = f.service.confirm(&Caller::customer(Uuid::now_v7()), request(&[("P1", "M", 1)], PHONE, "Dhaka")).await.unwrap_err();
    assert!(matches!(err, EngineError::CustomerNotFound));
}

#[tokio::test]
async fn test_concurrent_confirmations_never_oversell() {
    let f = fixture().await;
    f.store.set_stock("P1", "M", 7).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let service = f.service.clone();
        handles.push(tokio::spawn(async move {
            service.confirm(&Caller::anonymous(), request(&[("P1", "M", 2)], PHONE, "Dhaka")).await
        }));
    }

    let mut reserved = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(confirmation) => reserved += confirmation.order.item_count(),
            Err(EngineError::NothingReserved) => sold_out += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(reserved, 7);
    assert!(sold_out >= 6);
    assert_eq!(f.store.stock_count("P1", "M").await, Some(0));
}

/// Delegates to the in-memory store, takes its time opening transactions and
/// records every stock reservation.
struct ObservedStore {
    inner: Arc<opensase_orders::MemoryStore>,
    delay: Duration,
    reservations: Arc<Mutex<Vec<(String, String)>>>,
}

impl ObservedStore {
    fn new(inner: Arc<opensase_orders::MemoryStore>, delay: Duration) -> Self {
        Self { inner, delay, reservations: Arc::default() }
    }

    fn reservations(&self) -> Vec<(String, String)> { self.reservations.lock().unwrap().clone() }
}

struct ObservedTransaction {
    inner: Box<dyn OrderTransaction>,
    reservations: Arc<Mutex<Vec<(String, String)>>>,
}

#[async_trait]
impl OrderTransaction for ObservedTransaction {
    async fn order_id_exists(&mut self, order_id: &str) -> Result<bool, StoreError> { self.inner.order_id_exists(order_id).await }
    async fn insert_order(&mut self, order: &Order) -> Result<bool, StoreError> { self.inner.insert_order(order).await }
    async fn find_product(&mut self, product_id: &str) -> Result<Option<Product>, StoreError> { self.inner.find_product(product_id).await }
    async fn reserve_stock(&mut self, product_id: &str, size: &str, requested: Quantity) -> Result<Quantity, StoreError> {
        self.reservations.lock().unwrap().push((product_id.to_string(), size.to_string()));
        self.inner.reserve_stock(product_id, size, requested).await
    }
    async fn insert_ordered_product(&mut self, line: &OrderedProduct) -> Result<(), StoreError> { self.inner.insert_ordered_product(line).await }
    async fn update_order_totals(&mut self, order: &Order) -> Result<(), StoreError> { self.inner.update_order_totals(order).await }
    async fn commit(self: Box<Self>) -> Result<(), StoreError> { self.inner.commit().await }
}

#[async_trait]
impl OrderStore for ObservedStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        tokio::time::sleep(self.delay).await;
        let inner = self.inner.begin().await?;
        Ok(Box::new(ObservedTransaction { inner, reservations: self.reservations.clone() }))
    }
    async fn find_customer(&self, id: Uuid) -> Result<Option<Customer>, StoreError> { self.inner.find_customer(id).await }
    async fn get_or_create_customer(&self, phone: &PhoneNumber) -> Result<Customer, StoreError> { self.inner.get_or_create_customer(phone).await }
    async fn clear_cart(&self, id: Uuid) -> Result<u64, StoreError> { self.inner.clear_cart(id).await }
    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> { self.inner.find_order(order_id).await }
    async fn find_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        self.inner.find_order_by_idempotency_key(key).await
    }
    async fn list_orders_for_customer(&self, id: Uuid) -> Result<Vec<Order>, StoreError> { self.inner.list_orders_for_customer(id).await }
    async fn find_ordered_product(&self, key: &LineKey) -> Result<Option<OrderedProduct>, StoreError> { self.inner.find_ordered_product(key).await }
    async fn save_review(&self, line: &OrderedProduct, expected: ReviewStatus) -> Result<bool, StoreError> {
        self.inner.save_review(line, expected).await
    }
    async fn reviews_for_product(&self, product_id: &str) -> Result<Vec<ReviewEntry>, StoreError> { self.inner.reviews_for_product(product_id).await }
}

/// Offer storage that is always down.
struct OfflineOffers;

#[async_trait]
impl OfferStore for OfflineOffers {
    async fn active_offers(&self, _: OfferType, _: NaiveDate, _: Option<&str>) -> Result<Vec<Offer>, StoreError> {
        Err(StoreError::Unavailable("offer storage offline".into()))
    }
}

#[tokio::test]
async fn test_timeout_fails_and_rolls_back() {
    let inner = seeded_store().await;
    let slow = Arc::new(ObservedStore::new(inner.clone(), Duration::from_millis(200)));
    let settings = EngineSettings { confirm_timeout: Duration::from_millis(20), ..EngineSettings::default() };
    let service = service_for(slow, inner.clone(), Arc::new(MemoryPublisher::new()), settings);

    let err = service.confirm(&Caller::anonymous(), request(&[("P1", "M", 5)], PHONE, "Dhaka")).await.unwrap_err();

    assert!(matches!(err, EngineError::Timeout(_)));
    assert_eq!(inner.order_count().await, 0);
    assert_eq!(inner.stock_count("P1", "M").await, Some(10));
}

#[tokio::test]
async fn test_concurrent_same_key_places_one_order() {
    let inner = seeded_store().await;
    let slow = Arc::new(ObservedStore::new(inner.clone(), Duration::from_millis(50)));
    let service = service_for(slow, inner.clone(), Arc::new(MemoryPublisher::new()), EngineSettings::default());
    let mut req = request(&[("P1", "M", 3)], PHONE, "Dhaka");
    req.idempotency_key = Some("checkout-9c1e".into());

    let caller = Caller::anonymous();
    let (a, b) = tokio::join!(service.confirm(&caller, req.clone()), service.confirm(&caller, req));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.order.order_id, b.order.order_id);
    assert_ne!(a.replayed, b.replayed);
    assert_eq!(inner.order_count().await, 1);
    assert_eq!(inner.stock_count("P1", "M").await, Some(7));
}

#[tokio::test]
async fn test_stock_is_reserved_in_product_size_order() {
    let inner = seeded_store().await;
    inner.set_stock("P1", "L", 10).await;
    let observed = Arc::new(ObservedStore::new(inner.clone(), Duration::ZERO));
    let service = service_for(observed.clone(), inner.clone(), Arc::new(MemoryPublisher::new()), EngineSettings::default());

    let req = request(&[("P2", "L", 1), ("P1", "M", 1), ("P1", "L", 1)], PHONE, "Dhaka");
    let confirmation = service.confirm(&Caller::anonymous(), req).await.unwrap();

    let pair = |p: &str, s: &str| (p.to_string(), s.to_string());
    assert_eq!(observed.reservations(), vec![pair("P1", "L"), pair("P1", "M"), pair("P2", "L")]);

    // reported in cart order
    let reported: Vec<_> = confirmation
        .lines
        .iter()
        .map(|line| match line {
            LineOutcome::Reserved { product_id, size, .. } => (product_id.clone(), size.clone()),
            other => panic!("unexpected outcome: {other:?}"),
        })
        .collect();
    assert_eq!(reported, vec![pair("P2", "L"), pair("P1", "M"), pair("P1", "L")]);
}

#[tokio::test]
async fn test_discount_lookup_failure_is_ignored() {
    let store = seeded_store().await;
    let service = service_for(store.clone(), Arc::new(OfflineOffers), Arc::new(MemoryPublisher::new()), EngineSettings::default());

    let mut req = request(&[("P1", "M", 5)], PHONE, "Dhaka");
    req.applied_coupon = Some(opensase_orders::orders::AppliedCoupon { promo_code: "EID10".into() });
    let order = service.confirm(&Caller::anonymous(), req).await.unwrap().order;

    assert_eq!(order.totals.flat_discount, Decimal::ZERO);
    assert_eq!(order.totals.amount_to_collect, d(530));
    assert_eq!(order.applied_promo_code, None);
    assert_eq!(store.order_count().await, 1);
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn test_order_visibility() {
    let f = fixture().await;
    let owner = register_customer(&f.store, "01512345678").await;
    let stranger = register_customer(&f.store, "01612345678").await;
    let order = f.service.confirm(&Caller::customer(owner.id), request(&[("P1", "M", 1)], "01512345678", "Dhaka")).await.unwrap().order;

    assert_eq!(f.service.get_order(&Caller::customer(owner.id), &order.order_id).await.unwrap().order_id, order.order_id);
    assert!(matches!(f.service.get_order(&Caller::customer(stranger.id), &order.order_id).await, Err(EngineError::Forbidden)));
    assert!(matches!(f.service.get_order(&Caller::anonymous(), &order.order_id).await, Err(EngineError::Unauthorized)));
    assert!(f.service.get_order(&Caller::staff(stranger.id), &order.order_id).await.is_ok());
    assert!(matches!(f.service.get_order(&Caller::staff(stranger.id), "F0-NONE-0000").await, Err(EngineError::OrderNotFound)));
}

#[tokio::test]
async fn test_list_orders_newest_first() {
    let f = fixture().await;
    let customer = register_customer(&f.store, "01512345678").await;
    let caller = Caller::customer(customer.id);
    let first = f.service.confirm(&caller, request(&[("P1", "M", 1)], "01512345678", "Dhaka")).await.unwrap().order;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = f.service.confirm(&caller, request(&[("P2", "L", 1)], "01512345678", "Dhaka")).await.unwrap().order;
    f.service.confirm(&Caller::anonymous(), request(&[("P1", "M", 1)], "01812345678", "Dhaka")).await.unwrap();

    let orders = f.service.list_orders(&caller).await.unwrap();
    let ids: Vec<_> = orders.iter().map(|o| o.order_id.as_str()).collect();
    assert_eq!(ids, vec![second.order_id.as_str(), first.order_id.as_str()]);
    assert!(matches!(f.service.list_orders(&Caller::anonymous()).await, Err(EngineError::Unauthorized)));
}

// =============================================================================
// Reviews
// =============================================================================

fn review(order: &Order, rating: Decimal, text: &str) -> SubmitReviewRequest {
    let line = &order.ordered_products[0];
    SubmitReviewRequest {
        product_id: line.product_id.clone(),
        order_id: order.order_id.clone(),
        size: line.product_size.clone(),
        rating,
        review: text.into(),
    }
}

fn key_of(order: &Order) -> LineKey {
    let line = &order.ordered_products[0];
    LineKey { product_id: line.product_id.clone(), order_id: order.order_id.clone(), size: line.product_size.clone() }
}

#[tokio::test]
async fn test_review_lifecycle() {
    let f = fixture().await;
    let customer = register_customer(&f.store, "01512345678").await;
    let staff = register_customer(&f.store, "01312345678").await;
    let caller = Caller::customer(customer.id);
    let order = f.service.confirm(&caller, request(&[("P1", "M", 1)], "01512345678", "Dhaka")).await.unwrap().order;

    let line = f.service.submit_review(&caller, review(&order, d(4), "Nice fabric")).await.unwrap();
    assert_eq!(line.review_status, ReviewStatus::Submitted);
    let line = f.service.submit_review(&caller, review(&order, d(5), "Better after washing")).await.unwrap();
    assert_eq!(line.rating, Some(d(5)));

    assert!(matches!(f.service.approve_review(&caller, &key_of(&order)).await, Err(EngineError::Forbidden)));
    let approved = f.service.approve_review(&Caller::staff(staff.id), &key_of(&order)).await.unwrap();
    assert_eq!(approved.review_status, ReviewStatus::Approved);

    let subjects: Vec<_> = f.events.events().await.iter().map(|e| e.subject()).collect();
    assert_eq!(subjects, vec!["order.confirmed", "review.submitted", "review.submitted", "review.approved"]);
}

#[tokio::test]
async fn test_approved_review_cannot_change() {
    let f = fixture().await;
    let customer = register_customer(&f.store, "01512345678").await;
    let caller = Caller::customer(customer.id);
    let order = f.service.confirm(&caller, request(&[("P1", "M", 1)], "01512345678", "Dhaka")).await.unwrap().order;
    f.service.submit_review(&caller, review(&order, d(3), "ok")).await.unwrap();
    f.service.approve_review(&Caller::staff(customer.id), &key_of(&order)).await.unwrap();
    let before = f.store.find_ordered_product(&key_of(&order)).await.unwrap().unwrap();

    let err = f.service.submit_review(&caller, review(&order, d(1), "changed my mind")).await.unwrap_err();

    assert!(matches!(err, EngineError::Review(ReviewError::AlreadyApproved)));
    assert_eq!(f.store.find_ordered_product(&key_of(&order)).await.unwrap().unwrap(), before);
}

#[tokio::test]
async fn test_review_rules() {
    let f = fixture().await;
    let owner = register_customer(&f.store, "01512345678").await;
    let stranger = register_customer(&f.store, "01612345678").await;
    let order = f.service.confirm(&Caller::customer(owner.id), request(&[("P1", "M", 1)], "01512345678", "Dhaka")).await.unwrap().order;

    let err = f.service.submit_review(&Caller::customer(stranger.id), review(&order, d(4), "hm")).await.unwrap_err();
    assert!(matches!(err, EngineError::Forbidden));

    let err = f.service.submit_review(&Caller::customer(owner.id), review(&order, Decimal::new(55, 1), "wow")).await.unwrap_err();
    assert!(matches!(err, EngineError::Review(ReviewError::InvalidRating(_))));

    let mut wrong_size = review(&order, d(4), "fits");
    wrong_size.size = "XXL".into();
    let err = f.service.submit_review(&Caller::customer(owner.id), wrong_size).await.unwrap_err();
    assert!(matches!(err, EngineError::OrderedProductNotFound));

    let err = f.service.approve_review(&Caller::staff(owner.id), &key_of(&order)).await.unwrap_err();
    assert!(matches!(err, EngineError::Review(ReviewError::NotSubmitted)));
}

#[tokio::test]
async fn test_list_reviews_visibility_and_order() {
    let f = fixture().await;
    let alice = register_customer(&f.store, "01512345678").await;
    let bob = register_customer(&f.store, "01612345678").await;
    let carol = register_customer(&f.store, "01812345678").await;
    let staff = Caller::staff(carol.id);

    let a = f.service.confirm(&Caller::customer(alice.id), request(&[("P1", "M", 1)], "01512345678", "Dhaka")).await.unwrap().order;
    let b = f.service.confirm(&Caller::customer(bob.id), request(&[("P1", "M", 1)], "01612345678", "Dhaka")).await.unwrap().order;
    let c = f.service.confirm(&Caller::customer(carol.id), request(&[("P1", "M", 1)], "01812345678", "Dhaka")).await.unwrap().order;

    f.service.submit_review(&Caller::customer(alice.id), review(&a, d(3), "fine")).await.unwrap();
    f.service.approve_review(&staff, &key_of(&a)).await.unwrap();
    f.service.submit_review(&Caller::customer(bob.id), review(&b, d(5), "great")).await.unwrap();
    // a moderated line that lost its rating sorts last
    assert!(f.store.force_review_status(&key_of(&c), ReviewStatus::Approved).await);

    let public = f.service.list_reviews(&Caller::anonymous(), "P1").await.unwrap();
    assert_eq!(orders_of(&public), vec![a.order_id.as_str(), c.order_id.as_str()]);

    let own = f.service.list_reviews(&Caller::customer(bob.id), "P1").await.unwrap();
    assert_eq!(orders_of(&own), vec![b.order_id.as_str(), a.order_id.as_str(), c.order_id.as_str()]);

    let all = f.service.list_reviews(&staff, "P1").await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(f.service.list_reviews(&staff, "P2").await.unwrap().is_empty());
}

fn orders_of(reviews: &[ReviewEntry]) -> Vec<&str> { reviews.iter().map(|r| r.order_id.as_str()).collect() }

fn cart_line(product_id: &str, size: &str, count: u32) -> opensase_orders::domain::aggregates::CartLine {
    opensase_orders::domain::aggregates::CartLine { product_id: product_id.into(), size: size.into(), count }
}
