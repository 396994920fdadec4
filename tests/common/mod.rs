#![allow(dead_code)]

use chrono::{Days, Local};
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use opensase_orders::domain::aggregates::{Customer, DiscountType, Offer, OfferType, Product};
use opensase_orders::domain::value_objects::PhoneNumber;
use opensase_orders::orders::ConfirmOrderRequest;
use opensase_orders::publisher::MemoryPublisher;
use opensase_orders::store::{OfferStore, OrderStore};
use opensase_orders::{DiscountResolver, EngineSettings, MemoryStore, OrderService, PricingEngine};

pub const PHONE: &str = "01712345678";

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub events: Arc<MemoryPublisher>,
    pub discounts: Arc<DiscountResolver>,
    pub service: Arc<OrderService>,
}

pub fn d(v: i64) -> Decimal { Decimal::new(v, 0) }

/// P1: base 80, sells at 100 with 10% off. P2: base 700, sells at 1050.
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.add_product(Product::new("P1", "Cotton Shirt", d(80), d(100), d(10)).unwrap()).await;
    store.add_product(Product::new("P2", "Silk Panjabi", d(700), d(1050), Decimal::ZERO).unwrap()).await;
    store.set_stock("P1", "M", 10).await;
    store.set_stock("P2", "L", 10).await;
    store
}

pub fn service_for(store: Arc<dyn OrderStore>, offers: Arc<dyn OfferStore>, events: Arc<MemoryPublisher>, settings: EngineSettings) -> OrderService {
    let discounts = Arc::new(DiscountResolver::new(offers, Duration::from_secs(3600)));
    OrderService::new(store, discounts, PricingEngine::default(), events, settings)
}

pub async fn fixture() -> Fixture {
    let store = seeded_store().await;
    let events = Arc::new(MemoryPublisher::new());
    let discounts = Arc::new(DiscountResolver::new(store.clone(), Duration::from_secs(3600)));
    let service = Arc::new(OrderService::new(store.clone(), discounts.clone(), PricingEngine::default(), events.clone(), EngineSettings::default()));
    Fixture { store, events, discounts, service }
}

pub async fn register_customer(store: &MemoryStore, phone: &str) -> Customer {
    let customer = Customer::register(PhoneNumber::parse(phone).unwrap());
    store.add_customer(customer.clone()).await;
    customer
}

pub fn active_offer(offer_type: OfferType, promo_code: Option<&str>, discount_type: DiscountType, value: i64) -> Offer {
    let today = Local::now().date_naive();
    Offer {
        id: 0,
        offer_type,
        title: "Eid offer".into(),
        promo_code: promo_code.map(str::to_string),
        discount_type,
        discount_value: d(value),
        minimum_purchase: Decimal::ZERO,
        starts_on: today - Days::new(1),
        ends_on: today + Days::new(1),
    }
}

pub fn confirm_payload(items: &[(&str, &str, i64)], phone: &str, district: &str) -> serde_json::Value {
    let cart: Vec<_> = items
        .iter()
        .map(|(product_id, size, count)| json!({"product": {"product_id": product_id}, "size": size, "count": count}))
        .collect();
    json!({
        "cart_item_list": cart,
        "delivery_details": {
            "name": "Rahim Uddin",
            "phone": phone,
            "email": "rahim@example.com",
            "address": "House 12, Road 5",
            "district": district
        }
    })
}

pub fn request(items: &[(&str, &str, i64)], phone: &str, district: &str) -> ConfirmOrderRequest {
    serde_json::from_value(confirm_payload(items, phone, district)).unwrap()
}
