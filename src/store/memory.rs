//! In-process store.
//!
//! A confirmation transaction holds the state lock for its whole lifetime and
//! works on a copy that replaces the shared state on commit, so concurrent
//! confirmations serialize and an abandoned transaction leaves no trace.
//! Offers live behind their own lock so discount lookups never wait on an
//! open transaction.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use super::{LineKey, OfferStore, OrderStore, OrderTransaction, ReviewEntry, StoreError};
use crate::domain::aggregates::{Cart, CartLine, Customer, Offer, OfferType, Order, OrderedProduct, Product, ReviewStatus, StockEntry};
use crate::domain::value_objects::{PhoneNumber, Quantity};

#[derive(Clone, Debug, Default)]
struct State {
    customers: HashMap<Uuid, Customer>,
    products: HashMap<String, Product>,
    stock: HashMap<(String, String), StockEntry>,
    carts: HashMap<Uuid, Cart>,
    /// Insertion order.
    orders: Vec<Order>,
}

impl State {
    fn order(&self, order_id: &str) -> Option<&Order> { self.orders.iter().find(|o| o.order_id == order_id) }
    fn order_mut(&mut self, order_id: &str) -> Option<&mut Order> { self.orders.iter_mut().find(|o| o.order_id == order_id) }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
    offers: RwLock<Vec<Offer>>,
    next_offer_id: AtomicI64,
    fail_cart_clear: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn add_customer(&self, customer: Customer) {
        self.state.lock().await.customers.insert(customer.id, customer);
    }

    pub async fn add_product(&self, product: Product) {
        self.state.lock().await.products.insert(product.product_id.clone(), product);
    }

    /// Sets the stock row and keeps the product's `total_stock` in step.
    pub async fn set_stock(&self, product_id: &str, size: &str, count: i32) {
        let mut state = self.state.lock().await;
        state.stock.insert((product_id.to_string(), size.to_string()), StockEntry::new(product_id, size, count));
        let total: i64 = state.stock.values().filter(|s| s.product_id == product_id).map(|s| i64::from(s.count)).sum();
        if let Some(product) = state.products.get_mut(product_id) {
            product.total_stock = total;
        }
    }

    pub async fn stock_count(&self, product_id: &str, size: &str) -> Option<i32> {
        self.state.lock().await.stock.get(&(product_id.to_string(), size.to_string())).map(|s| s.count)
    }

    pub async fn product(&self, product_id: &str) -> Option<Product> {
        self.state.lock().await.products.get(product_id).cloned()
    }

    pub async fn add_cart_line(&self, customer_id: Uuid, line: CartLine) {
        self.state.lock().await.carts.entry(customer_id).or_default().add_line(line);
    }

    pub async fn cart_len(&self, customer_id: Uuid) -> usize {
        self.state.lock().await.carts.get(&customer_id).map_or(0, Cart::len)
    }

    pub async fn order_count(&self) -> usize { self.state.lock().await.orders.len() }

    /// Assigns the next insertion id and stores the offer.
    pub async fn add_offer(&self, mut offer: Offer) -> i64 {
        offer.id = self.next_offer_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = offer.id;
        self.offers.write().await.push(offer);
        id
    }

    pub async fn clear_offers(&self) { self.offers.write().await.clear(); }

    /// Makes `clear_cart` fail, for exercising best-effort paths.
    pub fn set_cart_clear_failure(&self, fail: bool) { self.fail_cart_clear.store(fail, Ordering::SeqCst); }

    /// Overwrites a line's review status, standing in for back-office moderation tools.
    pub async fn force_review_status(&self, key: &LineKey, status: ReviewStatus) -> bool {
        let mut state = self.state.lock().await;
        let line = state
            .order_mut(&key.order_id)
            .and_then(|o| o.ordered_products.iter_mut().find(|l| l.product_id == key.product_id && l.product_size == key.size));
        match line {
            Some(line) => { line.review_status = status; true }
            None => false,
        }
    }
}

pub struct MemoryTransaction {
    shared: OwnedMutexGuard<State>,
    working: State,
}

#[async_trait]
impl OrderTransaction for MemoryTransaction {
    async fn order_id_exists(&mut self, order_id: &str) -> Result<bool, StoreError> {
        Ok(self.working.order(order_id).is_some())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<bool, StoreError> {
        if self.working.order(&order.order_id).is_some() {
            return Err(StoreError::Unavailable(format!("duplicate order id {}", order.order_id)));
        }
        if let Some(key) = order.idempotency_key.as_deref() {
            if self.working.orders.iter().any(|o| o.idempotency_key.as_deref() == Some(key)) {
                return Ok(false);
            }
        }
        let mut shell = order.clone();
        shell.ordered_products.clear();
        self.working.orders.push(shell);
        Ok(true)
    }

    async fn find_product(&mut self, product_id: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.working.products.get(product_id).cloned())
    }

    async fn reserve_stock(&mut self, product_id: &str, size: &str, requested: Quantity) -> Result<Quantity, StoreError> {
        let Some(entry) = self.working.stock.get_mut(&(product_id.to_string(), size.to_string())) else {
            return Ok(Quantity::ZERO);
        };
        let reserved = entry.reserve(requested);
        if let Some(product) = self.working.products.get_mut(product_id) {
            product.total_stock -= i64::from(reserved.value());
        }
        Ok(reserved)
    }

    async fn insert_ordered_product(&mut self, line: &OrderedProduct) -> Result<(), StoreError> {
        let order = self.working.order_mut(&line.order_id).ok_or_else(|| StoreError::Corrupt {
            table: "ordered_products",
            detail: format!("order {} does not exist", line.order_id),
        })?;
        order.ordered_products.push(line.clone());
        Ok(())
    }

    async fn update_order_totals(&mut self, order: &Order) -> Result<(), StoreError> {
        let stored = self.working.order_mut(&order.order_id).ok_or_else(|| StoreError::Corrupt {
            table: "orders",
            detail: format!("order {} does not exist", order.order_id),
        })?;
        stored.totals = order.totals.clone();
        stored.applied_promo_code = order.applied_promo_code.clone();
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction { mut shared, working } = *self;
        *shared = working;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        let shared = self.state.clone().lock_owned().await;
        let working = shared.clone();
        Ok(Box::new(MemoryTransaction { shared, working }))
    }

    async fn find_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        Ok(self.state.lock().await.customers.get(&customer_id).cloned())
    }

    async fn get_or_create_customer(&self, phone: &PhoneNumber) -> Result<Customer, StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.customers.values().find(|c| &c.phone_number == phone) {
            return Ok(existing.clone());
        }
        let customer = Customer::register(phone.clone());
        state.customers.insert(customer.id, customer.clone());
        Ok(customer)
    }

    async fn clear_cart(&self, customer_id: Uuid) -> Result<u64, StoreError> {
        if self.fail_cart_clear.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("cart storage offline".into()));
        }
        let mut state = self.state.lock().await;
        Ok(state.carts.get_mut(&customer_id).map_or(0, |cart| cart.clear() as u64))
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.state.lock().await.order(order_id).cloned())
    }

    async fn find_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.idempotency_key.as_deref() == Some(key)).cloned())
    }

    async fn list_orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state.orders.iter().filter(|o| o.customer_id == Some(customer_id)).cloned().collect();
        orders.reverse();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn find_ordered_product(&self, key: &LineKey) -> Result<Option<OrderedProduct>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .order(&key.order_id)
            .and_then(|o| o.ordered_products.iter().find(|l| l.product_id == key.product_id && l.product_size == key.size))
            .cloned())
    }

    async fn save_review(&self, line: &OrderedProduct, expected: ReviewStatus) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(stored) = state.order_mut(&line.order_id).and_then(|o| o.ordered_products.iter_mut().find(|l| l.id == line.id)) else {
            return Ok(false);
        };
        if stored.review_status != expected {
            return Ok(false);
        }
        stored.rating = line.rating;
        stored.review = line.review.clone();
        stored.review_status = line.review_status;
        Ok(true)
    }

    async fn reviews_for_product(&self, product_id: &str) -> Result<Vec<ReviewEntry>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .flat_map(|o| o.ordered_products.iter().map(move |l| (o.customer_id, l)))
            .filter(|(_, l)| l.product_id == product_id && l.review_status != ReviewStatus::Unsubmitted)
            .map(|(customer_id, l)| ReviewEntry {
                order_id: l.order_id.clone(),
                product_id: l.product_id.clone(),
                product_size: l.product_size.clone(),
                rating: l.rating,
                review: l.review.clone(),
                review_status: l.review_status,
                customer_id,
            })
            .collect())
    }
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn active_offers(&self, offer_type: OfferType, day: NaiveDate, promo_code: Option<&str>) -> Result<Vec<Offer>, StoreError> {
        let offers = self.offers.read().await;
        Ok(offers.iter().filter(|o| o.matches(offer_type, day, promo_code)).cloned().collect())
    }
}
