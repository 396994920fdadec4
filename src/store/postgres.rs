//! PostgreSQL store on `sqlx`.
//!
//! Stock rows are locked with `SELECT … FOR UPDATE` inside the confirmation
//! transaction, which serializes concurrent reservations of the same
//! (product, size) pair.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{FromRow, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{LineKey, OfferStore, OrderStore, OrderTransaction, ReviewEntry, StoreError};
use crate::domain::aggregates::{
    CourierOption, Customer, DeliverySnapshot, DeliveryType, DiscountType, Offer, OfferType, Order, OrderStatus,
    OrderTotals, OrderedProduct, PaymentMethod, PaymentStatus, Product, ReviewStatus, StockEntry,
};
use crate::domain::value_objects::{PhoneNumber, Quantity};

const ORDER_COLUMNS: &str = "order_id, customer_id, customer_name, customer_phone, customer_email, customer_address, \
    customer_district, customer_note, products_base_value, products_regular_value, products_discount, flat_discount, \
    additional_discount, customers_delivery_charge, amount_to_collect, delivery_cost, order_profit, applied_promo_code, \
    order_status, payment_status, payment_method, courier, delivery_type, delivery_consignment_id, delivery_tracking_url, \
    idempotency_key, created_at, updated_at";

const LINE_COLUMNS: &str = "id, order_id, product_id, product_size, product_quantity, product_price, rating, review, review_status";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    async fn lines_for(&self, order_ids: &[String]) -> Result<Vec<OrderedProduct>, StoreError> {
        let sql = format!("SELECT {LINE_COLUMNS} FROM ordered_products WHERE order_id = ANY($1) ORDER BY id");
        let rows = sqlx::query_as::<_, LineRow>(&sql).bind(order_ids).fetch_all(&self.pool).await?;
        rows.into_iter().map(OrderedProduct::try_from).collect()
    }

    async fn with_lines(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        let ids: Vec<String> = rows.iter().map(|r| r.order_id.clone()).collect();
        let mut lines = self.lines_for(&ids).await?;
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let mut order = Order::try_from(row)?;
            let (mine, rest): (Vec<_>, Vec<_>) = lines.into_iter().partition(|l| l.order_id == order.order_id);
            order.ordered_products = mine;
            lines = rest;
            orders.push(order);
        }
        Ok(orders)
    }
}

// =============================================================================
// Rows
// =============================================================================

#[derive(Debug, FromRow)]
struct CustomerRow { id: Uuid, phone_number: String, full_name: Option<String>, is_staff: bool, created_at: DateTime<Utc> }

impl TryFrom<CustomerRow> for Customer {
    type Error = StoreError;
    fn try_from(r: CustomerRow) -> Result<Self, Self::Error> {
        let phone_number = PhoneNumber::parse(&r.phone_number).map_err(|e| corrupt("customers", e))?;
        Ok(Customer { id: r.id, phone_number, full_name: r.full_name, is_staff: r.is_staff, created_at: r.created_at })
    }
}

#[derive(Debug, FromRow)]
struct ProductRow {
    product_id: String, category_id: Option<String>, product_name: String, base_price: Decimal, selling_price: Decimal,
    discount_pct: Decimal, is_archived: bool, total_stock: i64,
}

impl From<ProductRow> for Product {
    fn from(r: ProductRow) -> Self {
        Product {
            product_id: r.product_id, category_id: r.category_id, product_name: r.product_name, base_price: r.base_price,
            selling_price: r.selling_price, discount_pct: r.discount_pct, is_archived: r.is_archived, total_stock: r.total_stock,
        }
    }
}

#[derive(Debug, FromRow)]
struct OfferRow {
    id: i64, offer_type: i16, title: String, promo_code: Option<String>, discount_type: i16, discount_value: Decimal,
    minimum_purchase: Decimal, starts_on: NaiveDate, ends_on: NaiveDate,
}

impl TryFrom<OfferRow> for Offer {
    type Error = StoreError;
    fn try_from(r: OfferRow) -> Result<Self, Self::Error> {
        Ok(Offer {
            id: r.id,
            offer_type: decode("offers", "offer_type", r.offer_type, OfferType::from_code)?,
            title: r.title,
            promo_code: r.promo_code,
            discount_type: decode("offers", "discount_type", r.discount_type, DiscountType::from_code)?,
            discount_value: r.discount_value,
            minimum_purchase: r.minimum_purchase,
            starts_on: r.starts_on,
            ends_on: r.ends_on,
        })
    }
}

#[derive(Debug, FromRow)]
struct OrderRow {
    order_id: String, customer_id: Option<Uuid>, customer_name: String, customer_phone: String,
    customer_email: Option<String>, customer_address: String, customer_district: String, customer_note: Option<String>,
    products_base_value: Decimal, products_regular_value: Decimal, products_discount: Decimal, flat_discount: Decimal,
    additional_discount: Decimal, customers_delivery_charge: Decimal, amount_to_collect: Decimal, delivery_cost: Decimal,
    order_profit: Decimal, applied_promo_code: Option<String>, order_status: i16, payment_status: i16, payment_method: i16,
    courier: Option<i16>, delivery_type: i16, delivery_consignment_id: Option<String>, delivery_tracking_url: Option<String>,
    idempotency_key: Option<String>, created_at: DateTime<Utc>, updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;
    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            order_id: r.order_id,
            customer_id: r.customer_id,
            delivery: DeliverySnapshot {
                customer_name: r.customer_name, customer_phone: r.customer_phone, customer_email: r.customer_email,
                customer_address: r.customer_address, customer_district: r.customer_district, customer_note: r.customer_note,
            },
            totals: OrderTotals {
                products_base_value: r.products_base_value, products_regular_value: r.products_regular_value,
                products_discount: r.products_discount, flat_discount: r.flat_discount, additional_discount: r.additional_discount,
                customers_delivery_charge: r.customers_delivery_charge, amount_to_collect: r.amount_to_collect,
                delivery_cost: r.delivery_cost, order_profit: r.order_profit,
            },
            applied_promo_code: r.applied_promo_code,
            order_status: decode("orders", "order_status", r.order_status, OrderStatus::from_code)?,
            payment_status: decode("orders", "payment_status", r.payment_status, PaymentStatus::from_code)?,
            payment_method: decode("orders", "payment_method", r.payment_method, PaymentMethod::from_code)?,
            courier: r.courier.map(|c| decode("orders", "courier", c, CourierOption::from_code)).transpose()?,
            delivery_type: decode("orders", "delivery_type", r.delivery_type, DeliveryType::from_code)?,
            delivery_consignment_id: r.delivery_consignment_id,
            delivery_tracking_url: r.delivery_tracking_url,
            idempotency_key: r.idempotency_key,
            created_at: r.created_at,
            updated_at: r.updated_at,
            ordered_products: vec![],
        })
    }
}

#[derive(Debug, FromRow)]
struct LineRow {
    id: Uuid, order_id: String, product_id: String, product_size: String, product_quantity: i32, product_price: Decimal,
    rating: Option<Decimal>, review: Option<String>, review_status: i16,
}

impl TryFrom<LineRow> for OrderedProduct {
    type Error = StoreError;
    fn try_from(r: LineRow) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(r.product_quantity).map_err(|e| corrupt("ordered_products", e))?;
        Ok(OrderedProduct {
            id: r.id, order_id: r.order_id, product_id: r.product_id, product_size: r.product_size,
            product_quantity: Quantity::new(quantity), product_price: r.product_price, rating: r.rating, review: r.review,
            review_status: decode("ordered_products", "review_status", r.review_status, ReviewStatus::from_code)?,
        })
    }
}

fn decode<T>(table: &'static str, column: &str, code: i16, from_code: fn(i16) -> Option<T>) -> Result<T, StoreError> {
    from_code(code).ok_or_else(|| StoreError::Corrupt { table, detail: format!("unknown {column} code {code}") })
}

fn corrupt(table: &'static str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt { table, detail: err.to_string() }
}

fn quantity_param(q: Quantity) -> Result<i32, StoreError> {
    i32::try_from(q.value()).map_err(|e| corrupt("ordered_products", e))
}

// =============================================================================
// Transaction
// =============================================================================

pub struct PgOrderTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTransaction for PgOrderTransaction {
    async fn order_id_exists(&mut self, order_id: &str) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM orders WHERE order_id = $1)")
            .bind(order_id).fetch_one(&mut *self.tx).await?;
        Ok(exists)
    }

    async fn insert_order(&mut self, o: &Order) -> Result<bool, StoreError> {
        let d = &o.delivery;
        // NULL keys never conflict, so orders without a key always insert.
        let done = sqlx::query(
            "INSERT INTO orders (order_id, customer_id, customer_name, customer_phone, customer_email, customer_address, \
             customer_district, customer_note, order_status, payment_status, payment_method, courier, delivery_type, \
             idempotency_key, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             ON CONFLICT (idempotency_key) DO NOTHING",
        )
        .bind(&o.order_id).bind(o.customer_id).bind(&d.customer_name).bind(&d.customer_phone).bind(&d.customer_email)
        .bind(&d.customer_address).bind(&d.customer_district).bind(&d.customer_note).bind(o.order_status.code())
        .bind(o.payment_status.code()).bind(o.payment_method.code()).bind(o.courier.map(CourierOption::code))
        .bind(o.delivery_type.code()).bind(&o.idempotency_key).bind(o.created_at).bind(o.updated_at)
        .execute(&mut *self.tx).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn find_product(&mut self, product_id: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(
            "SELECT product_id, category_id, product_name, base_price, selling_price, discount_pct, is_archived, total_stock \
             FROM products WHERE product_id = $1",
        )
        .bind(product_id).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(Product::from))
    }

    async fn reserve_stock(&mut self, product_id: &str, size: &str, requested: Quantity) -> Result<Quantity, StoreError> {
        let row = sqlx::query("SELECT product_id, size, count FROM product_stock WHERE product_id = $1 AND size = $2 FOR UPDATE")
            .bind(product_id).bind(size).fetch_optional(&mut *self.tx).await?;
        let Some(row) = row else { return Ok(Quantity::ZERO) };
        let mut entry = stock_entry(&row)?;
        let reserved = entry.reserve(requested);
        if reserved.is_zero() {
            return Ok(reserved);
        }
        sqlx::query("UPDATE product_stock SET count = $3 WHERE product_id = $1 AND size = $2")
            .bind(product_id).bind(size).bind(entry.count).execute(&mut *self.tx).await?;
        sqlx::query("UPDATE products SET total_stock = total_stock - $2 WHERE product_id = $1")
            .bind(product_id).bind(i64::from(reserved.value())).execute(&mut *self.tx).await?;
        Ok(reserved)
    }

    async fn insert_ordered_product(&mut self, l: &OrderedProduct) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO ordered_products (id, order_id, product_id, product_size, product_quantity, product_price, rating, review, review_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(l.id).bind(&l.order_id).bind(&l.product_id).bind(&l.product_size).bind(quantity_param(l.product_quantity)?)
        .bind(l.product_price).bind(l.rating).bind(&l.review).bind(l.review_status.code())
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn update_order_totals(&mut self, o: &Order) -> Result<(), StoreError> {
        let t = &o.totals;
        sqlx::query(
            "UPDATE orders SET products_base_value = $2, products_regular_value = $3, products_discount = $4, \
             flat_discount = $5, additional_discount = $6, customers_delivery_charge = $7, amount_to_collect = $8, \
             delivery_cost = $9, order_profit = $10, applied_promo_code = $11, updated_at = $12 WHERE order_id = $1",
        )
        .bind(&o.order_id).bind(t.products_base_value).bind(t.products_regular_value).bind(t.products_discount)
        .bind(t.flat_discount).bind(t.additional_discount).bind(t.customers_delivery_charge).bind(t.amount_to_collect)
        .bind(t.delivery_cost).bind(t.order_profit).bind(&o.applied_promo_code).bind(o.updated_at)
        .execute(&mut *self.tx).await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

fn stock_entry(row: &PgRow) -> Result<StockEntry, StoreError> {
    Ok(StockEntry { product_id: row.try_get("product_id")?, size: row.try_get("size")?, count: row.try_get("count")? })
}

// =============================================================================
// Store
// =============================================================================

#[async_trait]
impl OrderStore for PgStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgOrderTransaction { tx }))
    }

    async fn find_customer(&self, customer_id: Uuid) -> Result<Option<Customer>, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>("SELECT id, phone_number, full_name, is_staff, created_at FROM customers WHERE id = $1")
            .bind(customer_id).fetch_optional(&self.pool).await?;
        row.map(Customer::try_from).transpose()
    }

    async fn get_or_create_customer(&self, phone: &PhoneNumber) -> Result<Customer, StoreError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "INSERT INTO customers (id, phone_number, is_staff, created_at) VALUES ($1, $2, FALSE, NOW()) \
             ON CONFLICT (phone_number) DO UPDATE SET phone_number = EXCLUDED.phone_number \
             RETURNING id, phone_number, full_name, is_staff, created_at",
        )
        .bind(Uuid::now_v7()).bind(phone.as_str()).fetch_one(&self.pool).await?;
        Customer::try_from(row)
    }

    async fn clear_cart(&self, customer_id: Uuid) -> Result<u64, StoreError> {
        let done = sqlx::query("DELETE FROM cart_items WHERE customer_id = $1").bind(customer_id).execute(&self.pool).await?;
        Ok(done.rows_affected())
    }

    async fn find_order(&self, order_id: &str) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql).bind(order_id).fetch_optional(&self.pool).await?;
        Ok(self.with_lines(row.into_iter().collect()).await?.pop())
    }

    async fn find_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE idempotency_key = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql).bind(key).fetch_optional(&self.pool).await?;
        Ok(self.with_lines(row.into_iter().collect()).await?.pop())
    }

    async fn list_orders_for_customer(&self, customer_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE customer_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, OrderRow>(&sql).bind(customer_id).fetch_all(&self.pool).await?;
        self.with_lines(rows).await
    }

    async fn find_ordered_product(&self, key: &LineKey) -> Result<Option<OrderedProduct>, StoreError> {
        let sql = format!("SELECT {LINE_COLUMNS} FROM ordered_products WHERE product_id = $1 AND order_id = $2 AND product_size = $3");
        let row = sqlx::query_as::<_, LineRow>(&sql)
            .bind(&key.product_id).bind(&key.order_id).bind(&key.size).fetch_optional(&self.pool).await?;
        row.map(OrderedProduct::try_from).transpose()
    }

    async fn save_review(&self, line: &OrderedProduct, expected: ReviewStatus) -> Result<bool, StoreError> {
        let done = sqlx::query("UPDATE ordered_products SET rating = $2, review = $3, review_status = $4 WHERE id = $1 AND review_status = $5")
            .bind(line.id).bind(line.rating).bind(&line.review).bind(line.review_status.code()).bind(expected.code())
            .execute(&self.pool).await?;
        Ok(done.rows_affected() == 1)
    }

    async fn reviews_for_product(&self, product_id: &str) -> Result<Vec<ReviewEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT op.order_id, op.product_id, op.product_size, op.rating, op.review, op.review_status, o.customer_id \
             FROM ordered_products op JOIN orders o ON o.order_id = op.order_id \
             WHERE op.product_id = $1 AND op.review_status <> $2",
        )
        .bind(product_id).bind(ReviewStatus::Unsubmitted.code()).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<ReviewEntry, StoreError> {
                Ok(ReviewEntry {
                    order_id: row.try_get("order_id")?,
                    product_id: row.try_get("product_id")?,
                    product_size: row.try_get("product_size")?,
                    rating: row.try_get("rating")?,
                    review: row.try_get("review")?,
                    review_status: decode("ordered_products", "review_status", row.try_get("review_status")?, ReviewStatus::from_code)?,
                    customer_id: row.try_get("customer_id")?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OfferStore for PgStore {
    async fn active_offers(&self, offer_type: OfferType, day: NaiveDate, promo_code: Option<&str>) -> Result<Vec<Offer>, StoreError> {
        let rows = sqlx::query_as::<_, OfferRow>(
            "SELECT id, offer_type, title, promo_code, discount_type, discount_value, minimum_purchase, starts_on, ends_on \
             FROM offers WHERE offer_type = $1 AND starts_on <= $2 AND ends_on >= $2 \
             AND ($3::TEXT IS NULL OR promo_code = $3) ORDER BY id",
        )
        .bind(offer_type.code()).bind(day).bind(promo_code).fetch_all(&self.pool).await?;
        rows.into_iter().map(Offer::try_from).collect()
    }
}
