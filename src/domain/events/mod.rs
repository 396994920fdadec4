//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Order(OrderEvent),
    Review(ReviewEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Confirmed { order_id: String, customer_id: Option<Uuid>, amount_to_collect: Decimal, item_count: u32 },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ReviewEvent {
    Submitted { order_id: String, product_id: String, rating: Decimal },
    Approved { order_id: String, product_id: String },
}

impl DomainEvent {
    /// Message bus subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Order(OrderEvent::Confirmed { .. }) => "order.confirmed",
            Self::Review(ReviewEvent::Submitted { .. }) => "review.submitted",
            Self::Review(ReviewEvent::Approved { .. }) => "review.approved",
        }
    }
}
