//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod customer;
pub mod offer;

pub use product::{Product, ProductError, StockEntry};
pub use order::{
    CourierOption, DeliverySnapshot, DeliveryType, Order, OrderStatus, OrderTotals, OrderView, OrderedProduct,
    PaymentMethod, PaymentStatus, ReviewError, ReviewStatus,
};
pub use cart::{Cart, CartLine};
pub use customer::Customer;
pub use offer::{Discount, DiscountType, Offer, OfferType};
