//! Cart Aggregate
//!
//! Cart lines are written by the storefront and consumed in bulk when an
//! order is confirmed.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: String,
    pub size: String,
    pub count: u32,
}

/// A customer's saved cart. One line per (product, size).
#[derive(Clone, Debug, Default)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn len(&self) -> usize { self.lines.len() }
    pub fn is_empty(&self) -> bool { self.lines.is_empty() }

    pub fn add_line(&mut self, line: CartLine) {
        if let Some(existing) = self.lines.iter_mut().find(|l| l.product_id == line.product_id && l.size == line.size) {
            existing.count = existing.count.saturating_add(line.count);
        } else {
            self.lines.push(line);
        }
    }

    /// Empties the cart, returning how many lines were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.lines.len();
        self.lines.clear();
        removed
    }
}
