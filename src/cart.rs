//! Session-scoped shopping cart.
//!
//! The cart is the client-held picture of "what the shopper intends to buy"
//! before any order exists. It is pure local state: one instance per browsing
//! session, never shared across sessions and never stored server-side. On
//! checkout its lines are snapshotted into an order and the cart is cleared.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One cart line. Catalog products and ad-hoc service bookings are distinct
/// variants rather than one struct with optional fields, so a line's meaning
/// never depends on which fields happen to be populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartLine {
    CatalogProduct {
        product_id: Uuid,
        external_product_id: String,
        name: String,
        /// Minor currency units.
        unit_price: i64,
        quantity: u32,
        image_url: Option<String>,
    },
    ServiceBooking {
        service_id: String,
        /// Tier label ("30min", "1h", ...). Together with the service id it
        /// forms the line identity.
        tier: String,
        external_price_id: String,
        name: String,
        unit_price: i64,
        quantity: u32,
        image_url: Option<String>,
    },
}

impl CartLine {
    /// Stable identity used for merging and quantity updates.
    pub fn line_id(&self) -> String {
        match self {
            CartLine::CatalogProduct { product_id, .. } => product_id.to_string(),
            CartLine::ServiceBooking {
                service_id, tier, ..
            } => format!("{service_id}:{tier}"),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CartLine::CatalogProduct { name, .. } | CartLine::ServiceBooking { name, .. } => name,
        }
    }

    pub fn unit_price(&self) -> i64 {
        match self {
            CartLine::CatalogProduct { unit_price, .. }
            | CartLine::ServiceBooking { unit_price, .. } => *unit_price,
        }
    }

    pub fn quantity(&self) -> u32 {
        match self {
            CartLine::CatalogProduct { quantity, .. }
            | CartLine::ServiceBooking { quantity, .. } => *quantity,
        }
    }

    fn quantity_mut(&mut self) -> &mut u32 {
        match self {
            CartLine::CatalogProduct { quantity, .. }
            | CartLine::ServiceBooking { quantity, .. } => quantity,
        }
    }

    pub fn image_url(&self) -> Option<&str> {
        match self {
            CartLine::CatalogProduct { image_url, .. }
            | CartLine::ServiceBooking { image_url, .. } => image_url.as_deref(),
        }
    }

    /// Saturating, so absurd quantities cannot panic the UI layer; the
    /// server recomputes and validates the real total at intake.
    pub fn line_total(&self) -> i64 {
        self.unit_price()
            .saturating_mul(i64::from(self.quantity()))
    }
}

/// Derived totals, computed on demand so they can never go stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartTotals {
    /// Sum of line quantities.
    pub item_count: u32,
    /// Sum of `unit_price * quantity`, minor units.
    pub total: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
    /// Visibility of the cart drawer. UI state only, not part of the data
    /// model.
    open: bool,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Adds a line. A line with the same identity merges by incrementing the
    /// existing quantity.
    pub fn add(&mut self, line: CartLine) {
        let id = line.line_id();
        if let Some(existing) = self.lines.iter_mut().find(|l| l.line_id() == id) {
            let merged = existing.quantity().saturating_add(line.quantity());
            *existing.quantity_mut() = merged;
        } else {
            self.lines.push(line);
        }
    }

    /// Sets a line's quantity. Zero removes the line entirely; unknown line
    /// ids are ignored.
    pub fn update_quantity(&mut self, line_id: &str, quantity: u32) {
        if quantity == 0 {
            self.remove(line_id);
            return;
        }
        if let Some(line) = self.lines.iter_mut().find(|l| l.line_id() == line_id) {
            *line.quantity_mut() = quantity;
        }
    }

    pub fn remove(&mut self, line_id: &str) {
        self.lines.retain(|l| l.line_id() != line_id);
    }

    /// Empties the cart; called after a successful checkout initiation or on
    /// explicit user action.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn totals(&self) -> CartTotals {
        CartTotals {
            item_count: self
                .lines
                .iter()
                .fold(0u32, |acc, l| acc.saturating_add(l.quantity())),
            total: self
                .lines
                .iter()
                .fold(0i64, |acc, l| acc.saturating_add(l.line_total())),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }
}
