//! Stored position row: an open or closed holding of one ingredient.

use serde::{Deserialize, Serialize};

pub const STATUS_OPEN: &str = "open";
pub const STATUS_CLOSED: &str = "closed";

/// A position as persisted in the `positions` table.
///
/// Positions are portfolio-aggregated: there is at most one open row per
/// ingredient, and opening more of a held ingredient blends quantity and
/// entry price into the existing row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Position {
    pub id: i64,
    pub ingredient: String,
    pub quantity: i64,
    pub entry_price: f64,
    pub entry_date: String,
    pub last_updated: String,
    pub status: String,
    pub comment: Option<String>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.status == STATUS_OPEN
    }
}

/// Weighted-average entry price after merging a new lot into a holding.
pub fn blend_entry_price(old_avg: f64, old_qty: i64, price: f64, qty: i64) -> f64 {
    let total = old_qty + qty;
    (old_avg * old_qty as f64 + price * qty as f64) / total as f64
}
