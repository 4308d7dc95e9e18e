//! Per-ingredient portfolio aggregate.

use serde::{Deserialize, Serialize};

/// Currently-held quantity and weighted-average cost for one ingredient,
/// derived by grouping open positions. Never stored; recomputing from the
/// position rows is the ground truth.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Holding {
    pub ingredient: String,
    pub quantity: i64,
    pub average_price: f64,
}

impl Holding {
    /// Total cost of the holding at its average entry price.
    pub fn cost_basis(&self) -> f64 {
        self.average_price * self.quantity as f64
    }
}
