//! Fee policy and trade outcome arithmetic.
//!
//! The fee starts at `BASE_FEE` percent and drops by
//! `FEE_REDUCTION_PER_TRADER` for each registered trader, floored at 0.
//! It is read live at every close; nothing here touches storage.

use serde::{Deserialize, Serialize};

/// Base fee percentage with zero traders.
pub const BASE_FEE: f64 = 20.0;

/// Fee percentage shaved off per registered trader.
pub const FEE_REDUCTION_PER_TRADER: f64 = 1.0;

/// Current fee percentage for a given trader count.
pub fn current_fee(trader_count: i64) -> f64 {
    (BASE_FEE - trader_count as f64 * FEE_REDUCTION_PER_TRADER).max(0.0)
}

/// Gross/fee/net breakdown of a close at a given fee percentage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TradeOutcome {
    pub gross_pl: f64,
    pub fee_percentage: f64,
    pub fee_amount: f64,
    pub net_pl: f64,
}

impl TradeOutcome {
    /// Compute the outcome of selling `quantity` bought at `entry_price`
    /// for `exit_price`, with the fee taken on the absolute gross P/L.
    pub fn compute(entry_price: f64, exit_price: f64, quantity: i64, fee_percentage: f64) -> Self {
        let gross_pl = (exit_price - entry_price) * quantity as f64;
        let fee_amount = gross_pl.abs() * fee_percentage / 100.0;
        let net_pl = gross_pl - fee_amount;

        Self {
            gross_pl,
            fee_percentage,
            fee_amount,
            net_pl,
        }
    }
}
