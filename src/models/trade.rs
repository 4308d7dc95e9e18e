//! Closed-trade history records.

use serde::{Deserialize, Serialize};

/// One row of the append-only `trading_history` table, joined with the
/// position it closed for display (ingredient, entry price).
///
/// `profit_loss` is net of the fee; `fee_percentage` and `fee_amount` are
/// captured live at close time, never recomputed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradeRecord {
    pub id: i64,
    pub position_id: Option<i64>,
    pub ingredient: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub profit_loss: f64,
    pub fee_percentage: f64,
    pub fee_amount: f64,
    pub exit_date: String,
    pub comment: Option<String>,
}
