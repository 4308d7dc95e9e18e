//! Data models for ingredients, positions, closed trades, and holdings.

mod ingredient;
mod portfolio;
mod position;
mod trade;

pub use ingredient::Ingredient;
pub use portfolio::Holding;
pub use position::{blend_entry_price, Position, STATUS_CLOSED, STATUS_OPEN};
pub use trade::TradeRecord;
