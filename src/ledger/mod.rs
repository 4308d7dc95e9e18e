//! Position lifecycle: opening, closing, simulation, and read projections.
//!
//! The ledger owns all validation and P/L arithmetic; the [`Database`]
//! underneath only persists. Fees are read live from the traders row on
//! every close or simulation, never cached against a position.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::db::{CloseRecord, Database};
use crate::error::{LedgerError, Result};
use crate::fees::{current_fee, TradeOutcome};
use crate::models::{Holding, Ingredient, Position, TradeRecord};

/// Comments are capped at this many characters on write.
pub const MAX_COMMENT_LENGTH: usize = 500;

/// Lookup key for a close or simulation target: a position id, or the open
/// holding for an ingredient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionKey {
    ById(i64),
    ByIngredient(Ingredient),
}

impl FromStr for PositionKey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(id) = s.parse::<i64>() {
            return Ok(PositionKey::ById(id));
        }
        s.parse::<Ingredient>().map(PositionKey::ByIngredient)
    }
}

impl fmt::Display for PositionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionKey::ById(id) => write!(f, "position id {id}"),
            PositionKey::ByIngredient(ing) => write!(f, "ingredient {}", ing.code()),
        }
    }
}

/// Sell quantity: a literal amount, or the whole available quantity via the
/// `max`/`all` sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellQuantity {
    All,
    Exact(i64),
}

impl SellQuantity {
    /// Resolve against the available quantity, enforcing (0, available].
    pub fn resolve(self, available: i64) -> Result<i64> {
        match self {
            SellQuantity::All => Ok(available),
            SellQuantity::Exact(requested) if requested > 0 && requested <= available => {
                Ok(requested)
            }
            SellQuantity::Exact(requested) => Err(LedgerError::InvalidQuantity {
                requested,
                available,
            }),
        }
    }
}

impl FromStr for SellQuantity {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("max") || s.eq_ignore_ascii_case("all") {
            return Ok(SellQuantity::All);
        }
        s.parse::<i64>().map(SellQuantity::Exact).map_err(|_| {
            LedgerError::InvalidInput(format!(
                "quantity must be a number or 'max'/'all', got '{s}'"
            ))
        })
    }
}

/// Result of a close or close simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseOutcome {
    pub position_id: i64,
    pub ingredient: String,
    pub quantity_sold: i64,
    pub remaining_quantity: i64,
    pub position_closed: bool,
    pub outcome: TradeOutcome,
}

/// Point-in-time dashboard numbers, recomputed on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub trader_count: i64,
    pub current_fee: f64,
    pub open_positions: i64,
    pub total_profit_loss: f64,
    pub total_trades: i64,
}

/// The position ledger. Sole writer of positions and trading history.
pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a position, blending into the existing open holding for the
    /// ingredient if there is one.
    pub async fn open(
        &self,
        ingredient: &str,
        quantity: i64,
        entry_price: f64,
        comment: Option<&str>,
    ) -> Result<Position> {
        let ingredient: Ingredient = ingredient.parse()?;
        if quantity <= 0 {
            return Err(LedgerError::InvalidInput(format!(
                "quantity must be a positive integer, got {quantity}"
            )));
        }
        validate_price("entry price", entry_price)?;

        let comment = truncate_comment(comment);
        let position = self
            .db
            .upsert_position(ingredient.code(), quantity, entry_price, comment.as_deref())
            .await?;

        info!(
            id = position.id,
            ingredient = ingredient.code(),
            quantity,
            entry_price,
            "position opened"
        );

        Ok(position)
    }

    /// Close some or all of a position. Appends exactly one history entry
    /// and flips the position to closed when its quantity reaches zero.
    pub async fn close(
        &self,
        key: PositionKey,
        exit_price: f64,
        sell: SellQuantity,
        comment: Option<&str>,
    ) -> Result<CloseOutcome> {
        let (result, record) = self.prepare_close(key, exit_price, sell, comment).await?;

        self.db
            .apply_close(
                result.position_id,
                result.quantity_sold,
                result.position_closed,
                &record,
            )
            .await?;

        info!(
            position_id = result.position_id,
            ingredient = %result.ingredient,
            quantity_sold = result.quantity_sold,
            remaining = result.remaining_quantity,
            net_pl = result.outcome.net_pl,
            "position closed"
        );

        Ok(result)
    }

    /// What-if preview of a close: same resolution, validation, and
    /// arithmetic as [`Ledger::close`], with no writes of any kind.
    pub async fn simulate_close(
        &self,
        key: PositionKey,
        exit_price: f64,
        sell: SellQuantity,
    ) -> Result<CloseOutcome> {
        let (result, _) = self.prepare_close(key, exit_price, sell, None).await?;
        Ok(result)
    }

    /// Fully hypothetical round trip for an ingredient, held or not.
    pub async fn simulate_trade(
        &self,
        ingredient: &str,
        quantity: i64,
        entry_price: f64,
        exit_price: f64,
    ) -> Result<TradeOutcome> {
        let _: Ingredient = ingredient.parse()?;
        if quantity <= 0 {
            return Err(LedgerError::InvalidInput(format!(
                "quantity must be a positive integer, got {quantity}"
            )));
        }
        validate_price("entry price", entry_price)?;
        validate_price("exit price", exit_price)?;

        let fee = current_fee(self.db.trader_count().await?);
        Ok(TradeOutcome::compute(entry_price, exit_price, quantity, fee))
    }

    /// Shared validation and arithmetic for close and simulate_close.
    async fn prepare_close(
        &self,
        key: PositionKey,
        exit_price: f64,
        sell: SellQuantity,
        comment: Option<&str>,
    ) -> Result<(CloseOutcome, CloseRecord)> {
        validate_price("exit price", exit_price)?;

        let position = self.resolve(key).await?;
        let quantity_sold = sell.resolve(position.quantity)?;

        let fee = current_fee(self.db.trader_count().await?);
        let outcome = TradeOutcome::compute(position.entry_price, exit_price, quantity_sold, fee);

        let remaining = position.quantity - quantity_sold;
        let result = CloseOutcome {
            position_id: position.id,
            ingredient: position.ingredient,
            quantity_sold,
            remaining_quantity: remaining,
            position_closed: remaining == 0,
            outcome,
        };
        let record = CloseRecord {
            exit_price,
            net_pl: outcome.net_pl,
            fee_percentage: outcome.fee_percentage,
            fee_amount: outcome.fee_amount,
            comment: truncate_comment(comment),
        };

        Ok((result, record))
    }

    /// Resolve a lookup key to an open position.
    async fn resolve(&self, key: PositionKey) -> Result<Position> {
        match key {
            PositionKey::ById(id) => match self.db.get_position(id).await? {
                Some(position) if position.is_open() => Ok(position),
                Some(_) => Err(LedgerError::AlreadyClosed(id)),
                None => Err(LedgerError::NotFound(key.to_string())),
            },
            PositionKey::ByIngredient(ing) => self
                .db
                .find_open_by_ingredient(ing.code())
                .await?
                .ok_or_else(|| LedgerError::NotFound(key.to_string())),
        }
    }

    /// Update the trader count driving the fee policy.
    pub async fn set_trader_count(&self, count: i64) -> Result<f64> {
        if count < 0 {
            return Err(LedgerError::InvalidInput(format!(
                "trader count cannot be negative, got {count}"
            )));
        }

        self.db.set_trader_count(count).await?;
        let fee = current_fee(count);
        info!(count, fee, "trader count updated");

        Ok(fee)
    }

    /// Current fee percentage from the live trader count.
    pub async fn current_fee(&self) -> Result<f64> {
        Ok(current_fee(self.db.trader_count().await?))
    }

    /// Dashboard projection over config, positions, and history.
    pub async fn summary(&self) -> Result<DashboardSummary> {
        let trader_count = self.db.trader_count().await?;

        Ok(DashboardSummary {
            trader_count,
            current_fee: current_fee(trader_count),
            open_positions: self.db.open_position_count().await?,
            total_profit_loss: self.db.total_profit_loss().await?,
            total_trades: self.db.total_trades().await?,
        })
    }

    pub async fn open_positions(&self) -> Result<Vec<Position>> {
        self.db.open_positions().await
    }

    pub async fn trading_history(&self) -> Result<Vec<TradeRecord>> {
        self.db.trading_history().await
    }

    pub async fn portfolio(&self) -> Result<Vec<Holding>> {
        self.db.portfolio().await
    }
}

fn validate_price(what: &str, price: f64) -> Result<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(LedgerError::InvalidInput(format!(
            "{what} must be a non-negative number, got {price}"
        )));
    }
    Ok(())
}

fn truncate_comment(comment: Option<&str>) -> Option<String> {
    let comment = comment?.trim();
    if comment.is_empty() {
        return None;
    }
    Some(comment.chars().take(MAX_COMMENT_LENGTH).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_ledger() -> Ledger {
        Ledger::new(Database::new("sqlite::memory:").await.unwrap())
    }

    fn close_to(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-6, "{a} != {b}");
    }

    #[tokio::test]
    async fn test_open_validates_inputs() {
        let ledger = test_ledger().await;

        assert!(matches!(
            ledger.open("FLOUR", 10, 1.0, None).await,
            Err(LedgerError::InvalidIngredient(_))
        ));
        assert!(matches!(
            ledger.open("BTR", 0, 1.0, None).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert!(matches!(
            ledger.open("BTR", 10, -1.0, None).await,
            Err(LedgerError::InvalidInput(_))
        ));
        assert_eq!(ledger.summary().await.unwrap().open_positions, 0);
    }

    #[tokio::test]
    async fn test_full_close_at_base_fee() {
        let ledger = test_ledger().await;
        let pos = ledger.open("BTR", 100, 575.21, None).await.unwrap();

        let result = ledger
            .close(PositionKey::ById(pos.id), 600.00, SellQuantity::Exact(100), None)
            .await
            .unwrap();

        close_to(result.outcome.gross_pl, 2479.00);
        close_to(result.outcome.fee_percentage, 20.0);
        close_to(result.outcome.fee_amount, 495.80);
        close_to(result.outcome.net_pl, 1983.20);
        assert!(result.position_closed);
        assert_eq!(result.remaining_quantity, 0);

        let summary = ledger.summary().await.unwrap();
        assert_eq!(summary.open_positions, 0);
        assert_eq!(summary.total_trades, 1);
        close_to(summary.total_profit_loss, 1983.20);
    }

    #[tokio::test]
    async fn test_fee_is_read_live_at_close() {
        let ledger = test_ledger().await;
        let pos = ledger.open("BTR", 100, 575.21, None).await.unwrap();

        // Fee changes after the position was opened; the close must see it.
        ledger.set_trader_count(5).await.unwrap();

        let result = ledger
            .close(PositionKey::ById(pos.id), 600.00, SellQuantity::All, None)
            .await
            .unwrap();

        close_to(result.outcome.fee_percentage, 15.0);
        close_to(result.outcome.fee_amount, 371.85);
        close_to(result.outcome.net_pl, 2107.15);
    }

    #[tokio::test]
    async fn test_partial_close_conserves_quantity_and_pl() {
        let ledger = test_ledger().await;
        let pos = ledger.open("CHC", 100, 10.0, None).await.unwrap();

        let first = ledger
            .close(PositionKey::ById(pos.id), 12.0, SellQuantity::Exact(40), None)
            .await
            .unwrap();
        assert!(!first.position_closed);
        assert_eq!(first.remaining_quantity, 60);

        let open = ledger.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].quantity, 60);
        assert!(open[0].is_open());

        let second = ledger
            .close(PositionKey::ById(pos.id), 12.0, SellQuantity::Exact(60), None)
            .await
            .unwrap();
        assert!(second.position_closed);

        let history = ledger.trading_history().await.unwrap();
        assert_eq!(history.len(), 2);

        let full = TradeOutcome::compute(10.0, 12.0, 100, 20.0);
        close_to(first.outcome.net_pl + second.outcome.net_pl, full.net_pl);
        close_to(
            ledger.summary().await.unwrap().total_profit_loss,
            full.net_pl,
        );
    }

    #[tokio::test]
    async fn test_sell_quantity_sentinel_closes_fully() {
        let ledger = test_ledger().await;
        let pos = ledger.open("SEL", 60, 3.0, None).await.unwrap();

        let sell: SellQuantity = "MAX".parse().unwrap();
        let result = ledger
            .close(PositionKey::ById(pos.id), 4.0, sell, None)
            .await
            .unwrap();

        assert_eq!(result.quantity_sold, 60);
        assert!(result.position_closed);
    }

    #[tokio::test]
    async fn test_sell_quantity_bounds() {
        let ledger = test_ledger().await;
        let pos = ledger.open("NOI", 10, 1.0, None).await.unwrap();

        for bad in [0, -5, 11] {
            let err = ledger
                .close(PositionKey::ById(pos.id), 2.0, SellQuantity::Exact(bad), None)
                .await
                .unwrap_err();
            assert!(matches!(
                err,
                LedgerError::InvalidQuantity {
                    requested,
                    available: 10,
                } if requested == bad
            ));
        }

        // Failed closes must not have touched the store.
        assert_eq!(ledger.trading_history().await.unwrap().len(), 0);
        assert_eq!(ledger.open_positions().await.unwrap()[0].quantity, 10);
    }

    #[tokio::test]
    async fn test_close_by_ingredient_resolves_open_holding() {
        let ledger = test_ledger().await;
        ledger.open("VNL", 25, 8.0, None).await.unwrap();

        let key: PositionKey = "vnl".parse().unwrap();
        let result = ledger
            .close(key, 9.0, SellQuantity::All, Some("sold the lot"))
            .await
            .unwrap();

        assert_eq!(result.ingredient, "VNL");
        assert_eq!(result.quantity_sold, 25);

        let history = ledger.trading_history().await.unwrap();
        assert_eq!(history[0].comment.as_deref(), Some("sold the lot"));
    }

    #[tokio::test]
    async fn test_close_missing_and_already_closed() {
        let ledger = test_ledger().await;

        let err = ledger
            .close(PositionKey::ById(999), 1.0, SellQuantity::All, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let err = ledger
            .close(PositionKey::ByIngredient(Ingredient::Suc), 1.0, SellQuantity::All, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let pos = ledger.open("SUC", 5, 1.0, None).await.unwrap();
        ledger
            .close(PositionKey::ById(pos.id), 2.0, SellQuantity::All, None)
            .await
            .unwrap();

        let err = ledger
            .close(PositionKey::ById(pos.id), 2.0, SellQuantity::All, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AlreadyClosed(id) if id == pos.id));
        assert_eq!(ledger.trading_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_simulate_close_writes_nothing() {
        let ledger = test_ledger().await;
        let pos = ledger.open("CRL", 50, 2.0, None).await.unwrap();

        let before_positions = ledger.open_positions().await.unwrap();
        let before_history = ledger.trading_history().await.unwrap();

        let sim = ledger
            .simulate_close(PositionKey::ById(pos.id), 3.0, SellQuantity::Exact(20))
            .await
            .unwrap();

        let real = ledger
            .close(PositionKey::ById(pos.id), 3.0, SellQuantity::Exact(20), None)
            .await
            .unwrap();
        close_to(sim.outcome.gross_pl, real.outcome.gross_pl);
        close_to(sim.outcome.fee_amount, real.outcome.fee_amount);
        close_to(sim.outcome.net_pl, real.outcome.net_pl);

        // The simulation itself changed nothing; only the real close did.
        let after = ledger.open_positions().await.unwrap();
        assert_eq!(before_positions[0].quantity, 50);
        assert_eq!(after[0].quantity, 30);
        assert!(before_history.is_empty());
        assert_eq!(ledger.trading_history().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_simulate_close_validates_like_close() {
        let ledger = test_ledger().await;

        let err = ledger
            .simulate_close(PositionKey::ById(42), 1.0, SellQuantity::All)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));

        let pos = ledger.open("OEUF", 10, 1.0, None).await.unwrap();
        let err = ledger
            .simulate_close(PositionKey::ById(pos.id), 1.0, SellQuantity::Exact(11))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidQuantity { .. }));
    }

    #[tokio::test]
    async fn test_simulate_trade_is_pure() {
        let ledger = test_ledger().await;
        ledger.set_trader_count(10).await.unwrap();

        let out = ledger.simulate_trade("BTR", 100, 575.21, 600.00).await.unwrap();
        close_to(out.fee_percentage, 10.0);
        close_to(out.gross_pl, 2479.00);

        assert!(matches!(
            ledger.simulate_trade("NOPE", 1, 1.0, 2.0).await,
            Err(LedgerError::InvalidIngredient(_))
        ));
        assert_eq!(ledger.summary().await.unwrap().open_positions, 0);
    }

    #[tokio::test]
    async fn test_set_trader_count_rejects_negative() {
        let ledger = test_ledger().await;

        assert!(matches!(
            ledger.set_trader_count(-1).await,
            Err(LedgerError::InvalidInput(_))
        ));
        close_to(ledger.current_fee().await.unwrap(), 20.0);

        let fee = ledger.set_trader_count(8).await.unwrap();
        close_to(fee, 12.0);
        close_to(ledger.current_fee().await.unwrap(), 12.0);
    }

    #[tokio::test]
    async fn test_opening_twice_blends_into_portfolio() {
        let ledger = test_ledger().await;
        ledger.open("BTR", 100, 0.50, None).await.unwrap();
        ledger.open("BTR", 100, 0.60, None).await.unwrap();

        let holdings = ledger.portfolio().await.unwrap();
        assert_eq!(holdings.len(), 1);
        assert_eq!(holdings[0].quantity, 200);
        close_to(holdings[0].average_price, 0.55);

        // The grouped resync and the incrementally maintained row agree.
        let open = ledger.open_positions().await.unwrap();
        assert_eq!(open.len(), 1);
        close_to(open[0].entry_price, holdings[0].average_price);
    }

    #[tokio::test]
    async fn test_comment_truncated_to_cap() {
        let ledger = test_ledger().await;
        let long = "x".repeat(MAX_COMMENT_LENGTH + 100);

        let pos = ledger.open("CHC", 1, 1.0, Some(&long)).await.unwrap();
        assert_eq!(pos.comment.unwrap().chars().count(), MAX_COMMENT_LENGTH);

        ledger
            .close(PositionKey::ById(pos.id), 2.0, SellQuantity::All, Some(&long))
            .await
            .unwrap();
        let history = ledger.trading_history().await.unwrap();
        assert_eq!(
            history[0].comment.as_deref().unwrap().chars().count(),
            MAX_COMMENT_LENGTH
        );
    }

    #[test]
    fn test_position_key_parsing() {
        assert_eq!("17".parse::<PositionKey>().unwrap(), PositionKey::ById(17));
        assert_eq!(
            "btr".parse::<PositionKey>().unwrap(),
            PositionKey::ByIngredient(Ingredient::Btr)
        );
        assert!("???".parse::<PositionKey>().is_err());
    }

    #[test]
    fn test_sell_quantity_parsing() {
        assert_eq!("all".parse::<SellQuantity>().unwrap(), SellQuantity::All);
        assert_eq!("Max".parse::<SellQuantity>().unwrap(), SellQuantity::All);
        assert_eq!(
            "42".parse::<SellQuantity>().unwrap(),
            SellQuantity::Exact(42)
        );
        assert!("most".parse::<SellQuantity>().is_err());
    }
}
