//! SQLite persistence for all durable ledger state.
//!
//! Three tables back the whole system:
//! - `traders`: singleton row driving the fee policy
//! - `positions`: open and closed holdings, one open row per ingredient
//! - `trading_history`: append-only record of every close
//!
//! Every mutating operation runs in a single transaction so a failed close
//! or open leaves no partial write behind.

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::Result;
use crate::models::{blend_entry_price, Holding, Position, TradeRecord, STATUS_CLOSED, STATUS_OPEN};

/// Values recorded into `trading_history` by a close.
#[derive(Debug, Clone)]
pub struct CloseRecord {
    pub exit_price: f64,
    pub net_pl: f64,
    pub fee_percentage: f64,
    pub fee_amount: f64,
    pub comment: Option<String>,
}

/// Database connection pool and schema management.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and create the schema if it does not exist yet.
    ///
    /// The pool is capped at one connection: the ledger is single-user and
    /// this keeps in-memory databases coherent across queries.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS traders (
                count INTEGER NOT NULL DEFAULT 0,
                last_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ingredient TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                entry_price REAL NOT NULL,
                entry_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                last_updated TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                status TEXT NOT NULL DEFAULT 'open',
                comment TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trading_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                position_id INTEGER,
                exit_price REAL NOT NULL,
                profit_loss REAL NOT NULL,
                fee_percentage REAL NOT NULL,
                fee_amount REAL NOT NULL,
                exit_date TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                comment TEXT,
                FOREIGN KEY (position_id) REFERENCES positions (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_exit_date ON trading_history(exit_date)")
            .execute(&self.pool)
            .await?;

        // Seed the singleton traders row on first startup.
        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM traders")
            .fetch_one(&self.pool)
            .await?;
        if existing == 0 {
            sqlx::query("INSERT INTO traders (count) VALUES (0)")
                .execute(&self.pool)
                .await?;
        }

        Ok(())
    }

    // ==================== Traders ====================

    /// Current trader count from the singleton row.
    pub async fn trader_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT count FROM traders LIMIT 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Persist a new trader count.
    pub async fn set_trader_count(&self, count: i64) -> Result<()> {
        sqlx::query("UPDATE traders SET count = ?, last_updated = datetime('now')")
            .bind(count)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Positions ====================

    /// Fetch a position by id regardless of status.
    pub async fn get_position(&self, id: i64) -> Result<Option<Position>> {
        let position = sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(position)
    }

    /// Fetch the open holding for an ingredient, if any.
    pub async fn find_open_by_ingredient(&self, ingredient: &str) -> Result<Option<Position>> {
        let position = sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE ingredient = ? AND status = ?",
        )
        .bind(ingredient)
        .bind(STATUS_OPEN)
        .fetch_optional(&self.pool)
        .await?;

        Ok(position)
    }

    /// All open positions, most recent entry first.
    pub async fn open_positions(&self) -> Result<Vec<Position>> {
        let positions = sqlx::query_as::<_, Position>(
            "SELECT * FROM positions WHERE status = ? ORDER BY entry_date DESC, id DESC",
        )
        .bind(STATUS_OPEN)
        .fetch_all(&self.pool)
        .await?;

        Ok(positions)
    }

    pub async fn open_position_count(&self) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM positions WHERE status = ?")
                .bind(STATUS_OPEN)
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Insert a new open position, or blend into the existing open holding
    /// for the ingredient with a weighted-average entry price.
    pub async fn upsert_position(
        &self,
        ingredient: &str,
        quantity: i64,
        entry_price: f64,
        comment: Option<&str>,
    ) -> Result<Position> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<(i64, i64, f64)> = sqlx::query_as(
            "SELECT id, quantity, entry_price FROM positions WHERE ingredient = ? AND status = ?",
        )
        .bind(ingredient)
        .bind(STATUS_OPEN)
        .fetch_optional(&mut *tx)
        .await?;

        let id = match existing {
            Some((id, old_qty, old_avg)) => {
                let blended = blend_entry_price(old_avg, old_qty, entry_price, quantity);
                sqlx::query(
                    r#"
                    UPDATE positions SET
                        quantity = quantity + ?,
                        entry_price = ?,
                        comment = COALESCE(?, comment),
                        last_updated = datetime('now')
                    WHERE id = ?
                    "#,
                )
                .bind(quantity)
                .bind(blended)
                .bind(comment)
                .bind(id)
                .execute(&mut *tx)
                .await?;

                id
            }
            None => {
                let row: (i64,) = sqlx::query_as(
                    r#"
                    INSERT INTO positions (ingredient, quantity, entry_price, comment)
                    VALUES (?, ?, ?, ?)
                    RETURNING id
                    "#,
                )
                .bind(ingredient)
                .bind(quantity)
                .bind(entry_price)
                .bind(comment)
                .fetch_one(&mut *tx)
                .await?;

                row.0
            }
        };

        let position = sqlx::query_as::<_, Position>("SELECT * FROM positions WHERE id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        debug!(id, ingredient, quantity, "position persisted");

        Ok(position)
    }

    /// Apply a close atomically: decrement (or close out) the position and
    /// append exactly one history entry. Either both writes land or neither.
    pub async fn apply_close(
        &self,
        position_id: i64,
        sell_quantity: i64,
        close_out: bool,
        record: &CloseRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        if close_out {
            sqlx::query(
                r#"
                UPDATE positions SET
                    quantity = quantity - ?,
                    status = ?,
                    last_updated = datetime('now')
                WHERE id = ?
                "#,
            )
            .bind(sell_quantity)
            .bind(STATUS_CLOSED)
            .bind(position_id)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                r#"
                UPDATE positions SET
                    quantity = quantity - ?,
                    last_updated = datetime('now')
                WHERE id = ?
                "#,
            )
            .bind(sell_quantity)
            .bind(position_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO trading_history
                (position_id, exit_price, profit_loss, fee_percentage, fee_amount, comment)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position_id)
        .bind(record.exit_price)
        .bind(record.net_pl)
        .bind(record.fee_percentage)
        .bind(record.fee_amount)
        .bind(record.comment.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(position_id, sell_quantity, close_out, "close applied");

        Ok(())
    }

    // ==================== Trade history ====================

    /// Full trading history joined with the closed positions, most recent
    /// exit first.
    pub async fn trading_history(&self) -> Result<Vec<TradeRecord>> {
        let trades = sqlx::query_as::<_, TradeRecord>(
            r#"
            SELECT
                th.id,
                th.position_id,
                p.ingredient,
                p.entry_price,
                th.exit_price,
                th.profit_loss,
                th.fee_percentage,
                th.fee_amount,
                th.exit_date,
                th.comment
            FROM trading_history th
            JOIN positions p ON th.position_id = p.id
            ORDER BY th.exit_date DESC, th.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(trades)
    }

    /// Sum of net P/L over all recorded trades, 0 when empty.
    pub async fn total_profit_loss(&self) -> Result<f64> {
        let (total,): (f64,) =
            sqlx::query_as("SELECT COALESCE(SUM(profit_loss), 0.0) FROM trading_history")
                .fetch_one(&self.pool)
                .await?;

        Ok(total)
    }

    pub async fn total_trades(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM trading_history")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // ==================== Portfolio ====================

    /// Per-ingredient holdings derived from open positions. This is the
    /// resync ground truth; incremental maintenance happens through the
    /// blend in [`Database::upsert_position`].
    pub async fn portfolio(&self) -> Result<Vec<Holding>> {
        let holdings = sqlx::query_as::<_, Holding>(
            r#"
            SELECT
                ingredient,
                SUM(quantity) AS quantity,
                SUM(quantity * entry_price) / SUM(quantity) AS average_price
            FROM positions
            WHERE status = ?
            GROUP BY ingredient
            ORDER BY ingredient
            "#,
        )
        .bind(STATUS_OPEN)
        .fetch_all(&self.pool)
        .await?;

        Ok(holdings)
    }
}
