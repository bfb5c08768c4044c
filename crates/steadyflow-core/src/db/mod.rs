//! Database access layer with connection pooling and migrations
//!
//! This module is organized by domain:
//! - `transactions` - Transaction store (ingest, correction, window queries)
//! - `features` - Weekly feature upserts and history
//! - `income_sources` - Atomic replace of per-category income rollups
//! - `predictions` - Append-only forecast log
//! - `buffers` - Smoothing buffer state and serialized mutations
//! - `releases` - Weekly release proposals and execution
//! - `insights` - Insight rows and read/dismiss flags
//! - `profiles` - Fixed-expense baseline per user

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::Result;

mod buffers;
mod features;
mod income_sources;
mod insights;
mod predictions;
mod profiles;
mod releases;
mod transactions;

pub use insights::InsightFilter;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// How long a writer waits on a locked database before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a timestamp the way SQLite stores it ("YYYY-MM-DD HH:MM:SS")
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn format_date(date: &NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into())
}

/// Read a decimal money column stored as TEXT
pub(crate) fn money_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw).map_err(|e| conversion_error(idx, e))
}

pub(crate) fn datetime_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    chrono::NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT)
        .map(|dt| dt.and_utc())
        .map_err(|e| conversion_error(idx, e))
}

pub(crate) fn opt_datetime_col(
    row: &rusqlite::Row,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => chrono::NaiveDateTime::parse_from_str(&s, DATETIME_FORMAT)
            .map(|dt| Some(dt.and_utc()))
            .map_err(|e| conversion_error(idx, e)),
        None => Ok(None),
    }
}

pub(crate) fn date_col(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

/// Read a closed-enumeration column through its `FromStr` impl
pub(crate) fn enum_col<T>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e: String| conversion_error(idx, e))
}

/// Database wrapper with connection pooling
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
    /// Path to the database file
    db_path: String,
}

impl Database {
    /// Open (or create) a database file and ensure the schema exists
    pub fn new(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = Pool::builder().max_size(10).build(manager)?;

        let db = Self {
            pool,
            db_path: path.to_string(),
        };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get the path to the database file
    pub fn path(&self) -> &str {
        &self.db_path
    }

    /// Create a throwaway database (for testing)
    ///
    /// Note: Uses a temporary file rather than `:memory:` because each pooled
    /// connection to `:memory:` would see its own empty database.
    pub fn in_memory() -> Result<Self> {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        let path = std::env::temp_dir().join(format!(
            "steadyflow_test_{}_{}.db",
            std::process::id(),
            id
        ));
        let path = path.to_string_lossy().to_string();

        // Remove any leftovers from a previous run
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path, suffix));
        }

        Self::new(&path)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<DbConn> {
        Ok(self.pool.get()?)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            -- WAL mode: readers don't block the single writer
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;

            -- Money columns are decimal TEXT; timestamps are UTC "YYYY-MM-DD HH:MM:SS"

            CREATE TABLE IF NOT EXISTS transactions (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                timestamp DATETIME NOT NULL,
                amount TEXT NOT NULL,
                direction TEXT NOT NULL CHECK (direction IN ('credit', 'debit')),
                balance_after TEXT NOT NULL DEFAULT '0',
                description TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                is_income INTEGER NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE INDEX IF NOT EXISTS idx_transactions_user_time ON transactions(user_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_transactions_user_income ON transactions(user_id, is_income);

            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id TEXT PRIMARY KEY,
                monthly_fixed_expenses TEXT NOT NULL DEFAULT '0',
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weekly_features (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                week_start DATE NOT NULL,
                total_income TEXT NOT NULL,
                total_expense TEXT NOT NULL,
                net_cashflow TEXT NOT NULL,
                avg_daily_income TEXT NOT NULL,
                income_std TEXT NOT NULL,
                income_volatility_ratio REAL NOT NULL,
                days_with_income INTEGER NOT NULL,
                days_without_income INTEGER NOT NULL,
                income_source_count INTEGER NOT NULL,
                top_source_pct REAL NOT NULL,
                avg_daily_expense TEXT NOT NULL,
                expense_std TEXT NOT NULL,
                updated_at DATETIME NOT NULL,
                UNIQUE(user_id, week_start)
            );

            CREATE TABLE IF NOT EXISTS income_sources (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                category TEXT NOT NULL,
                total_amount TEXT NOT NULL,
                avg_monthly_amount TEXT NOT NULL,
                payment_count INTEGER NOT NULL,
                contribution_pct REAL NOT NULL,
                stability_score REAL NOT NULL,
                last_payment_at DATETIME NOT NULL,
                computed_at DATETIME NOT NULL,
                UNIQUE(user_id, category)
            );

            CREATE TABLE IF NOT EXISTS cashflow_predictions (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                horizon_days INTEGER NOT NULL,
                expected_inflow TEXT NOT NULL,
                expected_outflow TEXT NOT NULL,
                net_cashflow TEXT NOT NULL,
                lower_bound TEXT NOT NULL,
                upper_bound TEXT NOT NULL,
                risk_level TEXT NOT NULL,
                model_used TEXT NOT NULL,
                confidence REAL NOT NULL,
                created_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_predictions_user ON cashflow_predictions(user_id, created_at);

            CREATE TABLE IF NOT EXISTS smoothing_buffers (
                user_id TEXT PRIMARY KEY,
                balance TEXT NOT NULL,
                total_deposited TEXT NOT NULL,
                total_released TEXT NOT NULL,
                risk_score REAL NOT NULL,
                min_threshold TEXT NOT NULL,
                max_capacity TEXT NOT NULL,
                last_deposit_at DATETIME,
                last_release_at DATETIME,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS weekly_releases (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                week_start DATE NOT NULL,
                recommended_amount TEXT NOT NULL,
                actual_released TEXT NOT NULL DEFAULT '0',
                buffer_before TEXT NOT NULL,
                buffer_after TEXT NOT NULL,
                released INTEGER NOT NULL DEFAULT 0,
                released_at DATETIME,
                created_at DATETIME NOT NULL,
                UNIQUE(user_id, week_start)
            );

            CREATE TABLE IF NOT EXISTS insights (
                id INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                insight_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                explanation TEXT NOT NULL,
                metrics TEXT NOT NULL DEFAULT '{}',
                is_read INTEGER NOT NULL DEFAULT 0,
                is_dismissed INTEGER NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_insights_user ON insights(user_id, created_at);
            "#,
        )?;

        info!("Database schema initialized");
        Ok(())
    }
}
