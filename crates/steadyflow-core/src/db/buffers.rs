//! Smoothing buffer persistence
//!
//! Every mutation re-reads the row inside a `BEGIN IMMEDIATE` transaction, so
//! two writers for the same user serialize on SQLite's write lock instead of
//! losing an update.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;

use super::{datetime_col, format_datetime, money_col, opt_datetime_col, Database};
use crate::error::{Error, Result};
use crate::models::SmoothingBuffer;
use crate::smoothing::DepositResult;

const BUFFER_COLUMNS: &str = "user_id, balance, total_deposited, total_released, risk_score, \
     min_threshold, max_capacity, last_deposit_at, last_release_at, created_at, updated_at";

impl Database {
    pub fn get_buffer(&self, user_id: &str) -> Result<Option<SmoothingBuffer>> {
        let conn = self.conn()?;
        Ok(read_buffer(&conn, user_id)?)
    }

    /// Insert `buffer` unless the user already has one; returns the stored row
    pub fn create_buffer_if_absent(&self, buffer: &SmoothingBuffer) -> Result<SmoothingBuffer> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO smoothing_buffers (
                user_id, balance, total_deposited, total_released, risk_score,
                min_threshold, max_capacity, last_deposit_at, last_release_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
            params![
                buffer.user_id,
                buffer.balance.to_string(),
                buffer.total_deposited.to_string(),
                buffer.total_released.to_string(),
                buffer.risk_score,
                buffer.min_threshold.to_string(),
                buffer.max_capacity.to_string(),
                buffer.last_deposit_at.as_ref().map(format_datetime),
                buffer.last_release_at.as_ref().map(format_datetime),
                format_datetime(&buffer.created_at),
                format_datetime(&buffer.updated_at),
            ],
        )?;

        read_buffer(&conn, &buffer.user_id)?
            .ok_or_else(|| Error::NotFound(format!("buffer for user {}", buffer.user_id)))
    }

    /// Deposit into a buffer, clamping so the balance never exceeds capacity
    ///
    /// The excess is dropped, not rejected. Compare `accepted` with
    /// `requested` to detect a clamp.
    pub fn deposit_to_buffer(
        &self,
        user_id: &str,
        amount: Decimal,
        now: DateTime<Utc>,
    ) -> Result<DepositResult> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidData(format!(
                "deposit amount cannot be negative, got {}",
                amount
            )));
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut buffer = read_buffer(&tx, user_id)?
            .ok_or_else(|| Error::NotFound(format!("buffer for user {}", user_id)))?;

        let headroom = (buffer.max_capacity - buffer.balance).max(Decimal::ZERO);
        let accepted = amount.min(headroom);

        buffer.balance += accepted;
        buffer.total_deposited += accepted;
        buffer.last_deposit_at = Some(now);
        buffer.updated_at = now;

        tx.execute(
            r#"
            UPDATE smoothing_buffers
            SET balance = ?, total_deposited = ?, last_deposit_at = ?, updated_at = ?
            WHERE user_id = ?
            "#,
            params![
                buffer.balance.to_string(),
                buffer.total_deposited.to_string(),
                format_datetime(&now),
                format_datetime(&now),
                user_id
            ],
        )?;
        tx.commit()?;

        Ok(DepositResult {
            requested: amount,
            accepted,
            buffer,
        })
    }

    /// Persist a recomputed buffer risk score
    pub fn set_buffer_risk_score(
        &self,
        user_id: &str,
        risk_score: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE smoothing_buffers SET risk_score = ?, updated_at = ? WHERE user_id = ?",
            params![risk_score, format_datetime(&now), user_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!("buffer for user {}", user_id)));
        }
        Ok(())
    }
}

pub(super) fn read_buffer(
    conn: &Connection,
    user_id: &str,
) -> rusqlite::Result<Option<SmoothingBuffer>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM smoothing_buffers WHERE user_id = ?",
            BUFFER_COLUMNS
        ),
        params![user_id],
        |row| {
            Ok(SmoothingBuffer {
                user_id: row.get(0)?,
                balance: money_col(row, 1)?,
                total_deposited: money_col(row, 2)?,
                total_released: money_col(row, 3)?,
                risk_score: row.get(4)?,
                min_threshold: money_col(row, 5)?,
                max_capacity: money_col(row, 6)?,
                last_deposit_at: opt_datetime_col(row, 7)?,
                last_release_at: opt_datetime_col(row, 8)?,
                created_at: datetime_col(row, 9)?,
                updated_at: datetime_col(row, 10)?,
            })
        },
    )
    .optional()
}
