//! Weekly release proposals and execution

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use rust_decimal::Decimal;

use super::buffers::read_buffer;
use super::{
    date_col, datetime_col, format_date, format_datetime, money_col, opt_datetime_col, Database,
};
use crate::error::{Error, Result};
use crate::models::WeeklyRelease;

const RELEASE_COLUMNS: &str = "id, user_id, week_start, recommended_amount, actual_released, \
     buffer_before, buffer_after, released, released_at, created_at";

impl Database {
    /// Insert a proposal for (user, week) unless one already exists
    ///
    /// Relies on `UNIQUE(user_id, week_start)`: the insert is a no-op on
    /// conflict and the surviving row is read back. Returns the row and
    /// whether this call created it.
    pub fn insert_release_if_absent(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        recommended: Decimal,
        balance: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(WeeklyRelease, bool)> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO weekly_releases (
                user_id, week_start, recommended_amount, actual_released,
                buffer_before, buffer_after, released, created_at
            ) VALUES (?, ?, ?, '0', ?, ?, 0, ?)
            ON CONFLICT(user_id, week_start) DO NOTHING
            "#,
            params![
                user_id,
                format_date(&week_start),
                recommended.to_string(),
                balance.to_string(),
                balance.to_string(),
                format_datetime(&now),
            ],
        )?;

        let release = conn
            .query_row(
                &format!(
                    "SELECT {} FROM weekly_releases WHERE user_id = ? AND week_start = ?",
                    RELEASE_COLUMNS
                ),
                params![user_id, format_date(&week_start)],
                row_to_release,
            )
            .optional()?
            .ok_or_else(|| {
                Error::NotFound(format!("release for user {} week {}", user_id, week_start))
            })?;

        Ok((release, inserted > 0))
    }

    pub fn get_release(&self, user_id: &str, release_id: i64) -> Result<Option<WeeklyRelease>> {
        let conn = self.conn()?;
        Ok(read_release(&conn, user_id, release_id)?)
    }

    /// Release history, newest week first
    pub fn list_releases(&self, user_id: &str, limit: usize) -> Result<Vec<WeeklyRelease>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}
            FROM weekly_releases
            WHERE user_id = ?
            ORDER BY week_start DESC
            LIMIT ?
            "#,
            RELEASE_COLUMNS
        ))?;

        let rows = stmt.query_map(params![user_id, limit as i64], row_to_release)?;
        let releases: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(releases?)
    }

    /// Execute a proposed release exactly once
    ///
    /// Clamps the payout to the available balance, debits the buffer and
    /// stamps both rows in one `BEGIN IMMEDIATE` transaction. A release that
    /// is already executed is rejected and nothing is written.
    pub fn execute_release(
        &self,
        user_id: &str,
        release_id: i64,
        now: DateTime<Utc>,
    ) -> Result<WeeklyRelease> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut release = read_release(&tx, user_id, release_id)?.ok_or_else(|| {
            Error::NotFound(format!("release {} for user {}", release_id, user_id))
        })?;

        if release.released {
            return Err(Error::InvalidStateTransition(format!(
                "release {} was already executed",
                release_id
            )));
        }

        let mut buffer = read_buffer(&tx, user_id)?
            .ok_or_else(|| Error::NotFound(format!("buffer for user {}", user_id)))?;

        let actual = release.recommended_amount.min(buffer.balance).max(Decimal::ZERO);

        buffer.balance -= actual;
        buffer.total_released += actual;

        tx.execute(
            r#"
            UPDATE smoothing_buffers
            SET balance = ?, total_released = ?, last_release_at = ?, updated_at = ?
            WHERE user_id = ?
            "#,
            params![
                buffer.balance.to_string(),
                buffer.total_released.to_string(),
                format_datetime(&now),
                format_datetime(&now),
                user_id
            ],
        )?;

        release.actual_released = actual;
        release.buffer_after = buffer.balance;
        release.released = true;
        release.released_at = Some(now);

        tx.execute(
            r#"
            UPDATE weekly_releases
            SET actual_released = ?, buffer_after = ?, released = 1, released_at = ?
            WHERE id = ? AND user_id = ? AND released = 0
            "#,
            params![
                actual.to_string(),
                buffer.balance.to_string(),
                format_datetime(&now),
                release_id,
                user_id
            ],
        )?;
        tx.commit()?;

        Ok(release)
    }

    /// Number of executed releases with `week_start >= since`
    pub fn count_executed_releases_since(&self, user_id: &str, since: NaiveDate) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            r#"
            SELECT COUNT(*) FROM weekly_releases
            WHERE user_id = ? AND released = 1 AND week_start >= ?
            "#,
            params![user_id, format_date(&since)],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn read_release(
    conn: &Connection,
    user_id: &str,
    release_id: i64,
) -> rusqlite::Result<Option<WeeklyRelease>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM weekly_releases WHERE id = ? AND user_id = ?",
            RELEASE_COLUMNS
        ),
        params![release_id, user_id],
        row_to_release,
    )
    .optional()
}

fn row_to_release(row: &rusqlite::Row) -> rusqlite::Result<WeeklyRelease> {
    Ok(WeeklyRelease {
        id: row.get(0)?,
        user_id: row.get(1)?,
        week_start: date_col(row, 2)?,
        recommended_amount: money_col(row, 3)?,
        actual_released: money_col(row, 4)?,
        buffer_before: money_col(row, 5)?,
        buffer_after: money_col(row, 6)?,
        released: row.get(7)?,
        released_at: opt_datetime_col(row, 8)?,
        created_at: datetime_col(row, 9)?,
    })
}
