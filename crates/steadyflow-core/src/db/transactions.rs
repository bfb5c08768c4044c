//! Transaction store operations

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use super::{datetime_col, enum_col, format_datetime, money_col, Database};
use crate::error::{Error, Result};
use crate::money;
use crate::models::{Direction, IncomeTotals, NewTransaction, Transaction, TransactionCorrection};

const TRANSACTION_COLUMNS: &str = "id, user_id, account_id, timestamp, amount, direction, \
     balance_after, description, category, is_income";

impl Database {
    /// Insert a transaction
    ///
    /// Rejects non-positive amounts and records whose `is_income` flag
    /// disagrees with their direction.
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        validate_transaction(tx.amount, tx.direction, tx.is_income)?;

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO transactions (user_id, account_id, timestamp, amount, direction,
                                      balance_after, description, category, is_income)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                tx.user_id,
                tx.account_id,
                format_datetime(&tx.timestamp),
                tx.amount.to_string(),
                tx.direction.as_str(),
                tx.balance_after.to_string(),
                tx.description,
                tx.category.as_str(),
                tx.is_income,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert many transactions in one database transaction
    pub fn insert_transactions(&self, txs: &[NewTransaction]) -> Result<usize> {
        for tx in txs {
            validate_transaction(tx.amount, tx.direction, tx.is_income)?;
        }

        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;
        {
            let mut stmt = db_tx.prepare(
                r#"
                INSERT INTO transactions (user_id, account_id, timestamp, amount, direction,
                                          balance_after, description, category, is_income)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for tx in txs {
                stmt.execute(params![
                    tx.user_id,
                    tx.account_id,
                    format_datetime(&tx.timestamp),
                    tx.amount.to_string(),
                    tx.direction.as_str(),
                    tx.balance_after.to_string(),
                    tx.description,
                    tx.category.as_str(),
                    tx.is_income,
                ])?;
            }
        }
        db_tx.commit()?;

        Ok(txs.len())
    }

    /// Get a single transaction owned by `user_id`
    pub fn get_transaction(&self, user_id: &str, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE id = ? AND user_id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![id, user_id],
                row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    /// All transactions for a user at or after `cutoff`, oldest first
    pub fn list_transactions_since(
        &self,
        user_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {}
            FROM transactions
            WHERE user_id = ? AND timestamp >= ?
            ORDER BY timestamp ASC, id ASC
            "#,
            TRANSACTION_COLUMNS
        ))?;

        let rows = stmt.query_map(
            params![user_id, format_datetime(&cutoff)],
            row_to_transaction,
        )?;
        let txs: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(txs?)
    }

    /// Count and sum a user's transactions on one side of the ledger
    ///
    /// The sum is aggregated in SQLite and rounded back to cents.
    pub fn income_totals(&self, user_id: &str, is_income: bool) -> Result<IncomeTotals> {
        let conn = self.conn()?;
        let (count, total): (i64, f64) = conn.query_row(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CAST(amount AS REAL)), 0)
            FROM transactions
            WHERE user_id = ? AND is_income = ?
            "#,
            params![user_id, is_income],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(IncomeTotals {
            count,
            total: money::from_f64(total),
        })
    }

    /// Apply an explicit correction; `NotFound` if the user has no such row
    pub fn correct_transaction(
        &self,
        user_id: &str,
        id: i64,
        correction: &TransactionCorrection,
    ) -> Result<Transaction> {
        let mut conn = self.conn()?;
        let db_tx = conn.transaction()?;

        let existing = db_tx
            .query_row(
                &format!(
                    "SELECT {} FROM transactions WHERE id = ? AND user_id = ?",
                    TRANSACTION_COLUMNS
                ),
                params![id, user_id],
                row_to_transaction,
            )
            .optional()?
            .ok_or_else(|| Error::NotFound(format!("transaction {} for user {}", id, user_id)))?;

        let amount = correction.amount.unwrap_or(existing.amount);
        let category = correction.category.unwrap_or(existing.category);
        let description = correction
            .description
            .clone()
            .unwrap_or_else(|| existing.description.clone());
        // A category change may move the row across the income/expense divide
        let (direction, is_income) = match correction.category {
            Some(c) if c.is_income() => (Direction::Credit, true),
            Some(_) => (Direction::Debit, false),
            None => (existing.direction, existing.is_income),
        };
        validate_transaction(amount, direction, is_income)?;

        db_tx.execute(
            r#"
            UPDATE transactions
            SET amount = ?, category = ?, description = ?, direction = ?, is_income = ?
            WHERE id = ? AND user_id = ?
            "#,
            params![
                amount.to_string(),
                category.as_str(),
                description,
                direction.as_str(),
                is_income,
                id,
                user_id
            ],
        )?;
        db_tx.commit()?;

        Ok(Transaction {
            amount,
            category,
            description,
            direction,
            is_income,
            ..existing
        })
    }

    /// Delete a transaction on explicit user request
    pub fn delete_transaction(&self, user_id: &str, id: i64) -> Result<()> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM transactions WHERE id = ? AND user_id = ?",
            params![id, user_id],
        )?;
        if deleted == 0 {
            return Err(Error::NotFound(format!(
                "transaction {} for user {}",
                id, user_id
            )));
        }
        Ok(())
    }
}

fn validate_transaction(amount: Decimal, direction: Direction, is_income: bool) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(Error::InvalidData(format!(
            "transaction amount must be positive, got {}",
            amount
        )));
    }
    if is_income != (direction == Direction::Credit) {
        return Err(Error::InvalidData(format!(
            "is_income={} disagrees with direction {}",
            is_income, direction
        )));
    }
    Ok(())
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        account_id: row.get(2)?,
        timestamp: datetime_col(row, 3)?,
        amount: money_col(row, 4)?,
        direction: enum_col(row, 5)?,
        balance_after: money_col(row, 6)?,
        description: row.get(7)?,
        category: enum_col(row, 8)?,
        is_income: row.get(9)?,
    })
}
