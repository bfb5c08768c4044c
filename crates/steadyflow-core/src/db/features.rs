//! Weekly feature persistence

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, TransactionBehavior};
use tracing::debug;

use super::{date_col, format_date, format_datetime, money_col, Database};
use crate::error::Result;
use crate::models::WeeklyFeature;

impl Database {
    /// Upsert a batch of weekly features in one transaction
    ///
    /// Rows are keyed by (user_id, week_start); an existing row has every
    /// field overwritten.
    pub fn upsert_weekly_features(
        &self,
        features: &[WeeklyFeature],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        write_features(&tx, features, &format_datetime(&now))?;
        tx.commit()?;

        Ok(features.len())
    }

    /// Replace a user's weekly features for every week starting on or after `since`
    ///
    /// Weeks in the window that are absent from `features` are deleted, so a
    /// week whose transactions were removed does not keep its old totals.
    pub fn replace_weekly_features(
        &self,
        user_id: &str,
        since: NaiveDate,
        features: &[WeeklyFeature],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let removed = tx.execute(
            "DELETE FROM weekly_features WHERE user_id = ? AND week_start >= ?",
            params![user_id, format_date(&since)],
        )?;
        write_features(&tx, features, &format_datetime(&now))?;
        tx.commit()?;

        debug!(user_id, removed, written = features.len(), "Weekly features replaced");
        Ok(features.len())
    }

    /// The newest `limit` weekly features for a user, newest first
    pub fn list_weekly_features(&self, user_id: &str, limit: usize) -> Result<Vec<WeeklyFeature>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, week_start, total_income, total_expense, net_cashflow,
                   avg_daily_income, income_std, income_volatility_ratio, days_with_income,
                   days_without_income, income_source_count, top_source_pct,
                   avg_daily_expense, expense_std
            FROM weekly_features
            WHERE user_id = ?
            ORDER BY week_start DESC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, limit as i64], row_to_feature)?;
        let features: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(features?)
    }
}

fn write_features(
    tx: &rusqlite::Transaction<'_>,
    features: &[WeeklyFeature],
    updated_at: &str,
) -> Result<()> {
    let mut stmt = tx.prepare(
        r#"
        INSERT INTO weekly_features (
            user_id, week_start, total_income, total_expense, net_cashflow,
            avg_daily_income, income_std, income_volatility_ratio, days_with_income,
            days_without_income, income_source_count, top_source_pct,
            avg_daily_expense, expense_std, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, week_start) DO UPDATE SET
            total_income = excluded.total_income,
            total_expense = excluded.total_expense,
            net_cashflow = excluded.net_cashflow,
            avg_daily_income = excluded.avg_daily_income,
            income_std = excluded.income_std,
            income_volatility_ratio = excluded.income_volatility_ratio,
            days_with_income = excluded.days_with_income,
            days_without_income = excluded.days_without_income,
            income_source_count = excluded.income_source_count,
            top_source_pct = excluded.top_source_pct,
            avg_daily_expense = excluded.avg_daily_expense,
            expense_std = excluded.expense_std,
            updated_at = excluded.updated_at
        "#,
    )?;

    for f in features {
        stmt.execute(params![
            f.user_id,
            format_date(&f.week_start),
            f.total_income.to_string(),
            f.total_expense.to_string(),
            f.net_cashflow.to_string(),
            f.avg_daily_income.to_string(),
            f.income_std.to_string(),
            f.income_volatility_ratio,
            f.days_with_income,
            f.days_without_income,
            f.income_source_count,
            f.top_source_pct,
            f.avg_daily_expense.to_string(),
            f.expense_std.to_string(),
            updated_at,
        ])?;
    }
    Ok(())
}

fn row_to_feature(row: &rusqlite::Row) -> rusqlite::Result<WeeklyFeature> {
    Ok(WeeklyFeature {
        user_id: row.get(0)?,
        week_start: date_col(row, 1)?,
        total_income: money_col(row, 2)?,
        total_expense: money_col(row, 3)?,
        net_cashflow: money_col(row, 4)?,
        avg_daily_income: money_col(row, 5)?,
        income_std: money_col(row, 6)?,
        income_volatility_ratio: row.get(7)?,
        days_with_income: row.get(8)?,
        days_without_income: row.get(9)?,
        income_source_count: row.get(10)?,
        top_source_pct: row.get(11)?,
        avg_daily_expense: money_col(row, 12)?,
        expense_std: money_col(row, 13)?,
    })
}
