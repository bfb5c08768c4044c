//! Income source rollup persistence

use chrono::{DateTime, Utc};
use rusqlite::{params, TransactionBehavior};

use super::{datetime_col, enum_col, format_datetime, money_col, Database};
use crate::error::Result;
use crate::models::IncomeSource;

impl Database {
    /// Replace a user's entire income source set atomically
    ///
    /// Delete and reinsert run inside one `BEGIN IMMEDIATE` transaction, so a
    /// concurrent recompute for the same user waits instead of observing an
    /// empty set.
    pub fn replace_income_sources(
        &self,
        user_id: &str,
        sources: &[IncomeSource],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let computed_at = format_datetime(&now);

        tx.execute("DELETE FROM income_sources WHERE user_id = ?", params![user_id])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO income_sources (
                    user_id, category, total_amount, avg_monthly_amount, payment_count,
                    contribution_pct, stability_score, last_payment_at, computed_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for s in sources {
                stmt.execute(params![
                    user_id,
                    s.category.as_str(),
                    s.total_amount.to_string(),
                    s.avg_monthly_amount.to_string(),
                    s.payment_count,
                    s.contribution_pct,
                    s.stability_score,
                    format_datetime(&s.last_payment_at),
                    computed_at,
                ])?;
            }
        }
        tx.commit()?;

        Ok(sources.len())
    }

    /// A user's income sources, largest contribution first
    pub fn list_income_sources(&self, user_id: &str) -> Result<Vec<IncomeSource>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT user_id, category, total_amount, avg_monthly_amount, payment_count,
                   contribution_pct, stability_score, last_payment_at
            FROM income_sources
            WHERE user_id = ?
            ORDER BY contribution_pct DESC, category ASC
            "#,
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(IncomeSource {
                user_id: row.get(0)?,
                category: enum_col(row, 1)?,
                total_amount: money_col(row, 2)?,
                avg_monthly_amount: money_col(row, 3)?,
                payment_count: row.get(4)?,
                contribution_pct: row.get(5)?,
                stability_score: row.get(6)?,
                last_payment_at: datetime_col(row, 7)?,
            })
        })?;

        let sources: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(sources?)
    }
}
