//! Forecast log (append-only)

use rusqlite::params;

use super::{datetime_col, enum_col, format_datetime, money_col, Database};
use crate::error::Result;
use crate::models::CashflowPrediction;

impl Database {
    /// Append a prediction snapshot, returning its id
    ///
    /// The `id` field of `prediction` is ignored.
    pub fn insert_prediction(&self, prediction: &CashflowPrediction) -> Result<i64> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO cashflow_predictions (
                user_id, horizon_days, expected_inflow, expected_outflow, net_cashflow,
                lower_bound, upper_bound, risk_level, model_used, confidence, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                prediction.user_id,
                prediction.horizon_days,
                prediction.expected_inflow.to_string(),
                prediction.expected_outflow.to_string(),
                prediction.net_cashflow.to_string(),
                prediction.lower_bound.to_string(),
                prediction.upper_bound.to_string(),
                prediction.risk_level.as_str(),
                prediction.model_used.as_str(),
                prediction.confidence,
                format_datetime(&prediction.created_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Logged predictions for a user, newest first
    pub fn list_predictions(&self, user_id: &str, limit: usize) -> Result<Vec<CashflowPrediction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, user_id, horizon_days, expected_inflow, expected_outflow, net_cashflow,
                   lower_bound, upper_bound, risk_level, model_used, confidence, created_at
            FROM cashflow_predictions
            WHERE user_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )?;

        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok(CashflowPrediction {
                id: row.get(0)?,
                user_id: row.get(1)?,
                horizon_days: row.get(2)?,
                expected_inflow: money_col(row, 3)?,
                expected_outflow: money_col(row, 4)?,
                net_cashflow: money_col(row, 5)?,
                lower_bound: money_col(row, 6)?,
                upper_bound: money_col(row, 7)?,
                risk_level: enum_col(row, 8)?,
                model_used: enum_col(row, 9)?,
                confidence: row.get(10)?,
                created_at: datetime_col(row, 11)?,
            })
        })?;

        let predictions: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(predictions?)
    }
}
