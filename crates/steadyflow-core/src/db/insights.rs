//! Insight database operations
//!
//! Insights are append-only; only the read and dismissed flags ever change.

use chrono::{DateTime, Utc};
use rusqlite::params;

use super::{datetime_col, enum_col, format_datetime, Database};
use crate::error::{Error, Result};
use crate::insights::{Finding, Insight};

/// Filter for listing insights
#[derive(Debug, Clone)]
pub struct InsightFilter {
    pub unread_only: bool,
    pub include_dismissed: bool,
    pub limit: usize,
}

impl Default for InsightFilter {
    fn default() -> Self {
        Self {
            unread_only: false,
            include_dismissed: false,
            limit: 50,
        }
    }
}

impl Database {
    /// Append findings as new insight rows, returning what was stored
    pub fn insert_insights(
        &self,
        user_id: &str,
        findings: &[Finding],
        now: DateTime<Utc>,
    ) -> Result<Vec<Insight>> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let created_at = format_datetime(&now);
        let mut stored = Vec::with_capacity(findings.len());
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO insights (user_id, insight_type, severity, explanation, metrics, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for finding in findings {
                let metrics_json = serde_json::to_string(&finding.metrics)?;
                stmt.execute(params![
                    user_id,
                    finding.insight_type.as_str(),
                    finding.severity.as_str(),
                    finding.explanation,
                    metrics_json,
                    created_at,
                ])?;
                stored.push(Insight {
                    id: tx.last_insert_rowid(),
                    user_id: user_id.to_string(),
                    insight_type: finding.insight_type,
                    severity: finding.severity,
                    explanation: finding.explanation.clone(),
                    metrics: finding.metrics.clone(),
                    is_read: false,
                    is_dismissed: false,
                    created_at: now,
                });
            }
        }
        tx.commit()?;

        Ok(stored)
    }

    /// List a user's insights, newest first
    pub fn list_insights(&self, user_id: &str, filter: &InsightFilter) -> Result<Vec<Insight>> {
        let conn = self.conn()?;

        let mut sql = String::from(
            r#"
            SELECT id, user_id, insight_type, severity, explanation, metrics,
                   is_read, is_dismissed, created_at
            FROM insights
            WHERE user_id = ?
            "#,
        );
        if filter.unread_only {
            sql.push_str(" AND is_read = 0");
        }
        if !filter.include_dismissed {
            sql.push_str(" AND is_dismissed = 0");
        }
        sql.push_str(" ORDER BY created_at DESC, id DESC LIMIT ?");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![user_id, filter.limit as i64], row_to_insight)?;

        let insights: std::result::Result<Vec<_>, _> = rows.collect();
        Ok(insights?)
    }

    /// Mark an insight as read
    pub fn mark_insight_read(&self, user_id: &str, id: i64) -> Result<()> {
        self.set_insight_flag(user_id, id, "is_read")
    }

    /// Dismiss an insight
    pub fn dismiss_insight(&self, user_id: &str, id: i64) -> Result<()> {
        self.set_insight_flag(user_id, id, "is_dismissed")
    }

    fn set_insight_flag(&self, user_id: &str, id: i64, column: &'static str) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            &format!(
                "UPDATE insights SET {} = 1 WHERE id = ? AND user_id = ?",
                column
            ),
            params![id, user_id],
        )?;
        if updated == 0 {
            return Err(Error::NotFound(format!(
                "insight {} for user {}",
                id, user_id
            )));
        }
        Ok(())
    }
}

fn row_to_insight(row: &rusqlite::Row) -> rusqlite::Result<Insight> {
    let metrics_json: String = row.get(5)?;
    let metrics = serde_json::from_str(&metrics_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Insight {
        id: row.get(0)?,
        user_id: row.get(1)?,
        insight_type: enum_col(row, 2)?,
        severity: enum_col(row, 3)?,
        explanation: row.get(4)?,
        metrics,
        is_read: row.get(6)?,
        is_dismissed: row.get(7)?,
        created_at: datetime_col(row, 8)?,
    })
}
