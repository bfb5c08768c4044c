//! Fixed-expense baseline per user

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use rust_decimal::Decimal;

use super::{datetime_col, format_datetime, money_col, Database};
use crate::error::{Error, Result};
use crate::models::UserProfile;

impl Database {
    /// Set a user's monthly fixed expenses
    pub fn upsert_user_profile(
        &self,
        user_id: &str,
        monthly_fixed_expenses: Decimal,
        now: DateTime<Utc>,
    ) -> Result<UserProfile> {
        if monthly_fixed_expenses < Decimal::ZERO {
            return Err(Error::InvalidData(format!(
                "monthly fixed expenses cannot be negative, got {}",
                monthly_fixed_expenses
            )));
        }

        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO user_profiles (user_id, monthly_fixed_expenses, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                monthly_fixed_expenses = excluded.monthly_fixed_expenses,
                updated_at = excluded.updated_at
            "#,
            params![user_id, monthly_fixed_expenses.to_string(), format_datetime(&now)],
        )?;

        Ok(UserProfile {
            user_id: user_id.to_string(),
            monthly_fixed_expenses,
            updated_at: now,
        })
    }

    pub fn get_user_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let conn = self.conn()?;
        let profile = conn
            .query_row(
                "SELECT user_id, monthly_fixed_expenses, updated_at FROM user_profiles WHERE user_id = ?",
                params![user_id],
                |row| {
                    Ok(UserProfile {
                        user_id: row.get(0)?,
                        monthly_fixed_expenses: money_col(row, 1)?,
                        updated_at: datetime_col(row, 2)?,
                    })
                },
            )
            .optional()?;
        Ok(profile)
    }
}
