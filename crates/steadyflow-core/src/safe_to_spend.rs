//! Safe-to-Spend Calculator
//!
//! ```text
//! weekly_fixed = monthly_fixed / 4.33
//! multiplier   = 1 + min(avg volatility of last 4 weeks, 1)     (1.5 with no history)
//! safe_weekly  = max(0, (worst_case_income + buffer) / multiplier - weekly_fixed)
//! safe_daily   = safe_weekly / 7
//! exhaustion   = today + floor(buffer / safe_daily) days         (today if safe_daily rounds to 0)
//! ```
//!
//! Worst-case income is the lower bound of the 7-day forecast, floored at 0.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::debug;

use crate::clock::Clock;
use crate::config::{EngineConfig, SafeToSpendConfig};
use crate::db::Database;
use crate::error::Result;
use crate::forecast::ForecastEngine;
use crate::models::ModelUsed;
use crate::money::{from_f64, from_f64_floor, round2, to_f64};
use crate::stats;

const HORIZON_DAYS: u32 = 7;

/// Everything the calculation reads
#[derive(Debug, Clone, PartialEq)]
pub struct SpendInputs {
    /// Lower bound of the 7-day forecast
    pub forecast_lower_bound: Decimal,
    pub forecast_model: ModelUsed,
    pub buffer_balance: Decimal,
    /// `None` when the user has no profile
    pub monthly_fixed_expenses: Option<Decimal>,
    /// Volatility ratios of the most recent weeks; empty with no history
    pub recent_volatility: Vec<f64>,
}

/// Safe-to-spend figures with their derivation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafeToSpend {
    pub safe_weekly: Decimal,
    pub safe_daily: Decimal,
    pub worst_case_income: Decimal,
    pub buffer_balance: Decimal,
    pub monthly_fixed_expenses: Decimal,
    pub weekly_fixed_expenses: Decimal,
    /// `None` when there was no feature history
    pub avg_volatility: Option<f64>,
    pub volatility_multiplier: f64,
    /// Day the buffer runs out at the safe daily rate
    pub exhaustion_date: NaiveDate,
    pub days_until_exhaustion: i64,
    pub forecast_model: ModelUsed,
    /// One line per step of the calculation
    pub explanation: Vec<String>,
}

/// The calculation itself, free of any store
pub fn compute(inputs: &SpendInputs, config: &SafeToSpendConfig, today: NaiveDate) -> SafeToSpend {
    let worst_case_income = inputs.forecast_lower_bound.max(Decimal::ZERO);
    let monthly_fixed = inputs.monthly_fixed_expenses.unwrap_or(Decimal::ZERO);
    let weekly_fixed = to_f64(monthly_fixed) / config.weeks_per_month;

    let avg_volatility = if inputs.recent_volatility.is_empty() {
        None
    } else {
        Some(stats::mean(&inputs.recent_volatility))
    };
    let multiplier = match avg_volatility {
        Some(v) => 1.0 + v.clamp(0.0, 1.0),
        None => config.default_volatility_multiplier,
    };

    let balance = to_f64(inputs.buffer_balance);
    let available = to_f64(worst_case_income) + balance;
    let safe_weekly = (available / multiplier - weekly_fixed).max(0.0);
    let safe_daily = safe_weekly / 7.0;

    let safe_weekly_dec = from_f64_floor(safe_weekly);
    let safe_daily_dec = from_f64_floor(safe_daily);

    // Exhaustion follows the reported daily figure, so 0.00 a day means today
    let days_until_exhaustion = if safe_daily_dec > Decimal::ZERO {
        inputs
            .buffer_balance
            .checked_div(safe_daily_dec)
            .and_then(|d| d.floor().to_i64())
            .unwrap_or(i64::MAX)
            .max(0)
    } else {
        0
    };
    let exhaustion_date = Duration::try_days(days_until_exhaustion)
        .and_then(|offset| today.checked_add_signed(offset))
        .unwrap_or(NaiveDate::MAX);

    let weekly_fixed_dec = from_f64(weekly_fixed);

    let mut explanation = vec![
        format!(
            "Worst-case income over the next 7 days is {} ({} forecast)",
            worst_case_income, inputs.forecast_model
        ),
        format!("Buffer balance is {}", inputs.buffer_balance),
        format!(
            "Fixed expenses of {} a month come to {} a week",
            monthly_fixed, weekly_fixed_dec
        ),
    ];
    explanation.push(match avg_volatility {
        Some(v) => format!(
            "Average volatility {:.2} over {} weeks gives a {:.2}x cushion",
            v,
            inputs.recent_volatility.len(),
            multiplier
        ),
        None => format!("No income history, using a {:.2}x cushion", multiplier),
    });
    explanation.push(format!(
        "({} + {}) / {:.2} - {} leaves {} a week, {} a day",
        worst_case_income,
        inputs.buffer_balance,
        multiplier,
        weekly_fixed_dec,
        safe_weekly_dec,
        safe_daily_dec
    ));
    explanation.push(if safe_daily_dec > Decimal::ZERO {
        format!(
            "At that rate the buffer lasts {} days, until {}",
            days_until_exhaustion, exhaustion_date
        )
    } else {
        "Nothing is safe to spend; the buffer is at immediate risk".to_string()
    });

    SafeToSpend {
        safe_weekly: safe_weekly_dec,
        safe_daily: safe_daily_dec,
        worst_case_income,
        buffer_balance: inputs.buffer_balance,
        monthly_fixed_expenses: monthly_fixed,
        weekly_fixed_expenses: weekly_fixed_dec,
        avg_volatility: avg_volatility.map(round2),
        volatility_multiplier: round2(multiplier),
        exhaustion_date,
        days_until_exhaustion,
        forecast_model: inputs.forecast_model,
        explanation,
    }
}

/// Gathers the inputs for a user and runs [`compute`]
pub struct SafeToSpendCalculator {
    db: Database,
    config: SafeToSpendConfig,
    clock: Arc<dyn Clock>,
    forecaster: Arc<ForecastEngine>,
}

impl SafeToSpendCalculator {
    pub fn new(
        db: Database,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
        forecaster: Arc<ForecastEngine>,
    ) -> Self {
        Self {
            db,
            config: config.safe_to_spend.clone(),
            clock,
            forecaster,
        }
    }

    pub fn calculate(&self, user_id: &str) -> Result<SafeToSpend> {
        let forecast = self.forecaster.predict(user_id, HORIZON_DAYS)?;
        let buffer_balance = self
            .db
            .get_buffer(user_id)?
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO);
        let monthly_fixed_expenses = self
            .db
            .get_user_profile(user_id)?
            .map(|p| p.monthly_fixed_expenses);
        let recent_volatility = self
            .db
            .list_weekly_features(user_id, self.config.volatility_window_weeks as usize)?
            .iter()
            .map(|f| f.income_volatility_ratio)
            .collect();

        let inputs = SpendInputs {
            forecast_lower_bound: forecast.lower_bound,
            forecast_model: forecast.model_used,
            buffer_balance,
            monthly_fixed_expenses,
            recent_volatility,
        };
        let result = compute(&inputs, &self.config, self.clock.now().date_naive());

        debug!(
            user_id,
            safe_weekly = %result.safe_weekly,
            days_until_exhaustion = result.days_until_exhaustion,
            "Safe to spend calculated"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;
    use rust_decimal_macros::dec;

    fn inputs() -> SpendInputs {
        SpendInputs {
            forecast_lower_bound: dec!(7000),
            forecast_model: ModelUsed::RollingBaseline,
            buffer_balance: dec!(14000),
            monthly_fixed_expenses: Some(dec!(4330)),
            recent_volatility: vec![0.4, 0.6],
        }
    }

    #[test]
    fn test_basic_breakdown() {
        let today = date(2026, 3, 4);
        let result = compute(&inputs(), &SafeToSpendConfig::default(), today);

        assert_eq!(result.weekly_fixed_expenses, dec!(1000));
        assert_eq!(result.avg_volatility, Some(0.5));
        assert_eq!(result.volatility_multiplier, 1.5);
        // (7000 + 14000) / 1.5 - 1000
        assert_eq!(result.safe_weekly, dec!(13000));
        assert_eq!(result.safe_daily, dec!(1857.14));
        // floor(14000 / 1857.142857...) = 7
        assert_eq!(result.days_until_exhaustion, 7);
        assert_eq!(result.exhaustion_date, date(2026, 3, 11));
        assert_eq!(result.explanation.len(), 6);
    }

    #[test]
    fn test_volatility_capped_and_default_multiplier() {
        let config = SafeToSpendConfig::default();
        let today = date(2026, 3, 4);

        let mut volatile = inputs();
        volatile.recent_volatility = vec![3.0, 5.0];
        assert_eq!(compute(&volatile, &config, today).volatility_multiplier, 2.0);

        let mut fresh = inputs();
        fresh.recent_volatility.clear();
        let result = compute(&fresh, &config, today);
        assert_eq!(result.avg_volatility, None);
        assert_eq!(result.volatility_multiplier, 1.5);
    }

    #[test]
    fn test_negative_bound_and_no_profile() {
        let mut no_profile = inputs();
        no_profile.forecast_lower_bound = dec!(-500);
        no_profile.monthly_fixed_expenses = None;
        let result = compute(&no_profile, &SafeToSpendConfig::default(), date(2026, 3, 4));

        assert_eq!(result.worst_case_income, Decimal::ZERO);
        assert_eq!(result.weekly_fixed_expenses, Decimal::ZERO);
        // 14000 / 1.5
        assert_eq!(result.safe_weekly, dec!(9333.33));
    }

    #[test]
    fn test_nothing_safe_exhausts_today() {
        let mut broke = inputs();
        broke.forecast_lower_bound = Decimal::ZERO;
        broke.buffer_balance = dec!(500);
        let today = date(2026, 3, 4);
        let result = compute(&broke, &SafeToSpendConfig::default(), today);

        assert_eq!(result.safe_weekly, Decimal::ZERO);
        assert_eq!(result.safe_daily, Decimal::ZERO);
        assert_eq!(result.days_until_exhaustion, 0);
        assert_eq!(result.exhaustion_date, today);
    }

    #[test]
    fn test_tiny_remainder_exhausts_today() {
        // 1392 / 1.5 and 4018.24 / 4.33 both come to 928, leaving only float residue
        let nearly_even = SpendInputs {
            forecast_lower_bound: Decimal::ZERO,
            forecast_model: ModelUsed::InsufficientData,
            buffer_balance: dec!(1392),
            monthly_fixed_expenses: Some(dec!(4018.24)),
            recent_volatility: vec![],
        };
        let today = date(2026, 3, 4);
        let result = compute(&nearly_even, &SafeToSpendConfig::default(), today);

        assert_eq!(result.safe_daily, Decimal::ZERO);
        assert_eq!(result.days_until_exhaustion, 0);
        assert_eq!(result.exhaustion_date, today);
        assert!(result.explanation[5].starts_with("Nothing is safe to spend"));
    }

    #[test]
    fn test_days_follow_reported_daily_rate() {
        let mut slim = inputs();
        slim.forecast_lower_bound = Decimal::ZERO;
        slim.buffer_balance = dec!(100);
        slim.monthly_fixed_expenses = None;
        slim.recent_volatility = vec![0.0];
        let today = date(2026, 3, 4);
        let result = compute(&slim, &SafeToSpendConfig::default(), today);

        // 100 / 7 = 14.28 a day, floor(100 / 14.28) = 7
        assert_eq!(result.safe_daily, dec!(14.28));
        assert_eq!(result.days_until_exhaustion, 7);
        assert_eq!(result.exhaustion_date, date(2026, 3, 11));
    }
}
