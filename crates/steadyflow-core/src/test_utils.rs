//! Test fixtures for steadyflow-core
//!
//! Plain builder functions for transactions, weekly features, buffers,
//! income sources and clocks.
//! Compiled for unit tests and, with the `test-utils` feature, for downstream
//! test suites.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::clock::{Clock, FixedClock};
use crate::models::{
    Category, Direction, IncomeSource, NewTransaction, SmoothingBuffer, Transaction, WeeklyFeature,
};

/// Noon UTC on the given day
pub fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 12, 0, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid fixture date {}-{}-{}", year, month, day))
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or_else(|| panic!("invalid fixture date {}-{}-{}", year, month, day))
}

/// A clock pinned to noon UTC on the given day
pub fn fixed_clock(year: i32, month: u32, day: u32) -> Arc<dyn Clock> {
    Arc::new(FixedClock(at(year, month, day)))
}

/// Stored income transaction in the freelance_gig category
pub fn income(id: i64, user_id: &str, timestamp: DateTime<Utc>, amount: Decimal) -> Transaction {
    income_in(id, user_id, timestamp, amount, Category::FreelanceGig)
}

pub fn income_in(
    id: i64,
    user_id: &str,
    timestamp: DateTime<Utc>,
    amount: Decimal,
    category: Category,
) -> Transaction {
    Transaction {
        id,
        user_id: user_id.to_string(),
        account_id: "acc-1".to_string(),
        timestamp,
        amount,
        direction: Direction::Credit,
        balance_after: Decimal::ZERO,
        description: format!("{} payment", category),
        category,
        is_income: true,
    }
}

/// Stored expense transaction in the `other` category
pub fn expense(id: i64, user_id: &str, timestamp: DateTime<Utc>, amount: Decimal) -> Transaction {
    Transaction {
        id,
        user_id: user_id.to_string(),
        account_id: "acc-1".to_string(),
        timestamp,
        amount,
        direction: Direction::Debit,
        balance_after: Decimal::ZERO,
        description: "spend".to_string(),
        category: Category::Other,
        is_income: false,
    }
}

/// One transaction per day for `days` days ending on `last_day`
///
/// `amount_for(i)` gives the amount for day `i` (0 = oldest); days with a
/// zero amount are skipped.
pub fn daily_history(
    user_id: &str,
    last_day: DateTime<Utc>,
    days: i64,
    category: Category,
    amount_for: impl Fn(i64) -> Decimal,
) -> Vec<NewTransaction> {
    (0..days)
        .filter_map(|i| {
            let amount = amount_for(i);
            if amount <= Decimal::ZERO {
                return None;
            }
            let ts = last_day - Duration::days(days - 1 - i);
            Some(NewTransaction::new(user_id, "acc-1", ts, amount, category))
        })
        .collect()
}

/// Weekly feature with the given income and everything else neutral
pub fn feature(user_id: &str, week_start: NaiveDate, total_income: Decimal) -> WeeklyFeature {
    WeeklyFeature {
        user_id: user_id.to_string(),
        week_start,
        total_income,
        total_expense: Decimal::ZERO,
        net_cashflow: total_income,
        avg_daily_income: (total_income / Decimal::from(7)).round_dp(2),
        income_std: Decimal::ZERO,
        income_volatility_ratio: 0.0,
        days_with_income: if total_income > Decimal::ZERO { 1 } else { 0 },
        days_without_income: if total_income > Decimal::ZERO { 6 } else { 7 },
        income_source_count: if total_income > Decimal::ZERO { 1 } else { 0 },
        top_source_pct: if total_income > Decimal::ZERO { 100.0 } else { 0.0 },
        avg_daily_expense: Decimal::ZERO,
        expense_std: Decimal::ZERO,
    }
}

/// Consecutive weekly features, oldest first, starting on `first_monday`
pub fn weekly_series(
    user_id: &str,
    first_monday: NaiveDate,
    incomes: &[Decimal],
) -> Vec<WeeklyFeature> {
    incomes
        .iter()
        .enumerate()
        .map(|(i, amount)| {
            feature(
                user_id,
                first_monday + Duration::weeks(i as i64),
                *amount,
            )
        })
        .collect()
}

/// [`weekly_series`] reversed, the order rules and stores hand back
pub fn newest_first(user_id: &str, first_monday: NaiveDate, incomes: &[Decimal]) -> Vec<WeeklyFeature> {
    let mut weeks = weekly_series(user_id, first_monday, incomes);
    weeks.reverse();
    weeks
}

/// Buffer holding `balance` with the default 5000 / 100000 limits
pub fn buffer(user_id: &str, balance: Decimal) -> SmoothingBuffer {
    let now = at(2026, 3, 4);
    SmoothingBuffer {
        user_id: user_id.to_string(),
        balance,
        total_deposited: balance,
        total_released: Decimal::ZERO,
        risk_score: 0.5,
        min_threshold: Decimal::from(5000),
        max_capacity: Decimal::from(100000),
        last_deposit_at: None,
        last_release_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Three payments totalling `total` over a three month window
pub fn income_source(user_id: &str, category: Category, total: Decimal) -> IncomeSource {
    IncomeSource {
        user_id: user_id.to_string(),
        category,
        total_amount: total,
        avg_monthly_amount: (total / Decimal::from(3)).round_dp(2),
        payment_count: 3,
        contribution_pct: 50.0,
        stability_score: 0.9,
        last_payment_at: at(2026, 3, 1),
    }
}
