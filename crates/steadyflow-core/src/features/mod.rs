//! Feature Extractor
//!
//! Turns raw transactions into the two derived tables the rest of the engine
//! reads:
//!
//! - **Weekly features** - one row per ISO week (Monday start) with income
//!   and expense totals, spread, volatility, day coverage and source
//!   concentration. The window's rows are replaced together, so re-running
//!   over unchanged transactions reproduces identical rows.
//! - **Income sources** - a per-category rollup over a shorter window, fully
//!   replaced on each run inside one transaction.
//!
//! Both operations drop extreme outliers first: any amount outside
//! `[Q1 - k*IQR, Q3 + k*IQR]` of the window's raw amounts is discarded. `k`
//! defaults to 3, which removes data-entry errors but keeps legitimately
//! large payments.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{EngineConfig, FeatureConfig};
use crate::db::Database;
use crate::error::Result;
use crate::models::{Category, IncomeSource, Transaction, WeeklyFeature};
use crate::money::{self, round2, round_money};
use crate::stats;

/// Monday of the ISO week containing `date`
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// Drop transactions whose amount falls outside the IQR band
///
/// Returns the kept transactions and how many were dropped.
pub fn filter_outliers(txs: &[Transaction], k: f64) -> (Vec<&Transaction>, usize) {
    let amounts: Vec<f64> = txs.iter().map(|t| money::to_f64(t.amount)).collect();
    let Some((lo, hi)) = stats::iqr_bounds(&amounts, k) else {
        return (Vec::new(), 0);
    };

    let kept: Vec<&Transaction> = txs
        .iter()
        .zip(&amounts)
        .filter(|(_, a)| **a >= lo && **a <= hi)
        .map(|(t, _)| t)
        .collect();
    let dropped = txs.len() - kept.len();
    (kept, dropped)
}

/// Compute weekly features from an already filtered transaction set
pub fn compute_weekly_features(user_id: &str, txs: &[&Transaction]) -> Vec<WeeklyFeature> {
    let mut weeks: BTreeMap<NaiveDate, Vec<&Transaction>> = BTreeMap::new();
    for &tx in txs {
        weeks
            .entry(week_start(tx.timestamp.date_naive()))
            .or_default()
            .push(tx);
    }

    weeks
        .into_iter()
        .map(|(start, week)| summarize_week(user_id, start, &week))
        .collect()
}

fn summarize_week(user_id: &str, week_start: NaiveDate, week: &[&Transaction]) -> WeeklyFeature {
    let (income, expense): (Vec<&Transaction>, Vec<&Transaction>) =
        week.iter().copied().partition(|t| t.is_income);

    let total_income: Decimal = income.iter().map(|t| t.amount).sum();
    let total_expense: Decimal = expense.iter().map(|t| t.amount).sum();
    let days = Decimal::from(7);

    let income_amounts: Vec<f64> = income.iter().map(|t| money::to_f64(t.amount)).collect();
    let expense_amounts: Vec<f64> = expense.iter().map(|t| money::to_f64(t.amount)).collect();

    let avg_daily_income = money::to_f64(total_income) / 7.0;
    let income_std = stats::sample_std(&income_amounts);
    let volatility = if avg_daily_income > 0.0 {
        income_std / avg_daily_income
    } else {
        0.0
    };

    let income_days: BTreeSet<NaiveDate> =
        income.iter().map(|t| t.timestamp.date_naive()).collect();
    let days_with_income = income_days.len().min(7) as u32;

    let mut by_category: BTreeMap<Category, Decimal> = BTreeMap::new();
    for t in &income {
        *by_category.entry(t.category).or_default() += t.amount;
    }
    let top_source_pct = match by_category.values().max() {
        Some(top) if total_income > Decimal::ZERO => {
            money::to_f64(*top) / money::to_f64(total_income) * 100.0
        }
        _ => 0.0,
    };

    WeeklyFeature {
        user_id: user_id.to_string(),
        week_start,
        total_income: round_money(total_income),
        total_expense: round_money(total_expense),
        net_cashflow: round_money(total_income - total_expense),
        avg_daily_income: round_money(total_income / days),
        income_std: money::from_f64(income_std),
        income_volatility_ratio: round2(volatility),
        days_with_income,
        days_without_income: 7 - days_with_income,
        income_source_count: by_category.len() as u32,
        top_source_pct: round2(top_source_pct),
        avg_daily_expense: round_money(total_expense / days),
        expense_std: money::from_f64(stats::sample_std(&expense_amounts)),
    }
}

/// Per-category income rollup over an already filtered transaction set
pub fn compute_income_sources(
    user_id: &str,
    txs: &[&Transaction],
    window_months: u32,
) -> Vec<IncomeSource> {
    struct Acc {
        amounts: Vec<f64>,
        total: Decimal,
        last: DateTime<Utc>,
    }

    let mut groups: BTreeMap<Category, Acc> = BTreeMap::new();
    for t in txs.iter().filter(|t| t.is_income) {
        let acc = groups.entry(t.category).or_insert_with(|| Acc {
            amounts: Vec::new(),
            total: Decimal::ZERO,
            last: t.timestamp,
        });
        acc.amounts.push(money::to_f64(t.amount));
        acc.total += t.amount;
        acc.last = acc.last.max(t.timestamp);
    }

    let grand_total: Decimal = groups.values().map(|a| a.total).sum();
    let months = Decimal::from(window_months.max(1));

    let mut sources: Vec<IncomeSource> = groups
        .into_iter()
        .map(|(category, acc)| {
            let mean = stats::mean(&acc.amounts);
            let std = stats::sample_std(&acc.amounts);
            let cv = stats::coefficient_of_variation(mean, std, 1.0);
            let contribution = if grand_total > Decimal::ZERO {
                money::to_f64(acc.total) / money::to_f64(grand_total) * 100.0
            } else {
                0.0
            };

            IncomeSource {
                user_id: user_id.to_string(),
                category,
                total_amount: round_money(acc.total),
                avg_monthly_amount: round_money(acc.total / months),
                payment_count: acc.amounts.len() as u32,
                contribution_pct: round2(contribution),
                stability_score: round2((1.0 - cv).clamp(0.0, 1.0)),
                last_payment_at: acc.last,
            }
        })
        .collect();

    sources.sort_by(|a, b| {
        b.contribution_pct
            .total_cmp(&a.contribution_pct)
            .then_with(|| a.category.cmp(&b.category))
    });
    sources
}

/// Derives weekly features and income sources from the transaction store
pub struct FeatureExtractor {
    db: Database,
    config: FeatureConfig,
    clock: Arc<dyn Clock>,
}

impl FeatureExtractor {
    pub fn new(db: Database, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            db,
            config: config.features.clone(),
            clock,
        }
    }

    /// Recompute weekly features over the default lookback window
    pub fn extract_features(&self, user_id: &str) -> Result<Vec<WeeklyFeature>> {
        self.extract_features_with_lookback(user_id, self.config.lookback_months)
    }

    /// Recompute weekly features over `lookback_months`
    ///
    /// The window starts on the Monday on or before `now - lookback`, so
    /// every week in it is complete. Stored rows for weeks in the window are
    /// replaced as a set; an empty window clears them.
    pub fn extract_features_with_lookback(
        &self,
        user_id: &str,
        lookback_months: u32,
    ) -> Result<Vec<WeeklyFeature>> {
        let now = self.clock.now();
        let lookback = i64::from(lookback_months) * i64::from(self.config.days_per_month);
        let first_week = week_start((now - Duration::days(lookback)).date_naive());
        let cutoff = first_week.and_time(NaiveTime::MIN).and_utc();

        let txs = self.db.list_transactions_since(user_id, cutoff)?;
        let (kept, dropped) = filter_outliers(&txs, self.config.outlier_iqr_multiplier);
        if dropped > 0 {
            debug!(user_id, dropped, "Dropped outlier transactions");
        }

        let features = compute_weekly_features(user_id, &kept);
        self.db
            .replace_weekly_features(user_id, first_week, &features, now)?;

        info!(
            user_id,
            transactions = txs.len(),
            weeks = features.len(),
            "Weekly features extracted"
        );
        Ok(features)
    }

    /// Recompute and atomically replace the user's income sources
    pub fn update_income_sources(&self, user_id: &str) -> Result<Vec<IncomeSource>> {
        let now = self.clock.now();
        let cutoff = now - Duration::days(self.config.source_lookback_days());

        let txs = self.db.list_transactions_since(user_id, cutoff)?;
        let (kept, _) = filter_outliers(&txs, self.config.outlier_iqr_multiplier);
        let sources = compute_income_sources(user_id, &kept, self.config.source_lookback_months);

        self.db.replace_income_sources(user_id, &sources, now)?;

        info!(user_id, sources = sources.len(), "Income sources replaced");
        Ok(sources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, expense, income, income_in};
    use rust_decimal_macros::dec;

    #[test]
    fn test_week_start_is_monday() {
        let wed = NaiveDate::from_ymd_opt(2026, 3, 4).unwrap();
        assert_eq!(week_start(wed), NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        let mon = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(week_start(mon), mon);
        let sun = NaiveDate::from_ymd_opt(2026, 3, 8).unwrap();
        assert_eq!(week_start(sun), mon);
    }

    #[test]
    fn test_filter_outliers_drops_data_entry_error() {
        let mut txs: Vec<Transaction> = (0..10i64)
            .map(|i| {
                let day = 2 + (i % 5) as u32;
                income(i, "u1", at(2026, 3, day), dec!(1000) + Decimal::from(i * 10))
            })
            .collect();
        txs.push(income(99, "u1", at(2026, 3, 3), dec!(9999999)));

        let (kept, dropped) = filter_outliers(&txs, 3.0);
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 10);
    }

    #[test]
    fn test_filter_outliers_keeps_large_but_plausible_payment() {
        let txs = vec![
            income(1, "u1", at(2026, 3, 2), dec!(1000)),
            income(2, "u1", at(2026, 3, 3), dec!(1200)),
            income(3, "u1", at(2026, 3, 4), dec!(800)),
            income(4, "u1", at(2026, 3, 5), dec!(2500)),
        ];
        let (kept, dropped) = filter_outliers(&txs, 3.0);
        assert_eq!(dropped, 0);
        assert_eq!(kept.len(), 4);
    }

    #[test]
    fn test_weekly_feature_values() {
        let txs = vec![
            income(1, "u1", at(2026, 3, 2), dec!(3000)),
            income(2, "u1", at(2026, 3, 2), dec!(1000)),
            income(3, "u1", at(2026, 3, 4), dec!(3000)),
            expense(4, "u1", at(2026, 3, 5), dec!(700)),
        ];
        let refs: Vec<&Transaction> = txs.iter().collect();
        let features = compute_weekly_features("u1", &refs);

        assert_eq!(features.len(), 1);
        let f = &features[0];
        assert_eq!(f.week_start, NaiveDate::from_ymd_opt(2026, 3, 2).unwrap());
        assert_eq!(f.total_income, dec!(7000));
        assert_eq!(f.total_expense, dec!(700));
        assert_eq!(f.net_cashflow, dec!(6300));
        assert_eq!(f.avg_daily_income, dec!(1000));
        assert_eq!(f.days_with_income, 2);
        assert_eq!(f.days_without_income, 5);
        assert_eq!(f.income_source_count, 1);
        assert_eq!(f.top_source_pct, 100.0);
        assert_eq!(f.avg_daily_expense, dec!(100));
        // single expense has no spread
        assert_eq!(f.expense_std, Decimal::ZERO);
        // sample std of [3000, 1000, 3000] is 1154.70
        assert_eq!(f.income_std, dec!(1154.70));
        assert_eq!(f.income_volatility_ratio, 1.15);
    }

    #[test]
    fn test_zero_income_week_has_zero_volatility() {
        let txs = vec![
            expense(1, "u1", at(2026, 3, 2), dec!(500)),
            expense(2, "u1", at(2026, 3, 3), dec!(900)),
        ];
        let refs: Vec<&Transaction> = txs.iter().collect();
        let f = &compute_weekly_features("u1", &refs)[0];

        assert_eq!(f.total_income, Decimal::ZERO);
        assert_eq!(f.income_volatility_ratio, 0.0);
        assert!(!f.income_volatility_ratio.is_nan());
        assert_eq!(f.top_source_pct, 0.0);
        assert_eq!(f.days_without_income, 7);
    }

    #[test]
    fn test_top_source_pct_uses_amounts() {
        let txs = vec![
            income_in(1, "u1", at(2026, 3, 2), dec!(100), Category::PeerTransferCredit),
            income_in(2, "u1", at(2026, 3, 3), dec!(100), Category::PeerTransferCredit),
            income_in(3, "u1", at(2026, 3, 4), dec!(800), Category::FreelanceGig),
        ];
        let refs: Vec<&Transaction> = txs.iter().collect();
        let f = &compute_weekly_features("u1", &refs)[0];
        assert_eq!(f.income_source_count, 2);
        assert_eq!(f.top_source_pct, 80.0);
    }

    #[test]
    fn test_income_sources_rollup() {
        let txs = vec![
            income_in(1, "u1", at(2026, 1, 5), dec!(1000), Category::FreelanceGig),
            income_in(2, "u1", at(2026, 2, 5), dec!(1000), Category::FreelanceGig),
            income_in(3, "u1", at(2026, 3, 5), dec!(1000), Category::FreelanceGig),
            income_in(4, "u1", at(2026, 2, 9), dec!(1000), Category::PlatformPayout),
            expense(5, "u1", at(2026, 2, 10), dec!(300)),
        ];
        let refs: Vec<&Transaction> = txs.iter().collect();
        let sources = compute_income_sources("u1", &refs, 3);

        assert_eq!(sources.len(), 2);
        let gig = &sources[0];
        assert_eq!(gig.category, Category::FreelanceGig);
        assert_eq!(gig.total_amount, dec!(3000));
        assert_eq!(gig.avg_monthly_amount, dec!(1000));
        assert_eq!(gig.payment_count, 3);
        assert_eq!(gig.contribution_pct, 75.0);
        assert_eq!(gig.stability_score, 1.0);
        assert_eq!(gig.last_payment_at, at(2026, 3, 5));

        let payout = &sources[1];
        assert_eq!(payout.contribution_pct, 25.0);
        // a single payment has no measurable spread
        assert_eq!(payout.stability_score, 1.0);
    }

    #[test]
    fn test_stability_score_floors_at_zero() {
        let txs = vec![
            income(1, "u1", at(2026, 3, 2), dec!(10)),
            income(2, "u1", at(2026, 3, 3), dec!(10)),
            income(3, "u1", at(2026, 3, 4), dec!(5000)),
        ];
        let refs: Vec<&Transaction> = txs.iter().collect();
        let sources = compute_income_sources("u1", &refs, 3);
        assert_eq!(sources[0].stability_score, 0.0);
    }
}
