//! Daily cashflow series and trailing-window statistics

use chrono::NaiveDate;

use crate::models::Transaction;
use crate::money;
use crate::stats;

/// Calendar-complete daily income and expense totals
///
/// Runs from the date of the earliest transaction through the as-of date,
/// with zeros on days without activity.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    pub start: NaiveDate,
    pub income: Vec<f64>,
    pub expense: Vec<f64>,
}

impl DailySeries {
    /// Bucket transactions into days; `None` if nothing falls on or before `as_of`
    pub fn from_transactions<'a, I>(txs: I, as_of: NaiveDate) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let txs: Vec<&Transaction> = txs
            .into_iter()
            .filter(|t| t.timestamp.date_naive() <= as_of)
            .collect();
        let start = txs.iter().map(|t| t.timestamp.date_naive()).min()?;

        let len = (as_of - start).num_days() as usize + 1;
        let mut income = vec![0.0; len];
        let mut expense = vec![0.0; len];

        for t in txs {
            let idx = (t.timestamp.date_naive() - start).num_days() as usize;
            let amount = money::to_f64(t.amount);
            if t.is_income {
                income[idx] += amount;
            } else {
                expense[idx] += amount;
            }
        }

        Some(Self {
            start,
            income,
            expense,
        })
    }

    /// Days of history covered, inclusive of the as-of date
    pub fn history_days(&self) -> i64 {
        self.income.len() as i64
    }
}

/// Point forecasts with the standard deviation of each step
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSeries {
    pub values: Vec<f64>,
    pub step_std: Vec<f64>,
}

impl ForecastSeries {
    /// Mean forecast per day
    pub fn daily_mean(&self) -> f64 {
        stats::mean(&self.values)
    }

    /// Root mean square of the per-step standard deviations
    pub fn daily_std(&self) -> f64 {
        if self.step_std.is_empty() {
            return 0.0;
        }
        let sum_sq: f64 = self.step_std.iter().map(|s| s * s).sum();
        (sum_sq / self.step_std.len() as f64).sqrt()
    }

    /// Sample standard deviation of the point forecasts themselves
    pub fn point_spread(&self) -> f64 {
        stats::sample_std(&self.values)
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().chain(&self.step_std).all(|v| v.is_finite())
    }
}

/// Mean and sample standard deviation of a trailing window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingStats {
    pub mean: f64,
    pub std: f64,
}

/// Statistics over the last `min(window, len)` values
///
/// Returns `None` when fewer than `min_periods` values are available.
pub fn rolling_stats(values: &[f64], window: usize, min_periods: usize) -> Option<RollingStats> {
    let width = window.min(values.len());
    if width == 0 || width < min_periods {
        return None;
    }
    let tail = &values[values.len() - width..];
    Some(RollingStats {
        mean: stats::mean(tail),
        std: stats::sample_std(tail),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{at, date, expense, income};
    use rust_decimal_macros::dec;

    #[test]
    fn test_series_is_calendar_complete() {
        let txs = vec![
            income(1, "u1", at(2026, 3, 1), dec!(100)),
            expense(2, "u1", at(2026, 3, 1), dec!(40)),
            income(3, "u1", at(2026, 3, 4), dec!(300)),
        ];
        let series = DailySeries::from_transactions(&txs, date(2026, 3, 5)).unwrap();

        assert_eq!(series.start, date(2026, 3, 1));
        assert_eq!(series.history_days(), 5);
        assert_eq!(series.income, vec![100.0, 0.0, 0.0, 300.0, 0.0]);
        assert_eq!(series.expense, vec![40.0, 0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_series_ignores_future_transactions() {
        let txs = vec![income(1, "u1", at(2026, 4, 1), dec!(100))];
        assert!(DailySeries::from_transactions(&txs, date(2026, 3, 5)).is_none());
    }

    #[test]
    fn test_rolling_window_uses_tail() {
        let mut values = vec![1000.0; 10];
        values.extend(vec![10.0; 30]);
        let stats = rolling_stats(&values, 30, 7).unwrap();
        assert_eq!(stats.mean, 10.0);
        assert_eq!(stats.std, 0.0);
    }

    #[test]
    fn test_rolling_min_periods() {
        assert!(rolling_stats(&[1.0; 6], 30, 7).is_none());
        let stats = rolling_stats(&[1.0, 3.0, 1.0, 3.0, 1.0, 3.0, 2.0], 30, 7).unwrap();
        assert_eq!(stats.mean, 2.0);
    }
}
