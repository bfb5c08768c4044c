//! Income stability score
//!
//! A single number in [0, 1] summarising how predictable a user's weekly
//! income is. It blends three penalties:
//!
//! | weight | penalty                                   |
//! |--------|-------------------------------------------|
//! | 0.4    | coefficient of variation of weekly income |
//! | 0.3    | average top-source share                  |
//! | 0.3    | variance ratio, capped at 1               |

use crate::models::WeeklyFeature;
use crate::money::{round2, to_f64};
use crate::stats;

/// Score returned when there are fewer than two weeks to compare
pub const NEUTRAL_STABILITY: f64 = 0.5;

const CV_WEIGHT: f64 = 0.4;
const CONCENTRATION_WEIGHT: f64 = 0.3;
const VARIANCE_WEIGHT: f64 = 0.3;

pub fn stability_score(features: &[WeeklyFeature]) -> f64 {
    if features.len() < 2 {
        return NEUTRAL_STABILITY;
    }

    let incomes: Vec<f64> = features.iter().map(|f| to_f64(f.total_income)).collect();
    let mean = stats::mean(&incomes);
    let std = stats::population_std(&incomes);

    let cv = stats::coefficient_of_variation(mean, std, 1.0);
    let variance_ratio = if mean > 0.0 {
        ((std * std) / (mean * mean)).min(1.0)
    } else {
        1.0
    };
    let top_pct: Vec<f64> = features.iter().map(|f| f.top_source_pct).collect();
    let avg_top = stats::mean(&top_pct) / 100.0;

    let penalty = CV_WEIGHT * cv + CONCENTRATION_WEIGHT * avg_top + VARIANCE_WEIGHT * variance_ratio;
    round2((1.0 - penalty).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{date, weekly_series};
    use rust_decimal_macros::dec;

    #[test]
    fn test_too_few_weeks_is_neutral() {
        assert_eq!(stability_score(&[]), 0.5);
        let one = weekly_series("u1", date(2026, 3, 2), &[dec!(1000)]);
        assert_eq!(stability_score(&one), 0.5);
    }

    #[test]
    fn test_identical_weeks_penalised_only_for_concentration() {
        let mut weeks = weekly_series("u1", date(2026, 1, 5), &[dec!(1000); 4]);
        for w in &mut weeks {
            w.top_source_pct = 50.0;
        }
        // 1 - 0.3 * 0.5
        assert_eq!(stability_score(&weeks), 0.85);
    }

    #[test]
    fn test_erratic_income_scores_low() {
        let weeks = weekly_series(
            "u1",
            date(2026, 1, 5),
            &[dec!(0), dec!(9000), dec!(0), dec!(200), dec!(0), dec!(12000)],
        );
        let score = stability_score(&weeks);
        assert!((0.0..0.3).contains(&score), "score {}", score);
    }

    #[test]
    fn test_no_income_clamps_to_zero() {
        let weeks = weekly_series("u1", date(2026, 1, 5), &[dec!(0); 3]);
        // cv 1, var 1, top 0 -> 1 - 0.7
        assert_eq!(stability_score(&weeks), 0.3);
    }
}
