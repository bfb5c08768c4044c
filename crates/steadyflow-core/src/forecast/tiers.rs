//! Forecast tiers
//!
//! Each tier answers one question: can I estimate daily income for this
//! user right now? The answer is a [`TierOutcome`], never an error, so the
//! cascade can move on and record why a tier was skipped.

use std::sync::Arc;

use rayon::ThreadPool;

use super::arima::ArimaModel;
use super::artifact::{Artifact, ArtifactKind, ArtifactStore};
use super::series::{rolling_stats, DailySeries};
use crate::config::ForecastConfig;
use crate::models::{ModelUsed, RiskLevel};

/// Daily income estimate produced by a tier
#[derive(Debug, Clone, PartialEq)]
pub struct TierEstimate {
    pub model_used: ModelUsed,
    pub daily_mean: f64,
    pub daily_std: f64,
    pub risk_level: RiskLevel,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierOutcome {
    Estimate(TierEstimate),
    Unavailable(String),
}

/// What a tier gets to look at
pub struct TierContext<'a> {
    pub user_id: &'a str,
    pub horizon_days: u32,
    /// `None` when the user has no transactions in the window
    pub series: Option<&'a DailySeries>,
}

impl TierContext<'_> {
    pub fn history_days(&self) -> i64 {
        self.series.map(DailySeries::history_days).unwrap_or(0)
    }
}

pub trait ForecastTier: Send + Sync {
    /// Short identifier used in diagnostics
    fn name(&self) -> &'static str;

    fn estimate(&self, ctx: &TierContext<'_>) -> TierOutcome;
}

/// Risk level from the coefficient of variation of daily income
///
/// A zero mean counts as maximal variation.
pub fn risk_from_cv(mean: f64, std: f64, config: &ForecastConfig) -> RiskLevel {
    let cv = if mean > 0.0 { std / mean } else { 1.0 };
    if cv < config.low_risk_cv {
        RiskLevel::Low
    } else if cv < config.medium_risk_cv {
        RiskLevel::Medium
    } else {
        RiskLevel::High
    }
}

fn confidence_for(risk: RiskLevel, config: &ForecastConfig) -> f64 {
    match risk {
        RiskLevel::Low => config.low_risk_confidence,
        RiskLevel::Medium => config.medium_risk_confidence,
        RiskLevel::High => config.high_risk_confidence,
    }
}

/// Tier 1: forecast straight from a stored artifact
pub struct ArtifactTier {
    store: Arc<dyn ArtifactStore>,
    config: ForecastConfig,
}

impl ArtifactTier {
    pub fn new(store: Arc<dyn ArtifactStore>, config: ForecastConfig) -> Self {
        Self { store, config }
    }

    fn model_used(kind: ArtifactKind) -> ModelUsed {
        match kind {
            ArtifactKind::Arima => ModelUsed::ArimaPretrained,
            ArtifactKind::SeasonalTrend => ModelUsed::SeasonalTrendPretrained,
            ArtifactKind::RollingBaseline => ModelUsed::RollingBaselinePretrained,
        }
    }

    fn estimate_from(&self, artifact: &Artifact, horizon: usize) -> Option<TierEstimate> {
        let (mean, std) = match artifact {
            Artifact::RollingBaseline(m) => (m.mean.max(0.0), m.std.max(0.0)),
            other => {
                let series = other.forecast(horizon);
                if !series.is_finite() {
                    return None;
                }
                (series.daily_mean().max(0.0), series.daily_std().max(0.0))
            }
        };
        if !mean.is_finite() || !std.is_finite() {
            return None;
        }

        Some(TierEstimate {
            model_used: Self::model_used(artifact.kind()),
            daily_mean: mean,
            daily_std: std,
            risk_level: risk_from_cv(mean, std, &self.config),
            confidence: self.config.artifact_confidence,
        })
    }
}

impl ForecastTier for ArtifactTier {
    fn name(&self) -> &'static str {
        "artifact"
    }

    fn estimate(&self, ctx: &TierContext<'_>) -> TierOutcome {
        let mut reasons = Vec::new();

        for kind in ArtifactKind::PREFERENCE {
            match self.store.load(ctx.user_id, kind) {
                Ok(Some(artifact)) => {
                    match self.estimate_from(&artifact, ctx.horizon_days as usize) {
                        Some(estimate) => return TierOutcome::Estimate(estimate),
                        None => reasons.push(format!("{} artifact produced non-finite output", kind)),
                    }
                }
                Ok(None) => reasons.push(format!("no {} artifact", kind)),
                Err(e) => reasons.push(format!("{} artifact failed to load: {}", kind, e)),
            }
        }

        TierOutcome::Unavailable(reasons.join("; "))
    }
}

/// Tier 2: fit ARIMA(1,1,1) on the daily income series
///
/// Fits run on a dedicated bounded pool so a burst of them cannot occupy
/// every request thread.
pub struct OnlineArimaTier {
    pool: Arc<ThreadPool>,
    config: ForecastConfig,
}

impl OnlineArimaTier {
    pub fn new(pool: Arc<ThreadPool>, config: ForecastConfig) -> Self {
        Self { pool, config }
    }
}

impl ForecastTier for OnlineArimaTier {
    fn name(&self) -> &'static str {
        "online_arima"
    }

    fn estimate(&self, ctx: &TierContext<'_>) -> TierOutcome {
        let history = ctx.history_days();
        let series = match ctx.series {
            Some(s) if history >= self.config.online_min_history_days => s,
            _ => {
                return TierOutcome::Unavailable(format!(
                    "{} days of history, need {}",
                    history, self.config.online_min_history_days
                ))
            }
        };

        let fitted = self.pool.install(|| ArimaModel::fit(&series.income));
        let model = match fitted {
            Ok(model) => model,
            Err(e) => return TierOutcome::Unavailable(e.to_string()),
        };

        let forecast = model.forecast(ctx.horizon_days as usize);
        if !forecast.is_finite() {
            return TierOutcome::Unavailable("forecast is not finite".to_string());
        }
        // The band comes from how far the point forecasts spread, and an
        // on-the-fly fit is always rated medium risk
        let mean = forecast.daily_mean().max(0.0);
        let std = forecast.point_spread().max(0.0);

        TierOutcome::Estimate(TierEstimate {
            model_used: ModelUsed::ArimaOnline,
            daily_mean: mean,
            daily_std: std,
            risk_level: RiskLevel::Medium,
            confidence: self.config.online_confidence,
        })
    }
}

/// Tier 3: trailing mean/std of daily income
pub struct RollingBaselineTier {
    config: ForecastConfig,
}

impl RollingBaselineTier {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }
}

impl ForecastTier for RollingBaselineTier {
    fn name(&self) -> &'static str {
        "rolling_baseline"
    }

    fn estimate(&self, ctx: &TierContext<'_>) -> TierOutcome {
        let history = ctx.history_days();
        let series = match ctx.series {
            Some(s) if history >= self.config.min_history_days => s,
            _ => {
                return TierOutcome::Unavailable(format!(
                    "{} days of history, need {}",
                    history, self.config.min_history_days
                ))
            }
        };

        let Some(stats) = rolling_stats(
            &series.income,
            self.config.rolling_window_days,
            self.config.rolling_min_periods,
        ) else {
            return TierOutcome::Unavailable("rolling window below minimum periods".to_string());
        };

        let risk_level = risk_from_cv(stats.mean, stats.std, &self.config);
        TierOutcome::Estimate(TierEstimate {
            model_used: ModelUsed::RollingBaseline,
            daily_mean: stats.mean.max(0.0),
            daily_std: stats.std.max(0.0),
            risk_level,
            confidence: confidence_for(risk_level, &self.config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::artifact::{MemoryArtifactStore, RollingBaselineModel};
    use crate::test_utils::date;

    fn series(income: Vec<f64>) -> DailySeries {
        let expense = vec![0.0; income.len()];
        DailySeries {
            start: date(2026, 1, 1),
            income,
            expense,
        }
    }

    fn ctx<'a>(series: Option<&'a DailySeries>) -> TierContext<'a> {
        TierContext {
            user_id: "u1",
            horizon_days: 7,
            series,
        }
    }

    #[test]
    fn test_risk_from_cv_breakpoints() {
        let config = ForecastConfig::default();
        assert_eq!(risk_from_cv(100.0, 20.0, &config), RiskLevel::Low);
        assert_eq!(risk_from_cv(100.0, 30.0, &config), RiskLevel::Medium);
        assert_eq!(risk_from_cv(100.0, 59.0, &config), RiskLevel::Medium);
        assert_eq!(risk_from_cv(100.0, 60.0, &config), RiskLevel::High);
        assert_eq!(risk_from_cv(0.0, 0.0, &config), RiskLevel::High);
    }

    #[test]
    fn test_baseline_needs_min_history() {
        let tier = RollingBaselineTier::new(ForecastConfig::default());
        let s = series(vec![100.0; 13]);
        assert!(matches!(tier.estimate(&ctx(Some(&s))), TierOutcome::Unavailable(_)));
        assert!(matches!(tier.estimate(&ctx(None)), TierOutcome::Unavailable(_)));
    }

    #[test]
    fn test_baseline_steady_income_is_low_risk() {
        let tier = RollingBaselineTier::new(ForecastConfig::default());
        let s = series(vec![1000.0; 40]);
        match tier.estimate(&ctx(Some(&s))) {
            TierOutcome::Estimate(e) => {
                assert_eq!(e.model_used, ModelUsed::RollingBaseline);
                assert_eq!(e.daily_mean, 1000.0);
                assert_eq!(e.daily_std, 0.0);
                assert_eq!(e.risk_level, RiskLevel::Low);
                assert_eq!(e.confidence, 0.85);
            }
            other => panic!("expected estimate, got {:?}", other),
        }
    }

    #[test]
    fn test_baseline_sparse_income_is_high_risk() {
        let tier = RollingBaselineTier::new(ForecastConfig::default());
        let income: Vec<f64> = (0..30).map(|i| if i % 7 == 0 { 7000.0 } else { 0.0 }).collect();
        let s = series(income);
        match tier.estimate(&ctx(Some(&s))) {
            TierOutcome::Estimate(e) => {
                assert_eq!(e.risk_level, RiskLevel::High);
                assert_eq!(e.confidence, 0.50);
            }
            other => panic!("expected estimate, got {:?}", other),
        }
    }

    #[test]
    fn test_online_tier_needs_long_history() {
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap());
        let tier = OnlineArimaTier::new(pool, ForecastConfig::default());
        let s = series(vec![100.0; 100]);
        match tier.estimate(&ctx(Some(&s))) {
            TierOutcome::Unavailable(reason) => assert!(reason.contains("need 180")),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_online_tier_fit_failure_is_unavailable() {
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap());
        let tier = OnlineArimaTier::new(pool, ForecastConfig::default());
        // constant income cannot be fitted
        let s = series(vec![500.0; 200]);
        match tier.estimate(&ctx(Some(&s))) {
            TierOutcome::Unavailable(reason) => assert!(reason.contains("zero variance")),
            other => panic!("expected unavailable, got {:?}", other),
        }
    }

    #[test]
    fn test_online_band_is_spread_of_point_forecasts() {
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(1).build().unwrap());
        let tier = OnlineArimaTier::new(pool, ForecastConfig::default());
        let income: Vec<f64> = (0..200)
            .map(|i| 800.0 + 5.0 * i as f64 + ((i * 37) % 11) as f64 * 60.0)
            .collect();
        let s = series(income.clone());

        let expected = ArimaModel::fit(&income).unwrap().forecast(7);
        match tier.estimate(&ctx(Some(&s))) {
            TierOutcome::Estimate(e) => {
                assert_eq!(e.model_used, ModelUsed::ArimaOnline);
                assert_eq!(e.daily_mean, expected.daily_mean().max(0.0));
                assert_eq!(e.daily_std, crate::stats::sample_std(&expected.values));
                assert_eq!(e.risk_level, RiskLevel::Medium);
                assert_eq!(e.confidence, 0.75);
            }
            other => panic!("expected estimate, got {:?}", other),
        }
    }

    #[test]
    fn test_artifact_tier_prefers_arima_and_reports_missing() {
        let store = Arc::new(MemoryArtifactStore::new());
        let tier = ArtifactTier::new(store.clone(), ForecastConfig::default());

        match tier.estimate(&ctx(None)) {
            TierOutcome::Unavailable(reason) => {
                assert!(reason.contains("no arima artifact"));
                assert!(reason.contains("no rolling_baseline artifact"));
            }
            other => panic!("expected unavailable, got {:?}", other),
        }

        store
            .save(
                "u1",
                &Artifact::RollingBaseline(RollingBaselineModel {
                    mean: 1000.0,
                    std: 100.0,
                }),
            )
            .unwrap();
        match tier.estimate(&ctx(None)) {
            TierOutcome::Estimate(e) => {
                assert_eq!(e.model_used, ModelUsed::RollingBaselinePretrained);
                assert_eq!(e.risk_level, RiskLevel::Low);
                assert_eq!(e.confidence, 0.85);
            }
            other => panic!("expected estimate, got {:?}", other),
        }

        store
            .save(
                "u1",
                &Artifact::Arima(ArimaModel {
                    c: 0.0,
                    phi: 0.0,
                    theta: 0.0,
                    last_level: 900.0,
                    last_diff: 0.0,
                    last_resid: 0.0,
                    sigma: 10.0,
                }),
            )
            .unwrap();
        match tier.estimate(&ctx(None)) {
            TierOutcome::Estimate(e) => assert_eq!(e.model_used, ModelUsed::ArimaPretrained),
            other => panic!("expected estimate, got {:?}", other),
        }
    }
}
