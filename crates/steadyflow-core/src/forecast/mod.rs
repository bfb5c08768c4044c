//! Forecast Engine
//!
//! `predict` runs a cascade of [`ForecastTier`]s in order and takes the first
//! estimate:
//!
//! 1. [`ArtifactTier`] - a stored, pre-fitted model for the user
//! 2. [`OnlineArimaTier`] - ARIMA(1,1,1) fitted on the spot (180+ days)
//! 3. [`RollingBaselineTier`] - trailing 30-day mean/std (14+ days)
//!
//! If none produces an estimate the caller still gets a well-formed, zeroed
//! forecast flagged as `insufficient_data`.
//!
//! Every tier reduces to a daily income mean `m` and spread `s`. Bounds are
//! always `m ± k·s` per day (k = `bound_sigmas`, 2 by default) scaled to the
//! horizon, with the lower side floored at zero before outflow is removed.
//! Outflow always comes from the rolling mean of daily expenses, whichever
//! tier supplied income.

pub mod arima;
pub mod artifact;
pub mod series;
pub mod stability;
pub mod tiers;

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::{EngineConfig, FeatureConfig, ForecastConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::features::filter_outliers;
use crate::models::{CashflowPrediction, ModelUsed, RiskLevel};
use crate::money::{from_f64, round2};

pub use arima::ArimaModel;
pub use artifact::{
    Artifact, ArtifactKind, ArtifactStore, FileArtifactStore, MemoryArtifactStore,
    RollingBaselineModel, SeasonalTrendModel,
};
pub use series::{rolling_stats, DailySeries, ForecastSeries, RollingStats};
pub use tiers::{
    ArtifactTier, ForecastTier, OnlineArimaTier, RollingBaselineTier, TierContext, TierEstimate,
    TierOutcome,
};

/// One step of the cascade, kept on the forecast for diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierAttempt {
    pub tier: &'static str,
    pub produced: bool,
    /// Why the tier was skipped
    pub reason: Option<String>,
}

/// Cashflow forecast over a horizon of whole days
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub horizon_days: u32,
    pub expected_inflow: Decimal,
    pub expected_outflow: Decimal,
    pub net_cashflow: Decimal,
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub model_used: ModelUsed,
    /// Calendar days of history the forecast was built on
    pub history_days: i64,
    pub attempts: Vec<TierAttempt>,
}

/// Whether an artifact of one kind could be loaded for a user
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtifactAvailability {
    pub kind: ArtifactKind,
    pub available: bool,
    pub error: Option<String>,
}

pub struct ForecastEngine {
    db: Database,
    config: ForecastConfig,
    features: FeatureConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn ArtifactStore>,
    tiers: Vec<Box<dyn ForecastTier>>,
}

impl ForecastEngine {
    /// Build the engine and its bounded pool for online fits
    pub fn new(
        db: Database,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
        store: Arc<dyn ArtifactStore>,
    ) -> Result<Self> {
        let forecast = config.forecast.clone();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(forecast.online_fit_workers)
            .thread_name(|i| format!("steadyflow-fit-{}", i))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build model fit pool: {}", e)))?;

        let tiers: Vec<Box<dyn ForecastTier>> = vec![
            Box::new(ArtifactTier::new(store.clone(), forecast.clone())),
            Box::new(OnlineArimaTier::new(Arc::new(pool), forecast.clone())),
            Box::new(RollingBaselineTier::new(forecast.clone())),
        ];

        Ok(Self {
            db,
            config: forecast,
            features: config.features.clone(),
            clock,
            store,
            tiers,
        })
    }

    /// Engine reading artifacts from the configured models directory
    pub fn with_default_store(
        db: Database,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let store: Arc<dyn ArtifactStore> = match config.forecast.resolved_artifact_dir() {
            Some(dir) => Arc::new(FileArtifactStore::new(dir)),
            None => Arc::new(MemoryArtifactStore::new()),
        };
        Self::new(db, config, clock, store)
    }

    pub fn predict(&self, user_id: &str, horizon_days: u32) -> Result<Forecast> {
        if horizon_days == 0 {
            return Err(Error::InvalidData("horizon_days must be positive".to_string()));
        }

        let now = self.clock.now();
        let lookback = self
            .features
            .lookback_days()
            .max(self.config.online_min_history_days);
        let txs = self
            .db
            .list_transactions_since(user_id, now - Duration::days(lookback))?;
        let (kept, _) = filter_outliers(&txs, self.features.outlier_iqr_multiplier);
        let series = DailySeries::from_transactions(kept.iter().copied(), now.date_naive());

        let ctx = TierContext {
            user_id,
            horizon_days,
            series: series.as_ref(),
        };
        let history_days = ctx.history_days();

        let mut attempts = Vec::with_capacity(self.tiers.len());
        let mut winner = None;
        for tier in &self.tiers {
            match tier.estimate(&ctx) {
                TierOutcome::Estimate(estimate) => {
                    attempts.push(TierAttempt {
                        tier: tier.name(),
                        produced: true,
                        reason: None,
                    });
                    winner = Some(estimate);
                    break;
                }
                TierOutcome::Unavailable(reason) => {
                    debug!(user_id, tier = tier.name(), %reason, "Forecast tier unavailable");
                    attempts.push(TierAttempt {
                        tier: tier.name(),
                        produced: false,
                        reason: Some(reason),
                    });
                }
            }
        }

        let forecast = match winner {
            Some(estimate) => {
                let daily_outflow = series
                    .as_ref()
                    .and_then(|s| {
                        rolling_stats(
                            &s.expense,
                            self.config.rolling_window_days,
                            self.config.rolling_min_periods,
                        )
                    })
                    .map(|stats| stats.mean.max(0.0))
                    .unwrap_or(0.0);
                self.build(estimate, horizon_days, daily_outflow, history_days, attempts)
            }
            None => self.degenerate(horizon_days, history_days, attempts),
        };

        info!(
            user_id,
            horizon_days,
            history_days,
            model = %forecast.model_used,
            risk = %forecast.risk_level,
            "Forecast produced"
        );
        Ok(forecast)
    }

    fn build(
        &self,
        estimate: TierEstimate,
        horizon_days: u32,
        daily_outflow: f64,
        history_days: i64,
        attempts: Vec<TierAttempt>,
    ) -> Forecast {
        let h = f64::from(horizon_days);
        let k = self.config.bound_sigmas;
        let m = estimate.daily_mean.max(0.0);
        let s = estimate.daily_std.max(0.0);
        let outflow = daily_outflow * h;

        let expected_inflow = from_f64(m * h);
        let expected_outflow = from_f64(outflow);

        Forecast {
            horizon_days,
            expected_inflow,
            expected_outflow,
            net_cashflow: expected_inflow - expected_outflow,
            lower_bound: from_f64((m - k * s).max(0.0) * h - outflow),
            upper_bound: from_f64((m + k * s) * h - outflow),
            risk_level: estimate.risk_level,
            confidence: estimate.confidence,
            model_used: estimate.model_used,
            history_days,
            attempts,
        }
    }

    fn degenerate(
        &self,
        horizon_days: u32,
        history_days: i64,
        attempts: Vec<TierAttempt>,
    ) -> Forecast {
        Forecast {
            horizon_days,
            expected_inflow: Decimal::ZERO,
            expected_outflow: Decimal::ZERO,
            net_cashflow: Decimal::ZERO,
            lower_bound: Decimal::ZERO,
            upper_bound: Decimal::ZERO,
            risk_level: RiskLevel::High,
            confidence: self.config.degenerate_confidence,
            model_used: ModelUsed::InsufficientData,
            history_days,
            attempts,
        }
    }

    /// Predict and append the result to the prediction log
    pub fn save_prediction(&self, user_id: &str, horizon_days: u32) -> Result<CashflowPrediction> {
        let forecast = self.predict(user_id, horizon_days)?;
        let mut prediction = CashflowPrediction {
            id: 0,
            user_id: user_id.to_string(),
            horizon_days,
            expected_inflow: forecast.expected_inflow,
            expected_outflow: forecast.expected_outflow,
            net_cashflow: forecast.net_cashflow,
            lower_bound: forecast.lower_bound,
            upper_bound: forecast.upper_bound,
            risk_level: forecast.risk_level,
            model_used: forecast.model_used,
            confidence: round2(forecast.confidence),
            created_at: self.clock.now(),
        };
        prediction.id = self.db.insert_prediction(&prediction)?;
        Ok(prediction)
    }

    pub fn list_predictions(&self, user_id: &str, limit: usize) -> Result<Vec<CashflowPrediction>> {
        self.db.list_predictions(user_id, limit)
    }

    /// Which artifact kinds load for the user, in preference order
    pub fn artifact_availability(&self, user_id: &str) -> Vec<ArtifactAvailability> {
        ArtifactKind::PREFERENCE
            .iter()
            .map(|&kind| match self.store.load(user_id, kind) {
                Ok(found) => ArtifactAvailability {
                    kind,
                    available: found.is_some(),
                    error: None,
                },
                Err(e) => ArtifactAvailability {
                    kind,
                    available: false,
                    error: Some(e.to_string()),
                },
            })
            .collect()
    }

    /// Income stability over the most recent weekly features
    pub fn stability_score(&self, user_id: &str) -> Result<f64> {
        let features = self
            .db
            .list_weekly_features(user_id, self.config.stability_window_weeks as usize)?;
        Ok(stability::stability_score(&features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::test_utils::{at, daily_history, date, fixed_clock, weekly_series};
    use rust_decimal_macros::dec;

    fn engine_with(db: &Database, store: Arc<dyn ArtifactStore>) -> ForecastEngine {
        ForecastEngine::new(
            db.clone(),
            &EngineConfig::default(),
            fixed_clock(2026, 3, 31),
            store,
        )
        .unwrap()
    }

    /// 30 days of 1000/day income and 200/day spend ending 2026-03-31
    fn seed_steady_month(db: &Database, user: &str) {
        let end = at(2026, 3, 31);
        db.insert_transactions(&daily_history(user, end, 30, Category::FreelanceGig, |_| {
            dec!(1000)
        }))
        .unwrap();
        db.insert_transactions(&daily_history(user, end, 30, Category::FoodDelivery, |_| {
            dec!(200)
        }))
        .unwrap();
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let db = Database::in_memory().unwrap();
        let engine = engine_with(&db, Arc::new(MemoryArtifactStore::new()));
        assert!(matches!(engine.predict("u1", 0), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_no_history_is_degenerate_with_diagnostics() {
        let db = Database::in_memory().unwrap();
        let engine = engine_with(&db, Arc::new(MemoryArtifactStore::new()));

        let forecast = engine.predict("u1", 7).unwrap();
        assert_eq!(forecast.model_used, ModelUsed::InsufficientData);
        assert_eq!(forecast.expected_inflow, Decimal::ZERO);
        assert_eq!(forecast.risk_level, RiskLevel::High);
        assert_eq!(forecast.confidence, 0.3);
        assert_eq!(forecast.history_days, 0);

        let tiers: Vec<_> = forecast.attempts.iter().map(|a| a.tier).collect();
        assert_eq!(tiers, vec!["artifact", "online_arima", "rolling_baseline"]);
        assert!(forecast.attempts.iter().all(|a| !a.produced && a.reason.is_some()));
    }

    #[test]
    fn test_rolling_baseline_forecast() {
        let db = Database::in_memory().unwrap();
        seed_steady_month(&db, "u1");
        let engine = engine_with(&db, Arc::new(MemoryArtifactStore::new()));

        let forecast = engine.predict("u1", 7).unwrap();
        assert_eq!(forecast.model_used, ModelUsed::RollingBaseline);
        assert_eq!(forecast.history_days, 30);
        assert_eq!(forecast.expected_inflow, dec!(7000));
        assert_eq!(forecast.expected_outflow, dec!(1400));
        assert_eq!(forecast.net_cashflow, dec!(5600));
        // zero spread collapses the band onto the net
        assert_eq!(forecast.lower_bound, dec!(5600));
        assert_eq!(forecast.upper_bound, dec!(5600));
        assert_eq!(forecast.risk_level, RiskLevel::Low);
        assert_eq!(forecast.confidence, 0.85);
    }

    #[test]
    fn test_artifact_wins_over_history_but_outflow_stays_rolling() {
        let db = Database::in_memory().unwrap();
        seed_steady_month(&db, "u1");
        let store = Arc::new(MemoryArtifactStore::new());
        store
            .save(
                "u1",
                &Artifact::RollingBaseline(RollingBaselineModel {
                    mean: 500.0,
                    std: 100.0,
                }),
            )
            .unwrap();
        let engine = engine_with(&db, store);

        let forecast = engine.predict("u1", 7).unwrap();
        assert_eq!(forecast.model_used, ModelUsed::RollingBaselinePretrained);
        assert_eq!(forecast.expected_inflow, dec!(3500));
        assert_eq!(forecast.expected_outflow, dec!(1400));
        // (500 - 200) * 7 - 1400 and (500 + 200) * 7 - 1400
        assert_eq!(forecast.lower_bound, dec!(700));
        assert_eq!(forecast.upper_bound, dec!(3500));
        assert_eq!(forecast.attempts.len(), 1);
    }

    #[test]
    fn test_save_and_list_predictions() {
        let db = Database::in_memory().unwrap();
        seed_steady_month(&db, "u1");
        let engine = engine_with(&db, Arc::new(MemoryArtifactStore::new()));

        let saved = engine.save_prediction("u1", 14).unwrap();
        assert!(saved.id > 0);
        assert_eq!(saved.expected_inflow, dec!(14000));

        let listed = engine.list_predictions("u1", 10).unwrap();
        assert_eq!(listed, vec![saved]);
        assert!(engine.list_predictions("u2", 10).unwrap().is_empty());
    }

    #[test]
    fn test_artifact_availability_reports_each_kind() {
        let db = Database::in_memory().unwrap();
        let store = Arc::new(MemoryArtifactStore::new());
        store
            .save(
                "u1",
                &Artifact::RollingBaseline(RollingBaselineModel {
                    mean: 1.0,
                    std: 0.0,
                }),
            )
            .unwrap();
        let engine = engine_with(&db, store);

        let report = engine.artifact_availability("u1");
        let kinds: Vec<_> = report.iter().map(|a| (a.kind, a.available)).collect();
        assert_eq!(
            kinds,
            vec![
                (ArtifactKind::Arima, false),
                (ArtifactKind::SeasonalTrend, false),
                (ArtifactKind::RollingBaseline, true),
            ]
        );
        assert!(report.iter().all(|a| a.error.is_none()));
    }

    #[test]
    fn test_default_store_reads_configured_dir() {
        let dir = tempfile::tempdir().unwrap();
        FileArtifactStore::new(dir.path())
            .save(
                "u1",
                &Artifact::RollingBaseline(RollingBaselineModel {
                    mean: 200.0,
                    std: 0.0,
                }),
            )
            .unwrap();

        let mut config = EngineConfig::default();
        config.forecast.artifact_dir = Some(dir.path().to_path_buf());
        let db = Database::in_memory().unwrap();
        let engine =
            ForecastEngine::with_default_store(db, &config, fixed_clock(2026, 3, 31)).unwrap();

        let forecast = engine.predict("u1", 7).unwrap();
        assert_eq!(forecast.model_used, ModelUsed::RollingBaselinePretrained);
        assert_eq!(forecast.expected_inflow, dec!(1400));
    }

    #[test]
    fn test_stability_score_reads_recent_features() {
        let db = Database::in_memory().unwrap();
        let engine = engine_with(&db, Arc::new(MemoryArtifactStore::new()));
        assert_eq!(engine.stability_score("u1").unwrap(), 0.5);

        let mut weeks = weekly_series("u1", date(2026, 1, 5), &[dec!(10000); 6]);
        for w in &mut weeks {
            w.top_source_pct = 40.0;
        }
        db.upsert_weekly_features(&weeks, at(2026, 3, 31)).unwrap();
        // 1 - 0.3 * 0.4
        assert_eq!(engine.stability_score("u1").unwrap(), 0.88);
    }
}
