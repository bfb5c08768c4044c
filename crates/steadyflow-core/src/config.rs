//! Engine configuration
//!
//! Every threshold the engine uses lives here. A single `EngineConfig` is
//! built at startup and handed to each component, which keeps its own copy
//! of the section it needs.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/steadyflow/config/steadyflow.toml)
//! 2. Fall back to embedded defaults (compiled into binary)

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/steadyflow.toml");

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub features: FeatureConfig,
    pub forecast: ForecastConfig,
    pub buffer: BufferConfig,
    pub insights: InsightConfig,
    pub safe_to_spend: SafeToSpendConfig,
}

/// Feature extraction windows and outlier filtering
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub lookback_months: u32,
    pub source_lookback_months: u32,
    pub days_per_month: u32,
    pub outlier_iqr_multiplier: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lookback_months: 6,
            source_lookback_months: 3,
            days_per_month: 30,
            outlier_iqr_multiplier: 3.0,
        }
    }
}

impl FeatureConfig {
    pub fn lookback_days(&self) -> i64 {
        i64::from(self.lookback_months) * i64::from(self.days_per_month)
    }

    pub fn source_lookback_days(&self) -> i64 {
        i64::from(self.source_lookback_months) * i64::from(self.days_per_month)
    }
}

/// Forecast cascade thresholds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Below this much history the engine returns a degenerate forecast
    pub min_history_days: i64,
    /// History required before an online autoregressive fit is attempted
    pub online_min_history_days: i64,
    pub rolling_window_days: usize,
    pub rolling_min_periods: usize,
    pub bound_sigmas: f64,
    pub low_risk_cv: f64,
    pub medium_risk_cv: f64,
    pub low_risk_confidence: f64,
    pub medium_risk_confidence: f64,
    pub high_risk_confidence: f64,
    pub degenerate_confidence: f64,
    pub artifact_confidence: f64,
    pub online_confidence: f64,
    pub online_fit_workers: usize,
    pub stability_window_weeks: u32,
    /// Where pre-trained artifacts live; `None` means the platform data dir
    pub artifact_dir: Option<PathBuf>,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_history_days: 14,
            online_min_history_days: 180,
            rolling_window_days: 30,
            rolling_min_periods: 7,
            bound_sigmas: 2.0,
            low_risk_cv: 0.3,
            medium_risk_cv: 0.6,
            low_risk_confidence: 0.85,
            medium_risk_confidence: 0.70,
            high_risk_confidence: 0.50,
            degenerate_confidence: 0.3,
            artifact_confidence: 0.85,
            online_confidence: 0.75,
            online_fit_workers: 2,
            stability_window_weeks: 12,
            artifact_dir: None,
        }
    }
}

impl ForecastConfig {
    /// Artifact directory, resolving the platform default when unset
    pub fn resolved_artifact_dir(&self) -> Option<PathBuf> {
        self.artifact_dir
            .clone()
            .or_else(|| default_data_dir().map(|d| d.join("models")))
    }
}

/// Smoothing buffer defaults and release policy
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub min_threshold: f64,
    pub max_capacity: f64,
    pub initial_risk_score: f64,
    /// Share of the balance a single release may propose
    pub release_reserve_ratio: f64,
    /// Weekly income assumed when no feature history exists
    pub default_weekly_income: f64,
    pub income_window_weeks: u32,
    pub excess_ratio: f64,
    pub deficit_ratio: f64,
    pub risk: RiskBreakpoints,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min_threshold: 5000.0,
            max_capacity: 100_000.0,
            initial_risk_score: 0.5,
            release_reserve_ratio: 0.8,
            default_weekly_income: 15_000.0,
            income_window_weeks: 4,
            excess_ratio: 1.2,
            deficit_ratio: 0.8,
            risk: RiskBreakpoints::default(),
        }
    }
}

/// Buffer risk step function, expressed as multiples of the minimum threshold
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskBreakpoints {
    pub critical_below: f64,
    pub critical_score: f64,
    pub low_below: f64,
    pub low_score: f64,
    pub moderate_below: f64,
    pub moderate_score: f64,
    pub healthy_score: f64,
}

impl Default for RiskBreakpoints {
    fn default() -> Self {
        Self {
            critical_below: 0.5,
            critical_score: 0.9,
            low_below: 1.0,
            low_score: 0.6,
            moderate_below: 2.0,
            moderate_score: 0.3,
            healthy_score: 0.1,
        }
    }
}

impl RiskBreakpoints {
    /// Risk score for a balance measured against its minimum threshold
    pub fn score(&self, balance: f64, threshold: f64) -> f64 {
        if balance < threshold * self.critical_below {
            self.critical_score
        } else if balance < threshold * self.low_below {
            self.low_score
        } else if balance < threshold * self.moderate_below {
            self.moderate_score
        } else {
            self.healthy_score
        }
    }
}

/// Insight rule thresholds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct InsightConfig {
    pub history_weeks: u32,
    pub volatility_spike_ratio: f64,
    pub concentration_pct: f64,
    pub expense_creep_ratio: f64,
    pub low_income_weekly: f64,
    pub positive_trend_ratio: f64,
    pub buffer_draw_releases: usize,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            history_weeks: 8,
            volatility_spike_ratio: 0.7,
            concentration_pct: 60.0,
            expense_creep_ratio: 1.2,
            low_income_weekly: 5000.0,
            positive_trend_ratio: 1.15,
            buffer_draw_releases: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SafeToSpendConfig {
    pub weeks_per_month: f64,
    pub default_volatility_multiplier: f64,
    pub volatility_window_weeks: u32,
}

impl Default for SafeToSpendConfig {
    fn default() -> Self {
        Self {
            weeks_per_month: 4.33,
            default_volatility_multiplier: 1.5,
            volatility_window_weeks: 4,
        }
    }
}

impl EngineConfig {
    /// Load from the default override location, else the embedded defaults
    pub fn load() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::from_path(&path),
            _ => Self::parse(DEFAULT_CONFIG),
        }
    }

    /// Load from an explicit path, falling back to embedded defaults if absent
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Self::parse(DEFAULT_CONFIG);
        }
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    /// Parse config from TOML content
    pub fn parse(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.buffer.min_threshold < 0.0 || self.buffer.max_capacity < self.buffer.min_threshold
        {
            return Err(Error::Config(
                "buffer.max_capacity must be >= buffer.min_threshold >= 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.buffer.release_reserve_ratio) {
            return Err(Error::Config(
                "buffer.release_reserve_ratio must be within [0, 1]".to_string(),
            ));
        }
        if self.forecast.bound_sigmas <= 0.0 {
            return Err(Error::Config("forecast.bound_sigmas must be positive".to_string()));
        }
        if self.forecast.online_fit_workers == 0 {
            return Err(Error::Config(
                "forecast.online_fit_workers must be at least 1".to_string(),
            ));
        }
        if self.forecast.rolling_min_periods == 0 || self.forecast.rolling_window_days == 0 {
            return Err(Error::Config(
                "forecast rolling window and min periods must be positive".to_string(),
            ));
        }
        if self.safe_to_spend.weeks_per_month <= 0.0 {
            return Err(Error::Config(
                "safe_to_spend.weeks_per_month must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Platform data directory for steadyflow
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("steadyflow"))
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    default_data_dir().map(|d| d.join("config").join("steadyflow.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_config_matches_defaults() {
        let parsed = EngineConfig::parse(DEFAULT_CONFIG).unwrap();
        assert_eq!(parsed, EngineConfig::default());
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = EngineConfig::parse(
            r#"
            [buffer]
            min_threshold = 2000.0
            "#,
        )
        .unwrap();

        assert_eq!(config.buffer.min_threshold, 2000.0);
        assert_eq!(config.buffer.max_capacity, 100_000.0);
        assert_eq!(config.forecast, ForecastConfig::default());
    }

    #[test]
    fn test_invalid_capacity_rejected() {
        let result = EngineConfig::parse(
            r#"
            [buffer]
            min_threshold = 10.0
            max_capacity = 5.0
            "#,
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(matches!(
            EngineConfig::parse("[forecast\nbound_sigmas = "),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_missing_override_file_uses_defaults() {
        let config = EngineConfig::from_path(Path::new("/nonexistent/steadyflow.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_risk_breakpoints() {
        let risk = RiskBreakpoints::default();
        assert_eq!(risk.score(2000.0, 5000.0), 0.9);
        assert_eq!(risk.score(4000.0, 5000.0), 0.6);
        assert_eq!(risk.score(9000.0, 5000.0), 0.3);
        assert_eq!(risk.score(10_000.0, 5000.0), 0.1);
    }

    #[test]
    fn test_lookback_days() {
        let features = FeatureConfig::default();
        assert_eq!(features.lookback_days(), 180);
        assert_eq!(features.source_lookback_days(), 90);
    }
}
