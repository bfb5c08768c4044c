//! Pre-trained forecast artifacts
//!
//! Artifacts are produced offline and only read here. Each one carries the
//! fitted state needed to forecast without touching transaction history.
//!
//! The file store keeps one JSON document per (kind, user), named
//! `<kind>_<user_id>.json`.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use super::arima::ArimaModel;
use super::series::ForecastSeries;
use crate::error::{Error, Result};

/// Algorithm family of a stored artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Arima,
    SeasonalTrend,
    RollingBaseline,
}

impl ArtifactKind {
    /// Lookup order when several artifacts exist for a user
    pub const PREFERENCE: [ArtifactKind; 3] = [
        ArtifactKind::Arima,
        ArtifactKind::SeasonalTrend,
        ArtifactKind::RollingBaseline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Arima => "arima",
            Self::SeasonalTrend => "seasonal_trend",
            Self::RollingBaseline => "rolling_baseline",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Additive level + linear trend + day-of-week model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonalTrendModel {
    pub level: f64,
    /// Change in level per day
    pub slope: f64,
    /// Additive effect per weekday, Monday first
    pub weekly: [f64; 7],
    pub resid_std: f64,
    /// Last date of training data; step 1 is the day after
    pub trained_through: NaiveDate,
}

impl SeasonalTrendModel {
    pub fn forecast(&self, horizon: usize) -> ForecastSeries {
        let values = (1..=horizon)
            .map(|step| {
                let date = self.trained_through + Duration::days(step as i64);
                let weekday = date.weekday().num_days_from_monday() as usize;
                (self.level + self.slope * step as f64 + self.weekly[weekday]).max(0.0)
            })
            .collect();
        ForecastSeries {
            values,
            step_std: vec![self.resid_std; horizon],
        }
    }
}

/// Stored trailing mean/std of daily income
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RollingBaselineModel {
    pub mean: f64,
    pub std: f64,
}

/// A loadable forecasting artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Artifact {
    Arima(ArimaModel),
    SeasonalTrend(SeasonalTrendModel),
    RollingBaseline(RollingBaselineModel),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Arima(_) => ArtifactKind::Arima,
            Self::SeasonalTrend(_) => ArtifactKind::SeasonalTrend,
            Self::RollingBaseline(_) => ArtifactKind::RollingBaseline,
        }
    }

    /// Daily forecast for the next `horizon` days
    pub fn forecast(&self, horizon: usize) -> ForecastSeries {
        match self {
            Self::Arima(model) => model.forecast(horizon),
            Self::SeasonalTrend(model) => model.forecast(horizon),
            Self::RollingBaseline(model) => ForecastSeries {
                values: vec![model.mean.max(0.0); horizon],
                step_std: vec![model.std.max(0.0); horizon],
            },
        }
    }
}

/// Read access to artifacts produced by an offline trainer
pub trait ArtifactStore: Send + Sync {
    /// `Ok(None)` when no artifact of `kind` exists for the user
    fn load(&self, user_id: &str, kind: ArtifactKind) -> Result<Option<Artifact>>;

    /// Store an artifact, replacing any previous one of the same kind
    fn save(&self, user_id: &str, artifact: &Artifact) -> Result<()>;
}

/// JSON files in a models directory
pub struct FileArtifactStore {
    dir: PathBuf,
}

impl FileArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, user_id: &str, kind: ArtifactKind) -> PathBuf {
        self.dir.join(format!("{}_{}.json", kind.as_str(), user_id))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn load(&self, user_id: &str, kind: ArtifactKind) -> Result<Option<Artifact>> {
        let path = self.path_for(user_id, kind);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let artifact: Artifact = serde_json::from_str(&content)?;
        if artifact.kind() != kind {
            return Err(Error::InvalidData(format!(
                "{} holds a {} artifact",
                path.display(),
                artifact.kind()
            )));
        }
        Ok(Some(artifact))
    }

    fn save(&self, user_id: &str, artifact: &Artifact) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(user_id, artifact.kind());
        // Write then rename so readers never see a partial file
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(artifact)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-process store, used in tests and by hosts that keep models in memory
#[derive(Default)]
pub struct MemoryArtifactStore {
    artifacts: RwLock<HashMap<(String, ArtifactKind), Artifact>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn load(&self, user_id: &str, kind: ArtifactKind) -> Result<Option<Artifact>> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|_| Error::InvalidData("artifact store lock poisoned".to_string()))?;
        Ok(artifacts.get(&(user_id.to_string(), kind)).cloned())
    }

    fn save(&self, user_id: &str, artifact: &Artifact) -> Result<()> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|_| Error::InvalidData("artifact store lock poisoned".to_string()))?;
        artifacts.insert((user_id.to_string(), artifact.kind()), artifact.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::date;

    fn seasonal() -> SeasonalTrendModel {
        SeasonalTrendModel {
            level: 1000.0,
            slope: 10.0,
            weekly: [100.0, 0.0, 0.0, 0.0, 0.0, -500.0, -2000.0],
            resid_std: 50.0,
            // a Sunday
            trained_through: date(2026, 3, 1),
        }
    }

    #[test]
    fn test_seasonal_forecast_applies_weekday_effects() {
        let forecast = seasonal().forecast(7);
        // Monday: level + slope + monday effect
        assert_eq!(forecast.values[0], 1110.0);
        // Saturday
        assert_eq!(forecast.values[5], 1000.0 + 60.0 - 500.0);
        // Sunday is floored at zero
        assert_eq!(forecast.values[6], 0.0);
        assert_eq!(forecast.step_std, vec![50.0; 7]);
    }

    #[test]
    fn test_rolling_baseline_forecast_is_flat() {
        let artifact = Artifact::RollingBaseline(RollingBaselineModel {
            mean: 1200.0,
            std: 300.0,
        });
        let forecast = artifact.forecast(5);
        assert_eq!(forecast.values, vec![1200.0; 5]);
        assert_eq!(forecast.daily_std(), 300.0);
    }

    #[test]
    fn test_artifact_json_is_tagged() {
        let artifact = Artifact::RollingBaseline(RollingBaselineModel {
            mean: 1.0,
            std: 2.0,
        });
        let json = serde_json::to_value(&artifact).unwrap();
        assert_eq!(json["kind"], "rolling_baseline");
        assert_eq!(json["mean"], 1.0);
    }

    #[test]
    fn test_file_store_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileArtifactStore::new(dir.path());

        assert!(store.load("u1", ArtifactKind::SeasonalTrend).unwrap().is_none());

        let artifact = Artifact::SeasonalTrend(seasonal());
        store.save("u1", &artifact).unwrap();
        assert!(dir.path().join("seasonal_trend_u1.json").exists());

        let loaded = store.load("u1", ArtifactKind::SeasonalTrend).unwrap();
        assert_eq!(loaded, Some(artifact));
        assert!(store.load("u2", ArtifactKind::SeasonalTrend).unwrap().is_none());
    }

    #[test]
    fn test_file_store_corrupt_artifact_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("arima_u1.json"), "{not json").unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert!(matches!(
            store.load("u1", ArtifactKind::Arima),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_file_store_kind_mismatch_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = Artifact::RollingBaseline(RollingBaselineModel {
            mean: 1.0,
            std: 1.0,
        });
        fs::write(
            dir.path().join("arima_u1.json"),
            serde_json::to_string(&baseline).unwrap(),
        )
        .unwrap();
        let store = FileArtifactStore::new(dir.path());
        assert!(matches!(
            store.load("u1", ArtifactKind::Arima),
            Err(Error::InvalidData(_))
        ));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryArtifactStore::new();
        let artifact = Artifact::RollingBaseline(RollingBaselineModel {
            mean: 10.0,
            std: 1.0,
        });
        store.save("u1", &artifact).unwrap();
        assert_eq!(
            store.load("u1", ArtifactKind::RollingBaseline).unwrap(),
            Some(artifact)
        );
        assert!(store.load("u1", ArtifactKind::Arima).unwrap().is_none());
    }
}
