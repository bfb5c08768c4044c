//! Steadyflow Core Library
//!
//! Cashflow forecasting and income smoothing for people paid irregularly:
//! - Transaction store and derived tables (SQLite)
//! - Feature extraction into weekly statistics and income sources
//! - Three-tier cashflow forecasting (stored artifact, online ARIMA, rolling baseline)
//! - Smoothing buffer with weekly release proposals
//! - Rule-based insights over the weekly feature stream
//! - Safe-to-spend breakdowns

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod forecast;
pub mod insights;
pub mod models;
pub mod money;
pub mod safe_to_spend;
pub mod smoothing;
pub mod stats;

/// Fixture builders for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::EngineConfig;
pub use db::{Database, InsightFilter};
pub use error::{Error, Result};
pub use features::FeatureExtractor;
pub use forecast::{
    ArtifactAvailability, ArtifactKind, ArtifactStore, FileArtifactStore, Forecast,
    ForecastEngine, MemoryArtifactStore, TierAttempt,
};
pub use insights::{Finding, Insight, InsightEngine, InsightType, Severity};
pub use models::{
    CashflowPrediction, Category, Direction, IncomeSource, ModelUsed, NewTransaction, RiskLevel,
    SmoothingBuffer, Transaction, TransactionCorrection, UserProfile, WeeklyFeature,
    WeeklyRelease,
};
pub use safe_to_spend::{SafeToSpend, SafeToSpendCalculator};
pub use smoothing::{BufferManager, DepositResult, ReleaseProposal, SmoothingOutcome, SmoothingStatus};
