//! Buffer Manager result types

use rust_decimal::Decimal;
use serde::Serialize;

use crate::models::{ModelUsed, SmoothingBuffer};

/// Outcome of a deposit after the capacity clamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositResult {
    pub requested: Decimal,
    /// What actually landed in the buffer
    pub accepted: Decimal,
    pub buffer: SmoothingBuffer,
}

impl DepositResult {
    pub fn clamped(&self) -> bool {
        self.accepted < self.requested
    }
}

/// Recommended weekly release with its derivation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseProposal {
    pub user_id: String,
    pub recommended_amount: Decimal,
    pub buffer_balance: Decimal,
    /// `min(1, balance / threshold)`
    pub buffer_health: f64,
    pub risk_score: f64,
    /// Lower bound of the 7-day forecast, floored at zero
    pub worst_case_income: Decimal,
    pub avg_weekly_income: Decimal,
    /// `(worst_case_income + avg_weekly_income) / 2`
    pub base_release: Decimal,
    /// Most a single release may propose
    pub release_cap: Decimal,
    pub forecast_model: ModelUsed,
    pub explanation: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingStatus {
    InsufficientData,
    ExcessDeposited,
    DeficitCovered,
    DeficitWarning,
    Normal,
}

impl SmoothingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::ExcessDeposited => "excess_deposited",
            Self::DeficitCovered => "deficit_covered",
            Self::DeficitWarning => "deficit_warning",
            Self::Normal => "normal",
        }
    }
}

impl std::fmt::Display for SmoothingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of comparing the latest week against the trailing average
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothingOutcome {
    pub status: SmoothingStatus,
    /// Income of the most recent week, when there is one
    pub latest_income: Option<Decimal>,
    pub trailing_average: Option<Decimal>,
    /// Deposited amount for an excess, gap for a deficit, zero otherwise
    pub amount: Decimal,
    pub buffer_balance: Decimal,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_names() {
        assert_eq!(SmoothingStatus::ExcessDeposited.as_str(), "excess_deposited");
        assert_eq!(
            serde_json::to_value(SmoothingStatus::InsufficientData).unwrap(),
            "insufficient_data"
        );
    }
}
