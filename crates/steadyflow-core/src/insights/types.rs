//! Core types for the Insight Engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Types of insights that can be generated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightType {
    /// Latest week's income volatility is unusually high
    VolatilitySpike,
    /// Most of the latest week's income came from one category
    SourceConcentration,
    /// The buffer is being drawn down faster than it refills
    BufferDrawFrequent,
    /// Daily spending has been climbing for a month
    ExpenseCreep,
    /// Latest week's income is below the survival floor
    LowIncomeWarning,
    /// Income has been rising for a month
    PositiveTrend,
}

impl InsightType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsightType::VolatilitySpike => "volatility_spike",
            InsightType::SourceConcentration => "source_concentration",
            InsightType::BufferDrawFrequent => "buffer_draw_frequent",
            InsightType::ExpenseCreep => "expense_creep",
            InsightType::LowIncomeWarning => "low_income_warning",
            InsightType::PositiveTrend => "positive_trend",
        }
    }
}

impl fmt::Display for InsightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for InsightType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "volatility_spike" => Ok(InsightType::VolatilitySpike),
            "source_concentration" => Ok(InsightType::SourceConcentration),
            "buffer_draw_frequent" => Ok(InsightType::BufferDrawFrequent),
            "expense_creep" => Ok(InsightType::ExpenseCreep),
            "low_income_warning" => Ok(InsightType::LowIncomeWarning),
            "positive_trend" => Ok(InsightType::PositiveTrend),
            _ => Err(format!("Unknown insight type: {}", s)),
        }
    }
}

/// Severity level of an insight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational - no action needed
    Info,
    /// Should be addressed soon
    Warning,
    /// Requires immediate attention
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    /// Numeric priority for sorting (higher = more urgent)
    pub fn priority(&self) -> u8 {
        match self {
            Severity::Info => 1,
            Severity::Warning => 2,
            Severity::Critical => 3,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("Unknown severity: {}", s)),
        }
    }
}

/// A finding produced by an insight rule (before persistence)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Rule that fired
    pub insight_type: InsightType,
    pub severity: Severity,
    /// Templated sentence shown to the user
    pub explanation: String,
    /// Numbers behind the explanation, for programmatic consumers
    pub metrics: serde_json::Value,
}

impl Finding {
    pub fn new(insight_type: InsightType, severity: Severity, explanation: impl Into<String>) -> Self {
        Self {
            insight_type,
            severity,
            explanation: explanation.into(),
            metrics: serde_json::Value::Null,
        }
    }

    /// Add structured metrics payload
    pub fn with_metrics(mut self, metrics: serde_json::Value) -> Self {
        self.metrics = metrics;
        self
    }
}

/// A persisted insight
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub id: i64,
    pub user_id: String,
    pub insight_type: InsightType,
    pub severity: Severity,
    pub explanation: String,
    pub metrics: serde_json::Value,
    pub is_read: bool,
    pub is_dismissed: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insight_type_names() {
        for t in [
            InsightType::VolatilitySpike,
            InsightType::SourceConcentration,
            InsightType::BufferDrawFrequent,
            InsightType::ExpenseCreep,
            InsightType::LowIncomeWarning,
            InsightType::PositiveTrend,
        ] {
            assert_eq!(t.as_str().parse::<InsightType>().unwrap(), t);
        }
        assert!("savings".parse::<InsightType>().is_err());
    }

    #[test]
    fn test_severity_priority_order() {
        assert!(Severity::Critical.priority() > Severity::Warning.priority());
        assert!(Severity::Warning.priority() > Severity::Info.priority());
    }
}
