//! Insight rules
//!
//! Each rule looks at the recent weekly features (newest first) and fires at
//! most one finding. Rules are independent; every rule that matches fires.

use rust_decimal::Decimal;
use serde_json::json;

use crate::config::InsightConfig;
use crate::models::WeeklyFeature;
use crate::money::{round2, to_f64};
use crate::stats;

use super::types::{Finding, InsightType, Severity};

/// Weeks on each side of a recent-vs-prior comparison
const COMPARISON_WEEKS: usize = 4;

/// Buffer state, supplied when the user has a buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferContext {
    pub balance: Decimal,
    pub min_threshold: Decimal,
    /// Releases executed in the current and previous three weeks
    pub recent_releases: usize,
}

/// What a rule gets to look at
pub struct RuleContext<'a> {
    /// Newest first; never empty when rules run
    pub features: &'a [WeeklyFeature],
    pub buffer: Option<&'a BufferContext>,
}

impl RuleContext<'_> {
    fn latest(&self) -> Option<&WeeklyFeature> {
        self.features.first()
    }

    /// Means of `value` over the most recent four weeks and the weeks before
    fn recent_vs_prior(&self, value: impl Fn(&WeeklyFeature) -> f64) -> Option<(f64, f64)> {
        if self.features.len() <= COMPARISON_WEEKS {
            return None;
        }
        let (recent, prior) = self.features.split_at(COMPARISON_WEEKS);
        let recent: Vec<f64> = recent.iter().map(&value).collect();
        let prior: Vec<f64> = prior.iter().map(&value).collect();
        Some((stats::mean(&recent), stats::mean(&prior)))
    }
}

pub trait InsightRule: Send + Sync {
    fn id(&self) -> InsightType;

    /// Human-readable name
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding>;
}

/// Latest week's income is unusually spread out
pub struct VolatilitySpikeRule {
    threshold: f64,
}

impl VolatilitySpikeRule {
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            threshold: config.volatility_spike_ratio,
        }
    }
}

impl InsightRule for VolatilitySpikeRule {
    fn id(&self) -> InsightType {
        InsightType::VolatilitySpike
    }

    fn name(&self) -> &'static str {
        "Volatility Spike"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
        let latest = ctx.latest()?;
        let ratio = latest.income_volatility_ratio;
        if ratio <= self.threshold {
            return None;
        }

        Some(
            Finding::new(
                self.id(),
                Severity::Warning,
                format!(
                    "Your income volatility is high at {:.0}%. Consider diversifying income sources.",
                    ratio * 100.0
                ),
            )
            .with_metrics(json!({
                "volatility_ratio": ratio,
                "income_std": to_f64(latest.income_std),
                "avg_daily_income": to_f64(latest.avg_daily_income),
            })),
        )
    }
}

/// One category dominates the latest week's income
pub struct SourceConcentrationRule {
    threshold_pct: f64,
}

impl SourceConcentrationRule {
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            threshold_pct: config.concentration_pct,
        }
    }
}

impl InsightRule for SourceConcentrationRule {
    fn id(&self) -> InsightType {
        InsightType::SourceConcentration
    }

    fn name(&self) -> &'static str {
        "Source Concentration"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
        let latest = ctx.latest()?;
        if latest.top_source_pct <= self.threshold_pct {
            return None;
        }

        Some(
            Finding::new(
                self.id(),
                Severity::Warning,
                format!(
                    "Your top income source accounts for {:.0}% of income. Reduce client concentration.",
                    latest.top_source_pct
                ),
            )
            .with_metrics(json!({
                "top_source_pct": latest.top_source_pct,
                "source_count": latest.income_source_count,
            })),
        )
    }
}

/// Daily spending over the last four weeks is well above the four before
pub struct ExpenseCreepRule {
    ratio: f64,
}

impl ExpenseCreepRule {
    /// Full recent and prior windows are required
    const MIN_WEEKS: usize = 2 * COMPARISON_WEEKS;

    pub fn new(config: &InsightConfig) -> Self {
        Self {
            ratio: config.expense_creep_ratio,
        }
    }
}

impl InsightRule for ExpenseCreepRule {
    fn id(&self) -> InsightType {
        InsightType::ExpenseCreep
    }

    fn name(&self) -> &'static str {
        "Expense Creep"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
        if ctx.features.len() < Self::MIN_WEEKS {
            return None;
        }
        let (recent, prior) = ctx.recent_vs_prior(|f| to_f64(f.avg_daily_expense))?;
        if recent <= prior * self.ratio {
            return None;
        }

        let increase_pct = if prior > 0.0 {
            round2((recent / prior - 1.0) * 100.0)
        } else {
            100.0
        };
        Some(
            Finding::new(
                self.id(),
                Severity::Warning,
                format!("Your expenses increased by {:.0}% recently.", increase_pct),
            )
            .with_metrics(json!({
                "recent_avg": round2(recent),
                "prior_avg": round2(prior),
                "increase_pct": increase_pct,
            })),
        )
    }
}

/// Latest week's income is below the survival floor
pub struct LowIncomeRule {
    floor: f64,
}

impl LowIncomeRule {
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            floor: config.low_income_weekly,
        }
    }
}

impl InsightRule for LowIncomeRule {
    fn id(&self) -> InsightType {
        InsightType::LowIncomeWarning
    }

    fn name(&self) -> &'static str {
        "Low Income Warning"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
        let latest = ctx.latest()?;
        let income = to_f64(latest.total_income);
        if income >= self.floor {
            return None;
        }

        Some(
            Finding::new(
                self.id(),
                Severity::Critical,
                format!(
                    "Low income week detected: {:.0}. Buffer may be needed.",
                    income
                ),
            )
            .with_metrics(json!({
                "weekly_income": income,
                "days_with_income": latest.days_with_income,
            })),
        )
    }
}

/// Income over the last four weeks is well above the weeks before
pub struct PositiveTrendRule {
    ratio: f64,
}

impl PositiveTrendRule {
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            ratio: config.positive_trend_ratio,
        }
    }
}

impl InsightRule for PositiveTrendRule {
    fn id(&self) -> InsightType {
        InsightType::PositiveTrend
    }

    fn name(&self) -> &'static str {
        "Positive Trend"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
        let (recent, prior) = ctx.recent_vs_prior(|f| to_f64(f.total_income))?;
        if prior <= 0.0 || recent <= prior * self.ratio {
            return None;
        }

        let increase_pct = round2((recent / prior - 1.0) * 100.0);
        Some(
            Finding::new(
                self.id(),
                Severity::Info,
                format!("Income trending up by {:.0}%. Great work!", increase_pct),
            )
            .with_metrics(json!({
                "recent_avg": round2(recent),
                "prior_avg": round2(prior),
                "increase_pct": increase_pct,
            })),
        )
    }
}

/// Releases keep going out while the buffer sits below its threshold
pub struct BufferDrawRule {
    min_releases: usize,
}

impl BufferDrawRule {
    pub fn new(config: &InsightConfig) -> Self {
        Self {
            min_releases: config.buffer_draw_releases,
        }
    }
}

impl InsightRule for BufferDrawRule {
    fn id(&self) -> InsightType {
        InsightType::BufferDrawFrequent
    }

    fn name(&self) -> &'static str {
        "Frequent Buffer Draws"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Finding> {
        let buffer = ctx.buffer?;
        if buffer.recent_releases < self.min_releases || buffer.balance >= buffer.min_threshold {
            return None;
        }

        Some(
            Finding::new(
                self.id(),
                Severity::Warning,
                format!(
                    "{} releases in the last four weeks left the buffer at {}, below its {} minimum.",
                    buffer.recent_releases,
                    buffer.balance.round_dp(0),
                    buffer.min_threshold.round_dp(0)
                ),
            )
            .with_metrics(json!({
                "recent_releases": buffer.recent_releases,
                "buffer_balance": to_f64(buffer.balance),
                "min_threshold": to_f64(buffer.min_threshold),
            })),
        )
    }
}

/// Every rule, configured
pub fn default_rules(config: &InsightConfig) -> Vec<Box<dyn InsightRule>> {
    vec![
        Box::new(VolatilitySpikeRule::new(config)),
        Box::new(SourceConcentrationRule::new(config)),
        Box::new(ExpenseCreepRule::new(config)),
        Box::new(LowIncomeRule::new(config)),
        Box::new(PositiveTrendRule::new(config)),
        Box::new(BufferDrawRule::new(config)),
    ]
}
