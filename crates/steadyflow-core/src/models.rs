//! Domain models for Steadyflow

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Money flow direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "credit" => Ok(Self::Credit),
            "debit" => Ok(Self::Debit),
            _ => Err(format!("Unknown direction: {}", s)),
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transaction category
///
/// The first three members are income categories; the rest are expenses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    FreelanceGig,
    PlatformPayout,
    PeerTransferCredit,
    Rent,
    FoodDelivery,
    MobileRecharge,
    Travel,
    Utilities,
    Shopping,
    Entertainment,
    Other,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Self::FreelanceGig,
        Self::PlatformPayout,
        Self::PeerTransferCredit,
        Self::Rent,
        Self::FoodDelivery,
        Self::MobileRecharge,
        Self::Travel,
        Self::Utilities,
        Self::Shopping,
        Self::Entertainment,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FreelanceGig => "freelance_gig",
            Self::PlatformPayout => "platform_payout",
            Self::PeerTransferCredit => "peer_transfer_credit",
            Self::Rent => "rent",
            Self::FoodDelivery => "food_delivery",
            Self::MobileRecharge => "mobile_recharge",
            Self::Travel => "travel",
            Self::Utilities => "utilities",
            Self::Shopping => "shopping",
            Self::Entertainment => "entertainment",
            Self::Other => "other",
        }
    }

    /// Whether this is one of the income categories
    pub fn is_income(&self) -> bool {
        matches!(
            self,
            Self::FreelanceGig | Self::PlatformPayout | Self::PeerTransferCredit
        )
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown category: {}", s))
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A recorded money movement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: String,
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
    /// Always positive; the sign lives in `direction`
    pub amount: Decimal,
    pub direction: Direction,
    /// Running account balance after this transaction
    pub balance_after: Decimal,
    pub description: String,
    pub category: Category,
    pub is_income: bool,
}

/// New transaction for ingestion (before database insert)
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: String,
    pub account_id: String,
    pub timestamp: DateTime<Utc>,
    pub amount: Decimal,
    pub direction: Direction,
    pub balance_after: Decimal,
    pub description: String,
    pub category: Category,
    pub is_income: bool,
}

impl NewTransaction {
    /// Build a transaction whose direction follows its category
    pub fn new(
        user_id: impl Into<String>,
        account_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        amount: Decimal,
        category: Category,
    ) -> Self {
        let is_income = category.is_income();
        Self {
            user_id: user_id.into(),
            account_id: account_id.into(),
            timestamp,
            amount,
            direction: if is_income {
                Direction::Credit
            } else {
                Direction::Debit
            },
            balance_after: Decimal::ZERO,
            description: String::new(),
            category,
            is_income,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_balance_after(mut self, balance_after: Decimal) -> Self {
        self.balance_after = balance_after;
        self
    }
}

/// Explicit correction of a stored transaction
#[derive(Debug, Clone, Default)]
pub struct TransactionCorrection {
    pub amount: Option<Decimal>,
    pub category: Option<Category>,
    pub description: Option<String>,
}

/// Aggregate over a user's income transactions
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IncomeTotals {
    pub count: i64,
    pub total: Decimal,
}

/// Weekly aggregate statistics for one (user, ISO week)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyFeature {
    pub user_id: String,
    /// Monday of the ISO week
    pub week_start: NaiveDate,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub net_cashflow: Decimal,
    pub avg_daily_income: Decimal,
    pub income_std: Decimal,
    /// `income_std / avg_daily_income`, 0 when the average is 0
    pub income_volatility_ratio: f64,
    pub days_with_income: u32,
    pub days_without_income: u32,
    pub income_source_count: u32,
    pub top_source_pct: f64,
    pub avg_daily_expense: Decimal,
    pub expense_std: Decimal,
}

/// Per-category income rollup over the source window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomeSource {
    pub user_id: String,
    pub category: Category,
    pub total_amount: Decimal,
    pub avg_monthly_amount: Decimal,
    pub payment_count: u32,
    pub contribution_pct: f64,
    /// `max(0, 1 - cv)` over this category's payments
    pub stability_score: f64,
    pub last_payment_at: DateTime<Utc>,
}

/// Risk level attached to a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown risk level: {}", s)),
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which cascade path produced a forecast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelUsed {
    ArimaPretrained,
    SeasonalTrendPretrained,
    RollingBaselinePretrained,
    ArimaOnline,
    RollingBaseline,
    InsufficientData,
}

impl ModelUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArimaPretrained => "arima_pretrained",
            Self::SeasonalTrendPretrained => "seasonal_trend_pretrained",
            Self::RollingBaselinePretrained => "rolling_baseline_pretrained",
            Self::ArimaOnline => "arima_online",
            Self::RollingBaseline => "rolling_baseline",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

impl std::str::FromStr for ModelUsed {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "arima_pretrained" => Ok(Self::ArimaPretrained),
            "seasonal_trend_pretrained" => Ok(Self::SeasonalTrendPretrained),
            "rolling_baseline_pretrained" => Ok(Self::RollingBaselinePretrained),
            "arima_online" => Ok(Self::ArimaOnline),
            "rolling_baseline" => Ok(Self::RollingBaseline),
            "insufficient_data" => Ok(Self::InsufficientData),
            _ => Err(format!("Unknown model: {}", s)),
        }
    }
}

impl std::fmt::Display for ModelUsed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Logged forecast snapshot (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashflowPrediction {
    pub id: i64,
    pub user_id: String,
    pub horizon_days: u32,
    pub expected_inflow: Decimal,
    pub expected_outflow: Decimal,
    pub net_cashflow: Decimal,
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    pub risk_level: RiskLevel,
    pub model_used: ModelUsed,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Per-user smoothing reserve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingBuffer {
    pub user_id: String,
    pub balance: Decimal,
    pub total_deposited: Decimal,
    pub total_released: Decimal,
    pub risk_score: f64,
    pub min_threshold: Decimal,
    pub max_capacity: Decimal,
    pub last_deposit_at: Option<DateTime<Utc>>,
    pub last_release_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A proposed, then possibly executed, weekly disbursement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyRelease {
    pub id: i64,
    pub user_id: String,
    pub week_start: NaiveDate,
    pub recommended_amount: Decimal,
    /// Zero until executed
    pub actual_released: Decimal,
    pub buffer_before: Decimal,
    pub buffer_after: Decimal,
    pub released: bool,
    pub released_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Per-user fixed-expense baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub monthly_fixed_expenses: Decimal,
    pub updated_at: DateTime<Utc>,
}
