//! Buffer Manager
//!
//! Each user has one smoothing buffer: a reserve that absorbs weeks of
//! unusually high income and pays out a steadier weekly release. A buffer
//! exists once `initialize` (or the first deposit) has run; there is no other
//! state to track.
//!
//! Releases are proposed once per ISO week and executed at most once. The
//! proposal is throttled by buffer health and never exceeds
//! `release_reserve_ratio` (80%) of the balance.

mod types;

pub use types::{DepositResult, ReleaseProposal, SmoothingOutcome, SmoothingStatus};

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{BufferConfig, EngineConfig};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::features::week_start;
use crate::forecast::ForecastEngine;
use crate::models::{SmoothingBuffer, WeeklyRelease};
use crate::money::{floor_money, from_f64, from_f64_floor, round2, round_money, to_f64};

/// Horizon of the forecast a release is based on
const RELEASE_HORIZON_DAYS: u32 = 7;

pub struct BufferManager {
    db: Database,
    config: BufferConfig,
    clock: Arc<dyn Clock>,
    forecaster: Arc<ForecastEngine>,
}

impl BufferManager {
    pub fn new(
        db: Database,
        config: &EngineConfig,
        clock: Arc<dyn Clock>,
        forecaster: Arc<ForecastEngine>,
    ) -> Self {
        Self {
            db,
            config: config.buffer.clone(),
            clock,
            forecaster,
        }
    }

    /// Return the user's buffer, creating an empty one if needed
    pub fn initialize(&self, user_id: &str) -> Result<SmoothingBuffer> {
        let now = self.clock.now();
        let buffer = self.db.create_buffer_if_absent(&SmoothingBuffer {
            user_id: user_id.to_string(),
            balance: Decimal::ZERO,
            total_deposited: Decimal::ZERO,
            total_released: Decimal::ZERO,
            risk_score: self.config.initial_risk_score,
            min_threshold: from_f64(self.config.min_threshold),
            max_capacity: from_f64(self.config.max_capacity),
            last_deposit_at: None,
            last_release_at: None,
            created_at: now,
            updated_at: now,
        })?;
        debug!(user_id, balance = %buffer.balance, "Buffer ready");
        Ok(buffer)
    }

    pub fn get_buffer(&self, user_id: &str) -> Result<Option<SmoothingBuffer>> {
        self.db.get_buffer(user_id)
    }

    /// Deposit, clamping at capacity
    ///
    /// The result reports both the requested and the accepted amount.
    pub fn deposit(&self, user_id: &str, amount: Decimal) -> Result<DepositResult> {
        if amount < Decimal::ZERO {
            return Err(Error::InvalidData(format!(
                "deposit amount cannot be negative, got {}",
                amount
            )));
        }
        self.initialize(user_id)?;

        let result = self
            .db
            .deposit_to_buffer(user_id, round_money(amount), self.clock.now())?;
        if result.clamped() {
            warn!(
                user_id,
                requested = %result.requested,
                accepted = %result.accepted,
                "Deposit clamped at buffer capacity"
            );
        }
        info!(user_id, amount = %result.accepted, balance = %result.buffer.balance, "Buffer deposit");
        Ok(result)
    }

    /// Work out this week's release without creating it
    ///
    /// Persists the recomputed buffer risk score.
    pub fn calculate_weekly_release(&self, user_id: &str) -> Result<ReleaseProposal> {
        let buffer = self.initialize(user_id)?;
        let forecast = self.forecaster.predict(user_id, RELEASE_HORIZON_DAYS)?;
        let worst_case_income = forecast.lower_bound.max(Decimal::ZERO);

        let recent = self
            .db
            .list_weekly_features(user_id, self.config.income_window_weeks as usize)?;
        let avg_weekly_income = if recent.is_empty() {
            from_f64(self.config.default_weekly_income)
        } else {
            let total: Decimal = recent.iter().map(|f| f.total_income).sum();
            round_money(total / Decimal::from(recent.len()))
        };

        let base_release = round_money((worst_case_income + avg_weekly_income) / Decimal::TWO);

        let balance = to_f64(buffer.balance);
        let threshold = to_f64(buffer.min_threshold);
        let buffer_health = if threshold > 0.0 {
            (balance / threshold).min(1.0)
        } else {
            1.0
        };

        let release_cap = floor_money(buffer.balance * from_f64(self.config.release_reserve_ratio));
        let recommended_amount = from_f64_floor(to_f64(base_release) * buffer_health)
            .min(release_cap)
            .max(Decimal::ZERO);

        let risk_score = self.config.risk.score(balance, threshold);
        self.db
            .set_buffer_risk_score(user_id, risk_score, self.clock.now())?;

        let explanation = format!(
            "Worst-case income {} and recent average {} give a base of {}; \
             buffer health {:.0}% brings it to {} (cap {:.0}% of balance {} = {})",
            worst_case_income.round_dp(0),
            avg_weekly_income.round_dp(0),
            base_release.round_dp(0),
            buffer_health * 100.0,
            recommended_amount,
            self.config.release_reserve_ratio * 100.0,
            buffer.balance,
            release_cap,
        );

        debug!(
            user_id,
            recommended = %recommended_amount,
            risk_score,
            model = %forecast.model_used,
            "Weekly release calculated"
        );

        Ok(ReleaseProposal {
            user_id: user_id.to_string(),
            recommended_amount,
            buffer_balance: buffer.balance,
            buffer_health: round2(buffer_health),
            risk_score,
            worst_case_income,
            avg_weekly_income,
            base_release,
            release_cap,
            forecast_model: forecast.model_used,
            explanation,
        })
    }

    /// Propose this week's release, once per (user, week)
    ///
    /// A second call in the same week returns the existing row.
    pub fn create_weekly_release(&self, user_id: &str) -> Result<WeeklyRelease> {
        let now = self.clock.now();
        let week = week_start(now.date_naive());
        let proposal = self.calculate_weekly_release(user_id)?;

        let (release, created) = self.db.insert_release_if_absent(
            user_id,
            week,
            proposal.recommended_amount,
            proposal.buffer_balance,
            now,
        )?;

        if created {
            info!(
                user_id,
                release_id = release.id,
                week_start = %week,
                amount = %release.recommended_amount,
                "Weekly release proposed"
            );
        } else {
            debug!(user_id, release_id = release.id, "Weekly release already exists");
        }
        Ok(release)
    }

    /// Pay out a proposed release; fails if it was already executed
    pub fn execute_weekly_release(&self, user_id: &str, release_id: i64) -> Result<WeeklyRelease> {
        let release = self
            .db
            .execute_release(user_id, release_id, self.clock.now())?;
        info!(
            user_id,
            release_id,
            released = %release.actual_released,
            balance = %release.buffer_after,
            "Weekly release executed"
        );
        Ok(release)
    }

    pub fn list_releases(&self, user_id: &str, limit: usize) -> Result<Vec<WeeklyRelease>> {
        self.db.list_releases(user_id, limit)
    }

    /// Classify the latest week against the average of the weeks before it
    ///
    /// An excess is deposited. A deficit is only assessed against the
    /// balance; nothing is drawn.
    pub fn process_income_smoothing(&self, user_id: &str) -> Result<SmoothingOutcome> {
        let rows = self
            .db
            .list_weekly_features(user_id, self.config.income_window_weeks as usize + 1)?;
        let buffer_balance = self
            .db
            .get_buffer(user_id)?
            .map(|b| b.balance)
            .unwrap_or(Decimal::ZERO);

        let Some((latest, prior)) = rows.split_first().filter(|(_, prior)| !prior.is_empty())
        else {
            return Ok(SmoothingOutcome {
                status: SmoothingStatus::InsufficientData,
                latest_income: rows.first().map(|f| f.total_income),
                trailing_average: None,
                amount: Decimal::ZERO,
                buffer_balance,
                message: "Need at least two weeks of features".to_string(),
            });
        };

        let current = latest.total_income;
        let total: Decimal = prior.iter().map(|f| f.total_income).sum();
        let average = round_money(total / Decimal::from(prior.len()));
        let current_f = to_f64(current);
        let average_f = to_f64(average);

        let outcome = if current_f > average_f * self.config.excess_ratio {
            let excess = current - average;
            let deposit = self.deposit(user_id, excess)?;
            SmoothingOutcome {
                status: SmoothingStatus::ExcessDeposited,
                latest_income: Some(current),
                trailing_average: Some(average),
                amount: deposit.accepted,
                buffer_balance: deposit.buffer.balance,
                message: format!("Deposited {} excess income to buffer", deposit.accepted),
            }
        } else if current_f < average_f * self.config.deficit_ratio {
            let deficit = average - current;
            let (status, message) = if buffer_balance >= deficit {
                (
                    SmoothingStatus::DeficitCovered,
                    format!("Buffer can cover the {} deficit", deficit),
                )
            } else {
                (
                    SmoothingStatus::DeficitWarning,
                    format!(
                        "Buffer balance {} cannot cover the {} deficit",
                        buffer_balance, deficit
                    ),
                )
            };
            SmoothingOutcome {
                status,
                latest_income: Some(current),
                trailing_average: Some(average),
                amount: deficit,
                buffer_balance,
                message,
            }
        } else {
            SmoothingOutcome {
                status: SmoothingStatus::Normal,
                latest_income: Some(current),
                trailing_average: Some(average),
                amount: Decimal::ZERO,
                buffer_balance,
                message: "Income within normal range".to_string(),
            }
        };

        info!(user_id, status = %outcome.status, amount = %outcome.amount, "Income smoothing processed");
        Ok(outcome)
    }
}
