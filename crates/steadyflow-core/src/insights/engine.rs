//! Insight Engine - runs the rules and persists what fires

use std::sync::Arc;

use chrono::Duration;

use crate::clock::Clock;
use crate::config::{EngineConfig, InsightConfig};
use crate::db::{Database, InsightFilter};
use crate::error::Result;
use crate::features::week_start;

use super::rules::{default_rules, BufferContext, InsightRule, RuleContext};
use super::types::{Finding, Insight};

/// Weeks before the current one counted for buffer draws
const DRAW_LOOKBACK_WEEKS: i64 = 3;

pub struct InsightEngine {
    db: Database,
    config: InsightConfig,
    clock: Arc<dyn Clock>,
    rules: Vec<Box<dyn InsightRule>>,
}

impl InsightEngine {
    /// Create an engine with every built-in rule registered
    pub fn new(db: Database, config: &EngineConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.insights.clone();
        let rules = default_rules(&config);
        Self {
            db,
            config,
            clock,
            rules,
        }
    }

    /// Register an additional rule
    pub fn register(&mut self, rule: Box<dyn InsightRule>) {
        self.rules.push(rule);
    }

    /// Evaluate every rule without persisting, most severe first
    pub fn evaluate(&self, user_id: &str) -> Result<Vec<Finding>> {
        let features = self
            .db
            .list_weekly_features(user_id, self.config.history_weeks as usize)?;
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let buffer = match self.db.get_buffer(user_id)? {
            Some(buffer) => {
                let since = week_start(self.clock.now().date_naive())
                    - Duration::weeks(DRAW_LOOKBACK_WEEKS);
                Some(BufferContext {
                    balance: buffer.balance,
                    min_threshold: buffer.min_threshold,
                    recent_releases: self.db.count_executed_releases_since(user_id, since)?,
                })
            }
            None => None,
        };

        let ctx = RuleContext {
            features: &features,
            buffer: buffer.as_ref(),
        };

        let mut findings = Vec::new();
        for rule in &self.rules {
            if let Some(finding) = rule.evaluate(&ctx) {
                tracing::debug!(user_id, rule = rule.name(), "Insight rule fired");
                findings.push(finding);
            }
        }

        // Highest severity first; ties keep rule order
        findings.sort_by(|a, b| b.severity.priority().cmp(&a.severity.priority()));
        Ok(findings)
    }

    /// Evaluate and append the findings as new insights
    ///
    /// Repeated calls on unchanged data append repeated rows.
    pub fn generate(&self, user_id: &str) -> Result<Vec<Insight>> {
        let findings = self.evaluate(user_id)?;
        if findings.is_empty() {
            return Ok(Vec::new());
        }

        let insights = self
            .db
            .insert_insights(user_id, &findings, self.clock.now())?;
        tracing::info!(user_id, count = insights.len(), "Insights generated");
        Ok(insights)
    }

    pub fn list(&self, user_id: &str, filter: &InsightFilter) -> Result<Vec<Insight>> {
        self.db.list_insights(user_id, filter)
    }

    pub fn mark_insight_read(&self, user_id: &str, insight_id: i64) -> Result<()> {
        self.db.mark_insight_read(user_id, insight_id)
    }

    pub fn dismiss_insight(&self, user_id: &str, insight_id: i64) -> Result<()> {
        self.db.dismiss_insight(user_id, insight_id)
    }
}
