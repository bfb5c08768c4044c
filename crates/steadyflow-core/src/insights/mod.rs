//! Insight Engine - rule-based flags over the weekly feature stream
//!
//! Rules look at the latest eight weeks of features (and the buffer, when
//! the user has one). Every rule that matches fires; findings are appended
//! as new insight rows, most severe first.
//!
//! ## Rules
//!
//! - **Volatility spike** - latest volatility ratio above 0.7
//! - **Source concentration** - latest top source above 60% of income
//! - **Expense creep** - recent daily spending 20% above the prior month
//! - **Low income warning** - latest week below 5,000
//! - **Positive trend** - recent income 15% above the prior weeks
//! - **Frequent buffer draws** - three releases in four weeks with the
//!   buffer under its minimum
//!
//! ## Usage
//!
//! ```rust,ignore
//! use steadyflow_core::insights::InsightEngine;
//!
//! let engine = InsightEngine::new(db, &config, clock);
//! let insights = engine.generate("user-1")?;
//! ```

pub mod engine;
pub mod rules;
pub mod types;

pub use engine::InsightEngine;
pub use rules::{default_rules, BufferContext, InsightRule, RuleContext};
pub use types::{Finding, Insight, InsightType, Severity};
