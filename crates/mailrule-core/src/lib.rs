//! MailRule Core - Rule evaluation for message transactions
//!
//! This crate evaluates named rules against a transaction envelope. A rule
//! is an ordered list of conditions over envelope fields, each carrying a
//! result template, with a terminal fallback. `maybe-eval` rules resolve to
//! a store identifier whose contents decide the final answer.

pub mod engine;
pub mod error;
pub mod loader;
pub mod lookup;
pub mod rules;

pub use engine::{Expectation, RuleEngine, RuleKind, RuleSet, Verification, VerifyReport};
pub use error::{ConfigError, EvalError, EvalResult};
pub use loader::{LoadOptions, RuleDocument};
pub use lookup::{DynamicLookup, LookupRule};
pub use rules::{Condition, Operator, Otherwise, Rule, RuleOutcome, Template, Value};
