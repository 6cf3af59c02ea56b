//! Rule model
//!
//! Rules are decision tables over the envelope: ordered `if` clauses with
//! `eq`, `starts-with` or `matches` operators, each carrying a result
//! template, terminated by a single `else` fallback.

pub mod condition;
pub mod rule;
pub mod template;

pub use condition::{Condition, MatchOutcome, Operator};
pub use rule::{Otherwise, Rule, RuleOutcome, Value};
pub use template::{Captures, Template};
