//! Rules: ordered conditions with a terminal fallback

use super::condition::{Condition, MatchOutcome};
use super::template::{Captures, Template};
use crate::error::EvalResult;
use mailrule_common::KeyLookup;
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Caller-visible value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Integer(i64),
    Bool(bool),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    /// `false` is the caller-visible negative outcome
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Integer(num) => write!(f, "{}", num),
            Value::Bool(flag) => write!(f, "{}", flag),
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

/// Terminal `else` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Otherwise {
    /// `else = false`: no match, no result
    False,
    /// `else = <literal>`
    Value(Value),
}

/// Outcome of evaluating a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    /// A condition matched and its template was rendered
    Rendered(String),
    /// No condition matched; the fallback literal applies
    Literal(Value),
    /// No condition matched and the fallback is `false`
    NoMatch,
}

impl RuleOutcome {
    /// Collapse into the caller-visible value
    pub fn into_value(self) -> Value {
        match self {
            RuleOutcome::Rendered(text) => Value::Text(text),
            RuleOutcome::Literal(value) => value,
            RuleOutcome::NoMatch => Value::Bool(false),
        }
    }
}

/// A named rule body
#[derive(Debug, Clone)]
pub enum Rule {
    /// Bare template rendered without any condition
    Template(Template),
    /// Conditions evaluated in order; the first match wins
    Conditional {
        conditions: Vec<Condition>,
        otherwise: Otherwise,
    },
}

impl Rule {
    pub fn conditional(conditions: Vec<Condition>, otherwise: Otherwise) -> Self {
        Rule::Conditional {
            conditions,
            otherwise,
        }
    }

    /// Evaluate against an envelope
    pub fn evaluate(&self, envelope: &impl KeyLookup) -> EvalResult<RuleOutcome> {
        self.evaluate_captured(envelope).map(|(outcome, _)| outcome)
    }

    /// Evaluate and also return the captures of the matching condition,
    /// empty when no condition matched.
    pub(crate) fn evaluate_captured(
        &self,
        envelope: &impl KeyLookup,
    ) -> EvalResult<(RuleOutcome, Captures)> {
        match self {
            Rule::Template(template) => {
                let captures = Captures::none();
                let rendered = template.render(&captures, envelope)?;
                Ok((RuleOutcome::Rendered(rendered), captures))
            }
            Rule::Conditional {
                conditions,
                otherwise,
            } => {
                for (position, condition) in conditions.iter().enumerate() {
                    if let MatchOutcome::Matched(captures) = condition.evaluate(envelope)? {
                        debug!(
                            position,
                            field = %condition.field,
                            operator = %condition.operator,
                            "Condition matched"
                        );
                        let rendered = condition.then.render(&captures, envelope)?;
                        return Ok((RuleOutcome::Rendered(rendered), captures));
                    }
                }

                let outcome = match otherwise {
                    Otherwise::False => RuleOutcome::NoMatch,
                    Otherwise::Value(value) => RuleOutcome::Literal(value.clone()),
                };
                Ok((outcome, Captures::none()))
            }
        }
    }

    /// Templates this rule may render
    pub fn templates(&self) -> Vec<&Template> {
        match self {
            Rule::Template(template) => vec![template],
            Rule::Conditional { conditions, .. } => {
                conditions.iter().map(|condition| &condition.then).collect()
            }
        }
    }

    /// Fallback literal, if any
    pub fn fallback(&self) -> Option<&Value> {
        match self {
            Rule::Conditional {
                otherwise: Otherwise::Value(value),
                ..
            } => Some(value),
            _ => None,
        }
    }
}
