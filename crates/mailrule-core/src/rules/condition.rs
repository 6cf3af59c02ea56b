//! Conditions
//!
//! A condition compares one envelope field against an operand and, when it
//! matches, exposes capture groups to its `then` template.

use super::template::{Captures, Template};
use crate::error::{ConfigError, EvalError, EvalResult};
use mailrule_common::{EnvelopeKey, KeyLookup};
use regex::{Regex, RegexBuilder};
use std::fmt;

/// Comparison operator
#[derive(Debug, Clone)]
pub enum Operator {
    /// Exact string equality
    Eq(String),
    /// Literal prefix
    StartsWith(String),
    /// Regular expression, anchored only where the pattern anchors itself
    Matches(Regex),
}

impl Operator {
    /// Compile a `matches` operand, bounding the compiled program size
    pub fn matches(pattern: &str, size_limit: usize) -> Result<Self, ConfigError> {
        RegexBuilder::new(pattern)
            .size_limit(size_limit)
            .build()
            .map(Operator::Matches)
            .map_err(|source| ConfigError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operator::Eq(_) => "eq",
            Operator::StartsWith(_) => "starts-with",
            Operator::Matches(_) => "matches",
        }
    }

    pub fn operand(&self) -> &str {
        match self {
            Operator::Eq(operand) | Operator::StartsWith(operand) => operand,
            Operator::Matches(regex) => regex.as_str(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}", self.name(), self.operand())
    }
}

/// Result of evaluating one condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(Captures),
    NotMatched,
}

/// A single `if` clause
#[derive(Debug, Clone)]
pub struct Condition {
    /// Field being tested
    pub field: EnvelopeKey,
    /// Comparison
    pub operator: Operator,
    /// Result template rendered when the condition matches
    pub then: Template,
}

impl Condition {
    pub fn new(field: EnvelopeKey, operator: Operator, then: Template) -> Self {
        Self {
            field,
            operator,
            then,
        }
    }

    /// Evaluate against an envelope.
    ///
    /// `eq` and `starts-with` expose the whole field value as group 0;
    /// `matches` exposes the matched substring as group 0 followed by the
    /// parenthesised groups in source order.
    pub fn evaluate(&self, envelope: &impl KeyLookup) -> EvalResult<MatchOutcome> {
        let value = envelope
            .key(self.field)
            .ok_or(EvalError::FieldNotFound(self.field))?;

        let outcome = match &self.operator {
            Operator::Eq(operand) => {
                if *value == **operand {
                    MatchOutcome::Matched(Captures::whole(value.into_owned()))
                } else {
                    MatchOutcome::NotMatched
                }
            }
            Operator::StartsWith(prefix) => {
                if value.starts_with(prefix.as_str()) {
                    MatchOutcome::Matched(Captures::whole(value.into_owned()))
                } else {
                    MatchOutcome::NotMatched
                }
            }
            Operator::Matches(regex) => match regex.captures(&value) {
                Some(captures) => MatchOutcome::Matched(Captures::from_regex(&captures)),
                None => MatchOutcome::NotMatched,
            },
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailrule_common::Envelope;
    use pretty_assertions::assert_eq;

    const SIZE_LIMIT: usize = 1 << 20;

    fn create_test_envelope() -> Envelope {
        Envelope::new()
            .with(EnvelopeKey::Rcpt, "user@foo.example.org")
            .with(EnvelopeKey::RcptDomain, "foo.example.org")
            .with(EnvelopeKey::Sender, "bill@foo.net")
            .with(EnvelopeKey::Priority, -4i64)
    }

    fn condition(field: EnvelopeKey, operator: Operator) -> Condition {
        Condition::new(field, operator, Template::parse("${0}").unwrap())
    }

    #[test]
    fn test_eq() {
        let envelope = create_test_envelope();

        let matched = condition(EnvelopeKey::Sender, Operator::Eq("bill@foo.net".to_string()))
            .evaluate(&envelope)
            .unwrap();
        assert_eq!(matched, MatchOutcome::Matched(Captures::whole("bill@foo.net")));

        let missed = condition(EnvelopeKey::Sender, Operator::Eq("bill@foo".to_string()))
            .evaluate(&envelope)
            .unwrap();
        assert_eq!(missed, MatchOutcome::NotMatched);
    }

    #[test]
    fn test_eq_on_integer_field() {
        let outcome = condition(EnvelopeKey::Priority, Operator::Eq("-4".to_string()))
            .evaluate(&create_test_envelope())
            .unwrap();
        assert_eq!(outcome, MatchOutcome::Matched(Captures::whole("-4")));
    }

    #[test]
    fn test_starts_with_captures_whole_value() {
        let outcome = condition(EnvelopeKey::RcptDomain, Operator::StartsWith("foo".to_string()))
            .evaluate(&create_test_envelope())
            .unwrap();
        assert_eq!(outcome, MatchOutcome::Matched(Captures::whole("foo.example.org")));

        let outcome = condition(EnvelopeKey::RcptDomain, Operator::StartsWith("example".to_string()))
            .evaluate(&create_test_envelope())
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NotMatched);
    }

    #[test]
    fn test_matches_groups() {
        let operator = Operator::matches(r"^([^.]+)@([^.]+)\.(.+)$", SIZE_LIMIT).unwrap();
        let outcome = condition(EnvelopeKey::Rcpt, operator)
            .evaluate(&create_test_envelope())
            .unwrap();

        let MatchOutcome::Matched(captures) = outcome else {
            panic!("expected a match");
        };
        assert_eq!(captures.len(), 4);
        assert_eq!(captures.get(0).unwrap(), "user@foo.example.org");
        assert_eq!(captures.get(1).unwrap(), "user");
        assert_eq!(captures.get(2).unwrap(), "foo");
        assert_eq!(captures.get(3).unwrap(), "example.org");
    }

    #[test]
    fn test_matches_is_not_anchored_implicitly() {
        let operator = Operator::matches(r"([^.]+)\.(.+)$", SIZE_LIMIT).unwrap();
        let envelope = Envelope::new().with(EnvelopeKey::Mx, "mx.somedomain.com");
        let outcome = condition(EnvelopeKey::Mx, operator).evaluate(&envelope).unwrap();

        let MatchOutcome::Matched(captures) = outcome else {
            panic!("expected a match");
        };
        assert_eq!(captures.get(0).unwrap(), "mx.somedomain.com");
        assert_eq!(captures.get(1).unwrap(), "mx");
        assert_eq!(captures.get(2).unwrap(), "somedomain.com");
    }

    #[test]
    fn test_unmatched_optional_group_is_empty() {
        let operator = Operator::matches(r"^(bill)(\+tag)?@(.+)$", SIZE_LIMIT).unwrap();
        let outcome = condition(EnvelopeKey::Sender, operator)
            .evaluate(&create_test_envelope())
            .unwrap();

        let MatchOutcome::Matched(captures) = outcome else {
            panic!("expected a match");
        };
        assert_eq!(captures.get(2).unwrap(), "");
        assert_eq!(captures.get(3).unwrap(), "foo.net");
    }

    #[test]
    fn test_pattern_that_never_matches() {
        let operator = Operator::matches(r"^([^.]+)@([^.]+)\.(.+)$org", SIZE_LIMIT).unwrap();
        let outcome = condition(EnvelopeKey::Rcpt, operator)
            .evaluate(&create_test_envelope())
            .unwrap();
        assert_eq!(outcome, MatchOutcome::NotMatched);
    }

    #[test]
    fn test_invalid_pattern() {
        let result = Operator::matches(r"^([^.]+@", SIZE_LIMIT);
        assert!(matches!(result, Err(ConfigError::InvalidRegex { .. })));

        let result = Operator::matches(r"\w{1000}\w{1000}", 1024);
        assert!(matches!(result, Err(ConfigError::InvalidRegex { .. })));
    }

    #[test]
    fn test_missing_field() {
        let result = condition(EnvelopeKey::HeloDomain, Operator::Eq("x".to_string()))
            .evaluate(&create_test_envelope());
        assert!(matches!(
            result,
            Err(EvalError::FieldNotFound(EnvelopeKey::HeloDomain))
        ));
    }
}
