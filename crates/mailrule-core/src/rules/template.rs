//! Result templates
//!
//! A template is literal text with substitution tokens:
//!
//! - `${N}` inserts capture group `N` of the condition that matched
//!   (`0` is the whole match),
//! - `${field-name}` inserts the canonical string form of an envelope field,
//! - `${{text}}` emits the literal `${text}` without resolving it.
//!
//! Templates are tokenised once at load time by a small state machine and
//! rendered in a single left-to-right pass.

use crate::error::{ConfigError, EvalError, EvalResult};
use mailrule_common::{EnvelopeKey, KeyLookup};
use std::fmt;

/// Capture groups produced by a matching condition
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captures {
    groups: Vec<Option<String>>,
}

impl Captures {
    /// No condition has produced captures
    pub fn none() -> Self {
        Self::default()
    }

    /// Only group 0, set to the value that satisfied the condition
    pub fn whole(value: impl Into<String>) -> Self {
        Self {
            groups: vec![Some(value.into())],
        }
    }

    pub(crate) fn from_regex(captures: &regex::Captures<'_>) -> Self {
        Self {
            groups: captures
                .iter()
                .map(|group| group.map(|m| m.as_str().to_string()))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Group `index`; groups that did not participate in the match are empty
    pub fn get(&self, index: usize) -> EvalResult<&str> {
        match self.groups.get(index) {
            Some(group) => Ok(group.as_deref().unwrap_or_default()),
            None => Err(EvalError::CaptureIndexOutOfRange {
                index,
                available: self.groups.len(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Capture(usize),
    Field(EnvelopeKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Literal,
    Token,
    Escaped,
}

/// Parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    tokens: Vec<Token>,
}

impl Template {
    /// Tokenise a template
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut name = String::new();
        let mut state = State::Literal;
        let mut chars = source.chars().peekable();

        while let Some(ch) = chars.next() {
            match state {
                State::Literal => {
                    if ch == '$' && chars.peek() == Some(&'{') {
                        chars.next();
                        if chars.peek() == Some(&'{') {
                            chars.next();
                            state = State::Escaped;
                        } else {
                            state = State::Token;
                        }
                    } else {
                        literal.push(ch);
                    }
                }
                State::Token => {
                    if ch == '}' {
                        if !literal.is_empty() {
                            tokens.push(Token::Literal(std::mem::take(&mut literal)));
                        }
                        tokens.push(parse_token(source, &name)?);
                        name.clear();
                        state = State::Literal;
                    } else {
                        name.push(ch);
                    }
                }
                State::Escaped => {
                    if ch == '}' && chars.peek() == Some(&'}') {
                        chars.next();
                        literal.push_str("${");
                        literal.push_str(&name);
                        literal.push('}');
                        name.clear();
                        state = State::Literal;
                    } else {
                        name.push(ch);
                    }
                }
            }
        }

        if state != State::Literal {
            return Err(ConfigError::UnterminatedToken(source.to_string()));
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            tokens,
        })
    }

    /// Template text as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// True when rendering never consults captures or the envelope
    pub fn is_static(&self) -> bool {
        self.tokens
            .iter()
            .all(|token| matches!(token, Token::Literal(_)))
    }

    /// Rendered text of a static template
    pub fn static_text(&self) -> Option<String> {
        if !self.is_static() {
            return None;
        }
        Some(
            self.tokens
                .iter()
                .filter_map(|token| match token {
                    Token::Literal(text) => Some(text.as_str()),
                    _ => None,
                })
                .collect(),
        )
    }

    /// Envelope fields referenced by this template
    pub fn fields(&self) -> impl Iterator<Item = EnvelopeKey> + '_ {
        self.tokens.iter().filter_map(|token| match token {
            Token::Field(key) => Some(*key),
            _ => None,
        })
    }

    /// Render against the captures of the matching condition and the envelope
    pub fn render(&self, captures: &Captures, envelope: &impl KeyLookup) -> EvalResult<String> {
        let mut result = String::with_capacity(self.source.len());

        for token in &self.tokens {
            match token {
                Token::Literal(text) => result.push_str(text),
                Token::Capture(index) => result.push_str(captures.get(*index)?),
                Token::Field(key) => {
                    let value = envelope.key(*key).ok_or(EvalError::FieldNotFound(*key))?;
                    result.push_str(&value);
                }
            }
        }

        Ok(result)
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn parse_token(template: &str, name: &str) -> Result<Token, ConfigError> {
    let invalid = || ConfigError::InvalidToken {
        template: template.to_string(),
        token: name.to_string(),
    };

    if name.is_empty() {
        Err(invalid())
    } else if name.bytes().all(|b| b.is_ascii_digit()) {
        name.parse::<usize>().map(Token::Capture).map_err(|_| invalid())
    } else {
        name.parse::<EnvelopeKey>()
            .map(Token::Field)
            .map_err(|_| ConfigError::UnknownField(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mailrule_common::Envelope;
    use pretty_assertions::assert_eq;
    use std::net::IpAddr;

    fn create_test_envelope() -> Envelope {
        Envelope::new()
            .with(EnvelopeKey::Rcpt, "user@foo.example.org")
            .with(EnvelopeKey::Listener, 123u64)
            .with(EnvelopeKey::LocalIp, "192.168.9.3".parse::<IpAddr>().unwrap())
            .with(EnvelopeKey::Priority, -4i64)
    }

    fn render(template: &str, captures: &Captures) -> EvalResult<String> {
        Template::parse(template)
            .unwrap()
            .render(captures, &create_test_envelope())
    }

    #[test]
    fn test_literal_only() {
        let template = Template::parse("list_mx/domains").unwrap();
        assert!(template.is_static());
        assert_eq!(template.static_text().as_deref(), Some("list_mx/domains"));
        assert_eq!(render("plain $ text {}", &Captures::none()).unwrap(), "plain $ text {}");
    }

    #[test]
    fn test_envelope_fields() {
        let result = render(
            "rcpt ${rcpt} listener ${listener} ip ${local-ip} priority ${priority}",
            &Captures::none(),
        )
        .unwrap();
        assert_eq!(
            result,
            "rcpt user@foo.example.org listener 123 ip 192.168.9.3 priority -4"
        );
    }

    #[test]
    fn test_captures() {
        let captures = Captures {
            groups: vec![
                Some("user@foo.example.org".to_string()),
                Some("user".to_string()),
                None,
                Some("example.org".to_string()),
            ],
        };
        assert_eq!(render("${1}+${2}@${3}", &captures).unwrap(), "user+@example.org");
        assert_eq!(render("${0}", &captures).unwrap(), "user@foo.example.org");
    }

    #[test]
    fn test_escape_is_not_resolved() {
        let captures = Captures::whole("foo.example.org");
        assert_eq!(render("${0}${{0}}", &captures).unwrap(), "foo.example.org${0}");
        assert_eq!(render("${{rcpt}}", &captures).unwrap(), "${rcpt}");

        let template = Template::parse("${{0}}").unwrap();
        assert!(template.is_static());
    }

    #[test]
    fn test_capture_out_of_range() {
        let result = render("${1}", &Captures::whole("value"));
        assert!(matches!(
            result,
            Err(EvalError::CaptureIndexOutOfRange { index: 1, available: 1 })
        ));

        let result = render("${0}", &Captures::none());
        assert!(matches!(
            result,
            Err(EvalError::CaptureIndexOutOfRange { index: 0, available: 0 })
        ));
    }

    #[test]
    fn test_missing_field() {
        let result = render("${mx}", &Captures::none());
        assert!(matches!(result, Err(EvalError::FieldNotFound(EnvelopeKey::Mx))));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Template::parse("list_${1"),
            Err(ConfigError::UnterminatedToken(_))
        ));
        assert!(matches!(
            Template::parse("${{0}"),
            Err(ConfigError::UnterminatedToken(_))
        ));
        assert!(matches!(
            Template::parse("${}"),
            Err(ConfigError::InvalidToken { .. })
        ));
        assert!(matches!(
            Template::parse("${subject}"),
            Err(ConfigError::UnknownField(name)) if name == "subject"
        ));
        assert!(matches!(
            Template::parse("${99999999999999999999999}"),
            Err(ConfigError::InvalidToken { .. })
        ));
    }

    #[test]
    fn test_fields_listed() {
        let template = Template::parse("${sender} to ${rcpt} via ${1}").unwrap();
        let fields: Vec<EnvelopeKey> = template.fields().collect();
        assert_eq!(fields, vec![EnvelopeKey::Sender, EnvelopeKey::Rcpt]);
    }
}
