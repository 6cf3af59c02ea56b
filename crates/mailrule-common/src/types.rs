//! Envelope context model
//!
//! The envelope is the read-only attribute bag describing one message
//! transaction. Rules reference its fields by their kebab-case names.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Envelope field identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvelopeKey {
    /// Recipient address (RCPT TO)
    Rcpt,
    /// Recipient domain
    RcptDomain,
    /// Sender address (MAIL FROM)
    Sender,
    /// Sender domain
    SenderDomain,
    /// Remote MX host being delivered to
    Mx,
    /// HELO/EHLO domain
    HeloDomain,
    /// Authenticated account name
    AuthenticatedAs,
    /// Listener identifier
    Listener,
    /// Local IP address of the connection
    LocalIp,
    /// Remote IP address of the connection
    RemoteIp,
    /// Message priority
    Priority,
}

/// Kind of value a field carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Domain,
    Mailbox,
    Ip,
    Integer,
    Id,
}

impl EnvelopeKey {
    /// Every field an envelope may carry
    pub const ALL: [EnvelopeKey; 11] = [
        EnvelopeKey::Rcpt,
        EnvelopeKey::RcptDomain,
        EnvelopeKey::Sender,
        EnvelopeKey::SenderDomain,
        EnvelopeKey::Mx,
        EnvelopeKey::HeloDomain,
        EnvelopeKey::AuthenticatedAs,
        EnvelopeKey::Listener,
        EnvelopeKey::LocalIp,
        EnvelopeKey::RemoteIp,
        EnvelopeKey::Priority,
    ];

    /// Field name as written in rules
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvelopeKey::Rcpt => "rcpt",
            EnvelopeKey::RcptDomain => "rcpt-domain",
            EnvelopeKey::Sender => "sender",
            EnvelopeKey::SenderDomain => "sender-domain",
            EnvelopeKey::Mx => "mx",
            EnvelopeKey::HeloDomain => "helo-domain",
            EnvelopeKey::AuthenticatedAs => "authenticated-as",
            EnvelopeKey::Listener => "listener",
            EnvelopeKey::LocalIp => "local-ip",
            EnvelopeKey::RemoteIp => "remote-ip",
            EnvelopeKey::Priority => "priority",
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            EnvelopeKey::RcptDomain
            | EnvelopeKey::SenderDomain
            | EnvelopeKey::Mx
            | EnvelopeKey::HeloDomain => FieldKind::Domain,
            EnvelopeKey::Rcpt | EnvelopeKey::Sender | EnvelopeKey::AuthenticatedAs => {
                FieldKind::Mailbox
            }
            EnvelopeKey::LocalIp | EnvelopeKey::RemoteIp => FieldKind::Ip,
            EnvelopeKey::Priority => FieldKind::Integer,
            EnvelopeKey::Listener => FieldKind::Id,
        }
    }
}

impl fmt::Display for EnvelopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeKey {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnvelopeKey::ALL
            .iter()
            .find(|key| key.as_str() == s)
            .copied()
            .ok_or_else(|| crate::Error::UnknownField(s.to_string()))
    }
}

/// Typed envelope value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeValue {
    Text(String),
    Ip(IpAddr),
    Integer(i64),
    Id(u64),
}

impl fmt::Display for EnvelopeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvelopeValue::Text(text) => f.write_str(text),
            EnvelopeValue::Ip(ip) => write!(f, "{}", ip),
            EnvelopeValue::Integer(num) => write!(f, "{}", num),
            EnvelopeValue::Id(id) => write!(f, "{}", id),
        }
    }
}

impl EnvelopeValue {
    /// Canonical string form used for matching and interpolation
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            EnvelopeValue::Text(text) => Cow::Borrowed(text.as_str()),
            other => Cow::Owned(other.to_string()),
        }
    }
}

impl From<String> for EnvelopeValue {
    fn from(value: String) -> Self {
        EnvelopeValue::Text(value)
    }
}

impl From<&str> for EnvelopeValue {
    fn from(value: &str) -> Self {
        EnvelopeValue::Text(value.to_string())
    }
}

impl From<IpAddr> for EnvelopeValue {
    fn from(value: IpAddr) -> Self {
        EnvelopeValue::Ip(value)
    }
}

impl From<i64> for EnvelopeValue {
    fn from(value: i64) -> Self {
        EnvelopeValue::Integer(value)
    }
}

impl From<u64> for EnvelopeValue {
    fn from(value: u64) -> Self {
        EnvelopeValue::Id(value)
    }
}

/// Read access to envelope fields by key.
///
/// The evaluator only depends on this trait, so the transaction layer can
/// expose its own session state without copying it into an [`Envelope`].
pub trait KeyLookup: Sync {
    /// Canonical string form of `key`, or `None` when the field is not set
    fn key(&self, key: EnvelopeKey) -> Option<Cow<'_, str>>;
}

/// Message envelope for one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    fields: HashMap<EnvelopeKey, EnvelopeValue>,
}

impl Envelope {
    /// Create an empty envelope
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    pub fn with(mut self, key: EnvelopeKey, value: impl Into<EnvelopeValue>) -> Self {
        self.fields.insert(key, value.into());
        self
    }

    /// Set the sender and derive the sender domain
    pub fn with_sender(self, sender: &str) -> Self {
        let envelope = match domain_part(sender) {
            Some(domain) => self.with(EnvelopeKey::SenderDomain, domain),
            None => self,
        };
        envelope.with(EnvelopeKey::Sender, sender)
    }

    /// Set the recipient and derive the recipient domain
    pub fn with_rcpt(self, rcpt: &str) -> Self {
        let envelope = match domain_part(rcpt) {
            Some(domain) => self.with(EnvelopeKey::RcptDomain, domain),
            None => self,
        };
        envelope.with(EnvelopeKey::Rcpt, rcpt)
    }

    /// Get a typed field value
    pub fn get(&self, key: EnvelopeKey) -> Option<&EnvelopeValue> {
        self.fields.get(&key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Build an envelope from a TOML table of `field = value` pairs.
    ///
    /// The value kind is dictated by the field: IP fields must parse as
    /// addresses, `priority` as a signed integer and `listener` as an
    /// unsigned identifier.
    pub fn from_toml(table: &toml::Table) -> crate::Result<Self> {
        let mut envelope = Envelope::new();

        for (name, value) in table {
            let key: EnvelopeKey = name.parse()?;
            let value = parse_field(key, value)?;
            envelope.fields.insert(key, value);
        }

        Ok(envelope)
    }
}

impl KeyLookup for Envelope {
    fn key(&self, key: EnvelopeKey) -> Option<Cow<'_, str>> {
        self.fields.get(&key).map(EnvelopeValue::render)
    }
}

fn domain_part(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
        .map(|domain| domain.to_lowercase())
}

fn parse_field(key: EnvelopeKey, value: &toml::Value) -> crate::Result<EnvelopeValue> {
    let invalid = || {
        crate::Error::Validation(format!("Invalid value for envelope field '{}': {}", key, value))
    };

    match (key.kind(), value) {
        (FieldKind::Domain | FieldKind::Mailbox, toml::Value::String(text)) => {
            Ok(EnvelopeValue::Text(text.clone()))
        }
        (FieldKind::Ip, toml::Value::String(text)) => text
            .parse::<IpAddr>()
            .map(EnvelopeValue::Ip)
            .map_err(|_| invalid()),
        (FieldKind::Integer, toml::Value::Integer(num)) => Ok(EnvelopeValue::Integer(*num)),
        (FieldKind::Integer, toml::Value::String(text)) => text
            .parse::<i64>()
            .map(EnvelopeValue::Integer)
            .map_err(|_| invalid()),
        (FieldKind::Id, toml::Value::Integer(num)) => u64::try_from(*num)
            .map(EnvelopeValue::Id)
            .map_err(|_| invalid()),
        (FieldKind::Id, toml::Value::String(text)) => {
            text.parse::<u64>().map(EnvelopeValue::Id).map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}
