//! Rule document loader
//!
//! Parses a TOML rule document into an immutable [`RuleSet`], together with
//! the replay envelope and the expected results it declares. Every pattern,
//! template and static store reference is validated here so evaluation
//! never sees a malformed rule.

use crate::engine::{Expectation, RuleKind, RuleSet};
use crate::error::ConfigError;
use crate::lookup::LookupRule;
use crate::rules::{Condition, Operator, Otherwise, Rule, Template, Value};
use mailrule_common::config::EngineConfig;
use mailrule_common::{Envelope, EnvelopeKey};
use mailrule_storage::registry::create_store;
use mailrule_storage::{CacheSettings, CachedStore, LookupStore, StoreRegistry};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Default compiled-regex size limit (1 MiB)
pub const DEFAULT_REGEX_SIZE_LIMIT: usize = 1 << 20;

/// Loader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Upper bound on the compiled size of `matches` patterns
    pub regex_size_limit: usize,
    /// Skip invalid entries with a warning instead of failing the load
    pub skip_invalid: bool,
    /// Wrap every declared store in a lookup cache
    pub cache: Option<CacheSettings>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            regex_size_limit: DEFAULT_REGEX_SIZE_LIMIT,
            skip_invalid: false,
            cache: None,
        }
    }
}

impl From<&EngineConfig> for LoadOptions {
    fn from(config: &EngineConfig) -> Self {
        Self {
            regex_size_limit: config.regex_size_limit,
            skip_invalid: config.skip_invalid,
            cache: NonZeroUsize::new(config.cache_entries).map(|entries| CacheSettings {
                entries,
                ttl_positive: config.cache_ttl_positive(),
                ttl_negative: config.cache_ttl_negative(),
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    envelope: Option<toml::Table>,
    #[serde(default)]
    eval: BTreeMap<String, toml::Value>,
    #[serde(default, rename = "maybe-eval")]
    maybe_eval: BTreeMap<String, toml::Value>,
    #[serde(default)]
    store: BTreeMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    test: RawTest,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    expect: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTest {
    Template(String),
    Clauses(Vec<RawClause>),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct RawClause {
    #[serde(rename = "if")]
    field: Option<String>,
    eq: Option<String>,
    starts_with: Option<String>,
    matches: Option<String>,
    then: Option<String>,
    #[serde(rename = "else")]
    otherwise: Option<toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawStore {
    #[serde(rename = "type")]
    kind: String,
    format: String,
    #[serde(default)]
    values: Vec<String>,
}

/// A loaded rule document
#[derive(Debug)]
pub struct RuleDocument {
    /// Rules and stores
    pub rules: RuleSet,
    /// Replay envelope, when the document declares one
    pub envelope: Option<Envelope>,
    /// Expected results declared by the rules
    pub expectations: Vec<Expectation>,
}

impl RuleDocument {
    /// Load a rule document from a file
    pub fn from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let document = Self::parse(&text, options)?;
        info!(
            path = %path.display(),
            rules = document.rules.len(),
            stores = document.rules.stores().len(),
            "Loaded rule document"
        );
        Ok(document)
    }

    /// Parse a rule document
    pub fn parse(text: &str, options: &LoadOptions) -> Result<Self, ConfigError> {
        let raw: RawDocument = toml::from_str(text)?;

        let envelope = raw.envelope.as_ref().map(Envelope::from_toml).transpose()?;

        // Stores first so rules can be checked against them
        let mut stores = StoreRegistry::new();
        for (id, value) in raw.store {
            let built = build_store(&id, value, options);
            if let Some(store) = admit(built, "store", &id, options)? {
                stores.insert(store)?;
            }
        }

        let mut rules = RuleSet::new(stores);
        let mut expectations = Vec::new();

        for (name, value) in raw.eval {
            let built = build_eval(value, options);
            if let Some((rule, expected)) = admit(built, "eval", &name, options)? {
                if let Some(expected) = expected {
                    expectations.push(Expectation {
                        kind: RuleKind::Eval,
                        name: name.clone(),
                        expected,
                    });
                }
                rules.insert_eval(name, rule);
            }
        }

        for (name, value) in raw.maybe_eval {
            let built = build_maybe_eval(value, rules.stores(), options);
            if let Some((rule, expected)) = admit(built, "maybe-eval", &name, options)? {
                if let Some(expected) = expected {
                    expectations.push(Expectation {
                        kind: RuleKind::MaybeEval,
                        name: name.clone(),
                        expected,
                    });
                }
                rules.insert_maybe_eval(name, rule);
            }
        }

        Ok(Self {
            rules,
            envelope,
            expectations,
        })
    }
}

/// Apply the load policy to one entry
fn admit<T>(
    result: Result<T, ConfigError>,
    section: &'static str,
    name: &str,
    options: &LoadOptions,
) -> Result<Option<T>, ConfigError> {
    match result {
        Ok(entry) => Ok(Some(entry)),
        Err(err) if options.skip_invalid => {
            warn!(section, name = %name, error = %err, "Skipping invalid entry");
            Ok(None)
        }
        Err(err) => Err(err.in_entry(section, name)),
    }
}

fn build_store(
    id: &str,
    value: toml::Value,
    options: &LoadOptions,
) -> Result<Arc<dyn LookupStore>, ConfigError> {
    let raw: RawStore = value.try_into()?;
    let store = create_store(id, &raw.kind, &raw.format, raw.values)?;

    let store: Arc<dyn LookupStore> = match options.cache {
        Some(settings) => Arc::new(CachedStore::new(store, settings)),
        None => store,
    };
    Ok(store)
}

fn build_eval(
    value: toml::Value,
    options: &LoadOptions,
) -> Result<(Rule, Option<Value>), ConfigError> {
    let raw: RawRule = value.try_into()?;
    if raw.key.is_some() {
        return Err(ConfigError::InvalidRule(
            "'key' is only valid for maybe-eval rules".to_string(),
        ));
    }

    let rule = build_rule(raw.test, options)?;
    let expected = raw.expect.map(literal).transpose()?;
    Ok((rule, expected))
}

fn build_maybe_eval(
    value: toml::Value,
    stores: &StoreRegistry,
    options: &LoadOptions,
) -> Result<(LookupRule, Option<Value>), ConfigError> {
    let raw: RawRule = value.try_into()?;
    let key = raw.key.as_deref().map(Template::parse).transpose()?;
    let rule = LookupRule::new(build_rule(raw.test, options)?, key)?;

    for id in rule.static_stores() {
        if !stores.contains(&id) {
            return Err(ConfigError::UnknownStore(id));
        }
    }

    let expected = raw.expect.map(literal).transpose()?;
    Ok((rule, expected))
}

fn build_rule(test: RawTest, options: &LoadOptions) -> Result<Rule, ConfigError> {
    let clauses = match test {
        RawTest::Template(source) => return Ok(Rule::Template(Template::parse(&source)?)),
        RawTest::Clauses(clauses) => clauses,
    };

    let mut conditions = Vec::with_capacity(clauses.len());
    let mut otherwise = None;

    for clause in clauses {
        if otherwise.is_some() {
            return Err(ConfigError::InvalidRule(
                "'else' must be the last clause".to_string(),
            ));
        }

        match clause.otherwise {
            Some(fallback) => {
                if clause.field.is_some()
                    || clause.eq.is_some()
                    || clause.starts_with.is_some()
                    || clause.matches.is_some()
                    || clause.then.is_some()
                {
                    return Err(ConfigError::InvalidRule(
                        "'else' clause cannot carry a condition".to_string(),
                    ));
                }
                otherwise = Some(build_otherwise(fallback)?);
            }
            None => conditions.push(build_condition(clause, options)?),
        }
    }

    let otherwise = otherwise
        .ok_or_else(|| ConfigError::InvalidRule("missing terminal 'else' clause".to_string()))?;
    Ok(Rule::conditional(conditions, otherwise))
}

fn build_condition(clause: RawClause, options: &LoadOptions) -> Result<Condition, ConfigError> {
    let name = clause
        .field
        .ok_or_else(|| ConfigError::InvalidRule("clause is missing 'if'".to_string()))?;
    let field: EnvelopeKey = name
        .parse()
        .map_err(|_| ConfigError::UnknownField(name.clone()))?;

    let operator = match (clause.eq, clause.starts_with, clause.matches) {
        (Some(operand), None, None) => Operator::Eq(operand),
        (None, Some(prefix), None) => Operator::StartsWith(prefix),
        (None, None, Some(pattern)) => Operator::matches(&pattern, options.regex_size_limit)?,
        (None, None, None) => {
            return Err(ConfigError::InvalidRule(format!(
                "condition on '{}' has no operator",
                name
            )))
        }
        _ => {
            return Err(ConfigError::InvalidRule(format!(
                "condition on '{}' has more than one operator",
                name
            )))
        }
    };

    let then = clause
        .then
        .ok_or_else(|| ConfigError::InvalidRule(format!("condition on '{}' has no 'then'", name)))?;

    Ok(Condition::new(field, operator, Template::parse(&then)?))
}

fn build_otherwise(value: toml::Value) -> Result<Otherwise, ConfigError> {
    match literal(value)? {
        Value::Bool(false) => Ok(Otherwise::False),
        value => Ok(Otherwise::Value(value)),
    }
}

/// Literal result value: boolean, string or integer
fn literal(value: toml::Value) -> Result<Value, ConfigError> {
    match value {
        toml::Value::Boolean(flag) => Ok(Value::Bool(flag)),
        toml::Value::String(text) => Ok(Value::Text(text)),
        toml::Value::Integer(num) => Ok(Value::Integer(num)),
        other => Err(ConfigError::InvalidRule(format!(
            "unsupported literal '{}'",
            other
        ))),
    }
}
