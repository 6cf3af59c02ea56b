//! Dynamic store lookups
//!
//! A lookup rule evaluates to the identifier of a store rather than to a
//! final answer. The identifier may be assembled from captures, so the
//! store consulted can differ per transaction.

use crate::error::{ConfigError, EvalError, EvalResult};
use crate::rules::{Rule, RuleOutcome, Template, Value};
use mailrule_common::KeyLookup;
use mailrule_storage::{LookupQuery, StoreResolver};
use std::time::Duration;
use tracing::{debug, warn};

/// A `maybe-eval` rule
#[derive(Debug, Clone)]
pub struct LookupRule {
    rule: Rule,
    key: Option<Template>,
}

impl LookupRule {
    /// Build a lookup rule. Fallback literals must be store identifiers.
    pub fn new(rule: Rule, key: Option<Template>) -> Result<Self, ConfigError> {
        match rule.fallback() {
            None | Some(Value::Text(_)) => Ok(Self { rule, key }),
            Some(other) => Err(ConfigError::InvalidRule(format!(
                "fallback '{}' is not a store identifier",
                other
            ))),
        }
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Template rendering the key looked up in the store
    pub fn key(&self) -> Option<&Template> {
        self.key.as_ref()
    }

    /// Store identifiers known without evaluating anything
    pub fn static_stores(&self) -> Vec<String> {
        let mut stores: Vec<String> = self
            .rule
            .templates()
            .into_iter()
            .filter_map(Template::static_text)
            .collect();
        if let Some(Value::Text(id)) = self.rule.fallback() {
            stores.push(id.clone());
        }
        stores
    }
}

/// Resolves store identifiers and runs bounded queries
pub struct DynamicLookup<'a, R: StoreResolver + ?Sized> {
    resolver: &'a R,
    timeout: Duration,
}

impl<'a, R: StoreResolver + ?Sized> DynamicLookup<'a, R> {
    pub fn new(resolver: &'a R, timeout: Duration) -> Self {
        Self { resolver, timeout }
    }

    /// Evaluate a lookup rule.
    ///
    /// `false` is returned when no condition matches or when the store has
    /// no matching member; an identifier naming no store is an error.
    pub async fn evaluate(&self, rule: &LookupRule, envelope: &impl KeyLookup) -> EvalResult<Value> {
        let (outcome, captures) = rule.rule.evaluate_captured(envelope)?;

        let store_id = match outcome {
            RuleOutcome::Rendered(id) | RuleOutcome::Literal(Value::Text(id)) => id,
            RuleOutcome::Literal(other) => return Err(EvalError::StoreNotFound(other.to_string())),
            RuleOutcome::NoMatch => return Ok(Value::Bool(false)),
        };

        let query = match &rule.key {
            Some(key) => LookupQuery::Key(key.render(&captures, envelope)?),
            None => LookupQuery::Any,
        };

        let member = self.query(&store_id, &query).await?;
        Ok(member.map(Value::Text).unwrap_or(Value::Bool(false)))
    }

    /// Resolve `store_id` and run `query` against it within the timeout
    pub async fn query(&self, store_id: &str, query: &LookupQuery) -> EvalResult<Option<String>> {
        let store = self
            .resolver
            .resolve(store_id)
            .ok_or_else(|| EvalError::StoreNotFound(store_id.to_string()))?;

        match tokio::time::timeout(self.timeout, store.query(query)).await {
            Ok(Ok(member)) => {
                debug!(store = %store_id, ?query, found = member.is_some(), "Store lookup");
                Ok(member)
            }
            Ok(Err(source)) => Err(EvalError::Store {
                store: store_id.to_string(),
                source,
            }),
            Err(_) => {
                warn!(store = %store_id, timeout_ms = self.timeout.as_millis() as u64, "Store lookup timed out");
                Err(EvalError::LookupTimeout {
                    store: store_id.to_string(),
                    timeout: self.timeout,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Condition, Operator, Otherwise};
    use async_trait::async_trait;
    use mailrule_common::{Envelope, EnvelopeKey};
    use mailrule_storage::{
        LookupStore, MemoryStore, StoreError, StoreFormat, StoreKind, StoreRegistry, StoreResult,
    };
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    const TIMEOUT: Duration = Duration::from_secs(1);

    struct SlowStore;

    #[async_trait]
    impl LookupStore for SlowStore {
        fn id(&self) -> &str {
            "slow"
        }

        fn kind(&self) -> StoreKind {
            StoreKind::Memory
        }

        fn format(&self) -> StoreFormat {
            StoreFormat::List
        }

        async fn query(&self, _query: &LookupQuery) -> StoreResult<Option<String>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some("late".to_string()))
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl LookupStore for BrokenStore {
        fn id(&self) -> &str {
            "broken"
        }

        fn kind(&self) -> StoreKind {
            StoreKind::Memory
        }

        fn format(&self) -> StoreFormat {
            StoreFormat::List
        }

        async fn query(&self, _query: &LookupQuery) -> StoreResult<Option<String>> {
            Err(StoreError::Backend("connection refused".to_string()))
        }
    }

    fn create_test_registry() -> StoreRegistry {
        let mut registry = StoreRegistry::new();
        registry
            .insert(Arc::new(MemoryStore::new("list_mx/domains", vec!["mx".to_string()])))
            .unwrap();
        registry
            .insert(Arc::new(MemoryStore::new(
                "list_foo",
                vec!["user".to_string(), "admin".to_string()],
            )))
            .unwrap();
        registry.insert(Arc::new(SlowStore)).unwrap();
        registry.insert(Arc::new(BrokenStore)).unwrap();
        registry
    }

    fn create_test_envelope() -> Envelope {
        Envelope::new()
            .with(EnvelopeKey::Mx, "mx.somedomain.com")
            .with(EnvelopeKey::Rcpt, "admin@foo.example.org")
    }

    fn mx_rule() -> LookupRule {
        let condition = Condition::new(
            EnvelopeKey::Mx,
            Operator::matches(r"([^.]+)\.(.+)$", 1 << 20).unwrap(),
            Template::parse("list_${1}/domains").unwrap(),
        );
        LookupRule::new(Rule::conditional(vec![condition], Otherwise::False), None).unwrap()
    }

    fn static_rule(id: &str) -> LookupRule {
        LookupRule::new(Rule::Template(Template::parse(id).unwrap()), None).unwrap()
    }

    #[tokio::test]
    async fn test_dynamic_and_static_paths_agree() {
        let registry = create_test_registry();
        let lookup = DynamicLookup::new(&registry, TIMEOUT);
        let envelope = create_test_envelope();

        let dynamic = lookup.evaluate(&mx_rule(), &envelope).await.unwrap();
        let fixed = lookup
            .evaluate(&static_rule("list_mx/domains"), &envelope)
            .await
            .unwrap();

        assert_eq!(dynamic, Value::from("mx"));
        assert_eq!(dynamic, fixed);
    }

    #[tokio::test]
    async fn test_no_match_skips_lookup() {
        let registry = StoreRegistry::new();
        let lookup = DynamicLookup::new(&registry, TIMEOUT);
        let envelope = Envelope::new().with(EnvelopeKey::Mx, "localhost");

        let result = lookup.evaluate(&mx_rule(), &envelope).await.unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_key_lookup() {
        let registry = create_test_registry();
        let lookup = DynamicLookup::new(&registry, TIMEOUT);

        let condition = Condition::new(
            EnvelopeKey::Rcpt,
            Operator::matches(r"^([^@]+)@([^.]+)\.", 1 << 20).unwrap(),
            Template::parse("list_${2}").unwrap(),
        );
        let rule = LookupRule::new(
            Rule::conditional(vec![condition], Otherwise::False),
            Some(Template::parse("${1}").unwrap()),
        )
        .unwrap();

        let result = lookup.evaluate(&rule, &create_test_envelope()).await.unwrap();
        assert_eq!(result, Value::from("admin"));

        let envelope = Envelope::new().with(EnvelopeKey::Rcpt, "guest@foo.example.org");
        let result = lookup.evaluate(&rule, &envelope).await.unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[tokio::test]
    async fn test_store_not_found() {
        let registry = create_test_registry();
        let lookup = DynamicLookup::new(&registry, TIMEOUT);
        let envelope = Envelope::new().with(EnvelopeKey::Mx, "relay.somedomain.com");

        let result = lookup.evaluate(&mx_rule(), &envelope).await;
        assert!(matches!(result, Err(EvalError::StoreNotFound(id)) if id == "list_relay/domains"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_an_error() {
        let registry = create_test_registry();
        let lookup = DynamicLookup::new(&registry, TIMEOUT);

        let result = lookup
            .evaluate(&static_rule("slow"), &create_test_envelope())
            .await;
        assert!(matches!(result, Err(EvalError::LookupTimeout { ref store, .. }) if store == "slow"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_an_error() {
        let registry = create_test_registry();
        let lookup = DynamicLookup::new(&registry, TIMEOUT);

        let result = lookup
            .evaluate(&static_rule("broken"), &create_test_envelope())
            .await;
        assert!(matches!(result, Err(EvalError::Store { .. })));
    }

    #[test]
    fn test_fallback_must_name_store() {
        let rule = Rule::conditional(Vec::new(), Otherwise::Value(Value::Bool(true)));
        assert!(matches!(
            LookupRule::new(rule, None),
            Err(ConfigError::InvalidRule(_))
        ));

        let rule = Rule::conditional(Vec::new(), Otherwise::Value(Value::from("list_default")));
        let rule = LookupRule::new(rule, None).unwrap();
        assert_eq!(rule.static_stores(), vec!["list_default".to_string()]);
    }

    #[test]
    fn test_static_stores() {
        assert!(mx_rule().static_stores().is_empty());
        assert_eq!(
            static_rule("list_mx/domains").static_stores(),
            vec!["list_mx/domains".to_string()]
        );
    }
}
