//! Rule Engine - Evaluates named rules against transaction envelopes
//!
//! Rules and stores are loaded into an immutable [`RuleSet`]. The engine
//! publishes the current rule set as a shared snapshot: every evaluation
//! works on the snapshot it started with, and a reload replaces the whole
//! snapshot in one atomic pointer swap. Readers never take a lock.

use crate::error::{EvalError, EvalResult};
use crate::lookup::{DynamicLookup, LookupRule};
use crate::rules::{Rule, Value};
use arc_swap::ArcSwap;
use mailrule_common::config::EngineConfig;
use mailrule_common::KeyLookup;
use mailrule_storage::StoreRegistry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Evaluation mode of a named rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Result is returned directly
    Eval,
    /// Result names a store to consult
    MaybeEval,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::Eval => "eval",
            RuleKind::MaybeEval => "maybe-eval",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable table of rules and stores
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    eval: HashMap<String, Rule>,
    maybe_eval: HashMap<String, LookupRule>,
    stores: StoreRegistry,
}

impl RuleSet {
    pub fn new(stores: StoreRegistry) -> Self {
        Self {
            eval: HashMap::new(),
            maybe_eval: HashMap::new(),
            stores,
        }
    }

    pub fn insert_eval(&mut self, name: impl Into<String>, rule: Rule) {
        self.eval.insert(name.into(), rule);
    }

    pub fn insert_maybe_eval(&mut self, name: impl Into<String>, rule: LookupRule) {
        self.maybe_eval.insert(name.into(), rule);
    }

    pub fn eval_rule(&self, name: &str) -> Option<&Rule> {
        self.eval.get(name)
    }

    pub fn maybe_eval_rule(&self, name: &str) -> Option<&LookupRule> {
        self.maybe_eval.get(name)
    }

    pub fn stores(&self) -> &StoreRegistry {
        &self.stores
    }

    /// Number of named rules across both modes
    pub fn len(&self) -> usize {
        self.eval.len() + self.maybe_eval.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eval.is_empty() && self.maybe_eval.is_empty()
    }
}

/// Expected result declared alongside a rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub kind: RuleKind,
    pub name: String,
    pub expected: Value,
}

/// Outcome of checking one expectation
#[derive(Debug)]
pub struct Verification {
    pub kind: RuleKind,
    pub name: String,
    pub expected: Value,
    pub actual: EvalResult<Value>,
}

impl Verification {
    pub fn passed(&self) -> bool {
        matches!(&self.actual, Ok(actual) if *actual == self.expected)
    }
}

/// Results of checking a batch of expectations, in declaration order
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub results: Vec<Verification>,
}

impl VerifyReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(Verification::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Verification> {
        self.results.iter().filter(|result| !result.passed())
    }
}

/// Rule engine
pub struct RuleEngine {
    rules: ArcSwap<RuleSet>,
    lookup_timeout: Duration,
}

impl RuleEngine {
    /// Create a new rule engine
    pub fn new(rules: RuleSet, lookup_timeout: Duration) -> Self {
        info!(
            rules = rules.len(),
            stores = rules.stores().len(),
            "Rule engine initialized"
        );
        Self {
            rules: ArcSwap::from_pointee(rules),
            lookup_timeout,
        }
    }

    /// Create a rule engine using the configured lookup timeout
    pub fn from_config(rules: RuleSet, config: &EngineConfig) -> Self {
        Self::new(rules, config.lookup_timeout())
    }

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<RuleSet> {
        self.rules.load_full()
    }

    /// Publish a new rule set. In-flight evaluations keep their snapshot.
    pub fn reload(&self, rules: RuleSet) {
        info!(
            rules = rules.len(),
            stores = rules.stores().len(),
            "Rule set reloaded"
        );
        self.rules.store(Arc::new(rules));
    }

    /// Evaluate an `eval` rule
    pub fn eval(&self, name: &str, envelope: &impl KeyLookup) -> EvalResult<Value> {
        self.eval_in(&self.snapshot(), name, envelope)
    }

    /// Evaluate a `maybe-eval` rule and consult the store it names
    pub async fn maybe_eval(&self, name: &str, envelope: &impl KeyLookup) -> EvalResult<Value> {
        self.maybe_eval_in(&self.snapshot(), name, envelope).await
    }

    /// Evaluate a named rule in whichever mode it was declared
    pub async fn evaluate(&self, name: &str, envelope: &impl KeyLookup) -> EvalResult<Value> {
        let rules = self.snapshot();
        if rules.eval_rule(name).is_some() {
            self.eval_in(&rules, name, envelope)
        } else {
            self.maybe_eval_in(&rules, name, envelope).await
        }
    }

    /// Evaluate every expectation against one envelope and one snapshot
    pub async fn verify(
        &self,
        expectations: &[Expectation],
        envelope: &impl KeyLookup,
    ) -> VerifyReport {
        let rules = self.snapshot();
        let mut results = Vec::with_capacity(expectations.len());

        for expectation in expectations {
            let actual = match expectation.kind {
                RuleKind::Eval => self.eval_in(&rules, &expectation.name, envelope),
                RuleKind::MaybeEval => {
                    self.maybe_eval_in(&rules, &expectation.name, envelope)
                        .await
                }
            };

            results.push(Verification {
                kind: expectation.kind,
                name: expectation.name.clone(),
                expected: expectation.expected.clone(),
                actual,
            });
        }

        VerifyReport { results }
    }

    fn eval_in(&self, rules: &RuleSet, name: &str, envelope: &impl KeyLookup) -> EvalResult<Value> {
        let rule = rules
            .eval_rule(name)
            .ok_or_else(|| EvalError::RuleNotFound(name.to_string()))?;

        let value = rule.evaluate(envelope)?.into_value();
        debug!(rule = %name, result = %value, "Evaluated rule");
        Ok(value)
    }

    async fn maybe_eval_in(
        &self,
        rules: &RuleSet,
        name: &str,
        envelope: &impl KeyLookup,
    ) -> EvalResult<Value> {
        let rule = rules
            .maybe_eval_rule(name)
            .ok_or_else(|| EvalError::RuleNotFound(name.to_string()))?;

        let value = DynamicLookup::new(rules.stores(), self.lookup_timeout)
            .evaluate(rule, envelope)
            .await?;
        debug!(rule = %name, result = %value, "Evaluated lookup rule");
        Ok(value)
    }
}
