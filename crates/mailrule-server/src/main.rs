//! MailRule - Rule document verification entry point
//!
//! Loads a rule document, evaluates every rule that declares an `expect`
//! value against the document's envelope and reports the results.

use anyhow::{bail, Result};
use mailrule_common::config::{Config, LoggingConfig};
use mailrule_core::{LoadOptions, RuleDocument, RuleEngine};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging);

    // A path on the command line takes precedence over the configured one
    let rules_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.engine.rules_path.clone());

    info!(path = %rules_path.display(), "Loading rule document");
    let document = RuleDocument::from_file(&rules_path, &LoadOptions::from(&config.engine))?;

    let envelope = match document.envelope {
        Some(envelope) => envelope,
        None => {
            warn!("Rule document declares no envelope; evaluating against an empty one");
            Default::default()
        }
    };

    let engine = RuleEngine::from_config(document.rules, &config.engine);
    let report = engine.verify(&document.expectations, &envelope).await;

    for result in &report.results {
        match &result.actual {
            Ok(actual) if result.passed() => {
                info!(kind = %result.kind, rule = %result.name, result = %actual, "Check passed");
            }
            Ok(actual) => {
                warn!(
                    kind = %result.kind,
                    rule = %result.name,
                    expected = %result.expected,
                    actual = %actual,
                    "Check failed"
                );
            }
            Err(e) => {
                warn!(
                    kind = %result.kind,
                    rule = %result.name,
                    expected = %result.expected,
                    code = e.code(),
                    error = %e,
                    "Check failed"
                );
            }
        }
    }

    let failed = report.failures().count();
    if failed > 0 {
        bail!("{} of {} checks failed", failed, report.results.len());
    }

    info!(checks = report.results.len(), "All checks passed");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
