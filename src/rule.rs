use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::{
    config::RuleConfiguration,
    context::TransformationContext,
    errors::{FormatterError, Result},
    violation::{FormattingViolation, Severity},
};

/// Static description of a rule.
#[derive(Clone, Debug)]
pub struct RuleMeta {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub default_severity: Severity,
    pub fixable: bool,
}

/// A formatting rule. Stateless and thread-safe: one instance may be invoked
/// concurrently for many files, so any memoization belongs in the
/// per-file [`TransformationContext`], never in the rule itself.
///
/// `configs` is the ordered configuration list for the whole run; a rule
/// picks out its own entry by id (see [`resolve_options`]) and falls back to
/// its declared defaults. Long-running work must poll
/// `context.check_deadline()`.
pub trait FormattingRule: Send + Sync {
    fn meta(&self) -> RuleMeta;

    /// Validates this rule's options before anything runs. Malformed or
    /// out-of-range values fail with `InvalidConfiguration`.
    fn validate(&self, options: Option<&serde_json::Value>) -> Result<()> {
        let _ = options;
        Ok(())
    }

    /// Read-only pass producing violations.
    fn analyze(
        &self,
        context: &TransformationContext<'_>,
        configs: &[RuleConfiguration],
    ) -> Result<Vec<FormattingViolation>>;

    /// Returns the (possibly rewritten) source. Must be deterministic and a
    /// pure function of the tree and configuration.
    fn format(
        &self,
        context: &TransformationContext<'_>,
        configs: &[RuleConfiguration],
    ) -> Result<String>;
}

/// Deserializes the matching options entry for `meta.id` out of the config
/// list, falling back to `T::default()`. Unknown keys are ignored by serde.
pub fn resolve_options<T: DeserializeOwned + Default>(
    meta: &RuleMeta,
    configs: &[RuleConfiguration],
) -> Result<T> {
    let options = configs
        .iter()
        .find(|configuration| configuration.name == meta.id)
        .and_then(|configuration| configuration.options.as_ref());
    match options {
        Some(value) => serde_json::from_value(value.clone()).map_err(|error| {
            FormatterError::InvalidConfiguration {
                rule: meta.id.to_owned(),
                message: error.to_string(),
            }
        }),
        None => Ok(T::default()),
    }
}

/// A rule paired with its resolved severity and options for one run.
pub struct InstantiatedRule {
    pub rule: Arc<dyn FormattingRule>,
    pub meta: RuleMeta,
    pub severity: Severity,
    pub options: Option<serde_json::Value>,
}

impl InstantiatedRule {
    pub fn new(rule: Arc<dyn FormattingRule>, configuration: &RuleConfiguration) -> Result<Self> {
        let meta = rule.meta();
        rule.validate(configuration.options.as_ref())?;
        Ok(Self {
            severity: configuration.level.severity(meta.default_severity),
            options: configuration.options.clone(),
            meta,
            rule,
        })
    }

    /// The configuration slice a rule sees: its own resolved entry.
    pub fn configuration(&self) -> RuleConfiguration {
        RuleConfiguration {
            name: self.meta.id.to_owned(),
            level: crate::config::ConfiguredLevel::Default,
            options: self.options.clone(),
        }
    }
}
