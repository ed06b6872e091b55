use std::sync::Arc;

use crate::rule::FormattingRule;

mod final_newline;
mod line_length;
mod trailing_whitespace;

pub use final_newline::final_newline_rule;
pub use line_length::line_length_rule;
pub use trailing_whitespace::trailing_whitespace_rule;

/// Every built-in rule, in default execution order.
pub fn all_rules() -> Vec<Arc<dyn FormattingRule>> {
    vec![
        trailing_whitespace_rule(),
        final_newline_rule(),
        line_length_rule(),
    ]
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        path::PathBuf,
        sync::Arc,
        time::{Duration, Instant},
    };

    use crate::{
        config::{LanguageVersion, RuleConfiguration, SecurityConfig},
        context::TransformationContext,
        errors::Result,
        parser::IndexOverlayParser,
        rule::FormattingRule,
        violation::FormattingViolation,
    };

    /// Parses `source` and runs the rule against it the way the format
    /// stage would, with a generous deadline.
    pub(crate) fn analyze(
        rule: &Arc<dyn FormattingRule>,
        source: &str,
        configs: &[RuleConfiguration],
    ) -> Result<Vec<FormattingViolation>> {
        with_context(source, |context| rule.analyze(context, configs))
    }

    pub(crate) fn format(
        rule: &Arc<dyn FormattingRule>,
        source: &str,
        configs: &[RuleConfiguration],
    ) -> Result<String> {
        with_context(source, |context| rule.format(context, configs))
    }

    fn with_context<T>(
        source: &str,
        body: impl FnOnce(&TransformationContext<'_>) -> Result<T>,
    ) -> Result<T> {
        let security = SecurityConfig::default();
        let parsed = IndexOverlayParser::with_defaults(security)
            .parse(source, LanguageVersion::JAVA_21)?;
        let path = PathBuf::from("Test.java");
        let context = TransformationContext::new(
            &parsed.arena,
            parsed.root,
            source,
            &path,
            security,
            Instant::now() + Duration::from_secs(10),
            Duration::from_secs(10),
        )?;
        body(&context)
    }

    #[test]
    fn all_rules_have_distinct_ids() {
        let rules = super::all_rules();
        let mut ids: Vec<&str> = rules.iter().map(|rule| rule.meta().id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), rules.len());
    }
}
