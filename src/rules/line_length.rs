use std::sync::Arc;

use serde::Deserialize;

use crate::{
    config::RuleConfiguration,
    context::TransformationContext,
    errors::{FormatterError, Result},
    rule::{resolve_options, FormattingRule, RuleMeta},
    violation::{FormattingViolation, FormattingViolationBuilder, Severity},
};

const DEFAULT_MAX_LENGTH: usize = 120;

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct LineLengthOptions {
    #[serde(default = "default_max_length")]
    max_length: usize,
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

impl Default for LineLengthOptions {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

/// Reports lines longer than the configured limit. Analysis only; there is
/// no safe automatic rewrite for an overlong line.
struct LineLength;

pub fn line_length_rule() -> Arc<dyn FormattingRule> {
    Arc::new(LineLength)
}

impl FormattingRule for LineLength {
    fn meta(&self) -> RuleMeta {
        RuleMeta {
            id: "line-length",
            name: "Line length",
            description: "Lines must not exceed the configured width",
            default_severity: Severity::Warning,
            fixable: false,
        }
    }

    fn validate(&self, options: Option<&serde_json::Value>) -> Result<()> {
        if let Some(value) = options {
            let parsed: LineLengthOptions =
                serde_json::from_value(value.clone()).map_err(|error| {
                    FormatterError::InvalidConfiguration {
                        rule: self.meta().id.to_owned(),
                        message: error.to_string(),
                    }
                })?;
            if parsed.max_length == 0 {
                return Err(FormatterError::InvalidConfiguration {
                    rule: self.meta().id.to_owned(),
                    message: "max-length must be positive".into(),
                });
            }
        }
        Ok(())
    }

    fn analyze(
        &self,
        context: &TransformationContext<'_>,
        configs: &[RuleConfiguration],
    ) -> Result<Vec<FormattingViolation>> {
        let options: LineLengthOptions = resolve_options(&self.meta(), configs)?;
        let mut violations = Vec::new();
        let mut offset = 0usize;
        for line in context.source().split_inclusive('\n') {
            context.check_deadline()?;
            let content = line.trim_end_matches(|ch| ch == '\n' || ch == '\r');
            let width = content.chars().count();
            if width > options.max_length {
                let (line_number, _) = context.line_column(offset as u32);
                violations.push(
                    FormattingViolationBuilder::default()
                        .rule_id(self.meta().id)
                        .severity(self.meta().default_severity)
                        .message(format!(
                            "line is {width} characters, limit is {}",
                            options.max_length
                        ))
                        .file(context.path())
                        .start_offset(offset as u32)
                        .end_offset((offset + content.len()) as u32)
                        .line(line_number)
                        .column(options.max_length as u32 + 1)
                        .build()
                        .unwrap(),
                );
            }
            offset += line.len();
        }
        Ok(violations)
    }

    fn format(
        &self,
        context: &TransformationContext<'_>,
        _configs: &[RuleConfiguration],
    ) -> Result<String> {
        Ok(context.source().to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ConfiguredLevel, rules::testing};

    fn configured(max_length: usize) -> Vec<RuleConfiguration> {
        vec![RuleConfiguration {
            name: "line-length".into(),
            level: ConfiguredLevel::Warning,
            options: Some(serde_json::json!({ "max-length": max_length })),
        }]
    }

    #[test]
    fn default_limit_tolerates_ordinary_lines() {
        let source = "class A {\n    int x;\n}\n";
        let violations = testing::analyze(&line_length_rule(), source, &[]).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn overlong_lines_are_reported_with_their_width() {
        let source = "class A { int aaaaaaaaaa; }\n";
        let violations = testing::analyze(&line_length_rule(), source, &configured(10)).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 1);
        assert_eq!(violations[0].column, 11);
        assert!(violations[0].message.contains("limit is 10"));
    }

    #[test]
    fn zero_limit_fails_validation() {
        let rule = line_length_rule();
        let result = rule.validate(Some(&serde_json::json!({ "max-length": 0 })));
        assert!(matches!(
            result,
            Err(FormatterError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn malformed_options_fail_validation() {
        let rule = line_length_rule();
        let result = rule.validate(Some(&serde_json::json!({ "max-length": "wide" })));
        assert!(matches!(
            result,
            Err(FormatterError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn format_is_the_identity() {
        let source = "class A { int aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa; }\n";
        let formatted = testing::format(&line_length_rule(), source, &configured(10)).unwrap();
        assert_eq!(formatted, source);
    }
}
