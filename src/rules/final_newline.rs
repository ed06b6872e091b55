use std::sync::Arc;

use serde::Deserialize;

use crate::{
    config::RuleConfiguration,
    context::TransformationContext,
    errors::{FormatterError, Result},
    rule::{resolve_options, FormattingRule, RuleMeta},
    violation::{FixStrategyBuilder, FormattingViolation, FormattingViolationBuilder, Severity},
};

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct FinalNewlineOptions {
    #[serde(default = "default_require")]
    require: bool,
}

fn default_require() -> bool {
    true
}

impl Default for FinalNewlineOptions {
    fn default() -> Self {
        Self { require: true }
    }
}

/// Requires files to end with a newline; the fix appends one.
struct FinalNewline;

pub fn final_newline_rule() -> Arc<dyn FormattingRule> {
    Arc::new(FinalNewline)
}

fn missing_newline(source: &str, options: &FinalNewlineOptions) -> bool {
    options.require && !source.is_empty() && !source.ends_with('\n')
}

impl FormattingRule for FinalNewline {
    fn meta(&self) -> RuleMeta {
        RuleMeta {
            id: "final-newline",
            name: "Final newline",
            description: "Files must end with a line terminator",
            default_severity: Severity::Warning,
            fixable: true,
        }
    }

    fn validate(&self, options: Option<&serde_json::Value>) -> Result<()> {
        if let Some(value) = options {
            let _: FinalNewlineOptions = serde_json::from_value(value.clone()).map_err(|error| {
                FormatterError::InvalidConfiguration {
                    rule: self.meta().id.to_owned(),
                    message: error.to_string(),
                }
            })?;
        }
        Ok(())
    }

    fn analyze(
        &self,
        context: &TransformationContext<'_>,
        configs: &[RuleConfiguration],
    ) -> Result<Vec<FormattingViolation>> {
        let options: FinalNewlineOptions = resolve_options(&self.meta(), configs)?;
        let source = context.source();
        if !missing_newline(source, &options) {
            return Ok(Vec::new());
        }
        let end = source.len() as u32;
        let (line, column) = context.line_column(end);
        Ok(vec![FormattingViolationBuilder::default()
            .rule_id(self.meta().id)
            .severity(self.meta().default_severity)
            .message("file does not end with a newline")
            .file(context.path())
            .start_offset(end)
            .end_offset(end)
            .line(line)
            .column(column)
            .suggested_fixes(vec![FixStrategyBuilder::default()
                .description("append a final newline")
                .replacement_text("\n")
                .start_offset(end)
                .end_offset(end)
                .build()
                .unwrap()])
            .build()
            .unwrap()])
    }

    fn format(
        &self,
        context: &TransformationContext<'_>,
        configs: &[RuleConfiguration],
    ) -> Result<String> {
        let options: FinalNewlineOptions = resolve_options(&self.meta(), configs)?;
        let source = context.source();
        if missing_newline(source, &options) {
            let mut out = source.to_owned();
            out.push('\n');
            return Ok(out);
        }
        Ok(source.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ConfiguredLevel, rules::testing};

    #[test]
    fn missing_final_newline_is_flagged() {
        let violations = testing::analyze(&final_newline_rule(), "class A {}", &[]).unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].suggested_fixes.len(), 1);
        assert_eq!(violations[0].suggested_fixes[0].replacement_text, "\n");
    }

    #[test]
    fn terminated_files_are_clean() {
        let violations = testing::analyze(&final_newline_rule(), "class A {}\n", &[]).unwrap();
        assert!(violations.is_empty());
        let violations = testing::analyze(&final_newline_rule(), "", &[]).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn format_appends_exactly_one_newline() {
        let formatted = testing::format(&final_newline_rule(), "class A {}", &[]).unwrap();
        assert_eq!(formatted, "class A {}\n");
        let again = testing::format(&final_newline_rule(), &formatted, &[]).unwrap();
        assert_eq!(again, formatted);
    }

    #[test]
    fn rule_can_be_configured_off() {
        let configs = vec![RuleConfiguration {
            name: "final-newline".into(),
            level: ConfiguredLevel::Warning,
            options: Some(serde_json::json!({ "require": false })),
        }];
        let violations = testing::analyze(&final_newline_rule(), "class A {}", &configs).unwrap();
        assert!(violations.is_empty());
        let formatted = testing::format(&final_newline_rule(), "class A {}", &configs).unwrap();
        assert_eq!(formatted, "class A {}");
    }
}
