use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{
    config::RuleConfiguration,
    context::TransformationContext,
    errors::Result,
    rule::{FormattingRule, RuleMeta},
    violation::{FixStrategyBuilder, FormattingViolation, FormattingViolationBuilder, Severity},
};

static TRAILING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)[ \t]+\r?$").unwrap());

/// Flags and removes whitespace at the end of lines, outside string-ish
/// literals and comments.
struct TrailingWhitespace;

pub fn trailing_whitespace_rule() -> Arc<dyn FormattingRule> {
    Arc::new(TrailingWhitespace)
}

/// Byte range of the removable whitespace within one regex match; the
/// matched optional `\r` stays.
fn removable(m: &regex::Match<'_>) -> (usize, usize) {
    let end = if m.as_str().ends_with('\r') {
        m.end() - 1
    } else {
        m.end()
    };
    (m.start(), end)
}

impl FormattingRule for TrailingWhitespace {
    fn meta(&self) -> RuleMeta {
        RuleMeta {
            id: "trailing-whitespace",
            name: "Trailing whitespace",
            description: "Lines must not end in spaces or tabs",
            default_severity: Severity::Warning,
            fixable: true,
        }
    }

    fn analyze(
        &self,
        context: &TransformationContext<'_>,
        _configs: &[RuleConfiguration],
    ) -> Result<Vec<FormattingViolation>> {
        let source = context.source();
        let mut violations = Vec::new();
        for m in TRAILING.find_iter(source) {
            context.check_deadline()?;
            let (start, end) = removable(&m);
            if start == end || context.is_in_literal_or_comment(start as u32) {
                continue;
            }
            let (line, column) = context.line_column(start as u32);
            violations.push(
                FormattingViolationBuilder::default()
                    .rule_id(self.meta().id)
                    .severity(self.meta().default_severity)
                    .message("trailing whitespace")
                    .file(context.path())
                    .start_offset(start as u32)
                    .end_offset(end as u32)
                    .line(line)
                    .column(column)
                    .suggested_fixes(vec![FixStrategyBuilder::default()
                        .description("remove the trailing whitespace")
                        .replacement_text("")
                        .start_offset(start as u32)
                        .end_offset(end as u32)
                        .build()
                        .unwrap()])
                    .build()
                    .unwrap(),
            );
        }
        Ok(violations)
    }

    fn format(
        &self,
        context: &TransformationContext<'_>,
        _configs: &[RuleConfiguration],
    ) -> Result<String> {
        let source = context.source();
        let mut out = String::with_capacity(source.len());
        let mut copied_to = 0;
        for m in TRAILING.find_iter(source) {
            context.check_deadline()?;
            let (start, end) = removable(&m);
            if start == end || context.is_in_literal_or_comment(start as u32) {
                continue;
            }
            out.push_str(&source[copied_to..start]);
            copied_to = end;
        }
        out.push_str(&source[copied_to..]);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::testing;

    #[test]
    fn flags_trailing_spaces_and_tabs() {
        let source = "class A {   \n    int x; \t\n}\n";
        let violations = testing::analyze(&trailing_whitespace_rule(), source, &[]).unwrap();
        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].line, 1);
        assert_eq!(violations[1].line, 2);
        assert!(violations[0].suggested_fixes[0].auto_applicable);
    }

    #[test]
    fn clean_source_has_no_violations() {
        let source = "class A {\n    int x;\n}\n";
        let violations = testing::analyze(&trailing_whitespace_rule(), source, &[]).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn format_removes_the_whitespace() {
        let source = "class A {  \n    int x;\t\n}\n";
        let formatted = testing::format(&trailing_whitespace_rule(), source, &[]).unwrap();
        assert_eq!(formatted, "class A {\n    int x;\n}\n");
    }

    #[test]
    fn format_is_idempotent() {
        let source = "class A {  \n    int x;  \n}\n";
        let once = testing::format(&trailing_whitespace_rule(), source, &[]).unwrap();
        let twice = testing::format(&trailing_whitespace_rule(), &once, &[]).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn text_block_interiors_are_untouched() {
        let source = "class A {\n    String s = \"\"\"\n      padded   \n      \"\"\";\n}\n";
        let formatted = testing::format(&trailing_whitespace_rule(), source, &[]).unwrap();
        assert_eq!(formatted, source);
        let violations = testing::analyze(&trailing_whitespace_rule(), source, &[]).unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn crlf_line_endings_survive_the_rewrite() {
        let source = "class A {  \r\n}\r\n";
        let formatted = testing::format(&trailing_whitespace_rule(), source, &[]).unwrap();
        assert_eq!(formatted, "class A {\r\n}\r\n");
    }
}
