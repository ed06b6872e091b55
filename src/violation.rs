use std::{fmt, path::PathBuf};

use colored::Colorize;
use derive_builder::Builder;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
    Info,
    Debug,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
            Severity::Debug => "debug",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A concrete replacement a rule suggests for a violation.
#[derive(Builder, Clone, Debug, PartialEq, Eq)]
#[builder(setter(into))]
pub struct FixStrategy {
    pub description: String,
    #[builder(default = "true")]
    pub auto_applicable: bool,
    pub replacement_text: String,
    pub start_offset: u32,
    pub end_offset: u32,
}

/// One style finding, positioned in its file. Immutable once built.
#[derive(Builder, Clone, Debug)]
#[builder(setter(into))]
pub struct FormattingViolation {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub file: PathBuf,
    pub start_offset: u32,
    pub end_offset: u32,
    pub line: u32,
    pub column: u32,
    #[builder(default)]
    pub suggested_fixes: Vec<FixStrategy>,
}

impl FormattingViolation {
    pub fn print(&self) {
        let severity = match self.severity {
            Severity::Error => self.severity.label().red().bold(),
            Severity::Warning => self.severity.label().yellow().bold(),
            Severity::Info => self.severity.label().blue(),
            Severity::Debug => self.severity.label().dimmed(),
        };
        eprintln!(
            "{}:{}:{} {} {} [{}]",
            self.file.display(),
            self.line,
            self.column,
            severity,
            self.message,
            self.rule_id
        );
    }
}
