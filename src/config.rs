use std::{
    collections::HashMap,
    env, fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::Parser;
use derive_builder::Builder;
use serde::Deserialize;
use tracing::instrument;

use crate::{
    batch::ErrorStrategy,
    errors::{FormatterError, Result},
    rule::{FormattingRule, InstantiatedRule},
    violation::Severity,
};

pub const DEFAULT_MAX_SOURCE_BYTES: usize = 50 * 1024 * 1024;
pub const DEFAULT_MAX_SOURCE_CHARS: usize = 10_000_000;
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 1000;
pub const DEFAULT_MAX_ARENA_BYTES: usize = 256 * 1024 * 1024;
pub const DEFAULT_RULE_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MEMORY_BUDGET_BYTES: usize = 2 * 1024 * 1024 * 1024;

/// Resource and policy limits applied to every file.
#[derive(Clone, Copy, Debug)]
pub struct SecurityConfig {
    pub max_source_bytes: usize,
    pub max_source_chars: usize,
    pub max_recursion_depth: usize,
    pub max_arena_bytes: usize,
    pub rule_timeout: Duration,
    pub preview_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_source_bytes: DEFAULT_MAX_SOURCE_BYTES,
            max_source_chars: DEFAULT_MAX_SOURCE_CHARS,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
            max_arena_bytes: DEFAULT_MAX_ARENA_BYTES,
            rule_timeout: DEFAULT_RULE_TIMEOUT,
            preview_enabled: false,
        }
    }
}

/// Java language level the parser targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LanguageVersion(pub u16);

impl LanguageVersion {
    pub const JAVA_17: LanguageVersion = LanguageVersion(17);
    pub const JAVA_21: LanguageVersion = LanguageVersion(21);
    pub const JAVA_25: LanguageVersion = LanguageVersion(25);

    pub fn at_least(self, version: u16) -> bool {
        self.0 >= version
    }
}

impl Default for LanguageVersion {
    fn default() -> Self {
        Self::JAVA_21
    }
}

#[derive(Builder, Default, Parser)]
#[builder(default, setter(into, strip_option))]
#[command(name = "javafmt")]
pub struct Args {
    /// Files to process. Directory discovery happens outside the formatter.
    pub paths: Vec<PathBuf>,

    /// Run a single rule by id instead of every configured rule.
    #[arg(long)]
    pub rule: Option<String>,

    /// Rewrite files in place instead of only reporting violations.
    #[arg(long)]
    pub write: bool,

    /// Suppress per-violation output; only report counts.
    #[arg(long)]
    pub quiet: bool,

    /// Target Java language level.
    #[arg(long)]
    pub java_version: Option<u16>,

    /// Enable preview-feature parse strategies.
    #[arg(long)]
    pub preview: bool,

    /// Cap on concurrently processed files.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Explicit config file path; otherwise ancestors are searched for
    /// `.javafmt.yml`.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    pub fn load_config_file_and_into_config(
        self,
        all_rules: Vec<Arc<dyn FormattingRule>>,
    ) -> Result<Config> {
        let config_file = match &self.config {
            Some(path) => Some(load_config_file(path)?),
            None => find_config_file()
                .map(|path| load_config_file(&path))
                .transpose()?,
        };
        let rule_configurations = match config_file {
            Some(content) => content.rule_configurations(),
            None => Vec::new(),
        };
        let security = SecurityConfig {
            preview_enabled: self.preview,
            ..SecurityConfig::default()
        };
        Ok(Config {
            paths: self.paths,
            rule: self.rule,
            write: self.write,
            quiet: self.quiet,
            version: self.java_version.map(LanguageVersion).unwrap_or_default(),
            security,
            all_rules,
            rule_configurations,
            max_concurrency: self
                .max_concurrency
                .unwrap_or_else(rayon::current_num_threads),
            error_strategy: ErrorStrategy::Continue,
            memory_budget_bytes: DEFAULT_MEMORY_BUDGET_BYTES,
        })
    }
}

#[derive(Builder)]
#[builder(setter(strip_option, into), pattern = "owned")]
pub struct Config {
    #[builder(default)]
    pub paths: Vec<PathBuf>,

    #[builder(default)]
    pub rule: Option<String>,

    #[builder(default)]
    pub write: bool,

    #[builder(default)]
    pub quiet: bool,

    #[builder(default)]
    pub version: LanguageVersion,

    #[builder(default)]
    pub security: SecurityConfig,

    pub all_rules: Vec<Arc<dyn FormattingRule>>,

    #[builder(default)]
    pub rule_configurations: Vec<RuleConfiguration>,

    #[builder(default = "rayon::current_num_threads()")]
    pub max_concurrency: usize,

    #[builder(default)]
    pub error_strategy: ErrorStrategy,

    #[builder(default = "DEFAULT_MEMORY_BUDGET_BYTES")]
    pub memory_budget_bytes: usize,
}

impl Config {
    /// Pairs every active rule with its resolved severity and options,
    /// validating options before anything runs.
    pub fn get_instantiated_rules(&self) -> Result<Vec<InstantiatedRule>> {
        let rules_by_id: HashMap<&str, &Arc<dyn FormattingRule>> = self
            .all_rules
            .iter()
            .map(|rule| (rule.meta().id, rule))
            .collect();
        let configurations = if self.rule_configurations.is_empty() {
            self.all_rules
                .iter()
                .map(RuleConfiguration::default_for_rule)
                .collect()
        } else {
            self.rule_configurations.clone()
        };
        let mut instantiated = Vec::new();
        for configuration in &configurations {
            if configuration.level == ConfiguredLevel::Off {
                continue;
            }
            let rule = rules_by_id.get(configuration.name.as_str()).ok_or_else(|| {
                FormatterError::InvalidConfiguration {
                    rule: configuration.name.clone(),
                    message: "unknown rule".into(),
                }
            })?;
            instantiated.push(InstantiatedRule::new(Arc::clone(rule), configuration)?);
        }
        if let Some(rule_arg) = &self.rule {
            instantiated.retain(|rule| rule.meta.id == rule_arg);
            if instantiated.is_empty() {
                return Err(FormatterError::InvalidConfiguration {
                    rule: rule_arg.clone(),
                    message: "unknown or inactive rule".into(),
                });
            }
        }
        Ok(instantiated)
    }
}

/// Per-rule configuration entry: a level and an opaque options value the
/// rule deserializes itself. Unknown keys inside `options` are ignored.
#[derive(Clone, Debug)]
pub struct RuleConfiguration {
    pub name: String,
    pub level: ConfiguredLevel,
    pub options: Option<serde_json::Value>,
}

impl RuleConfiguration {
    pub fn default_for_rule(rule: &Arc<dyn FormattingRule>) -> Self {
        Self {
            name: rule.meta().id.to_owned(),
            level: ConfiguredLevel::Default,
            options: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfiguredLevel {
    Off,
    Error,
    Warning,
    Info,
    Debug,
    /// Use the rule's declared default severity.
    Default,
}

impl ConfiguredLevel {
    pub fn severity(self, default: Severity) -> Severity {
        match self {
            ConfiguredLevel::Error => Severity::Error,
            ConfiguredLevel::Warning => Severity::Warning,
            ConfiguredLevel::Info => Severity::Info,
            ConfiguredLevel::Debug => Severity::Debug,
            ConfiguredLevel::Off | ConfiguredLevel::Default => default,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConfigFileContent {
    #[serde(default)]
    pub rules: HashMap<String, RuleConfigurationValue>,
}

impl ConfigFileContent {
    pub fn rule_configurations(&self) -> Vec<RuleConfiguration> {
        let mut configurations: Vec<RuleConfiguration> = self
            .rules
            .iter()
            .map(|(name, value)| RuleConfiguration {
                name: name.clone(),
                level: value.level,
                options: value.options.clone(),
            })
            .collect();
        configurations.sort_by(|a, b| a.name.cmp(&b.name));
        configurations
    }
}

#[derive(Clone, Deserialize)]
pub struct RuleConfigurationValue {
    pub level: ConfiguredLevel,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

const CONFIG_FILENAME: &str = ".javafmt.yml";

pub fn load_config_file(path: &Path) -> Result<ConfigFileContent> {
    let contents = fs::read_to_string(path).map_err(|error| FormatterError::ConfigFile {
        path: path.to_owned(),
        message: error.to_string(),
    })?;
    serde_yaml::from_str(&contents).map_err(|error| FormatterError::ConfigFile {
        path: path.to_owned(),
        message: error.to_string(),
    })
}

#[instrument]
pub fn find_config_file() -> Option<PathBuf> {
    find_filename_in_ancestor_directory(CONFIG_FILENAME, env::current_dir().ok()?)
}

fn find_filename_in_ancestor_directory(
    filename: impl AsRef<Path>,
    starting_directory: PathBuf,
) -> Option<PathBuf> {
    let filename = filename.as_ref();
    let mut current_path = starting_directory;

    loop {
        current_path.push(filename);

        if current_path.is_file() {
            return Some(current_path);
        }

        if !(current_path.pop() && current_path.pop()) {
            return None;
        }
    }
}
