mod arena;
mod batch;
mod cli;
mod config;
mod context;
mod errors;
mod lexer;
mod memory;
mod node_type;
mod parse_context;
mod parser;
mod pipeline;
mod position;
mod rule;
mod rules;
mod strategy;
mod violation;

use std::sync::Arc;

use itertools::Itertools;
use tracing::{debug, info_span, instrument};

pub use arena::{estimate_nodes, NodeArena, NodeIndex, NodeRecord, SharedArena, NODE_RECORD_BYTES};
pub use batch::{
    BatchProcessor, BatchResult, ErrorStrategy, FileOutcome, ParallelProcessingConfig,
    ParallelProcessingConfigBuilder, ProgressCallback,
};
pub use cli::bootstrap_cli;
pub use config::{
    Args, ArgsBuilder, Config, ConfigBuilder, ConfiguredLevel, LanguageVersion, RuleConfiguration,
    SecurityConfig,
};
pub use context::TransformationContext;
pub use errors::{FormatterError, ParseError, ParseErrorKind, Result};
pub use lexer::{Keyword, Lexer, Token, TokenKind};
pub use memory::{MemoryReservation, MemoryReservationManager};
pub use node_type::NodeType;
pub use parse_context::{ParseContext, ParsingPhase};
pub use parser::{EciPlacement, IndexOverlayParser, ParsedSource, Parser};
pub use pipeline::{
    DataKind, FileProcessorPipeline, FileProcessorPipelineBuilder, FormatMode, FormatStage,
    ParseStage, ParsedFile, PipelineResult, PipelineStage, ProcessingContext, StageData,
    StageDisposition, StageStatus, StageSummary, ViolationSink, WriteStage,
};
pub use position::SourcePositionMapper;
pub use rule::{resolve_options, FormattingRule, InstantiatedRule, RuleMeta};
pub use rules::{all_rules, final_newline_rule, line_length_rule, trailing_whitespace_rule};
pub use strategy::{
    ParseStrategy, StrategyRegistry, KEYWORD_TRIGGERED, PHASE_AWARE,
};
pub use violation::{
    FixStrategy, FixStrategyBuilder, FormattingViolation, FormattingViolationBuilder, Severity,
};

/// Process-level outcome classes, consumed by the CLI as exit codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitStatus {
    Ok,
    FoundViolations,
    InvalidInput,
    ConfigError,
    PolicyFailure,
    IoFailure,
    Internal,
}

impl ExitStatus {
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Ok => 0,
            ExitStatus::FoundViolations => 1,
            ExitStatus::InvalidInput => 2,
            ExitStatus::ConfigError => 3,
            ExitStatus::PolicyFailure => 4,
            ExitStatus::IoFailure => 5,
            ExitStatus::Internal => 127,
        }
    }

    fn rank(self) -> u8 {
        match self {
            ExitStatus::Ok => 0,
            ExitStatus::FoundViolations => 1,
            ExitStatus::InvalidInput => 2,
            ExitStatus::ConfigError => 3,
            ExitStatus::PolicyFailure => 4,
            ExitStatus::IoFailure => 5,
            ExitStatus::Internal => 6,
        }
    }

    fn worst(self, other: ExitStatus) -> ExitStatus {
        if other.rank() > self.rank() {
            other
        } else {
            self
        }
    }
}

/// Maps an error to its exit class. `BatchCancelled` is secondary by
/// construction (something else already failed) and classifies as nothing.
fn classify(error: &FormatterError) -> Option<ExitStatus> {
    Some(match error {
        FormatterError::InputTooLarge { .. } => ExitStatus::InvalidInput,
        FormatterError::InvalidConfiguration { .. } | FormatterError::ConfigFile { .. } => {
            ExitStatus::ConfigError
        }
        FormatterError::ExecutionTimeout { .. }
        | FormatterError::FileTooLargeForHeap { .. }
        | FormatterError::RecursionLimitExceeded { .. }
        | FormatterError::AllocationLimitExceeded { .. } => ExitStatus::PolicyFailure,
        FormatterError::Io(_)
        | FormatterError::WriteFailed { .. }
        | FormatterError::EmptyOutput { .. } => ExitStatus::IoFailure,
        FormatterError::StageFailure { cause, .. } => return classify(cause),
        FormatterError::BatchCancelled => return None,
        FormatterError::InvalidNodeIndex(_)
        | FormatterError::ArenaClosed
        | FormatterError::EmptyPipeline
        | FormatterError::StageTypeMismatch { .. }
        | FormatterError::PipelineClosed
        | FormatterError::WorkerPanicked(_) => ExitStatus::Internal,
    })
}

pub struct RunStatus {
    pub batch: BatchResult,
    pub violations: Vec<FormattingViolation>,
}

/// Builds the Parse → Format (→ Write) pipeline from the config and runs
/// every configured path through it in parallel.
#[instrument(level = "debug", skip_all)]
pub fn run(config: &Config) -> Result<RunStatus> {
    if !config.version.at_least(17) {
        return Err(FormatterError::InvalidConfiguration {
            rule: "java-version".into(),
            message: format!("unsupported language level {}", config.version.0),
        });
    }
    let rules = Arc::new(config.get_instantiated_rules()?);
    let parser = Arc::new(IndexOverlayParser::with_defaults(config.security));
    let sink: ViolationSink = Default::default();
    let mode = if config.write {
        FormatMode::Write
    } else {
        FormatMode::Check
    };
    let mut builder = FileProcessorPipeline::builder(config.security)
        .stage(ParseStage::new(Arc::clone(&parser), config.version))
        .stage(FormatStage::new(
            Arc::clone(&rules),
            mode,
            Arc::clone(&sink),
            Arc::clone(&parser),
            config.version,
        ));
    if config.write {
        builder = builder.stage(WriteStage);
    }
    let pipeline = Arc::new(builder.build()?);
    let memory = Arc::new(MemoryReservationManager::new(config.memory_budget_bytes));
    let batch_config = ParallelProcessingConfigBuilder::default()
        .max_concurrency(config.max_concurrency)
        .error_strategy(config.error_strategy)
        .build()
        .unwrap();
    let processor = BatchProcessor::new(pipeline, memory, batch_config);
    let batch = processor.process(&config.paths);

    let violations: Vec<FormattingViolation> = sink
        .iter()
        .flat_map(|entry| entry.value().clone())
        .sorted_by(|a, b| {
            (&a.file, a.start_offset, &a.rule_id).cmp(&(&b.file, b.start_offset, &b.rule_id))
        })
        .collect();
    debug!(
        num_violations = violations.len(),
        failures = batch.failure_count,
        "run finished"
    );
    Ok(RunStatus { batch, violations })
}

#[instrument(skip_all)]
pub fn run_and_output(config: &Config) -> ExitStatus {
    let status = match run(config) {
        Ok(status) => status,
        Err(error) => {
            eprintln!("javafmt: {error}");
            return classify(&error).unwrap_or(ExitStatus::Internal);
        }
    };

    let span = info_span!("printing violations", num_violations = status.violations.len()).entered();
    if config.quiet {
        if !status.violations.is_empty() {
            eprintln!("javafmt: {} violation(s)", status.violations.len());
        }
    } else {
        for violation in &status.violations {
            violation.print();
        }
    }
    span.exit();

    for outcome in &status.batch.outcomes {
        if let Some(message) = outcome.error_message() {
            eprintln!("javafmt: {}: {message}", outcome.path.display());
        }
        if let Ok(result) = &outcome.result {
            if !config.quiet {
                for parse_error in &result.parse_errors {
                    eprintln!(
                        "javafmt: {}: offset {}: {}",
                        outcome.path.display(),
                        parse_error.offset,
                        parse_error.kind
                    );
                }
            }
        }
    }

    let mut exit = ExitStatus::Ok;
    if !status.violations.is_empty() && !config.write {
        exit = exit.worst(ExitStatus::FoundViolations);
    }
    for outcome in &status.batch.outcomes {
        let error_class = match &outcome.result {
            Ok(result) => result.error().and_then(classify),
            Err(error) => classify(error),
        };
        if let Some(class) = error_class {
            exit = exit.worst(class);
        }
    }
    exit
}
