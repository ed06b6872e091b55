use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tracing::{debug, instrument};

use crate::{
    arena::{NodeIndex, SharedArena},
    config::SecurityConfig,
    errors::{FormatterError, ParseError, Result},
};

mod stages;
pub use stages::{FormatMode, FormatStage, ParseStage, ViolationSink, WriteStage};

/// Payload kind moving between stages; the builder checks these pair-wise.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataKind {
    Path,
    Parsed,
    Text,
}

/// Output of the parse stage: everything later stages need, including the
/// live arena handle.
pub struct ParsedFile {
    pub path: PathBuf,
    pub source: String,
    pub arena: SharedArena,
    pub root: NodeIndex,
    pub parse_errors: Vec<ParseError>,
}

pub enum StageData {
    Path(PathBuf),
    Parsed(ParsedFile),
    Text(String),
}

impl StageData {
    pub fn kind(&self) -> DataKind {
        match self {
            StageData::Path(_) => DataKind::Path,
            StageData::Parsed(_) => DataKind::Parsed,
            StageData::Text(_) => DataKind::Text,
        }
    }
}

/// Result of one stage execution.
pub enum StageStatus {
    Success(StageData),
    Failure {
        stage_id: &'static str,
        error: FormatterError,
        recoverable: bool,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Clone, Debug)]
pub enum StageDisposition {
    Success,
    Failure(String),
    Skipped(String),
}

/// Per-stage outcome kept in the pipeline result, payload-free.
#[derive(Clone, Debug)]
pub struct StageSummary {
    pub stage_id: &'static str,
    pub disposition: StageDisposition,
    pub duration: Duration,
}

/// A single-purpose transformation in the per-file sequence. Stages are
/// stateless and shared read-only across worker threads.
pub trait PipelineStage: Send + Sync {
    fn stage_id(&self) -> &'static str;
    fn input_kind(&self) -> DataKind;
    fn output_kind(&self) -> DataKind;
    fn supports_error_recovery(&self) -> bool {
        false
    }
    fn execute(&self, input: StageData, context: &ProcessingContext) -> StageStatus;
}

/// Immutable per-file scope: path, limits, start timestamp and the deadline
/// derived from the configured rule timeout.
#[derive(Clone, Debug)]
pub struct ProcessingContext {
    pub path: PathBuf,
    pub security: SecurityConfig,
    pub started_at: Instant,
    pub deadline: Instant,
}

impl ProcessingContext {
    pub fn new(path: PathBuf, security: SecurityConfig) -> Self {
        let started_at = Instant::now();
        Self {
            path,
            security,
            started_at,
            deadline: started_at + security.rule_timeout,
        }
    }
}

/// Per-file aggregate. The arena handle is present on success for optional
/// downstream inspection; whoever takes it must close it (dropping the last
/// handle closes as a backstop).
pub struct PipelineResult {
    pub path: PathBuf,
    pub final_status: StageStatus,
    pub stage_outcomes: Vec<StageSummary>,
    /// Recovered syntax errors from the parse stage; present even when the
    /// file processed successfully with a best-effort tree.
    pub parse_errors: Vec<ParseError>,
    pub duration: Duration,
    pub arena: Option<SharedArena>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self.final_status, StageStatus::Success(_))
    }

    pub fn error(&self) -> Option<&FormatterError> {
        match &self.final_status {
            StageStatus::Failure { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn close_arena(&self) {
        if let Some(arena) = &self.arena {
            arena.lock().unwrap().close();
        }
    }
}

#[derive(Default)]
pub struct FileProcessorPipelineBuilder {
    security: SecurityConfig,
    stages: Vec<Arc<dyn PipelineStage>>,
}

impl FileProcessorPipelineBuilder {
    pub fn new(security: SecurityConfig) -> Self {
        Self {
            security,
            stages: Vec::new(),
        }
    }

    pub fn stage(mut self, stage: impl PipelineStage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    /// Consumes the builder. Fails with `EmptyPipeline` for zero stages and
    /// `StageTypeMismatch` when adjacent payload kinds disagree.
    pub fn build(self) -> Result<FileProcessorPipeline> {
        if self.stages.is_empty() {
            return Err(FormatterError::EmptyPipeline);
        }
        let first = &self.stages[0];
        if first.input_kind() != DataKind::Path {
            return Err(FormatterError::StageTypeMismatch {
                stage: first.stage_id(),
                expected: first.input_kind(),
                actual: DataKind::Path,
            });
        }
        for pair in self.stages.windows(2) {
            if pair[1].input_kind() != pair[0].output_kind() {
                return Err(FormatterError::StageTypeMismatch {
                    stage: pair[1].stage_id(),
                    expected: pair[1].input_kind(),
                    actual: pair[0].output_kind(),
                });
            }
        }
        Ok(FileProcessorPipeline {
            security: self.security,
            stages: self.stages,
            closed: AtomicBool::new(false),
        })
    }
}

/// Executes the stage sequence for one file at a time. Immutable once
/// built; `close()` cooperatively aborts work between stages.
pub struct FileProcessorPipeline {
    security: SecurityConfig,
    stages: Vec<Arc<dyn PipelineStage>>,
    closed: AtomicBool,
}

impl FileProcessorPipeline {
    pub fn builder(security: SecurityConfig) -> FileProcessorPipelineBuilder {
        FileProcessorPipelineBuilder::new(security)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    #[instrument(level = "debug", skip(self), fields(path = ?path))]
    pub fn process(&self, path: &Path) -> PipelineResult {
        let context = ProcessingContext::new(path.to_owned(), self.security);
        let started = Instant::now();
        let mut data = Some(StageData::Path(path.to_owned()));
        let mut outcomes = Vec::with_capacity(self.stages.len());
        let mut arena: Option<SharedArena> = None;
        let mut parse_errors: Vec<ParseError> = Vec::new();
        let mut terminal: Option<StageStatus> = None;

        for stage in &self.stages {
            if self.is_closed() {
                terminal = Some(StageStatus::Failure {
                    stage_id: stage.stage_id(),
                    error: FormatterError::PipelineClosed,
                    recoverable: false,
                });
                break;
            }
            let stage_started = Instant::now();
            let status = stage.execute(data.take().unwrap(), &context);
            let duration = stage_started.elapsed();
            match status {
                StageStatus::Success(output) => {
                    if let StageData::Parsed(parsed) = &output {
                        arena = Some(Arc::clone(&parsed.arena));
                        parse_errors = parsed.parse_errors.clone();
                    }
                    outcomes.push(StageSummary {
                        stage_id: stage.stage_id(),
                        disposition: StageDisposition::Success,
                        duration,
                    });
                    data = Some(output);
                }
                StageStatus::Failure {
                    stage_id,
                    error,
                    recoverable,
                } => {
                    debug!(stage_id, %error, recoverable, "stage failed");
                    outcomes.push(StageSummary {
                        stage_id,
                        disposition: StageDisposition::Failure(error.to_string()),
                        duration,
                    });
                    terminal = Some(StageStatus::Failure {
                        stage_id,
                        error,
                        recoverable,
                    });
                    break;
                }
                StageStatus::Skipped { reason } => {
                    outcomes.push(StageSummary {
                        stage_id: stage.stage_id(),
                        disposition: StageDisposition::Skipped(reason.clone()),
                        duration,
                    });
                    terminal = Some(StageStatus::Skipped { reason });
                    break;
                }
            }
        }

        let final_status = terminal.unwrap_or_else(|| StageStatus::Success(data.take().unwrap()));
        if !matches!(final_status, StageStatus::Success(_)) {
            // arena released on every non-success path; successful results
            // hand the handle to the caller instead
            if let Some(arena) = &arena {
                arena.lock().unwrap().close();
            }
        }
        PipelineResult {
            path: path.to_owned(),
            final_status,
            stage_outcomes: outcomes,
            parse_errors,
            duration: started.elapsed(),
            arena,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedStage {
        id: &'static str,
        input: DataKind,
        output: DataKind,
    }

    impl PipelineStage for FixedStage {
        fn stage_id(&self) -> &'static str {
            self.id
        }
        fn input_kind(&self) -> DataKind {
            self.input
        }
        fn output_kind(&self) -> DataKind {
            self.output
        }
        fn execute(&self, _input: StageData, context: &ProcessingContext) -> StageStatus {
            StageStatus::Success(StageData::Path(context.path.clone()))
        }
    }

    #[test]
    fn empty_builder_cannot_build() {
        assert!(matches!(
            FileProcessorPipeline::builder(SecurityConfig::default()).build(),
            Err(FormatterError::EmptyPipeline)
        ));
    }

    #[test]
    fn mismatched_stages_are_rejected_at_build_time() {
        let result = FileProcessorPipeline::builder(SecurityConfig::default())
            .stage(FixedStage {
                id: "parse",
                input: DataKind::Path,
                output: DataKind::Parsed,
            })
            .stage(FixedStage {
                id: "write",
                input: DataKind::Text,
                output: DataKind::Path,
            })
            .build();
        assert!(matches!(
            result,
            Err(FormatterError::StageTypeMismatch {
                stage: "write",
                expected: DataKind::Text,
                actual: DataKind::Parsed,
            })
        ));
    }

    #[test]
    fn first_stage_must_accept_a_path() {
        let result = FileProcessorPipeline::builder(SecurityConfig::default())
            .stage(FixedStage {
                id: "format",
                input: DataKind::Parsed,
                output: DataKind::Text,
            })
            .build();
        assert!(matches!(
            result,
            Err(FormatterError::StageTypeMismatch { stage: "format", .. })
        ));
    }

    #[test]
    fn closed_pipeline_rejects_new_work() {
        let pipeline = FileProcessorPipeline::builder(SecurityConfig::default())
            .stage(FixedStage {
                id: "noop",
                input: DataKind::Path,
                output: DataKind::Path,
            })
            .build()
            .unwrap();
        pipeline.close();
        let result = pipeline.process(Path::new("A.java"));
        assert!(matches!(
            result.final_status,
            StageStatus::Failure {
                error: FormatterError::PipelineClosed,
                ..
            }
        ));
    }
}
