use std::{
    collections::HashMap,
    fs,
    panic::{catch_unwind, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::{Duration, Instant},
};

use derive_builder::Builder;
use rayon::prelude::*;
use tracing::{debug, info, instrument};

use crate::{
    errors::FormatterError,
    memory::MemoryReservationManager,
    pipeline::{FileProcessorPipeline, PipelineResult},
};

/// Invoked exactly once per file, after its terminal outcome, with
/// `(completed_so_far, total, path)`. Invocations are serialized; callbacks
/// must not block.
pub type ProgressCallback = Arc<dyn Fn(usize, usize, &Path) + Send + Sync>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// One file's failure never affects the others.
    #[default]
    Continue,
    /// Cooperatively cancel files that have not started yet after the first
    /// failure; running files complete.
    StopOnFirstError,
}

#[derive(Builder, Clone)]
#[builder(setter(strip_option, into))]
pub struct ParallelProcessingConfig {
    #[builder(default = "rayon::current_num_threads()")]
    pub max_concurrency: usize,

    #[builder(default)]
    pub error_strategy: ErrorStrategy,

    #[builder(default)]
    pub progress: Option<ProgressCallback>,
}

impl Default for ParallelProcessingConfig {
    fn default() -> Self {
        ParallelProcessingConfigBuilder::default().build().unwrap()
    }
}

/// Terminal outcome for one input path, in input order.
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<PipelineResult, FormatterError>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        matches!(&self.result, Ok(result) if result.is_success())
    }

    pub fn error_message(&self) -> Option<String> {
        match &self.result {
            Ok(result) => result.error().map(ToString::to_string),
            Err(error) => Some(error.to_string()),
        }
    }
}

pub struct BatchResult {
    /// One entry per input path, preserving input order regardless of
    /// completion order.
    pub outcomes: Vec<FileOutcome>,
    pub total: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub errors: HashMap<PathBuf, String>,
    pub total_duration: Duration,
    pub files_per_second: f64,
}

/// Runs many files through one pipeline concurrently: a bounded rayon pool
/// for scheduling, the memory manager for admission, `catch_unwind` for
/// per-file isolation.
pub struct BatchProcessor {
    pipeline: Arc<FileProcessorPipeline>,
    memory: Arc<MemoryReservationManager>,
    config: ParallelProcessingConfig,
}

impl BatchProcessor {
    pub fn new(
        pipeline: Arc<FileProcessorPipeline>,
        memory: Arc<MemoryReservationManager>,
        config: ParallelProcessingConfig,
    ) -> Self {
        Self {
            pipeline,
            memory,
            config,
        }
    }

    #[instrument(skip_all, fields(files = paths.len()))]
    pub fn process(&self, paths: &[PathBuf]) -> BatchResult {
        let total = paths.len();
        let started = Instant::now();
        let cancelled = AtomicBool::new(false);
        let completed = AtomicUsize::new(0);
        let progress_lock: Mutex<()> = Mutex::new(());

        let run = || -> Vec<FileOutcome> {
            paths
                .par_iter()
                .map(|path| {
                    self.process_one(path, total, &cancelled, &completed, &progress_lock)
                })
                .collect()
        };
        let outcomes = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_concurrency.max(1))
            .build()
        {
            Ok(pool) => pool.install(run),
            // fall back to the shared global pool
            Err(_) => run(),
        };

        let success_count = outcomes.iter().filter(|outcome| outcome.is_success()).count();
        let errors: HashMap<PathBuf, String> = outcomes
            .iter()
            .filter_map(|outcome| {
                outcome
                    .error_message()
                    .map(|message| (outcome.path.clone(), message))
            })
            .collect();
        let total_duration = started.elapsed();
        let files_per_second = total as f64 / total_duration.as_secs_f64().max(f64::EPSILON);
        info!(
            total,
            success_count,
            failure_count = total - success_count,
            files_per_second,
            "batch complete"
        );
        BatchResult {
            total,
            success_count,
            failure_count: total - success_count,
            errors,
            total_duration,
            files_per_second,
            outcomes,
        }
    }

    fn process_one(
        &self,
        path: &Path,
        total: usize,
        cancelled: &AtomicBool,
        completed: &AtomicUsize,
        progress_lock: &Mutex<()>,
    ) -> FileOutcome {
        let result = if cancelled.load(Ordering::SeqCst) {
            Err(FormatterError::BatchCancelled)
        } else {
            self.run_pipeline(path)
        };

        let failed = !matches!(&result, Ok(pipeline_result) if pipeline_result.is_success());
        if failed && self.config.error_strategy == ErrorStrategy::StopOnFirstError {
            debug!(?path, "failure under stop-on-first-error, cancelling pending files");
            cancelled.store(true, Ordering::SeqCst);
        }
        // the batch does no downstream tree inspection, so release eagerly
        if let Ok(pipeline_result) = &result {
            pipeline_result.close_arena();
        }

        let outcome = FileOutcome {
            path: path.to_owned(),
            result,
        };
        match &self.config.progress {
            Some(progress) => {
                let _serialized = progress_lock.lock().unwrap();
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                progress(done, total, path);
            }
            None => {
                completed.fetch_add(1, Ordering::SeqCst);
            }
        }
        outcome
    }

    fn run_pipeline(&self, path: &Path) -> Result<PipelineResult, FormatterError> {
        let size = fs::metadata(path)?.len() as usize;
        let _reservation = self.memory.reserve(path, size)?;
        match catch_unwind(AssertUnwindSafe(|| self.pipeline.process(path))) {
            Ok(result) => Ok(result),
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                Err(FormatterError::WorkerPanicked(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::{LanguageVersion, SecurityConfig},
        parser::IndexOverlayParser,
        pipeline::{
            DataKind, FileProcessorPipeline, ParseStage, PipelineStage, ProcessingContext,
            StageData, StageStatus,
        },
    };

    fn parse_only_pipeline() -> Arc<FileProcessorPipeline> {
        let parser = Arc::new(IndexOverlayParser::with_defaults(SecurityConfig::default()));
        Arc::new(
            FileProcessorPipeline::builder(SecurityConfig::default())
                .stage(ParseStage::new(parser, LanguageVersion::JAVA_21))
                .build()
                .unwrap(),
        )
    }

    fn memory() -> Arc<MemoryReservationManager> {
        Arc::new(MemoryReservationManager::new(64 * 1024 * 1024))
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn one_failing_file_does_not_affect_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let valid = write_file(&dir, "Valid.java", "class Valid {}");
        let missing = dir.path().join("Missing.java");
        let valid2 = write_file(&dir, "Valid2.java", "class Valid2 {}");

        let processor = BatchProcessor::new(
            parse_only_pipeline(),
            memory(),
            ParallelProcessingConfig::default(),
        );
        let result = processor.process(&[valid.clone(), missing.clone(), valid2.clone()]);

        assert_eq!(result.total, 3);
        assert_eq!(result.success_count, 2);
        assert_eq!(result.failure_count, 1);
        assert!(result.errors.contains_key(&missing));
        assert!(!result.errors.contains_key(&valid2));
    }

    #[test]
    fn outcomes_preserve_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..16)
            .map(|i| write_file(&dir, &format!("C{i}.java"), &format!("class C{i} {{}}")))
            .collect();

        let processor = BatchProcessor::new(
            parse_only_pipeline(),
            memory(),
            ParallelProcessingConfigBuilder::default()
                .max_concurrency(4usize)
                .build()
                .unwrap(),
        );
        let result = processor.process(&paths);
        assert_eq!(result.outcomes.len(), paths.len());
        for (outcome, path) in result.outcomes.iter().zip(&paths) {
            assert_eq!(&outcome.path, path);
        }
    }

    #[test]
    fn progress_fires_exactly_once_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (0..8)
            .map(|i| write_file(&dir, &format!("P{i}.java"), "class P {}"))
            .collect();

        let calls: Arc<Mutex<Vec<(usize, usize)>>> = Default::default();
        let seen = Arc::clone(&calls);
        let config = ParallelProcessingConfigBuilder::default()
            .max_concurrency(4usize)
            .progress(Arc::new(move |done, total, _path: &Path| {
                seen.lock().unwrap().push((done, total));
            }) as ProgressCallback)
            .build()
            .unwrap();

        let processor = BatchProcessor::new(parse_only_pipeline(), memory(), config);
        processor.process(&paths);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), paths.len());
        // serialized invocations count monotonically up to the total
        let mut counts: Vec<usize> = calls.iter().map(|(done, _)| *done).collect();
        counts.sort_unstable();
        assert_eq!(counts, (1..=paths.len()).collect::<Vec<_>>());
        assert!(calls.iter().all(|(_, total)| *total == paths.len()));
    }

    #[test]
    fn stop_on_first_error_cancels_pending_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("Missing.java");
        let mut paths = vec![missing];
        for i in 0..32 {
            paths.push(write_file(&dir, &format!("S{i}.java"), "class S {}"));
        }

        let processor = BatchProcessor::new(
            parse_only_pipeline(),
            memory(),
            ParallelProcessingConfigBuilder::default()
                .max_concurrency(1usize)
                .error_strategy(ErrorStrategy::StopOnFirstError)
                .build()
                .unwrap(),
        );
        let result = processor.process(&paths);
        assert_eq!(result.total, paths.len());
        // with one worker, everything after the first failure is cancelled
        assert!(result.failure_count >= paths.len() - 1);
        assert!(result
            .outcomes
            .iter()
            .skip(1)
            .any(|outcome| matches!(outcome.result, Err(FormatterError::BatchCancelled))));
    }

    #[test]
    fn panicking_stages_are_isolated() {
        struct PanickingStage;
        impl PipelineStage for PanickingStage {
            fn stage_id(&self) -> &'static str {
                "panic"
            }
            fn input_kind(&self) -> DataKind {
                DataKind::Path
            }
            fn output_kind(&self) -> DataKind {
                DataKind::Path
            }
            fn execute(&self, _input: StageData, context: &ProcessingContext) -> StageStatus {
                if context.path.file_name().unwrap().to_str().unwrap().contains("Bad") {
                    panic!("stage exploded");
                }
                StageStatus::Success(StageData::Path(context.path.clone()))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let good = write_file(&dir, "Good.java", "class Good {}");
        let bad = write_file(&dir, "Bad.java", "class Bad {}");
        let pipeline = Arc::new(
            FileProcessorPipeline::builder(SecurityConfig::default())
                .stage(PanickingStage)
                .build()
                .unwrap(),
        );
        let processor =
            BatchProcessor::new(pipeline, memory(), ParallelProcessingConfig::default());
        let result = processor.process(&[good, bad.clone()]);
        assert_eq!(result.success_count, 1);
        assert!(matches!(
            result.outcomes[1].result,
            Err(FormatterError::WorkerPanicked(_))
        ));
    }
}
