use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::{
    arena::NodeIndex,
    arena::SharedArena,
    config::{LanguageVersion, RuleConfiguration},
    context::TransformationContext,
    errors::FormatterError,
    parser::IndexOverlayParser,
    rule::InstantiatedRule,
    violation::FormattingViolation,
};

use super::{
    DataKind, ParsedFile, PipelineStage, ProcessingContext, StageData, StageStatus,
};

/// Shared collection point for violations found during a run, keyed by
/// file. Concurrent inserts from worker threads are fine.
pub type ViolationSink = Arc<DashMap<PathBuf, Vec<FormattingViolation>>>;

const PARSE_STAGE_ID: &str = "parse";
const FORMAT_STAGE_ID: &str = "format";
const WRITE_STAGE_ID: &str = "write";

fn failure(stage_id: &'static str, error: FormatterError) -> StageStatus {
    StageStatus::Failure {
        stage_id,
        error,
        recoverable: false,
    }
}

fn wrong_payload(stage_id: &'static str, expected: DataKind, input: &StageData) -> StageStatus {
    failure(
        stage_id,
        FormatterError::StageTypeMismatch {
            stage: stage_id,
            expected,
            actual: input.kind(),
        },
    )
}

/// Path → ParsedFile: reads the file and populates an arena.
pub struct ParseStage {
    parser: Arc<IndexOverlayParser>,
    version: LanguageVersion,
}

impl ParseStage {
    pub fn new(parser: Arc<IndexOverlayParser>, version: LanguageVersion) -> Self {
        Self { parser, version }
    }
}

impl PipelineStage for ParseStage {
    fn stage_id(&self) -> &'static str {
        PARSE_STAGE_ID
    }

    fn input_kind(&self) -> DataKind {
        DataKind::Path
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Parsed
    }

    #[instrument(level = "debug", skip_all)]
    fn execute(&self, input: StageData, context: &ProcessingContext) -> StageStatus {
        let path = match input {
            StageData::Path(path) => path,
            other => return wrong_payload(PARSE_STAGE_ID, DataKind::Path, &other),
        };
        let source = match fs::read_to_string(&path) {
            Ok(source) => source,
            Err(error) => return failure(PARSE_STAGE_ID, error.into()),
        };
        match self.parser.parse_with_deadline(
            &source,
            self.version,
            context.deadline,
            context.security.rule_timeout,
        ) {
            Ok(parsed) => {
                debug!(
                    nodes = parsed.arena.node_count(),
                    errors = parsed.errors.len(),
                    "parsed"
                );
                StageStatus::Success(StageData::Parsed(ParsedFile {
                    path,
                    source,
                    arena: parsed.arena.into_shared(),
                    root: parsed.root,
                    parse_errors: parsed.errors,
                }))
            }
            Err(error) => failure(PARSE_STAGE_ID, error),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatMode {
    /// Analyze only; the produced text is the unchanged source.
    Check,
    /// Apply each rule's rewrite in caller order; later rules see the text
    /// produced by earlier rules.
    Write,
}

/// ParsedFile → String: runs every instantiated rule under the file's
/// deadline, reporting violations through the shared sink.
pub struct FormatStage {
    rules: Arc<Vec<InstantiatedRule>>,
    mode: FormatMode,
    sink: ViolationSink,
    parser: Arc<IndexOverlayParser>,
    version: LanguageVersion,
}

impl FormatStage {
    pub fn new(
        rules: Arc<Vec<InstantiatedRule>>,
        mode: FormatMode,
        sink: ViolationSink,
        parser: Arc<IndexOverlayParser>,
        version: LanguageVersion,
    ) -> Self {
        Self {
            rules,
            mode,
            sink,
            parser,
            version,
        }
    }

    fn configurations(&self) -> Vec<RuleConfiguration> {
        self.rules
            .iter()
            .map(InstantiatedRule::configuration)
            .collect()
    }
}

impl PipelineStage for FormatStage {
    fn stage_id(&self) -> &'static str {
        FORMAT_STAGE_ID
    }

    fn input_kind(&self) -> DataKind {
        DataKind::Parsed
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Text
    }

    #[instrument(level = "debug", skip_all)]
    fn execute(&self, input: StageData, context: &ProcessingContext) -> StageStatus {
        let file = match input {
            StageData::Parsed(file) => file,
            other => return wrong_payload(FORMAT_STAGE_ID, DataKind::Parsed, &other),
        };
        let configs = self.configurations();
        let timeout = context.security.rule_timeout;

        // analyze pass over the original tree
        let mut violations: Vec<FormattingViolation> = Vec::new();
        {
            let arena = file.arena.lock().unwrap();
            let transformation_context = match TransformationContext::new(
                &arena,
                file.root,
                &file.source,
                &file.path,
                context.security,
                context.deadline,
                timeout,
            ) {
                Ok(transformation_context) => transformation_context,
                Err(error) => return failure(FORMAT_STAGE_ID, error),
            };
            for rule in self.rules.iter() {
                if let Err(error) = transformation_context.check_deadline() {
                    return failure(FORMAT_STAGE_ID, error);
                }
                match rule.rule.analyze(&transformation_context, &configs) {
                    Ok(found) => violations.extend(found.into_iter().map(|mut violation| {
                        violation.severity = rule.severity;
                        violation
                    })),
                    Err(error) => return failure(FORMAT_STAGE_ID, error),
                }
            }
        }
        if !violations.is_empty() {
            self.sink
                .entry(file.path.clone())
                .or_default()
                .extend(violations);
        }

        if self.mode == FormatMode::Check {
            return StageStatus::Success(StageData::Text(file.source.clone()));
        }

        // rewrite pass; each changed text is re-parsed for the next rule
        let mut text = file.source.clone();
        let mut intermediate: Option<(SharedArena, NodeIndex)> = None;
        for index in 0..self.rules.len() {
            let rule = &self.rules[index];
            let (arena_handle, root) = match &intermediate {
                Some((arena, root)) => (Arc::clone(arena), *root),
                None => (Arc::clone(&file.arena), file.root),
            };
            let formatted = {
                let arena = arena_handle.lock().unwrap();
                let transformation_context = match TransformationContext::new(
                    &arena,
                    root,
                    &text,
                    &file.path,
                    context.security,
                    context.deadline,
                    timeout,
                ) {
                    Ok(transformation_context) => transformation_context,
                    Err(error) => return failure(FORMAT_STAGE_ID, error),
                };
                match rule.rule.format(&transformation_context, &configs) {
                    Ok(formatted) => formatted,
                    Err(error) => return failure(FORMAT_STAGE_ID, error),
                }
            };
            if formatted != text {
                debug!(rule = rule.meta.id, "rule rewrote the source");
                text = formatted;
                if index + 1 < self.rules.len() {
                    // the reparse runs under the same per-file deadline as
                    // the initial parse stage
                    match self.parser.parse_with_deadline(
                        &text,
                        self.version,
                        context.deadline,
                        timeout,
                    ) {
                        Ok(parsed) => {
                            if let Some((old, _)) = intermediate.take() {
                                old.lock().unwrap().close();
                            }
                            intermediate = Some((parsed.arena.into_shared(), parsed.root));
                        }
                        Err(error) => return failure(FORMAT_STAGE_ID, error),
                    }
                }
            }
        }
        if let Some((arena, _)) = intermediate.take() {
            arena.lock().unwrap().close();
        }
        StageStatus::Success(StageData::Text(text))
    }
}

/// String → Path: atomic in-place write via a sibling temporary.
pub struct WriteStage;

impl PipelineStage for WriteStage {
    fn stage_id(&self) -> &'static str {
        WRITE_STAGE_ID
    }

    fn input_kind(&self) -> DataKind {
        DataKind::Text
    }

    fn output_kind(&self) -> DataKind {
        DataKind::Path
    }

    #[instrument(level = "debug", skip_all)]
    fn execute(&self, input: StageData, context: &ProcessingContext) -> StageStatus {
        let content = match input {
            StageData::Text(content) => content,
            other => return wrong_payload(WRITE_STAGE_ID, DataKind::Text, &other),
        };
        let path = &context.path;
        if content.is_empty() {
            return failure(
                WRITE_STAGE_ID,
                FormatterError::EmptyOutput { path: path.clone() },
            );
        }
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(error) = fs::create_dir_all(parent) {
                    return failure(
                        WRITE_STAGE_ID,
                        FormatterError::WriteFailed {
                            path: path.clone(),
                            source: error,
                        },
                    );
                }
            }
        }
        let temp = temporary_sibling(path);
        if let Err(error) = fs::write(&temp, &content) {
            let _ = fs::remove_file(&temp);
            return failure(
                WRITE_STAGE_ID,
                FormatterError::WriteFailed {
                    path: path.clone(),
                    source: error,
                },
            );
        }
        if let Err(error) = fs::rename(&temp, path) {
            // never leave a partial file behind
            let _ = fs::remove_file(&temp);
            return failure(
                WRITE_STAGE_ID,
                FormatterError::WriteFailed {
                    path: path.clone(),
                    source: error,
                },
            );
        }
        StageStatus::Success(StageData::Path(path.clone()))
    }
}

fn temporary_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".javafmt.tmp");
    path.with_file_name(name)
}
