use std::{path::PathBuf, time::Duration};

use thiserror::Error;

use crate::pipeline::DataKind;

pub type Result<T> = std::result::Result<T, FormatterError>;

#[derive(Error, Debug)]
pub enum FormatterError {
    #[error("source is {actual} bytes which exceeds the {limit} byte limit")]
    InputTooLarge { actual: usize, limit: usize },

    #[error("recursion limit of {limit} exceeded at offset {offset}")]
    RecursionLimitExceeded { limit: usize, offset: u32 },

    #[error("arena would exceed its {limit} byte allocation limit")]
    AllocationLimitExceeded { limit: usize },

    #[error("node index {0} is out of range")]
    InvalidNodeIndex(i64),

    #[error("arena accessed after close")]
    ArenaClosed,

    #[error("execution exceeded the {}ms deadline", timeout.as_millis())]
    ExecutionTimeout { timeout: Duration },

    #[error("invalid configuration for rule '{rule}': {message}")]
    InvalidConfiguration { rule: String, message: String },

    #[error("configuration file {}: {message}", path.display())]
    ConfigFile { path: PathBuf, message: String },

    #[error("cannot build a pipeline with no stages")]
    EmptyPipeline,

    #[error("stage '{stage}' consumes {expected:?} but the preceding stage produces {actual:?}")]
    StageTypeMismatch {
        stage: &'static str,
        expected: DataKind,
        actual: DataKind,
    },

    #[error("stage '{stage_id}' failed: {cause}")]
    StageFailure {
        stage_id: &'static str,
        #[source]
        cause: Box<FormatterError>,
    },

    #[error("stage produced empty output for {}", path.display())]
    EmptyOutput { path: PathBuf },

    #[error("failed to write {}: {source}", path.display())]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} needs {requested} permits but the pool only holds {total}", path.display())]
    FileTooLargeForHeap {
        path: PathBuf,
        requested: usize,
        total: usize,
    },

    #[error("batch cancelled after an earlier failure")]
    BatchCancelled,

    #[error("pipeline closed while work was in flight")]
    PipelineClosed,

    #[error("worker panicked: {0}")]
    WorkerPanicked(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FormatterError {
    pub fn stage(stage_id: &'static str, cause: FormatterError) -> Self {
        Self::StageFailure {
            stage_id,
            cause: Box::new(cause),
        }
    }
}

/// A recoverable problem found while lexing or parsing. Accumulated on the
/// parse context rather than thrown; a parse with errors still yields a
/// best-effort tree.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub offset: u32,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: u32) -> Self {
        Self { kind, offset }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated text block")]
    UnterminatedTextBlock,
    #[error("unterminated character literal")]
    UnterminatedCharacter,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    #[error("malformed numeric literal")]
    MalformedNumber,
    #[error("stray character '{0}'")]
    StrayCharacter(char),
    #[error("expected {expected}")]
    MissingToken { expected: &'static str },
    #[error("unexpected {found}, expected {expected}")]
    UnexpectedToken {
        expected: &'static str,
        found: String,
    },
    #[error("skipped {count} tokens while recovering")]
    SkippedTokens { count: usize },
}
