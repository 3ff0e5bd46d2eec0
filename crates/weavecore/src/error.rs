use thiserror::Error;

/// Failures produced by the interpreter itself.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid workflow: {0}")]
    InvalidDsl(String),

    #[error("malformed statement: {0}")]
    Malformed(String),

    #[error("ref {0:?} not bound")]
    UnboundRef(String),

    #[error("empty value")]
    EmptyValue,

    #[error("empty condition")]
    EmptyCondition,

    #[error("condition evaluation failed: {source}")]
    CondEval { source: Box<EngineError> },

    #[error("map items var {0:?} is not a sequence")]
    NotASequence(String),

    #[error("variable {0:?} written by multiple branches with different values")]
    ParallelWriteConflict(String),

    #[error("variable {0:?} written by multiple map iterations with different values")]
    MapWriteConflict(String),

    #[error("while exceeded max iterations ({0})")]
    MaxItersExceeded(u32),

    #[error("activity {name} arg[{index}] eval: {source}")]
    ArgEval {
        name: String,
        index: usize,
        source: Box<EngineError>,
    },

    #[error("activity {name} failed: {source}")]
    Activity {
        name: String,
        source: ActivityError,
    },

    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    /// True for errors induced by cancellation rather than by the statement
    /// itself. Fail-fast reporting discards these in favour of the error
    /// that triggered the cancellation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, EngineError::Cancelled)
            || matches!(
                self,
                EngineError::Activity {
                    source: ActivityError::Cancelled,
                    ..
                }
            )
    }
}

/// Failures reported by the activity substrate.
#[derive(Error, Debug, Clone)]
pub enum ActivityError {
    #[error("unknown activity: {0}")]
    Unknown(String),

    #[error("timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("cancelled")]
    Cancelled,

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("{0}")]
    Failed(String),
}
