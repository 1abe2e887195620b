//! Error type shared by the chain engine, operations and the script runner.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChainError>;

/// Everything that can go wrong while configuring or running a chain.
///
/// Configuration errors are reported by the call that set the bad
/// configuration. Element errors are reported once the failing element is
/// reached: by the operation that reads it, or by the read that
/// materializes it, after whatever was produced before it is committed.
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    #[error("unknown pattern engine: {0} (expected parse, regex or glob)")]
    UnknownEngine(String),

    #[error("unknown mode: {0}")]
    UnknownMode(String),

    #[error("conflicting modes: {0}")]
    ModeConflict(String),

    #[error("unknown error policy: {0} (expected strict, replace or ignore)")]
    UnknownPolicy(String),

    #[error("invalid {engine} pattern: {message}")]
    Pattern {
        engine: &'static str,
        message: String,
    },

    #[error("{op} requires a worker")]
    NoWorker { op: &'static str },

    #[error("invalid {op}: {reason}")]
    InvalidOperation {
        op: &'static str,
        reason: String,
    },

    #[error("{op} expected {expected}, found {found}")]
    Type {
        op: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{op} of an empty sequence")]
    Empty { op: &'static str },

    #[error("{op} overflowed")]
    Overflow { op: &'static str },

    #[error("{codec} encode error: {message}")]
    Encode {
        codec: &'static str,
        message: String,
    },

    #[error("{codec} decode error: {message}")]
    Decode {
        codec: &'static str,
        message: String,
    },

    #[error("worker failed: {0}")]
    Worker(String),

    #[error("line {line}: {message}")]
    Script { line: usize, message: String },
}

impl From<regex::Error> for ChainError {
    fn from(err: regex::Error) -> Self {
        ChainError::Pattern {
            engine: "regex",
            message: err.to_string(),
        }
    }
}

impl From<glob::PatternError> for ChainError {
    fn from(err: glob::PatternError) -> Self {
        ChainError::Pattern {
            engine: "glob",
            message: err.to_string(),
        }
    }
}
