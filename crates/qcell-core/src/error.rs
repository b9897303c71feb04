//! Error types for qcell-core.

use std::time::Duration;

use thiserror::Error;

use crate::cell::ReturnCode;

/// Result type for qcell-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in qcell-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed expression text.
    #[error("parse error: {0}")]
    Parse(String),

    /// Expression uses a construct outside the operator table.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// Arithmetic fault while evaluating a well-formed expression.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// A handle references a node that was never written.
    #[error("no stored table at {file}/{node}")]
    StorageNotFound { file: String, node: String },

    /// A `(file, node)` pair that cannot be used as a storage address.
    #[error("invalid storage key: {0}")]
    InvalidKey(String),

    /// Corrupt or unreadable node file, or an unsupported read.
    #[error("storage error: {0}")]
    Storage(String),

    /// Shape, type or column errors in table operations.
    #[error("table error: {0}")]
    Table(String),

    /// The isolated transformation failed inside its worker.
    #[error("worker failed: {message}")]
    WorkerFailure { message: String },

    /// The worker did not answer within the bound.
    #[error("worker timed out after {after:?}")]
    Timeout { after: Duration },

    /// IPC communication error with worker process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV input could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Socket name not declared by the cell.
    #[error("unknown socket `{0}`")]
    UnknownSocket(String),

    /// Socket assignment rejected by its type or validator.
    #[error("invalid value for socket `{socket}`: {reason}")]
    InvalidSocket { socket: String, reason: String },

    /// A required input socket holds no value.
    #[error("missing required input `{0}`")]
    MissingInput(String),

    /// Cell not found in the registry.
    #[error("cell not found: {0}")]
    CellNotFound(String),
}

impl Error {
    /// Host return code for a cell whose `process` step failed with this error.
    ///
    /// Worker failures, timeouts and missing inputs stall downstream cells;
    /// a later tick may succeed. Everything else aborts.
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Error::WorkerFailure { .. } | Error::Timeout { .. } | Error::MissingInput(_) => {
                ReturnCode::Unknown
            }
            _ => ReturnCode::Quit,
        }
    }
}
