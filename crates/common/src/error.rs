//! Error types shared across Montage crates.

/// Top-level error type for Montage operations.
///
/// A cancelled export is not an error; it is reported as an export outcome.
#[derive(Debug, thiserror::Error)]
pub enum MontageError {
    #[error("Engine initialization failed: {message}")]
    Initialization { message: String },

    #[error("Engine session has been disposed")]
    Disposed,

    #[error("Engine is busy: an export is already in progress")]
    EngineBusy,

    #[error("Engine operation {operation} failed (status {code}): {message}")]
    OperationFailed {
        operation: &'static str,
        code: i32,
        message: String,
    },

    #[error("Export failed: {message}")]
    ExportFailed { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using MontageError.
pub type MontageResult<T> = Result<T, MontageError>;

impl MontageError {
    pub fn initialization(msg: impl Into<String>) -> Self {
        Self::Initialization {
            message: msg.into(),
        }
    }

    pub fn operation_failed(operation: &'static str, code: i32, msg: impl Into<String>) -> Self {
        Self::OperationFailed {
            operation,
            code,
            message: msg.into(),
        }
    }

    pub fn export_failed(msg: impl Into<String>) -> Self {
        Self::ExportFailed {
            message: msg.into(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }
}
