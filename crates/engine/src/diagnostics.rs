//! Engine error retrieval.

use montage_common::error::MontageError;

use crate::api::EngineApi;
use crate::session::EngineSession;

/// A failing status code together with the engine's diagnostic text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("engine error {code}: {message}")]
pub struct EngineError {
    pub code: i32,
    pub message: String,
}

impl EngineError {
    /// Convert into the error returned for a failed mutation call.
    pub fn into_operation_error(self, operation: &'static str) -> MontageError {
        MontageError::operation_failed(operation, self.code, self.message)
    }
}

/// Reads the engine's last error after a failing call.
///
/// The query goes through the session, so it is never made once the
/// timeline is released and the engine may have shut down.
#[derive(Clone)]
pub struct ErrorReporter {
    session: EngineSession,
}

impl ErrorReporter {
    pub fn new(session: &EngineSession) -> Self {
        Self {
            session: session.clone(),
        }
    }

    /// Query the engine for the message belonging to `code`.
    pub fn fetch_last_error(&self, code: i32) -> EngineError {
        self.session
            .with_handle(|api, _| self.describe(api, code))
            .unwrap_or_else(|_| EngineError {
                code,
                message: "engine error unavailable: session is closed".to_string(),
            })
    }

    /// Same as [`fetch_last_error`](Self::fetch_last_error) for callers
    /// already inside [`EngineSession::with_handle`].
    pub(crate) fn describe(&self, api: &dyn EngineApi, code: i32) -> EngineError {
        let message = read_last_error(api, self.session.runtime().error_buffer_len());
        tracing::debug!(code, %message, "Fetched engine error");
        EngineError { code, message }
    }
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("session", &self.session.id())
            .field("buffer_len", &self.session.runtime().error_buffer_len())
            .finish()
    }
}

/// Read the engine's last error through a buffer of `capacity` bytes.
///
/// The engine may truncate; whatever fits is kept. Text ends at the first
/// NUL and invalid UTF-8 is replaced.
pub(crate) fn read_last_error(api: &dyn EngineApi, capacity: usize) -> String {
    let mut buffer = vec![0u8; capacity.max(1)];
    api.last_error(&mut buffer);
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    let message = String::from_utf8_lossy(&buffer[..end]).trim().to_string();
    if message.is_empty() {
        "unknown engine error".to_string()
    } else {
        message
    }
}
