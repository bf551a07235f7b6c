//! Process-wide engine state.
//!
//! The engine's initialize/shutdown pair is global. [`EngineRuntime`] counts
//! the sessions using it so the first session initializes the engine and the
//! last one to close shuts it down.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use montage_common::config::{EngineBackend, EngineConfig, DEFAULT_ERROR_BUFFER_LEN};
use montage_common::error::{MontageError, MontageResult};

use crate::api::{EngineApi, STATUS_OK};
use crate::diagnostics::read_last_error;
use crate::simulated::{ExportScript, SimulatedEngine};

/// Shared owner of an engine implementation.
pub struct EngineRuntime {
    api: Box<dyn EngineApi>,
    sessions: Mutex<usize>,
    error_buffer_len: usize,
}

impl EngineRuntime {
    /// Wrap an engine with the default error buffer size.
    pub fn new(api: impl EngineApi + 'static) -> Arc<Self> {
        Self::with_error_buffer_len(api, DEFAULT_ERROR_BUFFER_LEN)
    }

    pub fn with_error_buffer_len(api: impl EngineApi + 'static, error_buffer_len: usize) -> Arc<Self> {
        Arc::new(Self {
            api: Box::new(api),
            sessions: Mutex::new(0),
            error_buffer_len: error_buffer_len.max(1),
        })
    }

    pub fn api(&self) -> &dyn EngineApi {
        self.api.as_ref()
    }

    pub fn error_buffer_len(&self) -> usize {
        self.error_buffer_len
    }

    /// Number of open sessions holding the engine initialized.
    pub fn active_sessions(&self) -> usize {
        *self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a session, initializing the engine if it is the first.
    pub(crate) fn acquire(&self) -> MontageResult<()> {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        if *sessions == 0 {
            let status = self.api.initialize();
            if status != STATUS_OK {
                let message = read_last_error(self.api(), self.error_buffer_len);
                tracing::warn!(backend = self.api.name(), status, %message, "Engine initialization failed");
                return Err(MontageError::initialization(format!(
                    "{} engine returned status {status}: {message}",
                    self.api.name()
                )));
            }
            tracing::info!(backend = self.api.name(), "Engine initialized");
        }
        *sessions += 1;
        Ok(())
    }

    /// Unregister a session, shutting the engine down after the last one.
    /// Never fails; a panicking shutdown is logged and swallowed.
    pub(crate) fn release(&self) {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match *sessions {
            0 => tracing::warn!(backend = self.api.name(), "Engine released more often than acquired"),
            1 => {
                *sessions = 0;
                if catch_unwind(AssertUnwindSafe(|| self.api.shutdown())).is_err() {
                    tracing::warn!(backend = self.api.name(), "Engine shutdown panicked");
                } else {
                    tracing::info!(backend = self.api.name(), "Engine shut down");
                }
            }
            _ => *sessions -= 1,
        }
    }
}

impl std::fmt::Debug for EngineRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRuntime")
            .field("backend", &self.api.name())
            .field("sessions", &self.active_sessions())
            .field("error_buffer_len", &self.error_buffer_len)
            .finish()
    }
}

/// Backends compiled into this build.
pub fn available_backends() -> Vec<EngineBackend> {
    let mut backends = vec![EngineBackend::Simulated];
    if cfg!(feature = "native") {
        backends.push(EngineBackend::Native);
    }
    backends
}

/// Build the runtime selected by `config`.
pub fn open_runtime(config: &EngineConfig) -> MontageResult<Arc<EngineRuntime>> {
    match config.backend {
        EngineBackend::Simulated => {
            let script = ExportScript::default()
                .with_step_delay(std::time::Duration::from_millis(config.simulated_step_delay_ms));
            let engine = SimulatedEngine::new();
            engine.set_export_script(script);
            Ok(EngineRuntime::with_error_buffer_len(engine, config.error_buffer_len))
        }
        EngineBackend::Native => native_runtime(config),
    }
}

#[cfg(feature = "native")]
fn native_runtime(config: &EngineConfig) -> MontageResult<Arc<EngineRuntime>> {
    Ok(crate::native::NativeEngine::shared_runtime(config.error_buffer_len))
}

#[cfg(not(feature = "native"))]
fn native_runtime(_config: &EngineConfig) -> MontageResult<Arc<EngineRuntime>> {
    Err(MontageError::unsupported(
        "native engine support was not compiled in (enable the `native` feature)",
    ))
}
