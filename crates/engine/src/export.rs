//! Asynchronous export control.
//!
//! The engine's export call blocks until rendering ends. The orchestrator
//! runs it on a blocking worker, relays progress to the caller's sink, and
//! maps the returned status code to an [`ExportOutcome`].
//!
//! ```text
//!  caller                 supervisor task            blocking worker
//!  ──────                 ───────────────            ───────────────
//!  start_export ───────▶  spawn_blocking ──────────▶ engine.export(..)
//!                         ◀── progress queue ─────── relay.report(p)
//!  sink(p) ◀────────────  forward (monotonic)
//!  cancel_export ──────▶  engine.cancel_export()
//!                         ◀── status code ────────── returns
//!  ExportTask::wait ◀───  Completed | Cancelled | Failed
//! ```

use std::ffi::CString;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use montage_common::error::{MontageError, MontageResult};
use montage_edit_model::ExportSettings;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ExportParams, STATUS_CANCELLED, STATUS_OK};
use crate::commands::path_to_cstring;
use crate::diagnostics::{EngineError, ErrorReporter};
use crate::progress::ProgressRelay;
use crate::session::EngineSession;

/// Receives export progress in percent. Runs on the caller's async runtime,
/// never on the engine's thread.
pub type ProgressSink = Box<dyn FnMut(u8) + Send>;

/// Parameters of one export attempt.
pub struct ExportRequest {
    /// Output file path.
    pub output_path: PathBuf,

    /// Output frame size in pixels.
    pub width: u32,
    pub height: u32,

    /// Output frame rate.
    pub fps: u32,

    /// Optional progress receiver.
    pub progress: Option<ProgressSink>,

    /// Cooperative cancellation signal for this attempt.
    pub cancel: CancellationToken,
}

impl ExportRequest {
    pub fn new(output_path: impl Into<PathBuf>, width: u32, height: u32, fps: u32) -> Self {
        Self {
            output_path: output_path.into(),
            width,
            height,
            fps,
            progress: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn from_settings(output_path: impl Into<PathBuf>, settings: &ExportSettings) -> Self {
        Self::new(output_path, settings.width, settings.height, settings.fps)
    }

    pub fn with_progress(mut self, sink: impl FnMut(u8) + Send + 'static) -> Self {
        self.progress = Some(Box::new(sink));
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn marshal(&self) -> MontageResult<MarshalledExport> {
        let dimension = |label: &str, value: u32| -> MontageResult<i32> {
            match i32::try_from(value) {
                Ok(v) if v > 0 => Ok(v),
                _ => Err(MontageError::invalid_input(format!(
                    "export {label} must be a positive 32-bit integer (got {value})"
                ))),
            }
        };
        Ok(MarshalledExport {
            output_path: path_to_cstring(&self.output_path)?,
            width: dimension("width", self.width)?,
            height: dimension("height", self.height)?,
            fps: dimension("fps", self.fps)?,
        })
    }
}

impl std::fmt::Debug for ExportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRequest")
            .field("output_path", &self.output_path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("fps", &self.fps)
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Export arguments in the form the engine takes them.
#[derive(Debug)]
struct MarshalledExport {
    output_path: CString,
    width: i32,
    height: i32,
    fps: i32,
}

/// Terminal result of an export attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ExportOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl ExportOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Convert to a `Result`, treating cancellation as success.
    pub fn into_result(self) -> MontageResult<Self> {
        match self {
            Self::Failed(message) => Err(MontageError::export_failed(message)),
            other => Ok(other),
        }
    }

    fn state(&self) -> ExportState {
        match self {
            Self::Completed => ExportState::Completed,
            Self::Cancelled => ExportState::Cancelled,
            Self::Failed(_) => ExportState::Failed,
        }
    }
}

/// Export state machine:
/// `Idle → Exporting → {Completed, Cancelled, Failed} → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    Idle,
    Exporting,
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug)]
struct Slot {
    state: ExportState,
    cancel: Option<CancellationToken>,
    last_outcome: Option<ExportOutcome>,
}

#[derive(Debug)]
struct Shared {
    slot: Mutex<Slot>,
    state_tx: watch::Sender<ExportState>,
}

impl Shared {
    fn lock(&self) -> std::sync::MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs at most one export at a time for a session.
#[derive(Debug, Clone)]
pub struct ExportOrchestrator {
    session: EngineSession,
    errors: ErrorReporter,
    shared: Arc<Shared>,
}

impl ExportOrchestrator {
    pub fn new(session: EngineSession) -> Self {
        let errors = ErrorReporter::new(&session);
        let (state_tx, _) = watch::channel(ExportState::Idle);
        Self {
            session,
            errors,
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    state: ExportState::Idle,
                    cancel: None,
                    last_outcome: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> ExportState {
        self.shared.lock().state
    }

    pub fn is_idle(&self) -> bool {
        self.state() == ExportState::Idle
    }

    /// Outcome of the most recent finished export.
    pub fn last_outcome(&self) -> Option<ExportOutcome> {
        self.shared.lock().last_outcome.clone()
    }

    /// Observe state transitions.
    pub fn subscribe(&self) -> watch::Receiver<ExportState> {
        self.shared.state_tx.subscribe()
    }

    /// Start an export on a blocking worker.
    ///
    /// Fails with [`MontageError::EngineBusy`] while another export runs; no
    /// engine call is made in that case. Must be called from within a tokio
    /// runtime.
    pub fn start_export(&self, mut request: ExportRequest) -> MontageResult<ExportTask> {
        let mut slot = self.shared.lock();
        if slot.state != ExportState::Idle {
            return Err(MontageError::EngineBusy);
        }
        self.session.ensure_open()?;
        let params = request.marshal()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            MontageError::unsupported("start_export must be called from within a tokio runtime")
        })?;

        let cancel = request.cancel.clone();
        slot.state = ExportState::Exporting;
        slot.cancel = Some(cancel.clone());
        self.shared.state_tx.send_replace(ExportState::Exporting);
        drop(slot);

        tracing::info!(
            session = self.session.id(),
            output = %request.output_path.display(),
            width = request.width,
            height = request.height,
            fps = request.fps,
            "Starting export"
        );

        let sink = request.progress.take();
        let handle = runtime.spawn(self.clone().supervise(params, sink, cancel.clone()));
        Ok(ExportTask { handle, cancel })
    }

    /// Request cancellation of the running export. A no-op when idle.
    ///
    /// The engine decides whether to honor the request; await the task for
    /// the actual outcome.
    pub fn cancel_export(&self) {
        let slot = self.shared.lock();
        match (&slot.state, &slot.cancel) {
            (ExportState::Exporting, Some(cancel)) => {
                tracing::info!(session = self.session.id(), "Export cancellation requested");
                cancel.cancel();
            }
            _ => tracing::debug!(session = self.session.id(), "No export in flight to cancel"),
        }
    }

    /// Resolve once no export is running.
    pub async fn wait_idle(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|state| *state == ExportState::Idle).await;
    }

    async fn supervise(
        self,
        params: MarshalledExport,
        mut sink: Option<ProgressSink>,
        cancel: CancellationToken,
    ) -> ExportOutcome {
        let started = std::time::Instant::now();
        let (relay, mut progress_rx) = ProgressRelay::channel();

        let session = self.session.clone();
        let errors = self.errors.clone();
        let worker_cancel = cancel.clone();
        // The relay moves into the worker and lives until the engine call
        // returns, whatever happens to the cancellation token meanwhile.
        let worker = tokio::task::spawn_blocking(move || {
            let export = ExportParams {
                output_path: &params.output_path,
                width: params.width,
                height: params.height,
                fps: params.fps,
            };
            session.with_export_handle(&worker_cancel, |api, timeline| {
                if worker_cancel.is_cancelled() {
                    return (STATUS_CANCELLED, None);
                }
                let status = api.export(timeline, &export, &relay);
                let failure = (status != STATUS_OK && status != STATUS_CANCELLED)
                    .then(|| errors.describe(api, status));
                (status, failure)
            })
        });
        tokio::pin!(worker);

        let mut delivered: Option<u8> = None;
        let mut cancel_requested = false;
        let joined = loop {
            tokio::select! {
                biased;
                joined = &mut worker => break joined,
                Some(percent) = progress_rx.recv() => {
                    deliver(&mut sink, &mut delivered, percent);
                    // A request that reached the engine before its export
                    // loop started may have been discarded; repeat it.
                    if cancel_requested {
                        self.request_engine_cancel();
                    }
                }
                _ = cancel.cancelled(), if !cancel_requested => {
                    cancel_requested = true;
                    self.request_engine_cancel();
                }
            }
        };

        // Flush what the engine reported before returning.
        drain(&mut progress_rx, &mut sink, &mut delivered);

        let outcome = match joined {
            Ok(Ok((status, failure))) => outcome_for(status, failure),
            Ok(Err(err)) => ExportOutcome::Failed(err.to_string()),
            Err(err) => ExportOutcome::Failed(format!("export worker failed: {err}")),
        };

        tracing::info!(
            session = self.session.id(),
            outcome = ?outcome,
            last_progress = ?delivered,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Export finished"
        );

        self.finish(&outcome);
        outcome
    }

    fn request_engine_cancel(&self) {
        self.session.request_export_cancel();
    }

    fn finish(&self, outcome: &ExportOutcome) {
        let mut slot = self.shared.lock();
        slot.state = outcome.state();
        self.shared.state_tx.send_replace(slot.state);

        slot.state = ExportState::Idle;
        slot.cancel = None;
        slot.last_outcome = Some(outcome.clone());
        self.shared.state_tx.send_replace(ExportState::Idle);
    }
}

/// The engine's status code decides the outcome, not whether cancellation
/// was requested.
fn outcome_for(status: i32, failure: Option<EngineError>) -> ExportOutcome {
    match status {
        STATUS_OK => ExportOutcome::Completed,
        STATUS_CANCELLED => ExportOutcome::Cancelled,
        code => {
            let message = failure.map_or_else(|| format!("engine error {code}"), |e| e.message);
            tracing::warn!(code, %message, "Engine export failed");
            ExportOutcome::Failed(message)
        }
    }
}

fn deliver(sink: &mut Option<ProgressSink>, delivered: &mut Option<u8>, percent: u8) {
    if delivered.is_some_and(|last| percent <= last) {
        return;
    }
    *delivered = Some(percent);
    if let Some(callback) = sink.as_mut() {
        if catch_unwind(AssertUnwindSafe(|| callback(percent))).is_err() {
            tracing::warn!("Progress sink panicked; further progress is dropped");
            *sink = None;
        }
    }
}

fn drain(
    rx: &mut mpsc::UnboundedReceiver<u8>,
    sink: &mut Option<ProgressSink>,
    delivered: &mut Option<u8>,
) {
    while let Ok(percent) = rx.try_recv() {
        deliver(sink, delivered, percent);
    }
}

/// A running export.
#[derive(Debug)]
pub struct ExportTask {
    handle: JoinHandle<ExportOutcome>,
    cancel: CancellationToken,
}

impl ExportTask {
    /// Request cancellation of this export.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this export when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the terminal outcome. Every progress value has been
    /// delivered to the sink by the time this resolves.
    pub async fn wait(self) -> ExportOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(err) => ExportOutcome::Failed(format!("export supervisor failed: {err}")),
        }
    }
}
