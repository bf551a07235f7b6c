//! Engine session management.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use montage_common::error::{MontageError, MontageResult};
use tokio_util::sync::CancellationToken;

use crate::api::{EngineApi, TimelineHandle};
use crate::runtime::EngineRuntime;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// An initialized engine plus the one timeline this session edits.
///
/// Clones share the same session. The timeline is released exactly once:
/// by the first [`close`](Self::close), or when the last clone is dropped.
#[derive(Clone)]
pub struct EngineSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: u64,
    runtime: Arc<EngineRuntime>,
    /// `None` once the session is disposed.
    timeline: RwLock<Option<TimelineHandle>>,
    /// Cancel path to a running export. Never waits on `timeline`.
    cancel: Mutex<CancelTarget>,
}

struct CancelTarget {
    /// Raw value of the live timeline; zero once it is being released.
    raw: usize,
    /// Signal of the export currently holding the timeline.
    export: Option<CancellationToken>,
}

impl EngineSession {
    /// Initialize the engine (if no other session has) and create a timeline.
    ///
    /// On failure nothing stays allocated.
    pub fn open(runtime: Arc<EngineRuntime>) -> MontageResult<Self> {
        runtime.acquire()?;

        let Some(timeline) = runtime.api().create_timeline() else {
            runtime.release();
            return Err(MontageError::initialization(format!(
                "{} engine could not create a timeline",
                runtime.api().name()
            )));
        };

        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session = id, backend = runtime.api().name(), ?timeline, "Engine session opened");

        Ok(Self {
            inner: Arc::new(SessionInner {
                id,
                runtime,
                cancel: Mutex::new(CancelTarget {
                    raw: timeline.as_raw(),
                    export: None,
                }),
                timeline: RwLock::new(Some(timeline)),
            }),
        })
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn runtime(&self) -> &Arc<EngineRuntime> {
        &self.inner.runtime
    }

    pub fn is_open(&self) -> bool {
        self.inner
            .timeline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Fail with [`MontageError::Disposed`] once the session is closed.
    pub fn ensure_open(&self) -> MontageResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(MontageError::Disposed)
        }
    }

    /// Run `op` against the live timeline.
    ///
    /// The session cannot be closed while `op` runs; [`close`](Self::close)
    /// waits for it to return.
    pub fn with_handle<R>(
        &self,
        op: impl FnOnce(&dyn EngineApi, &TimelineHandle) -> R,
    ) -> MontageResult<R> {
        let guard = self
            .inner
            .timeline
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let timeline = guard.as_ref().ok_or(MontageError::Disposed)?;
        Ok(op(self.inner.runtime.api(), timeline))
    }

    /// Like [`with_handle`](Self::with_handle), registering `cancel` as the
    /// signal to trigger if the session is closed while `op` runs.
    pub(crate) fn with_export_handle<R>(
        &self,
        cancel: &CancellationToken,
        op: impl FnOnce(&dyn EngineApi, &TimelineHandle) -> R,
    ) -> MontageResult<R> {
        // Registered before the handle is taken so a concurrent close always
        // sees the signal.
        self.inner.lock_cancel().export = Some(cancel.clone());
        let _registered = ExportRegistration(&self.inner);
        self.with_handle(op)
    }

    /// Ask the engine to stop the running export on this timeline.
    ///
    /// Does not contend with the lock held by a running export. A no-op once
    /// the timeline is being released.
    pub(crate) fn request_export_cancel(&self) {
        self.inner.send_engine_cancel(&self.inner.lock_cancel());
    }

    /// Destroy the timeline and release the engine. Idempotent, never fails.
    ///
    /// A running export is cancelled first, and the timeline is released only
    /// after the export call has returned.
    pub fn close(&self) {
        self.inner.close();
    }
}

/// Clears the registered export signal when the export call ends.
struct ExportRegistration<'a>(&'a SessionInner);

impl Drop for ExportRegistration<'_> {
    fn drop(&mut self) {
        self.0.lock_cancel().export = None;
    }
}

impl SessionInner {
    fn lock_cancel(&self) -> MutexGuard<'_, CancelTarget> {
        self.cancel.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Caller holds the cancel lock, so the timeline cannot be destroyed
    /// during the engine call.
    fn send_engine_cancel(&self, target: &CancelTarget) {
        // A second view of the live handle, used only for this call.
        let Some(timeline) = TimelineHandle::from_raw(target.raw) else {
            tracing::debug!(session = self.id, "Cancel not delivered: timeline released");
            return;
        };
        self.runtime.api().cancel_export(&timeline);
        tracing::debug!(session = self.id, "Engine cancel signalled");
    }

    fn cancel_running_export(&self) {
        let target = self.lock_cancel();
        if let Some(export) = &target.export {
            tracing::info!(session = self.id, "Cancelling export before close");
            export.cancel();
            self.send_engine_cancel(&target);
        }
    }

    fn close(&self) {
        self.cancel_running_export();

        let mut guard = self.timeline.write().unwrap_or_else(PoisonError::into_inner);
        let Some(timeline) = guard.take() else {
            tracing::debug!(session = self.id, "Engine session already closed");
            return;
        };
        self.lock_cancel().raw = 0;

        let api = self.runtime.api();
        if catch_unwind(AssertUnwindSafe(|| api.destroy_timeline(timeline))).is_err() {
            tracing::warn!(session = self.id, "Timeline destroy panicked; continuing release");
        }
        self.runtime.release();
        tracing::info!(session = self.id, "Engine session closed");
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for EngineSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSession")
            .field("id", &self.inner.id)
            .field("backend", &self.inner.runtime.api().name())
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{EngineCall, SimulatedEngine};

    #[test]
    fn test_open_creates_one_timeline() {
        let engine = SimulatedEngine::new();
        let session = EngineSession::open(EngineRuntime::new(engine.clone())).unwrap();
        assert!(session.is_open());
        assert_eq!(engine.live_timelines(), 1);
        assert_eq!(
            engine.calls(),
            vec![EngineCall::Initialize, EngineCall::CreateTimeline]
        );
    }

    #[test]
    fn test_timeline_refusal_releases_engine() {
        let engine = SimulatedEngine::new();
        engine.refuse_timelines();
        let runtime = EngineRuntime::new(engine.clone());

        let err = EngineSession::open(runtime.clone()).unwrap_err();
        assert!(matches!(err, MontageError::Initialization { .. }));
        assert_eq!(runtime.active_sessions(), 0);
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_with_handle_after_close_is_disposed() {
        let engine = SimulatedEngine::new();
        let session = EngineSession::open(EngineRuntime::new(engine)).unwrap();
        session.close();
        let result = session.with_handle(|_, _| ());
        assert!(matches!(result, Err(MontageError::Disposed)));
        assert!(matches!(session.ensure_open(), Err(MontageError::Disposed)));
    }

    #[test]
    fn test_drop_releases_timeline() {
        let engine = SimulatedEngine::new();
        let session = EngineSession::open(EngineRuntime::new(engine.clone())).unwrap();
        let clone = session.clone();
        drop(session);
        assert_eq!(engine.live_timelines(), 1);
        drop(clone);
        assert_eq!(engine.live_timelines(), 0);
        assert!(!engine.is_initialized());
    }

    #[test]
    fn test_cancel_after_close_makes_no_engine_call() {
        let engine = SimulatedEngine::new();
        let session = EngineSession::open(EngineRuntime::new(engine.clone())).unwrap();
        session.close();
        engine.clear_calls();

        session.request_export_cancel();

        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_close_without_export_sends_no_cancel() {
        let engine = SimulatedEngine::new();
        let session = EngineSession::open(EngineRuntime::new(engine.clone())).unwrap();
        session.close();
        assert!(!engine.calls().contains(&EngineCall::CancelExport));
    }
}
