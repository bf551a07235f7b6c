//! In-process reference engine.
//!
//! [`SimulatedEngine`] follows the engine protocol without touching media:
//! items are stored per timeline, export reports progress on a fixed
//! cadence, cancellation is honored only while an export is running, and
//! failures leave a message for the last-error query. The export behaviour
//! is scriptable and every call is recorded, which makes it the test double
//! for the session, dispatcher, and orchestrator.

use std::collections::HashMap;
use std::ffi::CStr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::api::{EngineApi, ExportParams, TimelineHandle, STATUS_CANCELLED, STATUS_OK};
use crate::progress::ProgressRelay;

/// Status returned for calls on an unknown timeline.
pub const STATUS_INVALID_HANDLE: i32 = -1;

/// How long a held export waits for cancellation before giving up.
const MAX_HOLD: Duration = Duration::from_secs(10);

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum EngineCall {
    Initialize,
    Shutdown,
    CreateTimeline,
    DestroyTimeline,
    AddVideoClip(MediaArgs),
    AddAudioTrack(MediaArgs),
    AddTextOverlay(TextArgs),
    ApplyFilter { filter_type: i32, value: f64 },
    ExportStarted { output_path: String, width: i32, height: i32, fps: i32 },
    ExportFinished { status: i32 },
    CancelExport,
    LastError,
}

/// What an export does.
#[derive(Debug, Clone)]
pub struct ExportScript {
    /// Progress values reported in order.
    pub progress: Vec<i32>,

    /// Pause after each progress report.
    pub step_delay: Duration,

    /// After the last step, wait for a cancel request before returning.
    pub hold_until_cancelled: bool,

    /// Keep going when cancellation is requested.
    pub ignore_cancel: bool,

    /// Status returned when the script runs to the end.
    pub status: i32,

    /// Last-error text set when `status` is a failure.
    pub error_message: Option<String>,
}

impl Default for ExportScript {
    fn default() -> Self {
        Self {
            progress: (0..=100).collect(),
            step_delay: Duration::from_millis(20),
            hold_until_cancelled: false,
            ignore_cancel: false,
            status: STATUS_OK,
            error_message: None,
        }
    }
}

impl ExportScript {
    /// Report exactly `progress`, without delay, then succeed.
    pub fn steps(progress: impl IntoIterator<Item = i32>) -> Self {
        Self {
            progress: progress.into_iter().collect(),
            step_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// End with `status` and, for failures, `message` as the last error.
    pub fn finishing_with(mut self, status: i32, message: impl Into<String>) -> Self {
        self.status = status;
        self.error_message = Some(message.into());
        self
    }

    pub fn holding_until_cancelled(mut self) -> Self {
        self.hold_until_cancelled = true;
        self
    }

    pub fn ignoring_cancel(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }
}

/// Arguments of an add-clip or add-track call, as the engine received them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaArgs {
    pub path: String,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub position_secs: f64,
}

/// Arguments of an add-text-overlay call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextArgs {
    pub text: String,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub x: i32,
    pub y: i32,
    pub font_size: i32,
    pub color: String,
}

/// Snapshot of one timeline's contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimelineSnapshot {
    pub video_clips: Vec<MediaArgs>,
    pub audio_tracks: Vec<MediaArgs>,
    pub text_overlays: Vec<TextArgs>,
    pub filter_type: i32,
    pub filter_value: f64,
}

#[derive(Debug, Default)]
struct SimTimeline {
    contents: TimelineSnapshot,
    exporting: Arc<AtomicBool>,
    cancel_requested: Arc<AtomicBool>,
}

#[derive(Debug, Default)]
struct SimState {
    initialized: bool,
    timelines: HashMap<usize, SimTimeline>,
    last_error: String,
    init_failure: Option<(i32, String)>,
    refuse_timelines: bool,
    command_failure: Option<(i32, String)>,
}

#[derive(Debug, Default)]
struct SimInner {
    state: Mutex<SimState>,
    script: Mutex<ExportScript>,
    calls: Mutex<Vec<EngineCall>>,
    next_handle: AtomicUsize,
}

/// Scriptable in-process engine. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    inner: Arc<SimInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script used by subsequent exports.
    pub fn set_export_script(&self, script: ExportScript) {
        *lock(&self.inner.script) = script;
    }

    /// Make the next `initialize` fail.
    pub fn fail_initialize(&self, status: i32, message: impl Into<String>) {
        lock(&self.inner.state).init_failure = Some((status, message.into()));
    }

    /// Make `create_timeline` return null from now on.
    pub fn refuse_timelines(&self) {
        lock(&self.inner.state).refuse_timelines = true;
    }

    /// Make the next mutation call fail with `status`.
    pub fn fail_next_command(&self, status: i32, message: impl Into<String>) {
        lock(&self.inner.state).command_failure = Some((status, message.into()));
    }

    pub fn set_last_error(&self, message: impl Into<String>) {
        lock(&self.inner.state).last_error = message.into();
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.inner.state).initialized
    }

    pub fn live_timelines(&self) -> usize {
        lock(&self.inner.state).timelines.len()
    }

    /// Contents of every live timeline, in creation order.
    pub fn timelines(&self) -> Vec<TimelineSnapshot> {
        let state = lock(&self.inner.state);
        let mut ids: Vec<_> = state.timelines.keys().copied().collect();
        ids.sort_unstable();
        ids.iter()
            .map(|id| state.timelines[id].contents.clone())
            .collect()
    }

    /// Every call made so far.
    pub fn calls(&self) -> Vec<EngineCall> {
        lock(&self.inner.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.inner.calls).clear();
    }

    fn record(&self, call: EngineCall) {
        lock(&self.inner.calls).push(call);
    }

    /// Apply `edit` to a live timeline, honoring an injected failure.
    fn mutate(&self, timeline: &TimelineHandle, edit: impl FnOnce(&mut TimelineSnapshot)) -> i32 {
        let mut state = lock(&self.inner.state);
        if let Some((status, message)) = state.command_failure.take() {
            state.last_error = message;
            return status;
        }
        match state.timelines.get_mut(&timeline.as_raw()) {
            Some(entry) => {
                edit(&mut entry.contents);
                STATUS_OK
            }
            None => {
                state.last_error = format!("invalid timeline handle {:#x}", timeline.as_raw());
                STATUS_INVALID_HANDLE
            }
        }
    }
}

fn text(value: &CStr) -> String {
    value.to_string_lossy().into_owned()
}

impl EngineApi for SimulatedEngine {
    fn name(&self) -> &str {
        "simulated"
    }

    fn initialize(&self) -> i32 {
        self.record(EngineCall::Initialize);
        let mut state = lock(&self.inner.state);
        if let Some((status, message)) = state.init_failure.take() {
            state.last_error = message;
            return status;
        }
        state.initialized = true;
        STATUS_OK
    }

    fn shutdown(&self) {
        self.record(EngineCall::Shutdown);
        lock(&self.inner.state).initialized = false;
    }

    fn create_timeline(&self) -> Option<TimelineHandle> {
        self.record(EngineCall::CreateTimeline);
        let mut state = lock(&self.inner.state);
        if state.refuse_timelines {
            state.last_error = "timeline allocation refused".to_string();
            return None;
        }
        let id = self.inner.next_handle.fetch_add(1, Ordering::Relaxed) + 1;
        state.timelines.insert(id, SimTimeline::default());
        TimelineHandle::from_raw(id)
    }

    fn destroy_timeline(&self, timeline: TimelineHandle) {
        self.record(EngineCall::DestroyTimeline);
        lock(&self.inner.state).timelines.remove(&timeline.as_raw());
    }

    fn add_video_clip(
        &self,
        timeline: &TimelineHandle,
        path: &CStr,
        start_secs: f64,
        duration_secs: f64,
        position_secs: f64,
    ) -> i32 {
        let args = MediaArgs {
            path: text(path),
            start_secs,
            duration_secs,
            position_secs,
        };
        self.record(EngineCall::AddVideoClip(args.clone()));
        self.mutate(timeline, |t| t.video_clips.push(args))
    }

    fn add_audio_track(
        &self,
        timeline: &TimelineHandle,
        path: &CStr,
        start_secs: f64,
        duration_secs: f64,
        position_secs: f64,
    ) -> i32 {
        let args = MediaArgs {
            path: text(path),
            start_secs,
            duration_secs,
            position_secs,
        };
        self.record(EngineCall::AddAudioTrack(args.clone()));
        self.mutate(timeline, |t| t.audio_tracks.push(args))
    }

    fn add_text_overlay(
        &self,
        timeline: &TimelineHandle,
        overlay_text: &CStr,
        position_secs: f64,
        duration_secs: f64,
        x: i32,
        y: i32,
        font_size: i32,
        color_hex: &CStr,
    ) -> i32 {
        let args = TextArgs {
            text: text(overlay_text),
            position_secs,
            duration_secs,
            x,
            y,
            font_size,
            color: text(color_hex),
        };
        self.record(EngineCall::AddTextOverlay(args.clone()));
        self.mutate(timeline, |t| t.text_overlays.push(args))
    }

    fn apply_filter(&self, timeline: &TimelineHandle, filter_type: i32, value: f64) -> i32 {
        self.record(EngineCall::ApplyFilter { filter_type, value });
        self.mutate(timeline, |t| {
            t.filter_type = filter_type;
            t.filter_value = value;
        })
    }

    fn export(
        &self,
        timeline: &TimelineHandle,
        params: &ExportParams<'_>,
        progress: &ProgressRelay,
    ) -> i32 {
        self.record(EngineCall::ExportStarted {
            output_path: text(params.output_path),
            width: params.width,
            height: params.height,
            fps: params.fps,
        });

        let (exporting, cancel_requested) = {
            let mut state = lock(&self.inner.state);
            match state.timelines.get(&timeline.as_raw()) {
                Some(entry) => (entry.exporting.clone(), entry.cancel_requested.clone()),
                None => {
                    state.last_error = format!("invalid timeline handle {:#x}", timeline.as_raw());
                    drop(state);
                    self.record(EngineCall::ExportFinished {
                        status: STATUS_INVALID_HANDLE,
                    });
                    return STATUS_INVALID_HANDLE;
                }
            }
        };
        let script = lock(&self.inner.script).clone();

        exporting.store(true, Ordering::SeqCst);
        cancel_requested.store(false, Ordering::SeqCst);

        let cancelled = || !script.ignore_cancel && cancel_requested.load(Ordering::SeqCst);
        let mut status = script.status;

        'run: {
            for &value in &script.progress {
                if cancelled() {
                    status = STATUS_CANCELLED;
                    break 'run;
                }
                progress.report(value);
                if !script.step_delay.is_zero() {
                    std::thread::sleep(script.step_delay);
                }
            }

            if script.hold_until_cancelled {
                let started = Instant::now();
                while !cancel_requested.load(Ordering::SeqCst) && started.elapsed() < MAX_HOLD {
                    std::thread::sleep(Duration::from_millis(1));
                }
                if cancelled() {
                    status = STATUS_CANCELLED;
                }
            }
        }

        exporting.store(false, Ordering::SeqCst);

        if status != STATUS_OK && status != STATUS_CANCELLED {
            let message = script
                .error_message
                .clone()
                .unwrap_or_else(|| format!("export failed with status {status}"));
            lock(&self.inner.state).last_error = message;
        }

        self.record(EngineCall::ExportFinished { status });
        status
    }

    fn cancel_export(&self, timeline: &TimelineHandle) {
        self.record(EngineCall::CancelExport);
        let state = lock(&self.inner.state);
        if let Some(entry) = state.timelines.get(&timeline.as_raw()) {
            if entry.exporting.load(Ordering::SeqCst) {
                entry.cancel_requested.store(true, Ordering::SeqCst);
            }
        }
    }

    fn last_error(&self, buffer: &mut [u8]) {
        self.record(EngineCall::LastError);
        let Some(capacity) = buffer.len().checked_sub(1) else {
            return;
        };
        let state = lock(&self.inner.state);
        let bytes = state.last_error.as_bytes();
        let n = bytes.len().min(capacity);
        buffer[..n].copy_from_slice(&bytes[..n]);
        buffer[n] = 0;
    }
}
