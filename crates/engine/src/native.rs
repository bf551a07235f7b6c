//! Bindings to the native `VideoEngine` shared library.
//!
//! The library's progress callback is a bare function pointer with no user
//! data, so the relay of the running export is parked in a process-wide slot
//! and a single trampoline forwards into it. Exports are serialized across
//! the process to keep that slot unambiguous.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::catch_unwind;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use crate::api::{EngineApi, ExportParams, TimelineHandle};
use crate::progress::ProgressRelay;
use crate::runtime::EngineRuntime;

type ProgressCallback = extern "C" fn(progress: c_int);

#[link(name = "VideoEngine")]
extern "C" {
    fn Engine_Initialize() -> c_int;
    fn Engine_Cleanup();
    fn Timeline_Create() -> *mut c_void;
    fn Timeline_Destroy(timeline: *mut c_void);
    fn Timeline_AddVideoClip(
        timeline: *mut c_void,
        file_path: *const c_char,
        start_time: f64,
        duration: f64,
        position: f64,
    ) -> c_int;
    fn Timeline_AddAudioTrack(
        timeline: *mut c_void,
        file_path: *const c_char,
        start_time: f64,
        duration: f64,
        position: f64,
    ) -> c_int;
    fn Timeline_AddTextOverlay(
        timeline: *mut c_void,
        text: *const c_char,
        position: f64,
        duration: f64,
        x: c_int,
        y: c_int,
        font_size: c_int,
        color_hex: *const c_char,
    ) -> c_int;
    fn Timeline_ApplyFilter(timeline: *mut c_void, filter_type: c_int, value: f64) -> c_int;
    fn Timeline_Export(
        timeline: *mut c_void,
        output_path: *const c_char,
        width: c_int,
        height: c_int,
        fps: c_int,
        progress: ProgressCallback,
    ) -> c_int;
    fn Timeline_CancelExport(timeline: *mut c_void);
    fn Engine_GetLastError(buffer: *mut c_char, buffer_size: c_int);
}

/// Relay of the export currently inside `Timeline_Export`.
static ACTIVE_PROGRESS: Mutex<Option<ProgressRelay>> = Mutex::new(None);

/// Held for the whole of `Timeline_Export`.
static EXPORT_GATE: Mutex<()> = Mutex::new(());

static SHARED_RUNTIME: OnceLock<Arc<EngineRuntime>> = OnceLock::new();

extern "C" fn progress_trampoline(progress: c_int) {
    // Unwinding into the engine is undefined behaviour.
    let _ = catch_unwind(|| {
        let slot = ACTIVE_PROGRESS.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(relay) = slot.as_ref() {
            relay.report(progress);
        }
    });
}

/// Clears the active relay when the export call returns or unwinds.
struct ActiveRelayGuard;

impl ActiveRelayGuard {
    fn install(relay: &ProgressRelay) -> Self {
        *ACTIVE_PROGRESS.lock().unwrap_or_else(PoisonError::into_inner) = Some(relay.clone());
        Self
    }
}

impl Drop for ActiveRelayGuard {
    fn drop(&mut self) {
        *ACTIVE_PROGRESS.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

fn raw(timeline: &TimelineHandle) -> *mut c_void {
    timeline.as_raw() as *mut c_void
}

/// The linked `VideoEngine` library.
#[derive(Debug, Default)]
pub struct NativeEngine {
    _private: (),
}

impl NativeEngine {
    /// The process-wide runtime for the native library.
    ///
    /// The library keeps global state, so every caller shares one runtime;
    /// `error_buffer_len` only takes effect on the first call.
    pub fn shared_runtime(error_buffer_len: usize) -> Arc<EngineRuntime> {
        SHARED_RUNTIME
            .get_or_init(|| {
                EngineRuntime::with_error_buffer_len(NativeEngine::default(), error_buffer_len)
            })
            .clone()
    }
}

impl EngineApi for NativeEngine {
    fn name(&self) -> &str {
        "native"
    }

    fn initialize(&self) -> i32 {
        // SAFETY: no preconditions.
        unsafe { Engine_Initialize() }
    }

    fn shutdown(&self) {
        // SAFETY: the runtime calls this once, after the last timeline is gone.
        unsafe { Engine_Cleanup() }
    }

    fn create_timeline(&self) -> Option<TimelineHandle> {
        // SAFETY: no preconditions; null signals failure.
        let timeline = unsafe { Timeline_Create() };
        TimelineHandle::from_raw(timeline as usize)
    }

    fn destroy_timeline(&self, timeline: TimelineHandle) {
        // SAFETY: the handle came from Timeline_Create and is consumed here,
        // so it cannot be used again.
        unsafe { Timeline_Destroy(raw(&timeline)) }
    }

    fn add_video_clip(
        &self,
        timeline: &TimelineHandle,
        path: &CStr,
        start_secs: f64,
        duration_secs: f64,
        position_secs: f64,
    ) -> i32 {
        // SAFETY: live handle; `path` is NUL-terminated and outlives the call.
        unsafe {
            Timeline_AddVideoClip(
                raw(timeline),
                path.as_ptr(),
                start_secs,
                duration_secs,
                position_secs,
            )
        }
    }

    fn add_audio_track(
        &self,
        timeline: &TimelineHandle,
        path: &CStr,
        start_secs: f64,
        duration_secs: f64,
        position_secs: f64,
    ) -> i32 {
        // SAFETY: live handle; `path` is NUL-terminated and outlives the call.
        unsafe {
            Timeline_AddAudioTrack(
                raw(timeline),
                path.as_ptr(),
                start_secs,
                duration_secs,
                position_secs,
            )
        }
    }

    fn add_text_overlay(
        &self,
        timeline: &TimelineHandle,
        text: &CStr,
        position_secs: f64,
        duration_secs: f64,
        x: i32,
        y: i32,
        font_size: i32,
        color_hex: &CStr,
    ) -> i32 {
        // SAFETY: live handle; both strings are NUL-terminated and outlive the call.
        unsafe {
            Timeline_AddTextOverlay(
                raw(timeline),
                text.as_ptr(),
                position_secs,
                duration_secs,
                x,
                y,
                font_size,
                color_hex.as_ptr(),
            )
        }
    }

    fn apply_filter(&self, timeline: &TimelineHandle, filter_type: i32, value: f64) -> i32 {
        // SAFETY: live handle.
        unsafe { Timeline_ApplyFilter(raw(timeline), filter_type, value) }
    }

    fn export(
        &self,
        timeline: &TimelineHandle,
        params: &ExportParams<'_>,
        progress: &ProgressRelay,
    ) -> i32 {
        let _gate = EXPORT_GATE.lock().unwrap_or_else(PoisonError::into_inner);
        let _active = ActiveRelayGuard::install(progress);
        // SAFETY: live handle; the path outlives the call, and the trampoline
        // only touches the relay slot, which stays populated until return.
        unsafe {
            Timeline_Export(
                raw(timeline),
                params.output_path.as_ptr(),
                params.width,
                params.height,
                params.fps,
                progress_trampoline,
            )
        }
    }

    fn cancel_export(&self, timeline: &TimelineHandle) {
        // SAFETY: live handle; the library allows this during an export.
        unsafe { Timeline_CancelExport(raw(timeline)) }
    }

    fn last_error(&self, buffer: &mut [u8]) {
        let Ok(len) = c_int::try_from(buffer.len()) else {
            return;
        };
        if len == 0 {
            return;
        }
        // SAFETY: the library writes at most `len` bytes, NUL included.
        unsafe { Engine_GetLastError(buffer.as_mut_ptr().cast(), len) }
    }
}
