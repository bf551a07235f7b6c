//! The engine's call surface.
//!
//! Every engine is reached through [`EngineApi`], a one-to-one image of the
//! foreign calls the engine exports. Status codes are passed through
//! untouched; interpreting them is the job of the dispatcher and the export
//! orchestrator.

use std::ffi::CStr;
use std::fmt;
use std::num::NonZeroUsize;

use crate::progress::ProgressRelay;

/// The call succeeded.
pub const STATUS_OK: i32 = 0;

/// The export call stopped because cancellation was requested.
/// Only meaningful for [`EngineApi::export`].
pub const STATUS_CANCELLED: i32 = 1;

/// Opaque reference to an engine timeline.
///
/// The raw value is never null. A handle has exactly one owner: it is not
/// `Clone`, and [`EngineApi::destroy_timeline`] consumes it.
#[derive(PartialEq, Eq)]
pub struct TimelineHandle(NonZeroUsize);

impl TimelineHandle {
    /// Wrap a raw engine value. Returns `None` for null.
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// The raw value to hand back to the engine.
    pub fn as_raw(&self) -> usize {
        self.0.get()
    }
}

impl fmt::Debug for TimelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimelineHandle({:#x})", self.0)
    }
}

/// Arguments of the export call, already marshalled.
#[derive(Debug, Clone, Copy)]
pub struct ExportParams<'a> {
    pub output_path: &'a CStr,
    pub width: i32,
    pub height: i32,
    pub fps: i32,
}

/// The engine's call surface.
///
/// Implementations must tolerate [`cancel_export`](Self::cancel_export) and
/// [`last_error`](Self::last_error) being called from another thread while
/// [`export`](Self::export) is running on the same timeline. No other calls
/// overlap on one timeline.
pub trait EngineApi: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Process-wide engine setup.
    fn initialize(&self) -> i32;

    /// Process-wide engine teardown.
    fn shutdown(&self);

    /// Create an empty timeline. `None` when the engine could not allocate one.
    fn create_timeline(&self) -> Option<TimelineHandle>;

    fn destroy_timeline(&self, timeline: TimelineHandle);

    fn add_video_clip(
        &self,
        timeline: &TimelineHandle,
        path: &CStr,
        start_secs: f64,
        duration_secs: f64,
        position_secs: f64,
    ) -> i32;

    fn add_audio_track(
        &self,
        timeline: &TimelineHandle,
        path: &CStr,
        start_secs: f64,
        duration_secs: f64,
        position_secs: f64,
    ) -> i32;

    #[allow(clippy::too_many_arguments)]
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
    ) -> i32;

    fn apply_filter(&self, timeline: &TimelineHandle, filter_type: i32, value: f64) -> i32;

    /// Render the timeline. Blocks until the export completes, fails, or
    /// observes a cancellation request. `progress` stays valid for the whole
    /// call and may be invoked from any thread.
    fn export(
        &self,
        timeline: &TimelineHandle,
        params: &ExportParams<'_>,
        progress: &ProgressRelay,
    ) -> i32;

    /// Ask a running export to stop. Has no effect when nothing is exporting.
    fn cancel_export(&self, timeline: &TimelineHandle);

    /// Copy the last error message into `buffer` as a NUL-terminated,
    /// possibly truncated string.
    fn last_error(&self, buffer: &mut [u8]);
}
