//! Timeline mutation commands.

use std::ffi::CString;
use std::path::Path;

use montage_common::error::{MontageError, MontageResult};
use montage_edit_model::{AudioTrack, FilterSpec, TextOverlay, VideoClip};

use crate::api::{EngineApi, TimelineHandle, STATUS_OK};
use crate::diagnostics::ErrorReporter;
use crate::session::EngineSession;

/// Sends edit items to the engine and turns status codes into errors.
///
/// Calls are synchronous and must not overlap with each other or with an
/// export on the same session.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    session: EngineSession,
    errors: ErrorReporter,
}

impl CommandDispatcher {
    pub fn new(session: EngineSession) -> Self {
        let errors = ErrorReporter::new(&session);
        Self { session, errors }
    }

    pub fn add_video_clip(&self, clip: &VideoClip) -> MontageResult<()> {
        self.session.ensure_open()?;
        let path = path_to_cstring(&clip.path)?;
        self.call("add_video_clip", |api, timeline| {
            api.add_video_clip(
                timeline,
                &path,
                clip.start_secs,
                clip.duration_secs,
                clip.position_secs,
            )
        })?;
        tracing::debug!(path = %clip.path.display(), position = clip.position_secs, "Video clip added");
        Ok(())
    }

    pub fn add_audio_track(&self, track: &AudioTrack) -> MontageResult<()> {
        self.session.ensure_open()?;
        let path = path_to_cstring(&track.path)?;
        self.call("add_audio_track", |api, timeline| {
            api.add_audio_track(
                timeline,
                &path,
                track.start_secs,
                track.duration_secs,
                track.position_secs,
            )
        })?;
        tracing::debug!(path = %track.path.display(), position = track.position_secs, "Audio track added");
        Ok(())
    }

    pub fn add_text_overlay(&self, overlay: &TextOverlay) -> MontageResult<()> {
        self.session.ensure_open()?;
        let text = to_cstring("overlay text", &overlay.text)?;
        let color = to_cstring("overlay color", &overlay.color.to_hex())?;
        self.call("add_text_overlay", |api, timeline| {
            api.add_text_overlay(
                timeline,
                &text,
                overlay.position_secs,
                overlay.duration_secs,
                overlay.x,
                overlay.y,
                overlay.font_size,
                &color,
            )
        })?;
        tracing::debug!(text = %overlay.text, color = %overlay.color, "Text overlay added");
        Ok(())
    }

    pub fn apply_filter(&self, filter: &FilterSpec) -> MontageResult<()> {
        self.session.ensure_open()?;
        self.call("apply_filter", |api, timeline| {
            api.apply_filter(timeline, filter.filter_type.code(), filter.value)
        })?;
        tracing::debug!(filter = filter.filter_type.name(), value = filter.value, "Filter applied");
        Ok(())
    }

    /// Run one engine call. A failure's message is read before the handle
    /// is let go.
    fn call(
        &self,
        operation: &'static str,
        op: impl FnOnce(&dyn EngineApi, &TimelineHandle) -> i32,
    ) -> MontageResult<()> {
        let failure = self.session.with_handle(|api, timeline| {
            let status = op(api, timeline);
            (status != STATUS_OK).then(|| self.errors.describe(api, status))
        })?;
        match failure {
            None => Ok(()),
            Some(error) => {
                tracing::warn!(operation, code = error.code, message = %error.message, "Engine command failed");
                Err(error.into_operation_error(operation))
            }
        }
    }
}

/// Marshal text for the engine. Interior NULs cannot cross the boundary.
pub(crate) fn to_cstring(label: &str, value: &str) -> MontageResult<CString> {
    CString::new(value)
        .map_err(|_| MontageError::invalid_input(format!("{label} contains a NUL byte")))
}

pub(crate) fn path_to_cstring(path: &Path) -> MontageResult<CString> {
    let text = path.to_str().ok_or_else(|| {
        MontageError::invalid_input(format!("path is not valid UTF-8: {}", path.display()))
    })?;
    to_cstring("path", text)
}
