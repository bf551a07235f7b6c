//! High-level editing facade.
//!
//! An [`Editor`] owns one engine session and keeps an [`EditProject`] in
//! step with what the engine accepted. Items reach the project only after
//! the engine returned success, so the project never lists an item the
//! timeline does not hold.

use std::path::PathBuf;
use std::sync::Arc;

use montage_common::error::{MontageError, MontageResult};
use montage_edit_model::{AudioTrack, EditProject, FilterSpec, TextOverlay, VideoClip};
use tokio::sync::watch;

use crate::commands::CommandDispatcher;
use crate::export::{ExportOrchestrator, ExportOutcome, ExportRequest, ExportState, ExportTask};
use crate::runtime::EngineRuntime;
use crate::session::EngineSession;

#[derive(Debug)]
pub struct Editor {
    session: EngineSession,
    commands: CommandDispatcher,
    exports: ExportOrchestrator,
    project: EditProject,
}

impl Editor {
    /// Open a session with an empty project called `name`.
    pub fn open(runtime: Arc<EngineRuntime>, name: impl Into<String>) -> MontageResult<Self> {
        let session = EngineSession::open(runtime)?;
        Ok(Self {
            commands: CommandDispatcher::new(session.clone()),
            exports: ExportOrchestrator::new(session.clone()),
            session,
            project: EditProject::new(name),
        })
    }

    /// Open a session and replay `project` into it.
    pub fn from_project(runtime: Arc<EngineRuntime>, project: &EditProject) -> MontageResult<Self> {
        let mut editor = Self::open(runtime, project.name.clone())?;
        editor.load_project(project)?;
        Ok(editor)
    }

    /// Send every item of `project` to the engine, in document order, then
    /// its filter. Export settings are copied as-is.
    ///
    /// Stops at the first rejected item; items accepted before it stay on
    /// the timeline and in [`project`](Self::project).
    pub fn load_project(&mut self, project: &EditProject) -> MontageResult<()> {
        for clip in &project.video_clips {
            self.add_video_clip(clip.clone())?;
        }
        for track in &project.audio_tracks {
            self.add_audio_track(track.clone())?;
        }
        for overlay in &project.text_overlays {
            self.add_text_overlay(overlay.clone())?;
        }
        if let Some(filter) = project.filter {
            self.apply_filter(filter)?;
        }
        self.project.export = project.export;

        tracing::info!(
            session = self.session.id(),
            project = %project.name,
            items = self.project.item_count(),
            "Project loaded into engine"
        );
        Ok(())
    }

    /// Items accepted so far, plus the export settings.
    pub fn project(&self) -> &EditProject {
        &self.project
    }

    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    pub fn add_video_clip(&mut self, clip: VideoClip) -> MontageResult<()> {
        self.ensure_not_exporting()?;
        self.commands.add_video_clip(&clip)?;
        self.project.video_clips.push(clip);
        self.project.touch();
        Ok(())
    }

    /// Place a clip of `duration_secs` right after the last video clip.
    pub fn append_video_clip(
        &mut self,
        path: impl Into<PathBuf>,
        duration_secs: f64,
    ) -> MontageResult<()> {
        let position = self.project.next_video_position();
        self.add_video_clip(VideoClip::new(path, duration_secs, position))
    }

    pub fn add_audio_track(&mut self, track: AudioTrack) -> MontageResult<()> {
        self.ensure_not_exporting()?;
        self.commands.add_audio_track(&track)?;
        self.project.audio_tracks.push(track);
        self.project.touch();
        Ok(())
    }

    pub fn add_text_overlay(&mut self, overlay: TextOverlay) -> MontageResult<()> {
        self.ensure_not_exporting()?;
        self.commands.add_text_overlay(&overlay)?;
        self.project.text_overlays.push(overlay);
        self.project.touch();
        Ok(())
    }

    /// Replace the timeline's filter.
    pub fn apply_filter(&mut self, filter: FilterSpec) -> MontageResult<()> {
        self.ensure_not_exporting()?;
        self.commands.apply_filter(&filter)?;
        self.project.filter = Some(filter);
        self.project.touch();
        Ok(())
    }

    /// Start exporting the timeline. See [`ExportOrchestrator::start_export`].
    pub fn export(&self, request: ExportRequest) -> MontageResult<ExportTask> {
        self.exports.start_export(request)
    }

    /// Export to `output_path` with the project's export settings.
    pub fn export_to(&self, output_path: impl Into<PathBuf>) -> MontageResult<ExportTask> {
        self.export(ExportRequest::from_settings(output_path, &self.project.export))
    }

    pub fn cancel_export(&self) {
        self.exports.cancel_export();
    }

    pub fn export_state(&self) -> ExportState {
        self.exports.state()
    }

    pub fn last_export_outcome(&self) -> Option<ExportOutcome> {
        self.exports.last_outcome()
    }

    pub fn subscribe_export_state(&self) -> watch::Receiver<ExportState> {
        self.exports.subscribe()
    }

    /// Cancel any running export, wait for its outcome, then release the
    /// timeline and the engine. Calling it again does nothing.
    pub async fn close(&self) {
        if !self.exports.is_idle() {
            tracing::info!(session = self.session.id(), "Closing editor with export in flight");
            self.exports.cancel_export();
            self.exports.wait_idle().await;
        }
        self.session.close();
    }

    fn ensure_not_exporting(&self) -> MontageResult<()> {
        if self.exports.is_idle() {
            Ok(())
        } else {
            Err(MontageError::EngineBusy)
        }
    }
}

impl Drop for Editor {
    fn drop(&mut self) {
        // A running export holds its own session clone; the timeline is
        // released once the worker returns.
        self.exports.cancel_export();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{EngineCall, MediaArgs, SimulatedEngine, TextArgs};
    use montage_edit_model::{Color, FilterType};

    fn editor() -> (SimulatedEngine, Editor) {
        let engine = SimulatedEngine::new();
        let editor = Editor::open(EngineRuntime::new(engine.clone()), "test").unwrap();
        (engine, editor)
    }

    #[test]
    fn test_accepted_clip_is_recorded_once() {
        let (engine, mut editor) = editor();
        let mut clip = VideoClip::new("a.mp4", 10.0, 4.0);
        clip.start_secs = 2.0;
        editor.add_video_clip(clip).unwrap();
        assert_eq!(editor.project().item_count(), 1);
        assert_eq!(
            engine.timelines()[0].video_clips,
            vec![MediaArgs {
                path: "a.mp4".into(),
                start_secs: 2.0,
                duration_secs: 10.0,
                position_secs: 4.0,
            }]
        );
    }

    #[test]
    fn test_rejected_item_is_not_recorded() {
        let (engine, mut editor) = editor();
        engine.fail_next_command(2, "file not found");
        let err = editor
            .add_audio_track(AudioTrack::new("missing.mp3", 5.0, 0.0))
            .unwrap_err();
        assert!(matches!(
            err,
            MontageError::OperationFailed { code: 2, ref message, .. } if message == "file not found"
        ));
        assert_eq!(editor.project().item_count(), 0);
    }

    #[test]
    fn test_append_places_clips_back_to_back() {
        let (_engine, mut editor) = editor();
        editor.append_video_clip("a.mp4", 4.0).unwrap();
        editor.append_video_clip("b.mp4", 6.0).unwrap();
        let positions: Vec<f64> = editor
            .project()
            .video_clips
            .iter()
            .map(|c| c.position_secs)
            .collect();
        assert_eq!(positions, vec![0.0, 4.0]);
    }

    #[test]
    fn test_load_project_replays_items_and_filter() {
        let mut source = EditProject::new("source");
        source.video_clips.push(VideoClip::new("a.mp4", 10.0, 0.0));
        source
            .text_overlays
            .push(TextOverlay::new("Title", 0.0, 3.0).with_color(Color::rgb(255, 0, 0)));
        source.filter = Some(FilterSpec::new(FilterType::Brightness, 1.5));
        source.export.fps = 24;

        let engine = SimulatedEngine::new();
        let editor = Editor::from_project(EngineRuntime::new(engine.clone()), &source).unwrap();

        assert_eq!(editor.project().item_count(), 2);
        assert_eq!(editor.project().export.fps, 24);
        assert!(engine.calls().contains(&EngineCall::AddTextOverlay(TextArgs {
            text: "Title".into(),
            position_secs: 0.0,
            duration_secs: 3.0,
            x: 100,
            y: 100,
            font_size: 24,
            color: "#FF0000".into(),
        })));
        assert!(engine.calls().contains(&EngineCall::ApplyFilter {
            filter_type: 2,
            value: 1.5,
        }));
    }

    #[test]
    fn test_commands_after_session_close_are_disposed() {
        let (_engine, mut editor) = editor();
        editor.session().close();
        let err = editor
            .apply_filter(FilterSpec::new(FilterType::Grayscale, 1.0))
            .unwrap_err();
        assert!(matches!(err, MontageError::Disposed));
        assert!(editor.project().filter.is_none());
    }
}
