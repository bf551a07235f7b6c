use std::sync::{Arc, Mutex};
use std::time::Duration;

use montage_common::error::MontageError;
use montage_edit_model::VideoClip;
use montage_engine::{
    Editor, EngineCall, EngineRuntime, EngineSession, ExportOrchestrator, ExportOutcome,
    ExportRequest, ExportScript, ExportState, SimulatedEngine,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn orchestrator(script: ExportScript) -> (SimulatedEngine, ExportOrchestrator) {
    let engine = SimulatedEngine::new();
    engine.set_export_script(script);
    let session = EngineSession::open(EngineRuntime::new(engine.clone())).unwrap();
    (engine, ExportOrchestrator::new(session))
}

/// A request whose sink records every value and forwards it to `rx`.
fn recording_request() -> (ExportRequest, Arc<Mutex<Vec<u8>>>, mpsc::UnboundedReceiver<u8>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = mpsc::unbounded_channel();
    let sink_seen = seen.clone();
    let request = ExportRequest::new("out.mp4", 1280, 720, 30).with_progress(move |p| {
        sink_seen.lock().unwrap().push(p);
        let _ = tx.send(p);
    });
    (request, seen, rx)
}

fn count(calls: &[EngineCall], pred: impl Fn(&EngineCall) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_export_completes_with_full_progress() {
    let (engine, exports) = orchestrator(ExportScript::default().with_step_delay(Duration::ZERO));
    let (request, seen, _rx) = recording_request();

    let task = exports.start_export(request).unwrap();
    assert_eq!(task.wait().await, ExportOutcome::Completed);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(exports.state(), ExportState::Idle);
    assert_eq!(exports.last_outcome(), Some(ExportOutcome::Completed));
    assert!(engine.calls().contains(&EngineCall::ExportStarted {
        output_path: "out.mp4".into(),
        width: 1280,
        height: 720,
        fps: 30,
    }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_during_export_resolves_cancelled() {
    let (engine, exports) = orchestrator(ExportScript::steps([10, 30, 50]).holding_until_cancelled());
    let (request, seen, mut rx) = recording_request();

    let task = exports.start_export(request).unwrap();
    assert_eq!(exports.state(), ExportState::Exporting);
    while let Some(p) = rx.recv().await {
        if p == 50 {
            break;
        }
    }

    exports.cancel_export();
    assert_eq!(task.wait().await, ExportOutcome::Cancelled);

    assert_eq!(*seen.lock().unwrap(), vec![10, 30, 50]);
    assert_eq!(exports.state(), ExportState::Idle);
    assert!(engine.calls().contains(&EngineCall::CancelExport));
    assert!(engine
        .calls()
        .contains(&EngineCall::ExportFinished { status: 1 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_export_carries_engine_message() {
    let (_engine, exports) = orchestrator(ExportScript::steps([10]).finishing_with(7, "disk full"));
    let task = exports
        .start_export(ExportRequest::new("out.mp4", 640, 360, 24))
        .unwrap();

    let outcome = task.wait().await;
    assert_eq!(outcome, ExportOutcome::Failed("disk full".into()));
    assert!(matches!(
        outcome.into_result(),
        Err(MontageError::ExportFailed { ref message }) if message == "disk full"
    ));
    assert_eq!(exports.state(), ExportState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_second_export_is_rejected_without_engine_call() {
    let (engine, exports) = orchestrator(ExportScript::steps([5]).holding_until_cancelled());
    let (request, _seen, mut rx) = recording_request();
    let task = exports.start_export(request).unwrap();
    rx.recv().await;

    let err = exports
        .start_export(ExportRequest::new("other.mp4", 640, 360, 24))
        .unwrap_err();
    assert!(matches!(err, MontageError::EngineBusy));

    task.cancel();
    assert_eq!(task.wait().await, ExportOutcome::Cancelled);
    let started = count(&engine.calls(), |c| matches!(c, EngineCall::ExportStarted { .. }));
    assert_eq!(started, 1);
}

#[tokio::test]
async fn test_cancel_while_idle_makes_no_engine_call() {
    let (engine, exports) = orchestrator(ExportScript::default());
    engine.clear_calls();

    exports.cancel_export();

    assert_eq!(exports.state(), ExportState::Idle);
    assert!(engine.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_status_code_wins_over_cancel_request() {
    let script = ExportScript::default()
        .with_step_delay(Duration::from_millis(1))
        .ignoring_cancel();
    let (_engine, exports) = orchestrator(script);
    let (request, seen, mut rx) = recording_request();

    let task = exports.start_export(request).unwrap();
    rx.recv().await;
    exports.cancel_export();

    assert_eq!(task.wait().await, ExportOutcome::Completed);
    assert_eq!(seen.lock().unwrap().last(), Some(&100));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_external_token_cancels_export() {
    let (_engine, exports) = orchestrator(ExportScript::steps([20]).holding_until_cancelled());
    let token = CancellationToken::new();
    let (request, _seen, mut rx) = recording_request();

    let task = exports
        .start_export(request.with_cancellation(token.clone()))
        .unwrap();
    rx.recv().await;
    token.cancel();

    assert_eq!(task.wait().await, ExportOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_orchestrator_accepts_new_export_after_outcome() {
    let (engine, exports) = orchestrator(ExportScript::steps([50, 100]));
    for _ in 0..2 {
        let task = exports
            .start_export(ExportRequest::new("out.mp4", 640, 360, 24))
            .unwrap();
        assert_eq!(task.wait().await, ExportOutcome::Completed);
    }
    let finished = count(&engine.calls(), |c| matches!(c, EngineCall::ExportFinished { .. }));
    assert_eq!(finished, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_commands_during_export_are_busy() {
    let engine = SimulatedEngine::new();
    engine.set_export_script(ExportScript::steps([1]).holding_until_cancelled());
    let mut editor = Editor::open(EngineRuntime::new(engine.clone()), "busy").unwrap();

    let (request, _seen, mut rx) = recording_request();
    let task = editor.export(request).unwrap();
    rx.recv().await;

    let err = editor
        .add_video_clip(VideoClip::new("a.mp4", 10.0, 0.0))
        .unwrap_err();
    assert!(matches!(err, MontageError::EngineBusy));
    assert_eq!(editor.project().item_count(), 0);

    editor.cancel_export();
    assert_eq!(task.wait().await, ExportOutcome::Cancelled);
    editor
        .add_video_clip(VideoClip::new("a.mp4", 10.0, 0.0))
        .unwrap();
    assert_eq!(editor.project().item_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_during_export_releases_after_outcome() {
    let engine = SimulatedEngine::new();
    engine.set_export_script(ExportScript::steps([10, 30]).holding_until_cancelled());
    let editor = Editor::open(EngineRuntime::new(engine.clone()), "closing").unwrap();

    let (request, _seen, mut rx) = recording_request();
    let task = editor.export(request).unwrap();
    rx.recv().await;

    editor.close().await;

    assert!(!editor.is_open());
    assert_eq!(engine.live_timelines(), 0);
    assert_eq!(editor.last_export_outcome(), Some(ExportOutcome::Cancelled));

    let calls = engine.calls();
    let finished = calls
        .iter()
        .position(|c| matches!(c, EngineCall::ExportFinished { .. }))
        .unwrap();
    let destroyed = calls
        .iter()
        .position(|c| *c == EngineCall::DestroyTimeline)
        .unwrap();
    assert!(finished < destroyed);
    assert_eq!(task.wait().await, ExportOutcome::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_direct_session_close_cancels_running_export() {
    let engine = SimulatedEngine::new();
    engine.set_export_script(ExportScript::steps([10, 40]).holding_until_cancelled());
    let session = EngineSession::open(EngineRuntime::new(engine.clone())).unwrap();
    let exports = ExportOrchestrator::new(session.clone());

    let (request, _seen, mut rx) = recording_request();
    let task = exports.start_export(request).unwrap();
    rx.recv().await;

    let closing = tokio::task::spawn_blocking(move || session.close());

    let outcome = tokio::time::timeout(Duration::from_secs(2), task.wait())
        .await
        .expect("export did not resolve after close");
    assert_eq!(outcome, ExportOutcome::Cancelled);
    tokio::time::timeout(Duration::from_secs(2), closing)
        .await
        .expect("close did not return")
        .unwrap();

    assert_eq!(engine.live_timelines(), 0);
    let calls = engine.calls();
    assert!(calls.contains(&EngineCall::CancelExport));
    let finished = calls
        .iter()
        .position(|c| matches!(c, EngineCall::ExportFinished { .. }))
        .unwrap();
    let destroyed = calls
        .iter()
        .position(|c| *c == EngineCall::DestroyTimeline)
        .unwrap();
    assert!(finished < destroyed);
    assert_eq!(exports.state(), ExportState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_after_direct_close_returns_promptly() {
    let engine = SimulatedEngine::new();
    engine.set_export_script(ExportScript::steps([10]).holding_until_cancelled());
    let session = EngineSession::open(EngineRuntime::new(engine.clone())).unwrap();
    let exports = ExportOrchestrator::new(session.clone());

    let (request, _seen, mut rx) = recording_request();
    let task = exports.start_export(request).unwrap();
    rx.recv().await;

    let closing = tokio::task::spawn_blocking(move || session.close());
    exports.cancel_export();

    let outcome = tokio::time::timeout(Duration::from_secs(2), task.wait())
        .await
        .expect("export did not resolve");
    assert_eq!(outcome, ExportOutcome::Cancelled);
    closing.await.unwrap();

    engine.clear_calls();
    exports.cancel_export();
    assert!(engine.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropping_editor_cancels_and_releases() {
    let engine = SimulatedEngine::new();
    engine.set_export_script(ExportScript::steps([10]).holding_until_cancelled());
    let editor = Editor::open(EngineRuntime::new(engine.clone()), "dropped").unwrap();

    let (request, _seen, mut rx) = recording_request();
    let task = editor.export(request).unwrap();
    rx.recv().await;

    drop(editor);
    assert_eq!(task.wait().await, ExportOutcome::Cancelled);
    assert_eq!(engine.live_timelines(), 0);
    assert!(!engine.is_initialized());
}

#[tokio::test]
async fn test_export_after_close_is_disposed() {
    let engine = SimulatedEngine::new();
    let editor = Editor::open(EngineRuntime::new(engine.clone()), "closed").unwrap();
    editor.close().await;

    let err = editor.export_to("out.mp4").unwrap_err();
    assert!(matches!(err, MontageError::Disposed));
    assert!(!engine
        .calls()
        .iter()
        .any(|c| matches!(c, EngineCall::ExportStarted { .. })));
}
