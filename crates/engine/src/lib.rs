//! Montage Engine
//!
//! Drives an external video-editing engine through its flat call surface.
//! The engine is reached through [`EngineApi`] and every call goes through a
//! session that owns exactly one timeline.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                    Editor                     │
//! │  ┌─────────────────┐  ┌────────────────────┐  │
//! │  │ CommandDispatcher│  │ ExportOrchestrator │  │
//! │  └────────┬────────┘  └─────────┬──────────┘  │
//! │           │   ErrorReporter     │             │
//! │           ▼                     ▼             │
//! │  ┌─────────────────────────────────────────┐  │
//! │  │   EngineSession (one TimelineHandle)    │  │
//! │  └────────────────────┬────────────────────┘  │
//! └───────────────────────┼───────────────────────┘
//!                         ▼
//!          EngineRuntime (init/shutdown refcount)
//!                         ▼
//!          EngineApi: SimulatedEngine | NativeEngine
//! ```
//!
//! Mutation calls are synchronous. Export runs on a blocking worker and is
//! observed through progress callbacks and an [`ExportOutcome`].

pub mod api;
pub mod commands;
pub mod diagnostics;
pub mod editor;
pub mod export;
#[cfg(feature = "native")]
pub mod native;
pub mod progress;
pub mod runtime;
pub mod session;
pub mod simulated;

pub use api::{EngineApi, ExportParams, TimelineHandle, STATUS_CANCELLED, STATUS_OK};
pub use commands::CommandDispatcher;
pub use diagnostics::{EngineError, ErrorReporter};
pub use editor::Editor;
pub use export::{
    ExportOrchestrator, ExportOutcome, ExportRequest, ExportState, ExportTask, ProgressSink,
};
#[cfg(feature = "native")]
pub use native::NativeEngine;
pub use progress::ProgressRelay;
pub use runtime::{available_backends, open_runtime, EngineRuntime};
pub use session::EngineSession;
pub use simulated::{
    EngineCall, ExportScript, MediaArgs, SimulatedEngine, TextArgs, TimelineSnapshot,
};
