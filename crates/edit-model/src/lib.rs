//! Montage Edit Model
//!
//! Defines the plain data records that make up an edit:
//! - **Items:** Video clips, audio tracks, and text overlays placed on the timeline
//! - **Filters:** The global filter applied to the rendered output
//! - **Project:** The edit document with its export settings
//!
//! Items are value records. Sending one to the engine copies it; the engine
//! keeps its own representation and the copy held here is informational.
//! All positions and durations are in seconds.

pub mod color;
pub mod item;
pub mod project;

pub use color::*;
pub use item::*;
pub use project::*;
