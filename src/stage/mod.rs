//! Staging orchestration
//!
//! Drives one application build: runtime resolution and installation,
//! dependency reconciliation, and the environment bindings handed to later
//! buildpacks. Everything observable is reported as [`StagingEvent`]s so the
//! caller decides how to render them.

pub mod build_cache;
pub mod env;
pub mod events;
pub mod extract;
pub mod orchestrator;

pub use env::EnvBindings;
pub use events::{EventLevel, StagingEvent, StagingFailure, StagingStep};
pub use orchestrator::{Orchestrator, StageDirs, StagingResult};
