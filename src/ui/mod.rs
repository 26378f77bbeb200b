//! Buildpack log output
//!
//! Staging output follows the buildpack log convention: `-----> ` for step
//! headers and a seven-space indent for everything under a step. Colors are
//! only used on an interactive terminal.
//!
//! # Example
//!
//! ```rust,ignore
//! use nodepack::ui::{self, UiContext};
//!
//! let ctx = UiContext::detect();
//! for event in &result.events {
//!     ui::event(&ctx, event);
//! }
//! ```

mod context;
mod output;

pub use context::UiContext;
pub use output::{
    event, format_event, header, info, key_value, step_ok, step_warn_hint, warning,
};
