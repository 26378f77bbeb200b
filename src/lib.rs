//! nodepack - Node.js buildpack staging
//!
//! Resolves the Node.js runtime and package manager an application asks for
//! against a versioned catalog, installs them from a shared content-addressed
//! cache, and installs only the dependencies the application did not vendor.

pub mod cache;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod stage;
pub mod ui;

pub use error::{NodepackError, NodepackResult};
