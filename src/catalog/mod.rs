//! Versioned artifact catalog and version resolution
//!
//! The catalog lists every runtime and package-manager artifact the
//! buildpack can install, with its download locator and sha256 checksum.
//! It is loaded once per staging run and never mutated afterwards.
//!
//! Resolution picks the highest catalog version satisfying an npm-style
//! range (`4.x`, `^6.0.0`, `>=4 <6`), falling back to the catalog's
//! designated default when the application declares nothing.

pub mod constraint;
pub mod manifest;
pub mod resolve;

pub use constraint::Constraint;
pub use manifest::{Catalog, CatalogEntry, ComponentKind, CATALOG_FILE};
pub use resolve::{resolve, Provenance, ResolvedVersion};
