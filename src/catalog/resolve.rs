//! Version resolution against the catalog
//!
//! Resolution is a pure function of `(component, constraint, catalog)`:
//! no filesystem or network access happens here.

use crate::catalog::constraint::Constraint;
use crate::catalog::manifest::{Catalog, CatalogEntry};
use crate::error::{NodepackError, NodepackResult};
use std::fmt;

/// How a resolved version was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    /// The constraint named one full version
    Exact,
    /// Highest catalog version satisfying a range
    RangeMatched,
    /// No constraint declared; the catalog default was used
    DefaultFallback,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact => write!(f, "exact"),
            Self::RangeMatched => write!(f, "range-matched"),
            Self::DefaultFallback => write!(f, "default-fallback"),
        }
    }
}

/// A catalog entry chosen for a constraint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub entry: CatalogEntry,
    pub provenance: Provenance,
}

/// Resolve a component's constraint to the best catalog entry.
///
/// `None` (or a blank string) selects the catalog default for the component.
pub fn resolve(
    catalog: &Catalog,
    component: &str,
    constraint: Option<&str>,
) -> NodepackResult<ResolvedVersion> {
    let (raw, provenance) = match constraint.map(str::trim).filter(|c| !c.is_empty()) {
        Some(raw) => (raw, None),
        None => {
            let default = catalog
                .default_for(component)
                .ok_or_else(|| NodepackError::NoDefaultVersion(component.to_string()))?;
            (default, Some(Provenance::DefaultFallback))
        }
    };

    let constraint = Constraint::parse(component, raw)?;

    let entry = catalog
        .entries(component)
        .iter()
        .rev()
        .find(|entry| constraint.matches(&entry.version))
        .ok_or_else(|| NodepackError::NoMatch {
            component: component.to_string(),
            constraint: raw.to_string(),
            available: catalog.versions_display(component),
        })?;

    let provenance = provenance.unwrap_or(if constraint.is_exact() {
        Provenance::Exact
    } else {
        Provenance::RangeMatched
    });

    Ok(ResolvedVersion {
        entry: entry.clone(),
        provenance,
    })
}
