//! npm-style version constraints
//!
//! Applications declare versions the way npm does (`4.x`, `>=4 <6`,
//! `1.2.3 - 2.3.4`, `4 || 6`). The `semver` crate speaks Cargo's dialect,
//! where a bare `4.1.1` means `^4.1.1` and comparators are comma separated,
//! so each alternative is rewritten into a Cargo requirement before parsing.

use crate::error::{NodepackError, NodepackResult};
use semver::{Version, VersionReq};
use std::fmt;

const OPERATOR_CHARS: [char; 5] = ['<', '>', '=', '~', '^'];

/// A parsed version constraint that remembers its literal spelling
#[derive(Debug, Clone)]
pub struct Constraint {
    raw: String,
    alternatives: Vec<VersionReq>,
    exact: bool,
}

impl Constraint {
    /// Parse an npm range for the given component
    pub fn parse(component: &str, raw: &str) -> NodepackResult<Self> {
        let invalid = |reason: String| NodepackError::InvalidConstraint {
            component: component.to_string(),
            constraint: raw.to_string(),
            reason,
        };

        let mut alternatives = Vec::new();
        let mut exact = false;

        let parts: Vec<&str> = raw.split("||").map(str::trim).collect();
        for part in &parts {
            let comparators = normalize_alternative(part).map_err(invalid)?;
            if comparators.is_empty() {
                alternatives.push(VersionReq::STAR);
                continue;
            }

            if parts.len() == 1 && comparators.len() == 1 {
                exact = is_exact_comparator(&comparators[0]);
            }

            let req = VersionReq::parse(&comparators.join(", "))
                .map_err(|e| invalid(e.to_string()))?;
            alternatives.push(req);
        }

        Ok(Self {
            raw: raw.to_string(),
            alternatives,
            exact,
        })
    }

    /// The constraint exactly as the application wrote it
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the constraint pins a single full version
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Whether `version` satisfies any alternative
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|req| req.matches(version))
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Rewrite one `||` alternative into Cargo-style comparators.
/// An empty result means "any version".
fn normalize_alternative(alt: &str) -> Result<Vec<String>, String> {
    if alt.is_empty() || alt == "latest" {
        return Ok(Vec::new());
    }

    // npm allows "> = 4" style spacing; glue bare operators to their operand
    let mut tokens: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in alt.split_whitespace() {
        if token.chars().all(|c| OPERATOR_CHARS.contains(&c)) {
            pending_op.push_str(token);
            continue;
        }
        tokens.push(format!("{pending_op}{token}"));
        pending_op.clear();
    }
    if !pending_op.is_empty() {
        return Err(format!("dangling operator '{pending_op}'"));
    }

    // Hyphen range: "1.2.3 - 2.3.4"
    if tokens.len() == 3 && tokens[1] == "-" {
        let low = normalize_comparator(&format!(">={}", tokens[0]))?;
        let high = normalize_comparator(&format!("<={}", tokens[2]))?;
        return Ok(low.into_iter().chain(high).collect());
    }

    let mut comparators = Vec::new();
    for token in &tokens {
        if let Some(comparator) = normalize_comparator(token)? {
            comparators.push(comparator);
        }
    }
    Ok(comparators)
}

/// Normalize one comparator. Returns `None` for a pure wildcard.
fn normalize_comparator(token: &str) -> Result<Option<String>, String> {
    let split = token
        .find(|c: char| !OPERATOR_CHARS.contains(&c))
        .unwrap_or(token.len());
    let (op, rest) = token.split_at(split);
    let rest = rest.strip_prefix('v').unwrap_or(rest);
    if rest.is_empty() {
        return Err(format!("missing version after '{op}'"));
    }

    let core_end = rest.find(['-', '+']).unwrap_or(rest.len());
    let (core, suffix) = rest.split_at(core_end);

    let mut fields = Vec::new();
    for field in core.split('.') {
        if matches!(field, "x" | "X" | "*") {
            break;
        }
        fields.push(field);
    }
    if fields.is_empty() {
        return Ok(None);
    }

    // Pre-release and build metadata only make sense on a full version
    let suffix = if fields.len() == 3 { suffix } else { "" };
    let op = match op {
        "" => "=",
        // npm reads "~>" as tilde
        "~>" => "~",
        other => other,
    };
    Ok(Some(format!("{op}{}{suffix}", fields.join("."))))
}

fn is_exact_comparator(comparator: &str) -> bool {
    let Some(version) = comparator.strip_prefix('=') else {
        return false;
    };
    Version::parse(version).is_ok()
}
