//! Error taxonomy for the reshaping engine.
//!
//! Engine helpers return [`CoreError`] values. Table- and column-scoped
//! failures are collected into [`Diagnostics`] so a document can still load
//! or save with the offending unit skipped; only
//! [`CoreError::SchemaVersionUnrecognized`] and
//! [`CoreError::IntegrityCollision`] abort a whole document.

use std::fmt;

use log::warn;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed input at {location}: {reason}")]
    MalformedInput { location: String, reason: String },
    #[error("unrecognized LiPD version '{version}'")]
    SchemaVersionUnrecognized { version: String },
    #[error("round-trip violation at {location}: {reason}")]
    RoundTripViolation { location: String, reason: String },
    #[error("columns '{first}' and '{second}' both claim number {number} in {location}")]
    IntegrityCollision {
        location: String,
        number: usize,
        first: String,
        second: String,
    },
}

impl CoreError {
    pub fn malformed(location: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::MalformedInput {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn round_trip(location: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::RoundTripViolation {
            location: location.into(),
            reason: reason.into(),
        }
    }

    /// True for the two error kinds that must abort a whole document.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::SchemaVersionUnrecognized { .. } | CoreError::IntegrityCollision { .. }
        )
    }
}

/// Per-document report of recoverable problems.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    issues: Vec<CoreError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, issue: CoreError) {
        warn!("{issue}");
        self.issues.push(issue);
    }

    pub fn extend<I>(&mut self, issues: I)
    where
        I: IntoIterator<Item = CoreError>,
    {
        for issue in issues {
            self.push(issue);
        }
    }

    /// Takes over issues that were already logged when first recorded.
    pub fn append(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn issues(&self) -> &[CoreError] {
        &self.issues
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoreError> {
        self.issues.iter()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}
