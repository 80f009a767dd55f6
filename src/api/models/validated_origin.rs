//! Syntactically validated origin strings.

use serde::Serialize;
use std::fmt;
use thiserror::Error;
use url::Url;

/// Reasons an origin string is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OriginValidationError {
    #[error("Origin must not be blank")]
    Blank,
    #[error("Origin {origin} is malformed: {reason}")]
    Malformed { origin: String, reason: String },
}

/// An origin of the form `scheme://host[:port]`.
///
/// The stored value is the ASCII serialization of the parsed origin: scheme
/// and host lowercased, default port and trailing `/` dropped. Spellings of
/// the same origin therefore compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ValidatedOrigin(String);

impl ValidatedOrigin {
    pub fn parse(origin: &str) -> Result<Self, OriginValidationError> {
        let trimmed = origin.trim();
        if trimmed.is_empty() {
            return Err(OriginValidationError::Blank);
        }

        let malformed = |reason: &str| OriginValidationError::Malformed {
            origin: trimmed.to_string(),
            reason: reason.to_string(),
        };

        if trimmed.chars().any(char::is_whitespace) {
            return Err(malformed("contains whitespace"));
        }

        let url = Url::parse(trimmed).map_err(|e| malformed(&e.to_string()))?;

        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(malformed("missing host")),
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(malformed("credentials are not allowed"));
        }
        if !matches!(url.path(), "" | "/") {
            return Err(malformed("path is not allowed"));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(malformed("query and fragment are not allowed"));
        }

        let origin = url.origin();
        if !origin.is_tuple() {
            return Err(malformed("scheme has no web origin"));
        }

        Ok(Self(origin.ascii_serialization()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ValidatedOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ValidatedOrigin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
