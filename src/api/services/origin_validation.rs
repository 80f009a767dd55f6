//! Validation of caller-supplied origin lists.

use super::error::CorsError;
use crate::models::ValidatedOrigin;
use std::collections::HashSet;

/// Validate every origin, failing on the first malformed one.
///
/// Duplicates within the list collapse to their first occurrence, so the
/// result keeps the caller's order.
pub fn validate_origins<S: AsRef<str>>(origins: &[S]) -> Result<Vec<ValidatedOrigin>, CorsError> {
    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(origins.len());

    for origin in origins {
        let origin = ValidatedOrigin::parse(origin.as_ref())?;
        if seen.insert(origin.clone()) {
            validated.push(origin);
        }
    }

    Ok(validated)
}
