//! Conversion between CORS URL lists and configuration resources.

use crate::models::{Attribute, Resource, ResourceAdd};
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Stable attribute key of a URL: the hex SHA-256 of its text.
pub fn url_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

pub fn url_to_attribute(url: &str) -> Attribute {
    Attribute::new(url_key(url), url)
}

/// Build a resource holding `urls`. Repeated URLs are stored once.
pub fn urls_to_resource<S: AsRef<str>>(name: &str, urls: &[S]) -> ResourceAdd {
    let mut seen = HashSet::new();
    let attributes = urls
        .iter()
        .map(|url| url.as_ref())
        .filter(|url| seen.insert(*url))
        .map(url_to_attribute)
        .collect();

    ResourceAdd {
        name: name.to_string(),
        attributes,
    }
}

pub fn resource_to_urls(resource: &Resource) -> Vec<String> {
    resource.attribute_values()
}
