//! Resource keys
//!
//! Work items and cache entries are addressed by `namespace/name` strings
//! (just `name` for cluster-scoped objects).

use kube::Resource;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("object has no name")]
    MissingName,

    #[error("unexpected key format: {0:?}")]
    Malformed(String),
}

/// Build a key from its parts
pub fn key_for(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(ns) if !ns.is_empty() => format!("{}/{}", ns, name),
        _ => name.to_string(),
    }
}

/// Compute the key of an object from its metadata
pub fn object_key<K: Resource>(obj: &K) -> Result<String, KeyError> {
    let meta = obj.meta();
    let name = meta
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or(KeyError::MissingName)?;
    Ok(key_for(meta.namespace.as_deref(), name))
}

/// Split a key into `(namespace, name)`
///
/// Cluster-scoped keys yield an empty namespace.
pub fn split_key(key: &str) -> Result<(&str, &str), KeyError> {
    let mut parts = key.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) if !name.is_empty() => Ok(("", name)),
        (Some(ns), Some(name), None) if !name.is_empty() => Ok((ns, name)),
        _ => Err(KeyError::Malformed(key.to_string())),
    }
}
