//! Process handle generation

use uuid::Uuid;

/// Generate a new process identifier.
///
/// Identifiers are random (version 4) UUIDs in hyphenated lowercase form, so
/// two live records never share one in practice.
#[must_use]
pub fn new_process_id() -> String {
    Uuid::new_v4().to_string()
}

/// First segment of a process id, handy as a display prefix
#[must_use]
pub fn short_id(id: &str) -> &str {
    id.split('-').next().unwrap_or(id)
}
