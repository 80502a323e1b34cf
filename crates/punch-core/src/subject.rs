//! Subjects and the tag bindings that identify them.
//!
//! Both are owned by the identity directory. The engine only ever reads them
//! through [`AttendanceStore::resolve_tag`](crate::store::AttendanceStore::resolve_tag).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tracked person whose attendance is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
  pub subject_id: Uuid,
  /// Human-facing unique code, e.g. an employee number.
  pub code:       String,
  /// Display name used in notifications and the roster.
  pub name:       String,
  pub active:     bool,
}

/// Association of a raw tag identifier to exactly one subject.
///
/// A tag resolves only while both the binding and its subject are active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagBinding {
  pub tag:        String,
  pub subject_id: Uuid,
  pub label:      Option<String>,
  pub active:     bool,
}

/// Bootstrap entry for the directory, read from the server configuration.
///
/// Seeding never updates an existing subject or tag; rows whose code or tag
/// already exist are left untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectSeed {
  pub code: String,
  pub name: String,
  #[serde(default)]
  pub tags: Vec<String>,
}
