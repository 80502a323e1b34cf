//! Raw scans, decision outcomes and the append-only scan log.

use std::str::FromStr as _;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Input ───────────────────────────────────────────────────────────────────

/// A single read of a tag by the hardware reader.
///
/// `observed_at` is local wall-clock time: its date selects the ledger row and
/// its time of day is compared against the policy windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scan {
  pub tag:         String,
  pub observed_at: NaiveDateTime,
  /// Reader that produced the scan; falls back to the policy's reader id.
  #[serde(default)]
  pub reader_id:   Option<String>,
}

impl Scan {
  pub fn new(tag: impl Into<String>, observed_at: NaiveDateTime) -> Self {
    Self { tag: tag.into(), observed_at, reader_id: None }
  }

  /// Stamp `tag` with the current local time.
  pub fn now(tag: impl Into<String>) -> Self {
    Self::new(tag, Local::now().naive_local())
  }

  pub fn with_reader(mut self, reader_id: impl Into<String>) -> Self {
    self.reader_id = Some(reader_id.into());
    self
  }
}

// ─── Outcome ─────────────────────────────────────────────────────────────────

/// The closed set of decision outcomes.
///
/// The string form is what lands in the scan log, so it must stay stable.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
  UnknownTag,
  SuppressedRecentScan,
  RejectedOutsideHours,
  RejectedAlreadyCheckedIn,
  RejectedNoCheckinYet,
  #[serde(rename = "checkin")]
  #[strum(serialize = "checkin")]
  AcceptedCheckin,
  #[serde(rename = "checkout")]
  #[strum(serialize = "checkout")]
  AcceptedCheckout,
}

impl Outcome {
  pub fn as_str(self) -> &'static str { self.into() }

  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownOutcome(s.to_owned()))
  }

  pub fn is_accepted(self) -> bool {
    matches!(self, Self::AcceptedCheckin | Self::AcceptedCheckout)
  }
}

// ─── Scan log ────────────────────────────────────────────────────────────────

/// Immutable audit record of one decision. Never updated or deleted by the
/// engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLogEntry {
  pub entry_id:    Uuid,
  pub tag:         String,
  pub subject_id:  Option<Uuid>,
  pub observed_at: NaiveDateTime,
  pub reader_id:   String,
  pub outcome:     Outcome,
  pub note:        String,
}

/// A scan log entry joined with its subject's display name, for listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedScan {
  #[serde(flatten)]
  pub entry:        ScanLogEntry,
  pub subject_name: Option<String>,
}

/// Parameters for [`AttendanceStore::recent_scans`](crate::store::AttendanceStore::recent_scans).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScanQuery {
  /// Restrict to a single tag identifier.
  pub tag:    Option<String>,
  pub limit:  Option<usize>,
  pub offset: Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn outcome_tags_are_stable() {
    assert_eq!(Outcome::AcceptedCheckin.as_str(), "checkin");
    assert_eq!(Outcome::AcceptedCheckout.as_str(), "checkout");
    assert_eq!(Outcome::UnknownTag.as_str(), "unknown_tag");
    assert_eq!(
      Outcome::RejectedNoCheckinYet.to_string(),
      "rejected_no_checkin_yet"
    );
    assert_eq!(
      serde_json::to_string(&Outcome::SuppressedRecentScan).unwrap(),
      "\"suppressed_recent_scan\""
    );
  }

  #[test]
  fn outcome_parses_its_own_tag() {
    for outcome in [
      Outcome::UnknownTag,
      Outcome::SuppressedRecentScan,
      Outcome::RejectedOutsideHours,
      Outcome::RejectedAlreadyCheckedIn,
      Outcome::RejectedNoCheckinYet,
      Outcome::AcceptedCheckin,
      Outcome::AcceptedCheckout,
    ] {
      assert_eq!(Outcome::parse(outcome.as_str()).unwrap(), outcome);
    }
  }

  #[test]
  fn unknown_outcome_tag_is_an_error() {
    let err = Outcome::parse("teleported").unwrap_err();
    assert!(matches!(err, Error::UnknownOutcome(t) if t == "teleported"));
  }

  #[test]
  fn only_checkin_and_checkout_are_accepted() {
    assert!(Outcome::AcceptedCheckin.is_accepted());
    assert!(Outcome::AcceptedCheckout.is_accepted());
    assert!(!Outcome::RejectedAlreadyCheckedIn.is_accepted());
    assert!(!Outcome::UnknownTag.is_accepted());
  }
}
