//! Attendance ledger types.
//!
//! The ledger holds one row per (subject, calendar day). The check-in is set
//! at most once; the check-out is overwritten by every later accepted scan,
//! so it always reads as the day's last checkout.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::subject::Subject;

/// One subject's attendance for one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
  pub subject_id: Uuid,
  pub date:       NaiveDate,
  pub check_in:   Option<NaiveDateTime>,
  pub check_out:  Option<NaiveDateTime>,
}

impl AttendanceRecord {
  pub fn has_checked_in(&self) -> bool { self.check_in.is_some() }

  pub fn has_checked_out(&self) -> bool { self.check_out.is_some() }
}

/// The single ledger mutation a decision may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerWrite {
  /// Create the day's row if needed and set its check-in. Fails if the day
  /// already has one.
  Checkin {
    subject_id: Uuid,
    date:       NaiveDate,
    at:         NaiveDateTime,
  },
  /// Set or overwrite the day's check-out.
  Checkout {
    subject_id: Uuid,
    date:       NaiveDate,
    at:         NaiveDateTime,
  },
}

// ─── Read model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
  Present,
  Absent,
}

/// A subject together with its attendance for a given day. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterRow {
  pub subject:   Subject,
  /// Active tags bound to the subject.
  pub tags:      Vec<String>,
  pub date:      NaiveDate,
  pub check_in:  Option<NaiveDateTime>,
  pub check_out: Option<NaiveDateTime>,
  pub status:    Presence,
}

impl RosterRow {
  pub fn presence_for(check_in: Option<NaiveDateTime>) -> Presence {
    if check_in.is_some() { Presence::Present } else { Presence::Absent }
  }
}
