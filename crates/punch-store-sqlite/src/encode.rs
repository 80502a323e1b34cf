//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Local timestamps are stored as `YYYY-MM-DDTHH:MM:SS.fffffffff` so that
//! string order matches time order. Dates are `YYYY-MM-DD`. UUIDs are stored
//! as hyphenated lowercase strings. The policy lives in `system_config` as
//! one `"HH:MM"` / integer / text value per key.

use std::collections::HashMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use punch_core::{
  attendance::{AttendanceRecord, RosterRow},
  policy::{PolicySnapshot, Window, hhmm},
  scan::{LoggedScan, Outcome, ScanLogEntry},
  subject::{Subject, TagBinding},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── NaiveDateTime / NaiveDate ────────────────────────────────────────────────

const DT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f";
const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn encode_dt(dt: NaiveDateTime) -> String { dt.format(DT_FORMAT).to_string() }

pub fn decode_dt(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<NaiveDateTime>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Policy ───────────────────────────────────────────────────────────────────

pub const KEY_CHECKIN_START: &str = "checkin_start";
pub const KEY_CHECKIN_END: &str = "checkin_end";
pub const KEY_CHECKOUT_START: &str = "checkout_start";
pub const KEY_CHECKOUT_END: &str = "checkout_end";
pub const KEY_COOLDOWN: &str = "scan_cooldown";
pub const KEY_READER_ID: &str = "reader_id";

fn fmt_time(t: NaiveTime) -> String { t.format("%H:%M:%S").to_string() }

pub fn encode_policy(p: &PolicySnapshot) -> Vec<(&'static str, String)> {
  vec![
    (KEY_CHECKIN_START, fmt_time(p.checkin.start)),
    (KEY_CHECKIN_END, fmt_time(p.checkin.end)),
    (KEY_CHECKOUT_START, fmt_time(p.checkout.start)),
    (KEY_CHECKOUT_END, fmt_time(p.checkout.end)),
    (KEY_COOLDOWN, p.cooldown_secs.to_string()),
    (KEY_READER_ID, p.reader_id.clone()),
  ]
}

/// Rebuild a snapshot from stored key/value rows. Keys that are absent keep
/// their default value; keys that are present must parse.
pub fn decode_policy(rows: HashMap<String, String>) -> Result<PolicySnapshot> {
  let defaults = PolicySnapshot::default();

  let time = |key: &str, fallback: NaiveTime| -> Result<NaiveTime> {
    match rows.get(key) {
      None => Ok(fallback),
      Some(v) => hhmm::parse(v).ok_or_else(|| Error::InvalidConfig {
        key:   key.to_owned(),
        value: v.clone(),
      }),
    }
  };

  let cooldown_secs = match rows.get(KEY_COOLDOWN) {
    None => defaults.cooldown_secs,
    Some(v) => v.trim().parse().map_err(|_| Error::InvalidConfig {
      key:   KEY_COOLDOWN.to_owned(),
      value: v.clone(),
    })?,
  };

  Ok(PolicySnapshot {
    checkin: Window::new(
      time(KEY_CHECKIN_START, defaults.checkin.start)?,
      time(KEY_CHECKIN_END, defaults.checkin.end)?,
    ),
    checkout: Window::new(
      time(KEY_CHECKOUT_START, defaults.checkout.start)?,
      time(KEY_CHECKOUT_END, defaults.checkout.end)?,
    ),
    cooldown_secs,
    reader_id: rows.get(KEY_READER_ID).cloned().unwrap_or(defaults.reader_id),
  })
}

// ─── Raw row types ────────────────────────────────────────────────────────────

/// Raw subject row as read from the database.
pub struct RawSubject {
  pub subject_id: String,
  pub code:       String,
  pub name:       String,
  pub active:     bool,
}

impl RawSubject {
  pub fn into_subject(self) -> Result<Subject> {
    Ok(Subject {
      subject_id: decode_uuid(&self.subject_id)?,
      code:       self.code,
      name:       self.name,
      active:     self.active,
    })
  }
}

pub struct RawAttendance {
  pub subject_id:   String,
  pub date:         String,
  pub check_in_at:  Option<String>,
  pub check_out_at: Option<String>,
}

impl RawAttendance {
  pub fn into_record(self) -> Result<AttendanceRecord> {
    Ok(AttendanceRecord {
      subject_id: decode_uuid(&self.subject_id)?,
      date:       decode_date(&self.date)?,
      check_in:   decode_opt_dt(self.check_in_at)?,
      check_out:  decode_opt_dt(self.check_out_at)?,
    })
  }
}

pub struct RawScanEntry {
  pub entry_id:     String,
  pub tag:          String,
  pub subject_id:   Option<String>,
  pub observed_at:  String,
  pub reader_id:    String,
  pub outcome:      String,
  pub note:         String,
  /// Only populated by listing queries that join `subjects`.
  pub subject_name: Option<String>,
}

impl RawScanEntry {
  pub fn into_entry(self) -> Result<ScanLogEntry> { Ok(self.into_logged()?.entry) }

  pub fn into_logged(self) -> Result<LoggedScan> {
    let entry = ScanLogEntry {
      entry_id:    decode_uuid(&self.entry_id)?,
      tag:         self.tag,
      subject_id:  self.subject_id.as_deref().map(decode_uuid).transpose()?,
      observed_at: decode_dt(&self.observed_at)?,
      reader_id:   self.reader_id,
      outcome:     Outcome::parse(&self.outcome)?,
      note:        self.note,
    };
    Ok(LoggedScan { entry, subject_name: self.subject_name })
  }
}

pub struct RawTagBinding {
  pub tag:        String,
  pub subject_id: String,
  pub label:      Option<String>,
  pub active:     bool,
}

impl RawTagBinding {
  pub fn into_binding(self) -> Result<TagBinding> {
    Ok(TagBinding {
      tag:        self.tag,
      subject_id: decode_uuid(&self.subject_id)?,
      label:      self.label,
      active:     self.active,
    })
  }
}

pub struct RawRosterRow {
  pub subject:      RawSubject,
  pub check_in_at:  Option<String>,
  pub check_out_at: Option<String>,
}

impl RawRosterRow {
  /// `tags` are the subject's active tags, already sorted.
  pub fn into_row(self, date: NaiveDate, tags: Vec<String>) -> Result<RosterRow> {
    let check_in = decode_opt_dt(self.check_in_at)?;
    Ok(RosterRow {
      subject: self.subject.into_subject()?,
      tags,
      date,
      check_in,
      check_out: decode_opt_dt(self.check_out_at)?,
      status: RosterRow::presence_for(check_in),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_as_strings() {
    let a = NaiveDate::from_ymd_opt(2024, 3, 4)
      .unwrap()
      .and_hms_milli_opt(9, 0, 0, 500)
      .unwrap();
    let b = NaiveDate::from_ymd_opt(2024, 3, 4)
      .unwrap()
      .and_hms_opt(9, 0, 1)
      .unwrap();
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(a)).unwrap(), a);
  }

  #[test]
  fn missing_policy_keys_fall_back_to_defaults() {
    let mut rows = HashMap::new();
    rows.insert(KEY_COOLDOWN.to_owned(), "30".to_owned());
    rows.insert(KEY_CHECKIN_START.to_owned(), "08:00".to_owned());
    let p = decode_policy(rows).unwrap();
    assert_eq!(p.cooldown_secs, 30);
    assert_eq!(p.checkin.start, NaiveTime::from_hms_opt(8, 0, 0).unwrap());
    assert_eq!(p.checkin.end, PolicySnapshot::default().checkin.end);
    assert_eq!(p.reader_id, "MAIN_ENTRANCE");
  }

  #[test]
  fn unparsable_policy_value_is_reported() {
    let mut rows = HashMap::new();
    rows.insert(KEY_COOLDOWN.to_owned(), "ten".to_owned());
    let err = decode_policy(rows).unwrap_err();
    assert!(matches!(err, Error::InvalidConfig { key, .. } if key == KEY_COOLDOWN));
  }
}
