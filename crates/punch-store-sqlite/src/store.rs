//! [`SqliteStore`], the SQLite implementation of [`AttendanceStore`].

use std::{collections::HashMap, path::Path};

use chrono::{Local, NaiveDate};
use punch_core::{
  attendance::{AttendanceRecord, LedgerWrite, RosterRow},
  policy::PolicySnapshot,
  scan::{LoggedScan, ScanLogEntry, ScanQuery},
  store::{AttendanceStore, PurgeCounts},
  subject::{Subject, SubjectSeed},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawAttendance, RawRosterRow, RawScanEntry, RawSubject, RawTagBinding, decode_policy,
    decode_uuid, encode_date, encode_dt, encode_policy, encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An attendance store backed by a single SQLite file.
///
/// Cloning shares the inner connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run raw SQL against the store; lets tests reach directory state that
  /// has no API.
  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── Row helpers ─────────────────────────────────────────────────────────────
//
// These run inside `Connection::call`, usually on an open transaction, so
// they take already-encoded owned values.

struct EncodedWrite {
  checkin:    bool,
  subject_id: String,
  date:       String,
  at:         String,
}

impl From<&LedgerWrite> for EncodedWrite {
  fn from(w: &LedgerWrite) -> Self {
    match *w {
      LedgerWrite::Checkin { subject_id, date, at } => Self {
        checkin:    true,
        subject_id: encode_uuid(subject_id),
        date:       encode_date(date),
        at:         encode_dt(at),
      },
      LedgerWrite::Checkout { subject_id, date, at } => Self {
        checkin:    false,
        subject_id: encode_uuid(subject_id),
        date:       encode_date(date),
        at:         encode_dt(at),
      },
    }
  }
}

struct EncodedScan {
  entry_id:    String,
  tag:         String,
  subject_id:  Option<String>,
  observed_at: String,
  reader_id:   String,
  outcome:     &'static str,
  note:        String,
}

impl From<ScanLogEntry> for EncodedScan {
  fn from(e: ScanLogEntry) -> Self {
    Self {
      entry_id:    encode_uuid(e.entry_id),
      tag:         e.tag,
      subject_id:  e.subject_id.map(encode_uuid),
      observed_at: encode_dt(e.observed_at),
      reader_id:   e.reader_id,
      outcome:     e.outcome.as_str(),
      note:        e.note,
    }
  }
}

/// Apply a ledger mutation. Returns `false`, having changed nothing, when a
/// check-in is already recorded for that day.
fn write_ledger(conn: &rusqlite::Connection, w: &EncodedWrite) -> rusqlite::Result<bool> {
  let changed = if w.checkin {
    conn.execute(
      "INSERT INTO attendances (subject_id, date, check_in_at) VALUES (?1, ?2, ?3)
       ON CONFLICT (subject_id, date) DO UPDATE SET check_in_at = excluded.check_in_at
       WHERE attendances.check_in_at IS NULL",
      rusqlite::params![w.subject_id, w.date, w.at],
    )?
  } else {
    conn.execute(
      "INSERT INTO attendances (subject_id, date, check_out_at) VALUES (?1, ?2, ?3)
       ON CONFLICT (subject_id, date) DO UPDATE SET check_out_at = excluded.check_out_at",
      rusqlite::params![w.subject_id, w.date, w.at],
    )?
  };
  Ok(changed > 0)
}

fn insert_scan(conn: &rusqlite::Connection, s: &EncodedScan) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO scan_log (entry_id, tag, subject_id, observed_at, reader_id, outcome, note)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      s.entry_id,
      s.tag,
      s.subject_id,
      s.observed_at,
      s.reader_id,
      s.outcome,
      s.note,
    ],
  )?;
  Ok(())
}

fn query_attendance(
  conn:       &rusqlite::Connection,
  subject_id: &str,
  date:       &str,
) -> rusqlite::Result<Option<RawAttendance>> {
  conn
    .query_row(
      "SELECT subject_id, date, check_in_at, check_out_at
       FROM attendances WHERE subject_id = ?1 AND date = ?2",
      rusqlite::params![subject_id, date],
      |row| {
        Ok(RawAttendance {
          subject_id:   row.get(0)?,
          date:         row.get(1)?,
          check_in_at:  row.get(2)?,
          check_out_at: row.get(3)?,
        })
      },
    )
    .optional()
}

fn raw_subject(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawSubject> {
  Ok(RawSubject {
    subject_id: row.get(0)?,
    code:       row.get(1)?,
    name:       row.get(2)?,
    active:     row.get(3)?,
  })
}

fn raw_scan(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawScanEntry> {
  Ok(RawScanEntry {
    entry_id:     row.get(0)?,
    tag:          row.get(1)?,
    subject_id:   row.get(2)?,
    observed_at:  row.get(3)?,
    reader_id:    row.get(4)?,
    outcome:      row.get(5)?,
    note:         row.get(6)?,
    subject_name: row.get(7)?,
  })
}

fn now_str() -> String { encode_dt(Local::now().naive_local()) }

// ─── AttendanceStore impl ────────────────────────────────────────────────────

impl AttendanceStore for SqliteStore {
  type Error = Error;

  // ── Identity ──────────────────────────────────────────────────────────────

  async fn resolve_tag(&self, tag: &str) -> Result<Option<Subject>> {
    let tag = tag.to_owned();

    let raw: Option<RawSubject> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT s.subject_id, s.code, s.name, s.active
               FROM tag_bindings t
               JOIN subjects s ON s.subject_id = t.subject_id
               WHERE t.tag = ?1 AND t.active = 1 AND s.active = 1",
              rusqlite::params![tag],
              raw_subject,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSubject::into_subject).transpose()
  }

  async fn list_subjects(&self) -> Result<Vec<Subject>> {
    let raws: Vec<RawSubject> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT subject_id, code, name, active FROM subjects
           WHERE active = 1 ORDER BY name",
        )?;
        let rows = stmt
          .query_map([], raw_subject)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSubject::into_subject).collect()
  }

  async fn seed_subject(&self, seed: SubjectSeed) -> Result<Subject> {
    let code = seed.code.trim().to_owned();
    let name = seed.name.trim().to_owned();
    if code.is_empty() {
      return Err(Error::InvalidSeed("subject code must not be empty".into()));
    }
    // Scanned tags are trimmed before lookup, so stored ones must be too.
    let tags: Vec<String> = seed
      .tags
      .iter()
      .map(|t| t.trim())
      .filter(|t| !t.is_empty())
      .map(str::to_owned)
      .collect();
    let new_id = encode_uuid(Uuid::new_v4());
    let now    = now_str();

    let raw: RawSubject = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT OR IGNORE INTO subjects (subject_id, code, name, active, created_at)
           VALUES (?1, ?2, ?3, 1, ?4)",
          rusqlite::params![new_id, code, name, now],
        )?;
        let subject = tx.query_row(
          "SELECT subject_id, code, name, active FROM subjects WHERE code = ?1",
          rusqlite::params![code],
          raw_subject,
        )?;
        for tag in &tags {
          let inserted = tx.execute(
            "INSERT OR IGNORE INTO tag_bindings (tag, subject_id, label, active, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            rusqlite::params![tag, subject.subject_id, format!("Tag of {}", subject.name), now],
          )?;
          if inserted == 0 {
            tracing::debug!(tag = %tag, code = %subject.code, "tag already bound, leaving as is");
          }
        }
        tx.commit()?;
        Ok(subject)
      })
      .await?;

    raw.into_subject()
  }

  // ── Ledger ────────────────────────────────────────────────────────────────

  async fn get_attendance(
    &self,
    subject_id: Uuid,
    date:       NaiveDate,
  ) -> Result<Option<AttendanceRecord>> {
    let id_str   = encode_uuid(subject_id);
    let date_str = encode_date(date);

    let raw = self
      .conn
      .call(move |conn| Ok(query_attendance(conn, &id_str, &date_str)?))
      .await?;

    raw.map(RawAttendance::into_record).transpose()
  }

  async fn apply_ledger_write(&self, write: LedgerWrite) -> Result<AttendanceRecord> {
    let enc = EncodedWrite::from(&write);

    let (applied, raw) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let applied = write_ledger(&tx, &enc)?;
        let raw = query_attendance(&tx, &enc.subject_id, &enc.date)?;
        if applied {
          tx.commit()?;
        }
        Ok((applied, raw))
      })
      .await?;

    if !applied {
      return Err(checkin_conflict(&write));
    }
    match raw {
      Some(raw) => raw.into_record(),
      None => Err(Error::Database(rusqlite::Error::QueryReturnedNoRows.into())),
    }
  }

  async fn roster(&self, date: NaiveDate) -> Result<Vec<RosterRow>> {
    let date_str = encode_date(date);

    let (raws, raw_bindings): (Vec<RawRosterRow>, Vec<RawTagBinding>) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.subject_id, s.code, s.name, s.active, a.check_in_at, a.check_out_at
           FROM subjects s
           LEFT JOIN attendances a ON a.subject_id = s.subject_id AND a.date = ?1
           WHERE s.active = 1
           ORDER BY s.name",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![date_str], |row| {
            Ok(RawRosterRow {
              subject:      raw_subject(row)?,
              check_in_at:  row.get(4)?,
              check_out_at: row.get(5)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
          "SELECT tag, subject_id, label, active FROM tag_bindings
           WHERE active = 1 ORDER BY tag",
        )?;
        let bindings = stmt
          .query_map([], |row| {
            Ok(RawTagBinding {
              tag:        row.get(0)?,
              subject_id: row.get(1)?,
              label:      row.get(2)?,
              active:     row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok((rows, bindings))
      })
      .await?;

    let mut tags: HashMap<Uuid, Vec<String>> = HashMap::new();
    for raw in raw_bindings {
      let binding = raw.into_binding()?;
      tags.entry(binding.subject_id).or_default().push(binding.tag);
    }

    raws
      .into_iter()
      .map(|r| {
        let id = decode_uuid(&r.subject.subject_id)?;
        r.into_row(date, tags.remove(&id).unwrap_or_default())
      })
      .collect()
  }

  // ── Scan log ──────────────────────────────────────────────────────────────

  async fn append_scan(&self, entry: ScanLogEntry) -> Result<()> {
    let enc = EncodedScan::from(entry);
    self
      .conn
      .call(move |conn| Ok(insert_scan(conn, &enc)?))
      .await?;
    Ok(())
  }

  async fn most_recent_scan(&self, tag: &str) -> Result<Option<ScanLogEntry>> {
    let tag = tag.to_owned();

    let raw: Option<RawScanEntry> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT entry_id, tag, subject_id, observed_at, reader_id, outcome, note, NULL
               FROM scan_log WHERE tag = ?1
               ORDER BY observed_at DESC, seq DESC
               LIMIT 1",
              rusqlite::params![tag],
              raw_scan,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawScanEntry::into_entry).transpose()
  }

  async fn recent_scans(&self, query: &ScanQuery) -> Result<Vec<LoggedScan>> {
    let tag        = query.tag.clone();
    let limit_val  = query.limit.unwrap_or(100) as i64;
    let offset_val = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawScanEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT l.entry_id, l.tag, l.subject_id, l.observed_at, l.reader_id,
                  l.outcome, l.note, s.name
           FROM scan_log l
           LEFT JOIN subjects s ON s.subject_id = l.subject_id
           WHERE (?1 IS NULL OR l.tag = ?1)
           ORDER BY l.observed_at DESC, l.seq DESC
           LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![tag, limit_val, offset_val], raw_scan)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawScanEntry::into_logged).collect()
  }

  // ── Decisions ─────────────────────────────────────────────────────────────

  async fn record_decision(
    &self,
    entry: ScanLogEntry,
    write: Option<LedgerWrite>,
  ) -> Result<()> {
    let enc_write = write.as_ref().map(EncodedWrite::from);
    let enc_scan  = EncodedScan::from(entry);

    let committed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if let Some(w) = &enc_write
          && !write_ledger(&tx, w)?
        {
          // Dropping `tx` rolls back.
          return Ok(false);
        }
        insert_scan(&tx, &enc_scan)?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    match (committed, write) {
      (false, Some(w)) => Err(checkin_conflict(&w)),
      _ => Ok(()),
    }
  }

  // ── Policy persistence ────────────────────────────────────────────────────

  async fn load_policy(&self) -> Result<Option<PolicySnapshot>> {
    let rows: Vec<(String, String)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT config_key, config_value FROM system_config")?;
        let rows = stmt
          .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    if rows.is_empty() {
      return Ok(None);
    }
    let rows: HashMap<String, String> = rows.into_iter().collect();
    decode_policy(rows).map(Some)
  }

  async fn save_policy(&self, policy: &PolicySnapshot) -> Result<()> {
    policy.validate()?;
    let pairs = encode_policy(policy);
    let now   = now_str();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for (key, value) in &pairs {
          tx.execute(
            "INSERT INTO system_config (config_key, config_value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (config_key) DO UPDATE
               SET config_value = excluded.config_value,
                   updated_at   = excluded.updated_at",
            rusqlite::params![key, value, now],
          )?;
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Administration ────────────────────────────────────────────────────────

  async fn purge_day(&self, date: NaiveDate) -> Result<PurgeCounts> {
    let date_str = encode_date(date);

    let counts = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let attendance = tx.execute(
          "DELETE FROM attendances WHERE date = ?1",
          rusqlite::params![date_str],
        )?;
        let scans = tx.execute(
          "DELETE FROM scan_log WHERE substr(observed_at, 1, 10) = ?1",
          rusqlite::params![date_str],
        )?;
        tx.commit()?;
        Ok(PurgeCounts { attendance, scans })
      })
      .await?;

    tracing::info!(%date, attendance = counts.attendance, scans = counts.scans, "purged day");
    Ok(counts)
  }
}

fn checkin_conflict(write: &LedgerWrite) -> Error {
  match *write {
    LedgerWrite::Checkin { subject_id, date, .. } | LedgerWrite::Checkout { subject_id, date, .. } => {
      Error::CheckinAlreadyRecorded { subject_id, date }
    }
  }
}
