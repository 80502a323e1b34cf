//! The `AttendanceStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `punch-store-sqlite`).
//! It bundles the identity resolver, the attendance ledger, the scan log and
//! policy persistence, since a decision must commit its ledger mutation and
//! its log entry together.

use std::future::Future;

use chrono::{NaiveDate, NaiveDateTime};
use uuid::Uuid;

use crate::{
  attendance::{AttendanceRecord, LedgerWrite, RosterRow},
  policy::PolicySnapshot,
  scan::{LoggedScan, ScanLogEntry, ScanQuery},
  subject::{Subject, SubjectSeed},
};

/// Rows removed by [`AttendanceStore::purge_day`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PurgeCounts {
  pub attendance: usize,
  pub scans:      usize,
}

/// Abstraction over an attendance store backend.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait AttendanceStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Identity ──────────────────────────────────────────────────────────

  /// Resolve a raw tag to its subject. `None` unless both the binding and the
  /// subject are active.
  fn resolve_tag<'a>(
    &'a self,
    tag: &'a str,
  ) -> impl Future<Output = Result<Option<Subject>, Self::Error>> + Send + 'a;

  /// Active subjects, ordered by name.
  fn list_subjects(
    &self,
  ) -> impl Future<Output = Result<Vec<Subject>, Self::Error>> + Send + '_;

  /// Insert a subject and its tags unless the code or tag already exist.
  /// Returns the stored subject.
  fn seed_subject(
    &self,
    seed: SubjectSeed,
  ) -> impl Future<Output = Result<Subject, Self::Error>> + Send + '_;

  // ── Ledger ────────────────────────────────────────────────────────────

  fn get_attendance(
    &self,
    subject_id: Uuid,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Option<AttendanceRecord>, Self::Error>> + Send + '_;

  /// Apply a single ledger mutation on its own.
  ///
  /// [`LedgerWrite::Checkin`] fails if the day already has a check-in;
  /// [`LedgerWrite::Checkout`] overwrites.
  fn apply_ledger_write(
    &self,
    write: LedgerWrite,
  ) -> impl Future<Output = Result<AttendanceRecord, Self::Error>> + Send + '_;

  fn upsert_checkin(
    &self,
    subject_id: Uuid,
    date: NaiveDate,
    at: NaiveDateTime,
  ) -> impl Future<Output = Result<AttendanceRecord, Self::Error>> + Send + '_ {
    self.apply_ledger_write(LedgerWrite::Checkin { subject_id, date, at })
  }

  fn upsert_checkout(
    &self,
    subject_id: Uuid,
    date: NaiveDate,
    at: NaiveDateTime,
  ) -> impl Future<Output = Result<AttendanceRecord, Self::Error>> + Send + '_ {
    self.apply_ledger_write(LedgerWrite::Checkout { subject_id, date, at })
  }

  /// Every active subject with its attendance for `date`.
  fn roster(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<Vec<RosterRow>, Self::Error>> + Send + '_;

  // ── Scan log ──────────────────────────────────────────────────────────

  fn append_scan(
    &self,
    entry: ScanLogEntry,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// The latest entry for `tag` by observation time, whatever its outcome.
  fn most_recent_scan<'a>(
    &'a self,
    tag: &'a str,
  ) -> impl Future<Output = Result<Option<ScanLogEntry>, Self::Error>> + Send + 'a;

  /// Entries newest first.
  fn recent_scans<'a>(
    &'a self,
    query: &'a ScanQuery,
  ) -> impl Future<Output = Result<Vec<LoggedScan>, Self::Error>> + Send + 'a;

  // ── Decisions ─────────────────────────────────────────────────────────

  /// Commit one decision: the optional ledger mutation and the log entry
  /// succeed or fail together.
  fn record_decision(
    &self,
    entry: ScanLogEntry,
    write: Option<LedgerWrite>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Policy persistence ────────────────────────────────────────────────

  fn load_policy(
    &self,
  ) -> impl Future<Output = Result<Option<PolicySnapshot>, Self::Error>> + Send + '_;

  fn save_policy<'a>(
    &'a self,
    policy: &'a PolicySnapshot,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Administration ────────────────────────────────────────────────────

  /// Delete the attendance records and scan log entries of `date`.
  fn purge_day(
    &self,
    date: NaiveDate,
  ) -> impl Future<Output = Result<PurgeCounts, Self::Error>> + Send + '_;
}
