//! The attendance decision engine.
//!
//! [`DecisionEngine::decide`] turns one raw [`Scan`] into exactly one
//! [`Decision`]. Each decision commits one scan log entry and at most one
//! ledger mutation in a single store call, then emits a notification if the
//! scan was accepted.

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
  Error, Result,
  attendance::{AttendanceRecord, LedgerWrite},
  intake::ScanReceiver,
  notify::{Action, Notification, NotificationSink},
  policy::{Classification, PolicySnapshot, PolicyStore, within_cooldown},
  scan::{Outcome, Scan, ScanLogEntry},
  store::AttendanceStore,
  subject::Subject,
};

// ─── Decision ────────────────────────────────────────────────────────────────

/// The engine's single output for one scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
  pub outcome:     Outcome,
  pub tag:         String,
  /// `None` only for [`Outcome::UnknownTag`].
  pub subject:     Option<Subject>,
  pub observed_at: NaiveDateTime,
  pub message:     String,
}

impl Decision {
  fn new(outcome: Outcome, scan: &Scan, subject: Option<Subject>, message: impl Into<String>) -> Self {
    Self {
      outcome,
      tag: scan.tag.clone(),
      subject,
      observed_at: scan.observed_at,
      message: message.into(),
    }
  }

  /// The notification for observers, if this decision was accepted.
  pub fn notification(&self) -> Option<Notification> {
    let action = match self.outcome {
      Outcome::AcceptedCheckin => Action::Checkin,
      Outcome::AcceptedCheckout => Action::Checkout,
      _ => return None,
    };
    let subject = self.subject.as_ref()?;
    Some(Notification {
      subject_id: subject.subject_id,
      name:       subject.name.clone(),
      action,
      time:       self.observed_at,
      message:    self.message.clone(),
    })
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct DecisionEngine<S> {
  store:  Arc<S>,
  policy: Arc<PolicyStore>,
  sink:   Arc<dyn NotificationSink>,
  /// Serialises decisions: each one reads and then writes the same ledger
  /// row, so two in flight could both see "no check-in yet".
  gate:   Mutex<()>,
}

impl<S> DecisionEngine<S>
where
  S: AttendanceStore,
{
  pub fn new(store: Arc<S>, policy: Arc<PolicyStore>, sink: Arc<dyn NotificationSink>) -> Self {
    Self { store, policy, sink, gate: Mutex::new(()) }
  }

  /// Decide, persist and notify for a single scan.
  ///
  /// Fails only with [`Error::Persistence`], in which case nothing from this
  /// scan was committed and no notification was sent.
  pub async fn decide(&self, scan: &Scan) -> Result<Decision> {
    let _gate = self.gate.lock().await;
    let policy = self.policy.current();
    let scan = Scan { tag: scan.tag.trim().to_owned(), ..scan.clone() };

    let (decision, write) = self.evaluate(&scan, &policy).await?;

    let entry = ScanLogEntry {
      entry_id:    Uuid::new_v4(),
      tag:         scan.tag.clone(),
      subject_id:  decision.subject.as_ref().map(|s| s.subject_id),
      observed_at: scan.observed_at,
      reader_id:   scan.reader_id.clone().unwrap_or_else(|| policy.reader_id.clone()),
      outcome:     decision.outcome,
      note:        decision.message.clone(),
    };
    self
      .store
      .record_decision(entry, write)
      .await
      .map_err(Error::persistence)?;

    if decision.outcome.is_accepted() {
      tracing::info!(
        tag = %decision.tag,
        outcome = %decision.outcome,
        subject = decision.subject.as_ref().map(|s| s.name.as_str()).unwrap_or_default(),
        at = %decision.observed_at,
        "{}", decision.message
      );
    } else {
      tracing::debug!(
        tag = %decision.tag,
        outcome = %decision.outcome,
        at = %decision.observed_at,
        "scan ignored: {}", decision.message
      );
    }

    if let Some(n) = decision.notification() {
      self.sink.publish(n);
    }

    Ok(decision)
  }

  /// Classify the scan and work out its ledger mutation, without writing
  /// anything.
  async fn evaluate(
    &self,
    scan: &Scan,
    policy: &PolicySnapshot,
  ) -> Result<(Decision, Option<LedgerWrite>)> {
    let subject = if scan.tag.is_empty() {
      None
    } else {
      self.store.resolve_tag(&scan.tag).await.map_err(Error::persistence)?
    };
    let Some(subject) = subject else {
      let msg = format!("Unknown tag: {:?}", scan.tag);
      return Ok((Decision::new(Outcome::UnknownTag, scan, None, msg), None));
    };

    let last = self
      .store
      .most_recent_scan(&scan.tag)
      .await
      .map_err(Error::persistence)?;
    if let Some(last) = last
      && within_cooldown(last.observed_at, scan.observed_at, policy.cooldown())
    {
      let d = Decision::new(
        Outcome::SuppressedRecentScan,
        scan,
        Some(subject),
        "Recent scan detected, ignoring",
      );
      return Ok((d, None));
    }

    let is_checkin = match policy.classify(scan.observed_at) {
      Classification::InCheckinWindow => true,
      Classification::InCheckoutWindow => false,
      Classification::OutsideWindows => {
        let d = Decision::new(
          Outcome::RejectedOutsideHours,
          scan,
          Some(subject),
          "Scan outside valid hours",
        );
        return Ok((d, None));
      }
    };

    let date = scan.observed_at.date();
    let today = self
      .store
      .get_attendance(subject.subject_id, date)
      .await
      .map_err(Error::persistence)?;
    let checked_in = today.as_ref().is_some_and(AttendanceRecord::has_checked_in);
    let checked_out = today.as_ref().is_some_and(AttendanceRecord::has_checked_out);
    let subject_id = subject.subject_id;
    let at = scan.observed_at;

    let (outcome, message, write) = match (is_checkin, checked_in) {
      (true, true) => (Outcome::RejectedAlreadyCheckedIn, "Already checked in today", None),
      (true, false) => (
        Outcome::AcceptedCheckin,
        "Check-in recorded successfully",
        Some(LedgerWrite::Checkin { subject_id, date, at }),
      ),
      (false, false) => (Outcome::RejectedNoCheckinYet, "No check-in found for today", None),
      (false, true) => (
        Outcome::AcceptedCheckout,
        if checked_out {
          "Check-out time updated to latest scan"
        } else {
          "Check-out recorded successfully"
        },
        Some(LedgerWrite::Checkout { subject_id, date, at }),
      ),
    };
    Ok((Decision::new(outcome, scan, Some(subject), message), write))
  }

  /// Consume scans until every producer has gone away.
  ///
  /// A persistence failure is logged and handed back to the submitter, if
  /// one is waiting; the loop then moves on. Retrying is the producer's call.
  pub async fn run(&self, mut intake: ScanReceiver) {
    tracing::info!("decision loop started");
    while let Some(request) = intake.recv().await {
      let result = self.decide(request.scan()).await;
      if let Err(e) = &result {
        tracing::error!(tag = %request.scan().tag, error = %e, "scan decision failed");
      }
      request.respond(result);
    }
    tracing::info!("scan intake closed, decision loop exiting");
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn alice() -> Subject {
    Subject {
      subject_id: Uuid::new_v4(),
      code:       "EMP001".into(),
      name:       "Alice".into(),
      active:     true,
    }
  }

  fn scan() -> Scan {
    let at = NaiveDate::from_ymd_opt(2024, 3, 4)
      .unwrap()
      .and_hms_opt(17, 50, 0)
      .unwrap();
    Scan::new("ABCD0286", at)
  }

  #[test]
  fn accepted_decision_carries_a_notification() {
    let subject = alice();
    let d = Decision::new(
      Outcome::AcceptedCheckout,
      &scan(),
      Some(subject.clone()),
      "Check-out recorded successfully",
    );
    let n = d.notification().unwrap();
    assert_eq!(n.subject_id, subject.subject_id);
    assert_eq!(n.name, "Alice");
    assert_eq!(n.action, Action::Checkout);
    assert_eq!(n.time, d.observed_at);
    assert_eq!(n.message, d.message);
  }

  #[test]
  fn rejected_decisions_notify_nobody() {
    for outcome in [
      Outcome::SuppressedRecentScan,
      Outcome::RejectedOutsideHours,
      Outcome::RejectedAlreadyCheckedIn,
      Outcome::RejectedNoCheckinYet,
    ] {
      let d = Decision::new(outcome, &scan(), Some(alice()), "nope");
      assert!(d.notification().is_none(), "{outcome} should not notify");
    }
    let unknown = Decision::new(Outcome::UnknownTag, &scan(), None, "Unknown tag");
    assert!(unknown.notification().is_none());
  }
}
