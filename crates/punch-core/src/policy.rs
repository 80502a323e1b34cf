//! Time-of-day policy: check-in/check-out windows and the scan cooldown.
//!
//! A [`PolicySnapshot`] is immutable. Reloading swaps the whole snapshot in a
//! [`PolicyStore`]; a decision keeps whichever snapshot it loaded first.

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Windows ─────────────────────────────────────────────────────────────────

/// A time-of-day interval, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
  #[serde(with = "hhmm")]
  pub start: NaiveTime,
  #[serde(with = "hhmm")]
  pub end:   NaiveTime,
}

impl Window {
  pub fn new(start: NaiveTime, end: NaiveTime) -> Self { Self { start, end } }

  /// Build a window from whole hours and minutes. Returns `None` for
  /// out-of-range values.
  pub fn hm(start: (u32, u32), end: (u32, u32)) -> Option<Self> {
    Some(Self {
      start: NaiveTime::from_hms_opt(start.0, start.1, 0)?,
      end:   NaiveTime::from_hms_opt(end.0, end.1, 0)?,
    })
  }

  pub fn contains(&self, t: NaiveTime) -> bool { self.start <= t && t <= self.end }

  pub fn overlaps(&self, other: &Window) -> bool {
    self.start <= other.end && other.start <= self.end
  }
}

/// Where a timestamp falls relative to the policy windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
  InCheckinWindow,
  InCheckoutWindow,
  OutsideWindows,
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The active policy values, read once per decision.
///
/// Fields missing on input take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySnapshot {
  pub checkin:       Window,
  pub checkout:      Window,
  /// Minimum seconds between two scans of the same tag.
  pub cooldown_secs: u64,
  /// Reader id written to the scan log when a scan carries none.
  pub reader_id:     String,
}

impl Default for PolicySnapshot {
  fn default() -> Self {
    Self {
      checkin:       Window::new(hm(8, 45), hm(9, 15)),
      checkout:      Window::new(hm(17, 45), hm(18, 15)),
      cooldown_secs: 10,
      reader_id:     "MAIN_ENTRANCE".to_owned(),
    }
  }
}

impl PolicySnapshot {
  pub fn cooldown(&self) -> TimeDelta {
    i64::try_from(self.cooldown_secs)
      .ok()
      .and_then(TimeDelta::try_seconds)
      .unwrap_or(TimeDelta::MAX)
  }

  /// Classify the time of day of `at`.
  ///
  /// The check-in window is tested first, so a timestamp inside both
  /// windows of a misconfigured (overlapping) policy counts as check-in.
  pub fn classify(&self, at: NaiveDateTime) -> Classification {
    let t = at.time();
    if self.checkin.contains(t) {
      Classification::InCheckinWindow
    } else if self.checkout.contains(t) {
      Classification::InCheckoutWindow
    } else {
      Classification::OutsideWindows
    }
  }

  /// Configuration-time checks. Overlap is allowed here; callers decide
  /// whether to warn about it via [`Self::windows_overlap`].
  pub fn validate(&self) -> Result<()> {
    for (name, w) in [("checkin", &self.checkin), ("checkout", &self.checkout)] {
      if w.start > w.end {
        return Err(Error::InvalidPolicy(format!(
          "{name} window starts after it ends ({} > {})",
          w.start.format("%H:%M"),
          w.end.format("%H:%M"),
        )));
      }
    }
    if self.reader_id.trim().is_empty() {
      return Err(Error::InvalidPolicy("reader_id must not be empty".into()));
    }
    Ok(())
  }

  pub fn windows_overlap(&self) -> bool { self.checkin.overlaps(&self.checkout) }
}

fn hm(h: u32, m: u32) -> NaiveTime {
  NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

// ─── Cooldown ────────────────────────────────────────────────────────────────

/// Whether a scan at `now` falls within `cooldown` of the previous scan of
/// the same tag.
///
/// The distance is taken in absolute value: a wall clock stepped backwards
/// suppresses only scans within `cooldown` of the last one, instead of every
/// scan until the clock catches up.
pub fn within_cooldown(last: NaiveDateTime, now: NaiveDateTime, cooldown: TimeDelta) -> bool {
  (now - last).abs() < cooldown
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// Holds the current [`PolicySnapshot`] behind an atomic reference swap.
pub struct PolicyStore {
  current: ArcSwap<PolicySnapshot>,
}

impl PolicyStore {
  pub fn new(initial: PolicySnapshot) -> Result<Self> {
    initial.validate()?;
    warn_on_overlap(&initial);
    Ok(Self { current: ArcSwap::from_pointee(initial) })
  }

  /// The latest loaded snapshot.
  pub fn current(&self) -> Arc<PolicySnapshot> { self.current.load_full() }

  /// Validate `next` and make it current. On error the previous snapshot
  /// stays active.
  pub fn replace(&self, next: PolicySnapshot) -> Result<Arc<PolicySnapshot>> {
    next.validate()?;
    warn_on_overlap(&next);
    let next = Arc::new(next);
    self.current.store(Arc::clone(&next));
    tracing::info!(
      checkin = %fmt_window(&next.checkin),
      checkout = %fmt_window(&next.checkout),
      cooldown_secs = next.cooldown_secs,
      reader_id = %next.reader_id,
      "policy reloaded"
    );
    Ok(next)
  }
}

impl Default for PolicyStore {
  fn default() -> Self {
    Self { current: ArcSwap::from_pointee(PolicySnapshot::default()) }
  }
}

fn warn_on_overlap(p: &PolicySnapshot) {
  if p.windows_overlap() {
    tracing::warn!(
      checkin = %fmt_window(&p.checkin),
      checkout = %fmt_window(&p.checkout),
      "check-in and check-out windows overlap; overlapping scans count as check-in"
    );
  }
}

fn fmt_window(w: &Window) -> String {
  format!("{}-{}", w.start.format("%H:%M"), w.end.format("%H:%M"))
}

// ─── "HH:MM" serde ───────────────────────────────────────────────────────────

/// Times of day as `"HH:MM"`, with `"HH:MM:SS"` accepted on input.
pub mod hhmm {
  use chrono::{NaiveTime, Timelike as _};
  use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

  pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
    let text = if t.second() == 0 {
      t.format("%H:%M").to_string()
    } else {
      t.format("%H:%M:%S").to_string()
    };
    s.serialize_str(&text)
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
    let raw = String::deserialize(d)?;
    parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid time of day {raw:?}, expected HH:MM")))
  }

  pub fn parse(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
      .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
      .ok()
  }
}
