//! Reported state of the tag reader feeding the intake queue.
//!
//! The reader task writes it, HTTP handlers read it. Only the latest state is
//! kept.

use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReaderState {
  pub running:    bool,
  /// Device path, or `-` for stdin. `None` when no reader is configured.
  pub device:     Option<String>,
  /// Why the reader stopped, if it failed.
  pub last_error: Option<String>,
}

#[derive(Default)]
pub struct ReaderStatus {
  state: ArcSwap<ReaderState>,
}

impl ReaderStatus {
  pub fn current(&self) -> Arc<ReaderState> { self.state.load_full() }

  pub fn started(&self, device: &str) {
    self.state.store(Arc::new(ReaderState {
      running:    true,
      device:     Some(device.to_owned()),
      last_error: None,
    }));
  }

  /// Mark the reader stopped, keeping the device it was reading.
  pub fn stopped(&self, error: Option<String>) {
    let device = self.current().device.clone();
    self.state.store(Arc::new(ReaderState { running: false, device, last_error: error }));
  }
}
