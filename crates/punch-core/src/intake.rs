//! Bounded queue between scan producers and the single decision loop.
//!
//! Producers (the reader adapter, the HTTP scan endpoint) hold a cloneable
//! [`ScanQueue`]. Exactly one consumer drains the [`ScanReceiver`] via
//! [`DecisionEngine::run`](crate::engine::DecisionEngine::run), so decisions
//! happen strictly in arrival order.

use tokio::sync::{mpsc, oneshot};

use crate::{Error, Result, engine::Decision, scan::Scan};

type Reply = oneshot::Sender<Result<Decision>>;

/// A scan waiting for a decision, optionally with someone awaiting it.
pub struct ScanRequest {
  scan:  Scan,
  reply: Option<Reply>,
}

impl ScanRequest {
  pub fn scan(&self) -> &Scan { &self.scan }

  /// Hand the decision (or failure) back to whoever submitted the scan.
  /// A submitter that stopped waiting is ignored.
  pub fn respond(self, result: Result<Decision>) {
    if let Some(reply) = self.reply {
      let _ = reply.send(result);
    }
  }
}

/// Producer side of the intake queue.
#[derive(Clone)]
pub struct ScanQueue {
  tx: mpsc::Sender<ScanRequest>,
}

/// Consumer side of the intake queue.
pub struct ScanReceiver {
  rx: mpsc::Receiver<ScanRequest>,
}

/// Create a queue holding at most `capacity` undecided scans.
pub fn channel(capacity: usize) -> (ScanQueue, ScanReceiver) {
  let (tx, rx) = mpsc::channel(capacity.max(1));
  (ScanQueue { tx }, ScanReceiver { rx })
}

impl ScanQueue {
  /// Enqueue without waiting for the decision. Waits for queue space.
  pub async fn submit(&self, scan: Scan) -> Result<()> {
    self
      .tx
      .send(ScanRequest { scan, reply: None })
      .await
      .map_err(|_| Error::QueueClosed)
  }

  /// Enqueue and wait for the decision loop to decide this scan.
  pub async fn submit_and_wait(&self, scan: Scan) -> Result<Decision> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(ScanRequest { scan, reply: Some(reply) })
      .await
      .map_err(|_| Error::QueueClosed)?;
    rx.await.map_err(|_| Error::QueueClosed)?
  }

  pub fn is_closed(&self) -> bool { self.tx.is_closed() }
}

impl ScanReceiver {
  /// Next scan in arrival order; `None` once every producer is gone.
  pub async fn recv(&mut self) -> Option<ScanRequest> { self.rx.recv().await }
}
