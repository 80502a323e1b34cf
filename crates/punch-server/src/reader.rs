//! Line-oriented reader adapter.
//!
//! Stands in for the hardware link: one tag identifier per line, from a
//! device node, a pipe or stdin. Each line is stamped with the local wall
//! clock on arrival and queued for the decision loop.

use punch_core::{intake::ScanQueue, reader::ReaderStatus, scan::Scan};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, BufReader};

#[derive(Debug, Error)]
pub enum ReaderError {
  #[error("reader i/o error: {0}")]
  Io(#[from] std::io::Error),

  #[error(transparent)]
  Intake(#[from] punch_core::Error),
}

/// Run the reader on `device`, reporting its state through `status`.
pub async fn run(device: &str, queue: &ScanQueue, status: &ReaderStatus) {
  status.started(device);
  match run_device(device, queue, None).await {
    Ok(_) => status.stopped(None),
    Err(e) => {
      tracing::error!(%device, "reader stopped: {e}");
      status.stopped(Some(e.to_string()));
    }
  }
}

/// Read `device` (`-` for stdin) until end of input. Returns the number of
/// scans submitted.
pub async fn run_device(
  device:    &str,
  queue:     &ScanQueue,
  reader_id: Option<&str>,
) -> Result<usize, ReaderError> {
  tracing::info!(%device, "reader started");
  let submitted = if device == "-" {
    pump_lines(BufReader::new(tokio::io::stdin()), queue, reader_id).await?
  } else {
    let file = tokio::fs::File::open(device).await?;
    pump_lines(BufReader::new(file), queue, reader_id).await?
  };
  tracing::info!(%device, submitted, "reader reached end of input");
  Ok(submitted)
}

/// Submit one scan per non-blank line of `input`, in order.
pub async fn pump_lines<R>(
  input:     R,
  queue:     &ScanQueue,
  reader_id: Option<&str>,
) -> Result<usize, ReaderError>
where
  R: AsyncBufRead + Unpin,
{
  let mut lines = input.lines();
  let mut submitted = 0;
  while let Some(line) = lines.next_line().await? {
    let tag = line.trim();
    if tag.is_empty() {
      continue;
    }
    tracing::debug!(%tag, "tag read");
    let mut scan = Scan::now(tag);
    scan.reader_id = reader_id.map(str::to_owned);
    queue.submit(scan).await?;
    submitted += 1;
  }
  Ok(submitted)
}
