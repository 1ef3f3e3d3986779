//! Report thread: position reports out as JSON lines.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use sthana::PositionReport;

use crate::error::Result;

const RECV_TIMEOUT: Duration = Duration::from_millis(200);

/// Writes each report as one JSON line, flushing per report.
pub struct ReportThread<W: Write> {
    writer: W,
    reports: Receiver<PositionReport>,
    running: Arc<AtomicBool>,
    written: u64,
}

impl<W: Write> ReportThread<W> {
    pub fn new(writer: W, reports: Receiver<PositionReport>, running: Arc<AtomicBool>) -> Self {
        Self {
            writer,
            reports,
            running,
            written: 0,
        }
    }

    /// Run until shutdown or until every sender is gone. Returns reports written.
    pub fn run(&mut self) -> Result<u64> {
        while self.running.load(Ordering::Relaxed) {
            match self.reports.recv_timeout(RECV_TIMEOUT) {
                Ok(report) => self.write(&report)?,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        // Drain whatever the pipeline produced before stopping
        while let Ok(report) = self.reports.try_recv() {
            self.write(&report)?;
        }
        log::debug!("Report thread exiting after {} reports", self.written);
        Ok(self.written)
    }

    fn write(&mut self, report: &PositionReport) -> Result<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }
}
