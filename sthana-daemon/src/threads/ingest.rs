//! Ingest thread: JSON-lines measurements into the engine.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sthana::{Error, TrackingState};

/// Reads one measurement per line until EOF or shutdown.
pub struct IngestThread<R: BufRead> {
    reader: R,
    state: Arc<TrackingState>,
    running: Arc<AtomicBool>,
    lines: u64,
    rejected: u64,
}

impl<R: BufRead> IngestThread<R> {
    pub fn new(reader: R, state: Arc<TrackingState>, running: Arc<AtomicBool>) -> Self {
        Self {
            reader,
            state,
            running,
            lines: 0,
            rejected: 0,
        }
    }

    /// Run until the input ends. Returns lines read.
    pub fn run(&mut self) -> std::io::Result<u64> {
        let mut line = String::new();
        while self.running.load(Ordering::Relaxed) {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                log::info!(
                    "Input ended after {} lines ({} rejected)",
                    self.lines,
                    self.rejected
                );
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            self.lines += 1;
            self.handle(trimmed);
        }
        Ok(self.lines)
    }

    fn handle(&mut self, line: &str) {
        let result = self.state.ingest_json(line);
        match result {
            Ok(_) => {}
            // Already logged by the engine
            Err(Error::UnknownReceiver(_)) => self.rejected += 1,
            Err(e) => {
                self.rejected += 1;
                log::warn!("Line {}: {}", self.lines, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use sthana::EngineConfig;

    #[test]
    fn test_reads_until_eof() {
        let yaml = "nodes:\n  - { id: hall, point: [0, 0, 0] }\ndevices:\n  - id: \"*\"\n";
        let state = Arc::new(TrackingState::new(EngineConfig::from_yaml(yaml).unwrap()));
        let input = concat!(
            "{\"transmitter\":\"tag\",\"receiver\":\"hall\",\"distance\":2.0,\"rssi\":-70}\n",
            "\n",
            "# comment\n",
            "not json\n",
            "{\"transmitter\":\"tag\",\"receiver\":\"attic\",\"distance\":2.0,\"rssi\":-70}\n",
        );
        let running = Arc::new(AtomicBool::new(true));
        let mut thread = IngestThread::new(Cursor::new(input), Arc::clone(&state), running);

        assert_eq!(thread.run().unwrap(), 3);
        assert_eq!(thread.rejected, 2);
        assert!(state.device("tag").is_some());
        let snapshot = state.telemetry().snapshot();
        assert_eq!(snapshot.unknown_node, 1);
        assert_eq!(snapshot.malformed, 1);
    }
}
