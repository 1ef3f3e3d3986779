//! Daemon threads.
//!
//! - Ingest thread: JSON-lines measurements from stdin or a file
//! - Report thread: position reports to stdout or a file
//! - Reload thread: config file polling and hot apply
//!
//! The engine's own pipeline and calibration threads are owned by `main`.

mod ingest;
mod output;
mod reload;

pub use ingest::IngestThread;
pub use output::ReportThread;
pub use reload::ReloadThread;
