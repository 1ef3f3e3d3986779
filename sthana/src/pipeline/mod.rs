//! Positioning pipeline.
//!
//! Devices move through idle → dirty → locating → idle:
//! - Ingestion marks a device dirty when one of its links moves
//! - Each tick swaps out the dirty set, evaluates every scenario of each
//!   dirty device in parallel against a consistent link snapshot
//! - The best moved scenario is smoothed and reported
//!
//! A device whose scenarios did not move keeps its last report.

mod dirty;
mod locate;
mod worker;

pub use dirty::DirtySet;
pub use locate::{Outcome, locate_device, run_tick, select_best};
pub use worker::PipelineWorker;
