//! Set of devices waiting to be located, with a wake-up signal.

use std::collections::HashSet;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use parking_lot::Mutex;

/// Devices marked for the next pipeline tick.
///
/// Marking is cheap and never blocks; the pipeline swaps the whole set
/// out at the start of a tick.
#[derive(Debug)]
pub struct DirtySet {
    ids: Mutex<HashSet<String>>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
}

impl Default for DirtySet {
    fn default() -> Self {
        Self::new()
    }
}

impl DirtySet {
    /// Create an empty set.
    pub fn new() -> Self {
        let (wake_tx, wake_rx) = bounded(1);
        Self {
            ids: Mutex::new(HashSet::new()),
            wake_tx,
            wake_rx,
        }
    }

    /// Mark a device and wake the pipeline.
    pub fn mark(&self, device_id: &str) {
        let inserted = self.ids.lock().insert(device_id.to_string());
        if inserted {
            match self.wake_tx.try_send(()) {
                Ok(()) | Err(TrySendError::Full(())) => {}
                Err(TrySendError::Disconnected(())) => {
                    log::warn!("Pipeline wake channel closed");
                }
            }
        }
    }

    /// Swap the set out, returning the marked ids sorted.
    pub fn take(&self) -> Vec<String> {
        let ids = std::mem::take(&mut *self.ids.lock());
        let mut ids: Vec<String> = ids.into_iter().collect();
        ids.sort();
        ids
    }

    /// Number of marked devices.
    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    /// True if nothing is marked.
    pub fn is_empty(&self) -> bool {
        self.ids.lock().is_empty()
    }

    /// Block until woken or the timeout passes. Returns true if woken.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.wake_rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_swaps_out() {
        let dirty = DirtySet::new();
        dirty.mark("b");
        dirty.mark("a");
        dirty.mark("b");
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty.take(), vec!["a".to_string(), "b".to_string()]);
        assert!(dirty.is_empty());
        assert!(dirty.take().is_empty());
    }

    #[test]
    fn test_mark_wakes_waiter() {
        let dirty = DirtySet::new();
        assert!(!dirty.wait(Duration::from_millis(1)));
        dirty.mark("a");
        dirty.mark("b");
        assert!(dirty.wait(Duration::from_millis(1)));
        // The wake signal is coalesced
        assert!(!dirty.wait(Duration::from_millis(1)));
    }
}
