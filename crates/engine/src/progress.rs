//! Progress handoff from the engine thread to the caller.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

/// Receives raw progress values from the engine and forwards them without
/// blocking.
///
/// Values are clamped to `[0, 100]`. A value that does not exceed the last
/// forwarded one is dropped, so the receiver only ever sees a strictly
/// increasing sequence.
#[derive(Debug, Clone)]
pub struct ProgressRelay {
    inner: Arc<RelayInner>,
}

#[derive(Debug)]
struct RelayInner {
    last: AtomicI32,
    tx: mpsc::UnboundedSender<u8>,
}

impl ProgressRelay {
    /// Create a relay and the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<u8>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let relay = Self {
            inner: Arc::new(RelayInner {
                last: AtomicI32::new(-1),
                tx,
            }),
        };
        (relay, rx)
    }

    /// Called by the engine. Never blocks.
    pub fn report(&self, raw: i32) {
        let value = raw.clamp(0, 100);
        let previous = self.inner.last.fetch_max(value, Ordering::AcqRel);
        if value > previous {
            // The receiver is gone once the export outcome is resolved.
            let _ = self.inner.tx.send(value as u8);
        }
    }

    /// Highest value forwarded so far.
    pub fn last(&self) -> Option<u8> {
        match self.inner.last.load(Ordering::Acquire) {
            v if v < 0 => None,
            v => Some(v as u8),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<u8>) -> Vec<u8> {
        let mut out = vec![];
        while let Ok(v) = rx.try_recv() {
            out.push(v);
        }
        out
    }

    #[test]
    fn test_forwards_increasing_values() {
        let (relay, mut rx) = ProgressRelay::channel();
        for v in [0, 10, 30, 50] {
            relay.report(v);
        }
        assert_eq!(drain(&mut rx), vec![0, 10, 30, 50]);
        assert_eq!(relay.last(), Some(50));
    }

    #[test]
    fn test_drops_regressions_and_repeats() {
        let (relay, mut rx) = ProgressRelay::channel();
        for v in [10, 10, 5, 20, 15, 20] {
            relay.report(v);
        }
        assert_eq!(drain(&mut rx), vec![10, 20]);
    }

    #[test]
    fn test_clamps_out_of_range() {
        let (relay, mut rx) = ProgressRelay::channel();
        relay.report(-7);
        relay.report(250);
        assert_eq!(drain(&mut rx), vec![0, 100]);
    }

    #[test]
    fn test_report_after_receiver_dropped_is_silent() {
        let (relay, rx) = ProgressRelay::channel();
        drop(rx);
        relay.report(40);
        assert_eq!(relay.last(), Some(40));
    }

    proptest! {
        #[test]
        fn prop_forwarded_sequence_is_bounded_and_increasing(
            values in proptest::collection::vec(-1000i32..1000, 0..200)
        ) {
            let (relay, mut rx) = ProgressRelay::channel();
            for v in &values {
                relay.report(*v);
            }
            let seen = drain(&mut rx);
            prop_assert!(seen.iter().all(|v| *v <= 100));
            prop_assert!(seen.windows(2).all(|w| w[0] < w[1]));
            if let Some(max) = values.iter().max() {
                prop_assert_eq!(seen.last().copied(), Some((*max).clamp(0, 100) as u8));
            }
        }
    }
}
