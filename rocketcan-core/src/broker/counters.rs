//! Broker-wide traffic counters.
//!
//! Grounded on the connection counting in `tcp::metrics::ConnectionCount`
//! from the reference reverse proxy: plain atomics, snapshotted under a
//! `Relaxed` load since exact ordering across counters isn't load-bearing,
//! only their eventual values in the session summary.

use std::sync::atomic::{AtomicU64, Ordering};

/// A point-in-time read of the broker's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub sent: u64,
    pub received: u64,
    pub lost: u64,
}

/// `sent` increments once per successful [`crate::broker::Broker::send`]
/// call (not once per fanned-out client); `received` increments once per
/// record read off any client socket; `lost` increments once per record
/// whose receive callback reported failure (the callback stands in for a
/// CAN driver write that can itself fail).
#[derive(Debug, Default)]
pub struct Counters {
    sent: AtomicU64,
    received: AtomicU64,
    lost: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lost(&self) {
        self.lost.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
        }
    }
}
