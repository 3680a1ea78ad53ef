//! A simulated CAN channel standing in for the real driver the broker core
//! treats as external (spec design note). Implements the narrow surface a
//! driver needs to expose to a broker: write a frame onto the bus, read
//! frames back, and report status/busload.
//!
//! `LoopbackCan` models a CAN controller wired to itself: anything written
//! is immediately readable again, plus a periodic heartbeat frame so a
//! freshly connected client sees traffic without first sending anything.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rocketcan_core::frame::{CanFrame, Timestamp};
use tokio::task::JoinHandle;

pub struct LoopbackCan {
    tx_count: AtomicU64,
    rx_count: AtomicU64,
}

fn now() -> Timestamp {
    let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Timestamp {
        sec: since_epoch.as_secs(),
        nsec: u64::from(since_epoch.subsec_nanos()),
    }
}

impl LoopbackCan {
    pub fn new() -> Arc<Self> {
        Arc::new(LoopbackCan {
            tx_count: AtomicU64::new(0),
            rx_count: AtomicU64::new(0),
        })
    }

    /// A loopback channel never reports bus errors.
    pub fn status(&self) -> u8 {
        0
    }

    /// A loopback channel has no real bus to measure load on.
    pub fn busload(&self) -> u16 {
        0
    }

    /// "Transmits" `frame` onto the simulated bus. Because the channel
    /// loops back, the same frame is immediately handed to `on_receive` as
    /// if it had been read off the bus.
    pub fn write(&self, frame: CanFrame, on_receive: &(dyn Fn(CanFrame) + Send + Sync)) {
        self.tx_count.fetch_add(1, Ordering::Relaxed);
        self.rx_count.fetch_add(1, Ordering::Relaxed);
        on_receive(frame);
    }

    /// Spawns a task emitting an incrementing heartbeat frame (id `0x100`)
    /// on `period`, so the bus has some traffic even with no client
    /// transmitting.
    pub fn spawn_heartbeat(
        self: &Arc<Self>,
        period: Duration,
        on_receive: impl Fn(CanFrame) + Send + Sync + 'static,
    ) -> JoinHandle<()> {
        let can = self.clone();
        tokio::spawn(async move {
            let mut counter: u32 = 0;
            loop {
                tokio::time::sleep(period).await;
                let mut data = [0u8; 64];
                data[..4].copy_from_slice(&counter.to_be_bytes());
                let frame = CanFrame {
                    id: 0x100,
                    xtd: false,
                    rtr: false,
                    fdf: false,
                    brs: false,
                    esi: false,
                    sts: false,
                    dlc: 4,
                    data,
                    timestamp: now(),
                };
                can.write(frame, &on_receive);
                counter = counter.wrapping_add(1);
            }
        })
    }
}
