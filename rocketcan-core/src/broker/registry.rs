//! The live client table and its fan-out send.
//!
//! Grounded on `proxy::connection::manager::ConnectionManager` and
//! `proxy::connection::guards::ConnectionGuard`: an atomic count plus a
//! `Drop` guard that deregisters a client the instant its task ends, so the
//! broker never has to poll for dead connections.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::mpsc;

pub type ClientId = u64;

/// Registered clients, keyed by id, each with its own outgoing channel.
pub struct Registry {
    next_id: AtomicU64,
    clients: Mutex<HashMap<ClientId, mpsc::Sender<Bytes>>>,
    count: AtomicUsize,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Registry {
            next_id: AtomicU64::new(1),
            clients: Mutex::new(HashMap::new()),
            count: AtomicUsize::new(0),
        })
    }

    /// Registers a new client's outgoing channel and returns a guard that
    /// deregisters it on drop.
    pub fn insert(self: &Arc<Self>, tx: mpsc::Sender<Bytes>) -> ClientGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.lock().unwrap().insert(id, tx);
        self.count.fetch_add(1, Ordering::Relaxed);
        ClientGuard {
            id,
            registry: self.clone(),
        }
    }

    fn remove(&self, id: ClientId) {
        if self.clients.lock().unwrap().remove(&id).is_some() {
            self.count.fetch_sub(1, Ordering::Relaxed);
        }
    }

    /// Number of currently registered clients.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fans `bytes` out to every registered client with a blocking send per
    /// client, matching spec.md §4.5.3's "attempt a blocking send of exactly
    /// `n` bytes" contract: a full channel (a client whose writer task can't
    /// keep up with the transport) backpressures this call rather than
    /// dropping the record, and only a closed channel (a client that has
    /// already disconnected) is skipped. The client set is snapshotted under
    /// the lock so the lock is never held across an `await`; sends then run
    /// in registration order, matching the order their `send` calls entered
    /// this critical section. Returns how many clients actually received it.
    pub async fn fan_out(&self, bytes: Bytes) -> usize {
        let targets: Vec<mpsc::Sender<Bytes>> =
            self.clients.lock().unwrap().values().cloned().collect();

        let mut delivered = 0;
        for tx in &targets {
            if tx.send(bytes.clone()).await.is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Deregisters its client from the owning [`Registry`] when dropped.
pub struct ClientGuard {
    id: ClientId,
    registry: Arc<Registry>,
}

impl ClientGuard {
    pub fn id(&self) -> ClientId {
        self.id
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_drop_tracks_count() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::channel(1);
        let guard = registry.insert(tx);
        assert_eq!(registry.len(), 1);
        drop(guard);
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn fan_out_skips_only_closed_clients() {
        let registry = Registry::new();
        let (tx_ok, mut rx_ok) = mpsc::channel(4);
        let (tx_closed, rx_closed) = mpsc::channel(4);
        drop(rx_closed);

        let _guard_ok = registry.insert(tx_ok);
        let _guard_closed = registry.insert(tx_closed);

        let delivered = registry.fan_out(Bytes::from_static(b"hello")).await;
        assert_eq!(delivered, 1);
        assert_eq!(rx_ok.try_recv().unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn fan_out_blocks_until_a_full_channel_drains() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(1);
        tx.send(Bytes::from_static(b"already queued")).await.unwrap();
        let _guard = registry.insert(tx);

        let registry_for_send = registry.clone();
        let send = tokio::spawn(async move {
            registry_for_send.fan_out(Bytes::from_static(b"second")).await
        });

        // The channel is full, so the fan-out can't have completed yet.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!send.is_finished());

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"already queued"));
        assert_eq!(send.await.unwrap(), 1);
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"second"));
    }
}
