//! Broker Core: the lifecycle state machine, the accept loop, and the
//! fan-out send that ties the transport endpoint to client connections.
//!
//! The accept loop and per-client tasks are grounded on
//! `tcp::handler::TcpHandler::run`'s `tokio::select!` pattern: one task
//! accepting, one pair of tasks per connection, a `watch` channel for
//! shutdown. This replaces the original `select()` + `pthread_mutex_t` +
//! `fd_set` worker with an equivalent reactor-based design (spec design
//! note): each client gets its own registered "send half" instead of a
//! shared descriptor set under one mutex. Fan-out itself still blocks on
//! each client's send in turn, exactly as the original single-threaded
//! worker did, so ordering and backpressure match spec.md §4.5.3.

pub mod counters;
pub mod registry;
pub mod session_log;

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{Result, RocketCanError};
use crate::transport::{Listener, SocketKind};
use crate::wire::{self, WIRE_SIZE};

pub use counters::{CounterSnapshot, Counters};
pub use registry::{ClientId, Registry};
pub use session_log::{LogLevel, SessionLog};

/// Invoked once per record received from any client, with the id of the
/// client it came from. Generalizes the original `ipc_event_cbk_t` function
/// pointer (`(buf, n, ref) -> rc`) into a Rust closure the broker can clone
/// across client tasks; the returned `bool` stands in for `rc >= 0` and
/// `false` counts as a lost record, mirroring `ipc_server.c`'s
/// `lost_pkg++` on a negative callback return.
pub type RecvCallback = Arc<dyn Fn(ClientId, [u8; WIRE_SIZE]) -> bool + Send + Sync>;

/// Parameters a [`Broker`] is started with.
pub struct BrokerConfig {
    /// `host:port` to listen on.
    pub listen: String,
    pub sock_type: SocketKind,
    pub mtu: usize,
    pub log_level: LogLevel,
    /// Directory the session log (`ipc_<port>.log`) is written into.
    pub log_dir: PathBuf,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        BrokerConfig {
            listen: "0.0.0.0:0".to_string(),
            sock_type: SocketKind::Tcp,
            mtu: crate::transport::address::MAX_MTU_SIZE,
            log_level: LogLevel::Info,
            log_dir: PathBuf::from("."),
        }
    }
}

struct Running {
    registry: Arc<Registry>,
    counters: Arc<Counters>,
    log: Arc<SessionLog>,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
    /// Reader/writer task pairs spawned per client, joined in `stop` so the
    /// final counter snapshot is taken only once every task has exited.
    client_tasks: Arc<StdMutex<Vec<JoinHandle<()>>>>,
    port: u16,
    started_at: Instant,
}

/// The broker's `Stopped` / `Running` state machine.
///
/// `start` fails with [`RocketCanError::AlreadyRunning`] if already
/// running; `send` and `stop` fail with [`RocketCanError::NotRunning`] if
/// not.
pub struct Broker {
    state: Mutex<Option<Running>>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        Broker {
            state: Mutex::new(None),
        }
    }

    /// Binds the listener, opens the session log and spawns the accept
    /// loop. Returns once the listener is bound and ready to accept.
    pub async fn start(&self, config: BrokerConfig, callback: RecvCallback) -> Result<()> {
        let mut guard = self.state.lock().await;
        if guard.is_some() {
            return Err(RocketCanError::AlreadyRunning);
        }

        let listener = Listener::bind(&config.listen, config.sock_type, config.mtu).await?;
        let port = listener.local_addr()?.port();
        let log = Arc::new(SessionLog::open(&config.log_dir, port, config.log_level).await?);
        log.info(&format!("broker starting, listening on port {port}")).await;

        let registry = Registry::new();
        let counters = Arc::new(Counters::new());
        let client_tasks = Arc::new(StdMutex::new(Vec::new()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let accept_task = tokio::spawn(accept_loop(
            listener,
            registry.clone(),
            counters.clone(),
            log.clone(),
            callback,
            client_tasks.clone(),
            shutdown_rx,
        ));

        *guard = Some(Running {
            registry,
            counters,
            log,
            shutdown: shutdown_tx,
            accept_task,
            client_tasks,
            port,
            started_at: Instant::now(),
        });
        Ok(())
    }

    /// Fans a packed wire record out to every connected client.
    ///
    /// `sent` is incremented exactly once per call, regardless of how many
    /// clients actually received it. With zero clients connected nothing is
    /// sent, `sent` is left untouched, and the byte count is logged as lost.
    ///
    /// The broker-wide state lock is held only long enough to confirm the
    /// broker is running and clone out its `Arc` handles — never across the
    /// fan-out's blocking per-client sends — so one stalled client can delay
    /// only the next `send`/`stop` call waiting on the fan-out itself, not
    /// every other broker operation. This mirrors `ipc_server_send`, which
    /// holds its mutex only to snapshot the client fd set before sending.
    pub async fn send(&self, bytes: [u8; WIRE_SIZE]) -> Result<()> {
        let (registry, counters, log) = {
            let guard = self.state.lock().await;
            let running = guard.as_ref().ok_or(RocketCanError::NotRunning)?;
            (running.registry.clone(), running.counters.clone(), running.log.clone())
        };

        let targets = registry.len();
        if registry.is_empty() {
            log.info(&format!("lost {WIRE_SIZE} bytes: no clients connected")).await;
            return Ok(());
        }

        let delivered = registry.fan_out(Bytes::copy_from_slice(&bytes)).await;
        counters.record_sent();
        log.data(&format!("sent to {delivered}/{targets} clients"), &bytes)
            .await;
        if delivered < targets {
            log.info(&format!(
                "{} client(s) could not accept the record",
                targets - delivered
            ))
            .await;
        }
        Ok(())
    }

    /// Stops the broker: broadcasts the canonical abort record, tears down
    /// the accept loop, and appends the session summary (counters and
    /// elapsed time) to the log before closing it.
    pub async fn stop(&self) -> Result<()> {
        let running = {
            let mut guard = self.state.lock().await;
            guard.take().ok_or(RocketCanError::NotRunning)?
        };

        running
            .registry
            .fan_out(Bytes::copy_from_slice(&wire::make_abort()))
            .await;
        let _ = running.shutdown.send(true);
        running.accept_task.abort();
        let _ = running.accept_task.await;

        let client_tasks = std::mem::take(&mut *running.client_tasks.lock().unwrap());
        for task in client_tasks {
            let _ = task.await;
        }

        let elapsed = running.started_at.elapsed();
        running.log.summary(running.counters.snapshot(), elapsed).await;
        running.log.info("broker stopped").await;
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.state.lock().await.is_some()
    }

    /// The bound port, if running. Useful when `listen` asked for port 0.
    pub async fn port(&self) -> Option<u16> {
        self.state.lock().await.as_ref().map(|r| r.port)
    }

    /// A snapshot of the traffic counters, if running.
    pub async fn counters(&self) -> Option<CounterSnapshot> {
        self.state.lock().await.as_ref().map(|r| r.counters.snapshot())
    }
}

async fn accept_loop(
    listener: Listener,
    registry: Arc<Registry>,
    counters: Arc<Counters>,
    log: Arc<SessionLog>,
    callback: RecvCallback,
    client_tasks: Arc<StdMutex<Vec<JoinHandle<()>>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, addr)) => {
                        log.info(&format!("client connected: {addr}")).await;
                        spawn_client(
                            stream,
                            registry.clone(),
                            counters.clone(),
                            log.clone(),
                            callback.clone(),
                            client_tasks.clone(),
                            shutdown.clone(),
                        );
                    }
                    Err(err) => {
                        log.info(&format!("accept error: {err}")).await;
                    }
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }
    }
}

/// Spawns the reader/writer task pair for one accepted client and records
/// both `JoinHandle`s in `client_tasks` so `Broker::stop` can join them
/// before taking its final counter snapshot.
fn spawn_client(
    stream: TcpStream,
    registry: Arc<Registry>,
    counters: Arc<Counters>,
    log: Arc<SessionLog>,
    callback: RecvCallback,
    client_tasks: Arc<StdMutex<Vec<JoinHandle<()>>>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<Bytes>(32);
    let guard = registry.insert(tx);
    let id = guard.id();

    let writer_task = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    // The writer task above exits once `rx` closes, which happens as soon
    // as `guard` (held by this task) drops and deregisters `tx`. So only
    // this reader needs to watch for shutdown directly.
    let reader_task = tokio::spawn(async move {
        let _guard = guard;
        let mut buf = [0u8; WIRE_SIZE];
        loop {
            tokio::select! {
                result = reader.read_exact(&mut buf) => {
                    match result {
                        Ok(_) => {
                            counters.record_received();
                            log.data(&format!("received from client {id}"), &buf).await;
                            if !callback(id, buf) {
                                counters.record_lost();
                                log.info(&format!("receive callback rejected a record from client {id}"))
                                    .await;
                            }
                        }
                        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
                            log.info(&format!("client {id} disconnected")).await;
                            break;
                        }
                        Err(err) => {
                            log.info(&format!("client {id} read error: {err}")).await;
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    break;
                }
            }
        }
    });

    let mut tasks = client_tasks.lock().unwrap();
    tasks.push(writer_task);
    tasks.push(reader_task);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::transport::Client;

    fn test_config(port: &str, dir: &std::path::Path) -> BrokerConfig {
        BrokerConfig {
            listen: port.to_string(),
            sock_type: SocketKind::Tcp,
            mtu: 1500,
            log_level: LogLevel::Data,
            log_dir: dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn start_twice_is_already_running() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let noop: RecvCallback = Arc::new(|_, _| true);
        broker
            .start(test_config("127.0.0.1:0", dir.path()), noop.clone())
            .await
            .unwrap();

        let err = broker
            .start(test_config("127.0.0.1:0", dir.path()), noop)
            .await
            .unwrap_err();
        assert!(matches!(err, RocketCanError::AlreadyRunning));
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn send_before_start_is_not_running() {
        let broker = Broker::new();
        let err = broker.send([0u8; WIRE_SIZE]).await.unwrap_err();
        assert!(matches!(err, RocketCanError::NotRunning));
    }

    #[tokio::test]
    async fn send_with_zero_clients_is_lost_not_sent() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let noop: RecvCallback = Arc::new(|_, _| true);
        broker
            .start(test_config("127.0.0.1:0", dir.path()), noop)
            .await
            .unwrap();

        broker.send([0u8; WIRE_SIZE]).await.unwrap();
        let snapshot = broker.counters().await.unwrap();
        assert_eq!(snapshot.sent, 0);
        assert_eq!(snapshot.lost, 0);
        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn fans_out_to_connected_client_and_receives_back() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let received_clone = received.clone();
        let callback: RecvCallback = Arc::new(move |_, bytes| {
            received_clone.lock().unwrap().push(bytes);
            true
        });

        broker
            .start(test_config("127.0.0.1:0", dir.path()), callback)
            .await
            .unwrap();
        let port = broker.port().await.unwrap();

        let mut client = Client::connect(&format!("127.0.0.1:{port}")).await.unwrap();
        // give the accept loop a moment to register the new client
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        broker.send([7u8; WIRE_SIZE]).await.unwrap();
        let from_broker = client
            .recv(crate::transport::RecvTimeout::Millis(500))
            .await
            .unwrap();
        assert_eq!(from_broker, [7u8; WIRE_SIZE]);

        client.send(&[9u8; WIRE_SIZE]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(received.lock().unwrap().as_slice(), [[9u8; WIRE_SIZE]]);

        let snapshot = broker.counters().await.unwrap();
        assert_eq!(snapshot.sent, 1);
        assert_eq!(snapshot.received, 1);

        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn worker_survives_abrupt_client_disconnect() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let callback: RecvCallback = Arc::new(move |_, _| {
            calls_clone.fetch_add(1, Ordering::Relaxed);
            true
        });

        broker
            .start(test_config("127.0.0.1:0", dir.path()), callback)
            .await
            .unwrap();
        let port = broker.port().await.unwrap();

        let client = Client::connect(&format!("127.0.0.1:{port}")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        drop(client);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // the broker must still accept a fresh connection after the abrupt drop
        let mut second = Client::connect(&format!("127.0.0.1:{port}")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        broker.send([3u8; WIRE_SIZE]).await.unwrap();
        let got = second
            .recv(crate::transport::RecvTimeout::Millis(500))
            .await
            .unwrap();
        assert_eq!(got, [3u8; WIRE_SIZE]);

        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn callback_rejection_increments_lost_once() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let callback: RecvCallback = Arc::new(|_, _| false);

        broker
            .start(test_config("127.0.0.1:0", dir.path()), callback)
            .await
            .unwrap();
        let port = broker.port().await.unwrap();

        let mut client = Client::connect(&format!("127.0.0.1:{port}")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        client.send(&[1u8; WIRE_SIZE]).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let snapshot = broker.counters().await.unwrap();
        assert_eq!(snapshot.received, 1);
        assert_eq!(snapshot.lost, 1);

        broker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn two_clients_each_receive_one_copy_and_one_dropping_does_not_stop_the_other() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Broker::new();
        let noop: RecvCallback = Arc::new(|_, _| true);

        broker
            .start(test_config("127.0.0.1:0", dir.path()), noop)
            .await
            .unwrap();
        let port = broker.port().await.unwrap();

        let mut client_a = Client::connect(&format!("127.0.0.1:{port}")).await.unwrap();
        let mut client_b = Client::connect(&format!("127.0.0.1:{port}")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        broker.send([1u8; WIRE_SIZE]).await.unwrap();
        let got_a = client_a
            .recv(crate::transport::RecvTimeout::Millis(500))
            .await
            .unwrap();
        let got_b = client_b
            .recv(crate::transport::RecvTimeout::Millis(500))
            .await
            .unwrap();
        assert_eq!(got_a, [1u8; WIRE_SIZE]);
        assert_eq!(got_b, [1u8; WIRE_SIZE]);

        drop(client_a);
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        broker.send([2u8; WIRE_SIZE]).await.unwrap();
        let got_b2 = client_b
            .recv(crate::transport::RecvTimeout::Millis(500))
            .await
            .unwrap();
        assert_eq!(got_b2, [2u8; WIRE_SIZE]);

        broker.stop().await.unwrap();
    }
}
