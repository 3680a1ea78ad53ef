#![forbid(unsafe_code)]
//! End-to-end broker scenario: a single client receives 1000 back-to-back
//! fan-out sends, in order, each a valid 96-byte record, matching the
//! "broker echo test" scenario.

use std::sync::Arc;
use std::time::Duration;

use rocketcan_core::broker::{Broker, BrokerConfig, LogLevel, RecvCallback};
use rocketcan_core::transport::{Client, RecvTimeout, SocketKind};
use rocketcan_core::wire::{self, WIRE_SIZE};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn thousand_back_to_back_sends_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let broker = Broker::new();
    let noop: RecvCallback = Arc::new(|_, _| true);

    broker
        .start(
            BrokerConfig {
                listen: "127.0.0.1:0".to_string(),
                sock_type: SocketKind::Tcp,
                mtu: 1500,
                log_level: LogLevel::None,
                log_dir: dir.path().to_path_buf(),
            },
            noop,
        )
        .await
        .unwrap();
    let port = broker.port().await.unwrap();

    let mut client = Client::connect(&format!("127.0.0.1:{port}")).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let reader = tokio::spawn(async move {
        let mut received = Vec::with_capacity(1000);
        for _ in 0u32..1000 {
            let record = client.recv(RecvTimeout::Millis(2000)).await.unwrap();
            received.push(record);
        }
        (client, received)
    });

    // Fan-out blocks on the per-client channel, so back-to-back sends never
    // outrun the reader's draining task: a full channel backpressures the
    // send rather than dropping the record.
    for seq in 0u32..1000 {
        let mut bytes = [0u8; WIRE_SIZE];
        bytes[0..4].copy_from_slice(&seq.to_be_bytes());
        bytes[94] = wire::ETX;
        bytes[95] = rocketcan_core::crc::calc(&bytes[0..95], None);
        broker.send(bytes).await.unwrap();
    }

    let (_client, received) = reader.await.unwrap();
    for (seq, record) in received.iter().enumerate() {
        assert!(wire::is_valid(record), "record {seq} failed CRC/ctrlchar check");
        assert_eq!(&record[0..4], &(seq as u32).to_be_bytes());
    }

    let snapshot = broker.counters().await.unwrap();
    assert_eq!(snapshot.sent, 1000);

    broker.stop().await.unwrap();
}
