//! Client-side transport endpoint: connect to a running broker, send and
//! receive whole 96-byte wire records.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::address;
use crate::error::{Result, RocketCanError};
use crate::wire::WIRE_SIZE;

/// How long [`Client::recv`] waits for a full record before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvTimeout {
    /// Poll once; if nothing is available yet, fail with `NoData`.
    NonBlocking,
    /// Wait up to the given duration.
    Millis(u32),
    /// Block until a record arrives, or the connection closes.
    Forever,
}

impl RecvTimeout {
    /// Maps the wire `timeout` parameter (0 = non-blocking,
    /// [`address::WAIT_FOREVER`] = forever, else milliseconds).
    pub fn from_millis_param(value: u16) -> Self {
        match value {
            0 => RecvTimeout::NonBlocking,
            address::WAIT_FOREVER => RecvTimeout::Forever,
            ms => RecvTimeout::Millis(u32::from(ms)),
        }
    }
}

/// A connected client endpoint.
pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Parses `host:port` and connects to it.
    pub async fn connect(spec: &str) -> Result<Self> {
        let (host, port) = address::parse(spec)?;
        let stream = TcpStream::connect((host.as_str(), port)).await?;
        Ok(Client { stream })
    }

    /// Sends a single already-packed wire record.
    pub async fn send(&mut self, bytes: &[u8; WIRE_SIZE]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Receives a single wire record, honoring `how`.
    ///
    /// A connection closed mid-record is a [`RocketCanError::BadMessage`];
    /// an empty read under [`RecvTimeout::NonBlocking`] or an elapsed
    /// [`RecvTimeout::Millis`] is [`RocketCanError::NoData`].
    pub async fn recv(&mut self, how: RecvTimeout) -> Result<[u8; WIRE_SIZE]> {
        let mut buf = [0u8; WIRE_SIZE];
        match how {
            RecvTimeout::Forever => {
                read_whole_record(&mut self.stream, &mut buf).await?;
            }
            RecvTimeout::Millis(ms) => {
                timeout(Duration::from_millis(u64::from(ms)), read_whole_record(&mut self.stream, &mut buf))
                    .await
                    .map_err(|_| RocketCanError::NoData)??;
            }
            RecvTimeout::NonBlocking => {
                match timeout(Duration::from_millis(0), read_whole_record(&mut self.stream, &mut buf)).await {
                    Ok(inner) => inner?,
                    Err(_) => return Err(RocketCanError::NoData),
                }
            }
        }
        Ok(buf)
    }
}

/// Reads exactly `buf.len()` bytes, tracking how many actually arrived so a
/// connection closed mid-record reports the true short count rather than 0.
async fn read_whole_record(stream: &mut TcpStream, buf: &mut [u8]) -> Result<()> {
    let mut got = 0;
    while got < buf.len() {
        match stream.read(&mut buf[got..]).await {
            Ok(0) if got == 0 => return Err(RocketCanError::NoData),
            Ok(0) => {
                return Err(RocketCanError::BadMessage {
                    expected: buf.len(),
                    got,
                })
            }
            Ok(n) => got += n,
            Err(err) => return Err(RocketCanError::Io(err)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn short_read_is_bad_message() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            sock.write_all(&[0xAAu8; WIRE_SIZE - 1]).await.unwrap();
        });

        let mut client = Client::connect(&addr.to_string()).await.unwrap();
        let err = client.recv(RecvTimeout::Millis(500)).await.unwrap_err();
        assert!(matches!(
            err,
            RocketCanError::BadMessage { expected: WIRE_SIZE, got } if got == WIRE_SIZE - 1
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn immediate_close_is_no_data() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            drop(sock);
        });

        let mut client = Client::connect(&addr.to_string()).await.unwrap();
        let err = client.recv(RecvTimeout::Millis(500)).await.unwrap_err();
        assert!(matches!(err, RocketCanError::NoData));
        server.await.unwrap();
    }
}
