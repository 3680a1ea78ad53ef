//! Server-side transport endpoint: the listening socket the broker accepts
//! new clients on.

use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream};

use super::address;
use crate::error::{Result, RocketCanError};

/// Minimum pending-connection backlog spec.md §4.4 requires of the listener.
const MIN_BACKLOG: u32 = 10;

/// The wire protocols a broker can be configured with.
///
/// Only [`SocketKind::Tcp`] is implemented; the others are accepted by
/// [`crate::config`] for compatibility with the transport's address syntax
/// but rejected at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketKind {
    #[default]
    Tcp,
    Udp,
    Sctp,
}

/// A bound, listening server endpoint.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Binds a listener on `host:port` with the given socket kind and MTU.
    ///
    /// Per spec.md §4.4, the socket is bound with address-reuse enabled (so a
    /// fixed-port broker can rebind while a prior socket sits in TIME_WAIT)
    /// and a backlog of at least [`MIN_BACKLOG`].
    pub async fn bind(spec: &str, kind: SocketKind, mtu: usize) -> Result<Self> {
        if kind != SocketKind::Tcp {
            return Err(RocketCanError::InvalidArgument(
                "only SocketKind::Tcp is supported".into(),
            ));
        }
        if mtu == 0 || mtu > address::MAX_MTU_SIZE {
            return Err(RocketCanError::InvalidArgument(format!(
                "mtu {mtu} outside 1..={}",
                address::MAX_MTU_SIZE
            )));
        }
        let (host, port) = address::parse(spec)?;
        let addr: std::net::SocketAddr = lookup_host((host.as_str(), port))
            .await?
            .next()
            .ok_or_else(|| RocketCanError::AddressError(format!("no address for '{spec}'")))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let inner = socket.listen(MIN_BACKLOG)?;
        Ok(Listener { inner })
    }

    /// Accepts the next incoming client connection.
    pub async fn accept(&self) -> Result<(TcpStream, std::net::SocketAddr)> {
        self.inner.accept().await.map_err(RocketCanError::from)
    }

    /// The address this listener is actually bound to (useful when `spec`
    /// asked for an ephemeral port).
    pub fn local_addr(&self) -> Result<std::net::SocketAddr> {
        self.inner.local_addr().map_err(RocketCanError::from)
    }
}
