//! `host:port` address parsing, including the `localhost` rewrite the
//! original IPC layer applies.

use crate::error::{Result, RocketCanError};

/// Maximum transport MTU accepted by [`crate::config`] and the listener.
pub const MAX_MTU_SIZE: usize = 1500;
/// Sentinel telling [`super::client::Client::recv`] to block with no timeout.
pub const WAIT_FOREVER: u16 = 65535;
/// Canonical loopback address `localhost` is rewritten to.
pub const ADDR_LOCALHOST: &str = "127.0.0.1";

/// Parses a `host:port` endpoint string.
///
/// `localhost` is rewritten to `127.0.0.1`. The port must parse as a valid
/// `u16`; anything else (missing colon, empty host, non-numeric or
/// out-of-range port) is an [`RocketCanError::AddressError`].
pub fn parse(spec: &str) -> Result<(String, u16)> {
    let (host, port) = spec
        .rsplit_once(':')
        .ok_or_else(|| RocketCanError::AddressError(format!("missing ':port' in '{spec}'")))?;

    if host.is_empty() {
        return Err(RocketCanError::AddressError(format!(
            "empty host in '{spec}'"
        )));
    }
    let host = if host == "localhost" {
        ADDR_LOCALHOST.to_string()
    } else {
        host.to_string()
    };

    let port: u16 = port
        .parse()
        .map_err(|_| RocketCanError::AddressError(format!("invalid port '{port}' in '{spec}'")))?;

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_host_and_port() {
        assert_eq!(parse("192.168.0.1:1234").unwrap(), ("192.168.0.1".into(), 1234));
    }

    #[test]
    fn rewrites_localhost() {
        assert_eq!(parse("localhost:8080").unwrap(), ("127.0.0.1".into(), 8080));
    }

    #[test]
    fn rejects_missing_port() {
        assert!(parse("192.168.0.1").is_err());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(parse("localhost:ipc").is_err());
    }

    #[test]
    fn rejects_out_of_range_port() {
        assert!(parse("localhost:70000").is_err());
    }
}
