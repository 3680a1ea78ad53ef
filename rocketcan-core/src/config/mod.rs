//! Broker configuration: a TOML file loaded and validated the way
//! `config::loader::load_from_path` does for the reference proxy.

use std::path::Path;

use serde::Deserialize;

use crate::broker::LogLevel;
use crate::error::{Result, RocketCanError};
use crate::transport::address::MAX_MTU_SIZE;
use crate::transport::SocketKind;

fn default_sock_type() -> String {
    "tcp".into()
}

fn default_mtu() -> usize {
    MAX_MTU_SIZE
}

fn default_logging() -> String {
    "info".into()
}

fn default_channel() -> String {
    "loopback".into()
}

/// The `[broker]` table: listener address, transport and logging.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSection {
    pub listen: String,
    #[serde(default = "default_sock_type")]
    pub sock_type: String,
    #[serde(default = "default_mtu")]
    pub mtu: usize,
    #[serde(default = "default_logging")]
    pub logging: String,
}

impl BrokerSection {
    pub fn sock_type(&self) -> Result<SocketKind> {
        match self.sock_type.to_ascii_lowercase().as_str() {
            "tcp" => Ok(SocketKind::Tcp),
            "udp" => Ok(SocketKind::Udp),
            "sctp" => Ok(SocketKind::Sctp),
            other => Err(RocketCanError::Config(format!(
                "unknown broker.sock_type '{other}'"
            ))),
        }
    }

    pub fn log_level(&self) -> Result<LogLevel> {
        match self.logging.to_ascii_lowercase().as_str() {
            "none" => Ok(LogLevel::None),
            "info" => Ok(LogLevel::Info),
            "data" => Ok(LogLevel::Data),
            "all" => Ok(LogLevel::All),
            other => Err(RocketCanError::Config(format!(
                "unknown broker.logging level '{other}'"
            ))),
        }
    }
}

/// The `[can]` table: which simulated CAN channel to bridge onto the
/// broker. Out of `rocketcan-core`'s scope (the CAN driver is consumed
/// externally); carried here only so the binary crate can pick its
/// [`crate::transport`]-facing defaults from one file.
#[derive(Debug, Clone, Deserialize)]
pub struct CanSection {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub bitrate: Option<u32>,
}

impl Default for CanSection {
    fn default() -> Self {
        CanSection {
            channel: default_channel(),
            bitrate: None,
        }
    }
}

/// The full configuration file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub broker: BrokerSection,
    #[serde(default)]
    pub can: CanSection,
}

impl Config {
    /// Reads and parses a TOML config file, then validates it.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&text).map_err(|e| RocketCanError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the fields that `serde` alone can't: address syntax, known
    /// transport/logging names, and MTU bounds.
    pub fn validate(&self) -> Result<()> {
        crate::transport::address::parse(&self.broker.listen)?;
        self.broker.sock_type()?;
        self.broker.log_level()?;
        if self.broker.mtu == 0 || self.broker.mtu > MAX_MTU_SIZE {
            return Err(RocketCanError::Config(format!(
                "broker.mtu must be in 1..={MAX_MTU_SIZE}"
            )));
        }
        Ok(())
    }
}
