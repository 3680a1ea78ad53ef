//! Core library for RocketCAN: a CAN-over-Ethernet broker.
//!
//! Layered bottom-up, each module only depending on the ones before it:
//! [`crc`] (checksum) -> [`wire`] (96-byte record codec) -> [`frame`] (CAN
//! frame <-> wire record translation) -> [`transport`] (address parsing,
//! listener, client) -> [`broker`] (lifecycle, fan-out, session log) ->
//! [`config`] (ties a TOML file to all of the above).

pub mod broker;
pub mod config;
pub mod crc;
pub mod error;
pub mod frame;
pub mod transport;
pub mod wire;

pub use error::{Result, RocketCanError};
