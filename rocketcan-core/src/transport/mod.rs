//! Transport Endpoint: address parsing and the server/client socket
//! operations built on it. Broker lifecycle and fan-out live one layer up,
//! in [`crate::broker`].

pub mod address;
pub mod client;
pub mod listener;

pub use client::{Client, RecvTimeout};
pub use listener::{Listener, SocketKind};
