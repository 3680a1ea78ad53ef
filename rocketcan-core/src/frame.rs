//! Host-order CAN frame and the bijective mapping to/from the wire record.
//!
//! Kept free of I/O so it stays property-test-friendly and the codec can be
//! proven bijective independently of the broker (spec design note).

use crate::error::{Result, RocketCanError};
use crate::wire::{RecordKind, WireRecord, MAX_LEN};

/// RocketCAN message flag bits (CAN API Vx compatible).
pub mod flag {
    pub const XTD: u8 = 0x01;
    pub const RTR: u8 = 0x02;
    pub const FDF: u8 = 0x04;
    pub const BRS: u8 = 0x08;
    pub const ESI: u8 = 0x10;
    pub const STS: u8 = 0x80;
}

/// CAN status register bits (bit7..bit0).
pub mod status {
    pub const RESET: u8 = 0x80;
    pub const BOFF: u8 = 0x40;
    pub const EWRN: u8 = 0x20;
    pub const BERR: u8 = 0x10;
    pub const TX_BUSY: u8 = 0x08;
    pub const RX_EMPTY: u8 = 0x04;
    pub const MSG_LST: u8 = 0x02;
    pub const QUE_OVR: u8 = 0x01;
}

/// Wall-clock timestamp, split the way `struct timespec` is: seconds and
/// nanoseconds-within-the-second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Timestamp {
    pub sec: u64,
    pub nsec: u64,
}

/// A CAN frame in host byte order, as produced or consumed by the CAN driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    pub id: u32,
    pub xtd: bool,
    pub rtr: bool,
    pub fdf: bool,
    pub brs: bool,
    pub esi: bool,
    pub sts: bool,
    pub dlc: u8,
    pub data: [u8; MAX_LEN],
    pub timestamp: Timestamp,
}

impl CanFrame {
    /// The payload length implied by `dlc` (see [`dlc_to_len`]).
    pub fn length(&self) -> u8 {
        dlc_to_len(self.dlc)
    }
}

/// `DLC2LEN`: maps a 4-bit data-length-code to its payload byte count.
///
/// CAN CC DLCs 0..8 map to themselves; CAN FD DLCs 9..15 map to
/// 12, 16, 20, 24, 32, 48, 64.
pub fn dlc_to_len(dlc: u8) -> u8 {
    const TABLE: [u8; 16] = [0, 1, 2, 3, 4, 5, 6, 7, 8, 12, 16, 20, 24, 32, 48, 64];
    TABLE[dlc.min(15) as usize]
}

/// `LEN2DLC`: picks the smallest DLC whose `DLC2LEN` covers a payload of `len` bytes.
pub fn len_to_dlc(len: u8) -> u8 {
    match len {
        0..=8 => len,
        9..=12 => 9,
        13..=16 => 10,
        17..=20 => 11,
        21..=24 => 12,
        25..=32 => 13,
        33..=48 => 14,
        _ => 15,
    }
}

fn reject_rtr_fdf(rtr: bool, fdf: bool) -> Result<()> {
    if rtr && fdf {
        return Err(RocketCanError::ProtocolError(
            "remote frame (RTR) cannot also be CAN-FD (FDF)".into(),
        ));
    }
    Ok(())
}

/// Maps a host CAN frame onto a wire record (data kind, `ctrlchar = ETX`).
///
/// `status`, `extra` and `busload` are left at zero; the broker overlays
/// them via [`crate::wire::WireRecord::add_status`] /
/// [`crate::wire::WireRecord::add_extra`] when it knows the local
/// controller's state.
pub fn host_to_wire(can: &CanFrame) -> Result<WireRecord> {
    reject_rtr_fdf(can.rtr, can.fdf)?;

    let length = dlc_to_len(can.dlc);
    let mut data = [0u8; MAX_LEN];
    data[..length as usize].copy_from_slice(&can.data[..length as usize]);

    let flags = (if can.xtd { flag::XTD } else { 0 })
        | (if can.rtr { flag::RTR } else { 0 })
        | (if can.fdf { flag::FDF } else { 0 })
        | (if can.brs { flag::BRS } else { 0 })
        | (if can.esi { flag::ESI } else { 0 })
        | (if can.sts { flag::STS } else { 0 });

    Ok(WireRecord {
        id: can.id,
        flags,
        length,
        status: 0,
        extra: 0,
        data,
        ts_sec: can.timestamp.sec,
        ts_nsec: can.timestamp.nsec,
        busload: 0,
        kind: RecordKind::Data,
    })
}

/// Maps a wire record back onto a host CAN frame.
///
/// A status record (`sts` set) carries no CAN payload semantics beyond the
/// broker's status encoding; callers must not reinterpret its `data` bytes
/// as a CAN payload, but the translator copies them through unchanged so no
/// information is lost in the round trip.
pub fn wire_to_host(net: &WireRecord) -> Result<CanFrame> {
    if net.length as usize > MAX_LEN {
        return Err(RocketCanError::ProtocolError(format!(
            "payload length {} exceeds {MAX_LEN}",
            net.length
        )));
    }
    let rtr = net.flags & flag::RTR != 0;
    let fdf = net.flags & flag::FDF != 0;
    reject_rtr_fdf(rtr, fdf)?;

    let mut data = [0u8; MAX_LEN];
    let len = net.length as usize;
    data[..len].copy_from_slice(&net.data[..len]);

    Ok(CanFrame {
        id: net.id,
        xtd: net.flags & flag::XTD != 0,
        rtr,
        fdf,
        brs: net.flags & flag::BRS != 0,
        esi: net.flags & flag::ESI != 0,
        sts: net.flags & flag::STS != 0,
        dlc: len_to_dlc(net.length),
        data,
        timestamp: Timestamp {
            sec: net.ts_sec,
            nsec: net.ts_nsec,
        },
    })
}
