//! The 96-byte wire record: packing, unpacking and checksum sealing.
//!
//! This is the only place that knows about network byte order. Everything
//! above it (the frame translator, the broker) deals exclusively in host
//! values.

use crate::crc;
use crate::error::{Result, RocketCanError};

/// Total size of a wire record, in bytes.
pub const WIRE_SIZE: usize = 96;
/// Maximum CAN FD payload a record can carry.
pub const MAX_LEN: usize = 64;

/// Control character marking a data record.
pub const ETX: u8 = 0x03;
/// Control character marking an abort (session-teardown) record.
pub const EOT: u8 = 0x04;
/// Reserved control character; not emitted by this implementation.
pub const ETB: u8 = 0x17;

const ID_OFF: usize = 0;
const FLAGS_OFF: usize = 4;
const LENGTH_OFF: usize = 5;
const STATUS_OFF: usize = 6;
const EXTRA_OFF: usize = 7;
const DATA_OFF: usize = 8;
const TS_SEC_OFF: usize = 72;
const TS_NSEC_OFF: usize = 80;
const BUSLOAD_OFF: usize = 92;
const CTRLCHAR_OFF: usize = 94;
const CRC_OFF: usize = 95;

/// Distinguishes a data record from an abort record, per `ctrlchar`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Data,
    Abort,
}

/// A decoded wire record, with all multi-byte fields already in host order.
#[derive(Debug, Clone, PartialEq)]
pub struct WireRecord {
    pub id: u32,
    pub flags: u8,
    pub length: u8,
    pub status: u8,
    pub extra: u8,
    pub data: [u8; MAX_LEN],
    pub ts_sec: u64,
    pub ts_nsec: u64,
    pub busload: u16,
    pub kind: RecordKind,
}

impl WireRecord {
    /// Packs the record to its 96-byte wire representation, sealing it with
    /// a freshly computed checksum.
    pub fn pack(&self) -> [u8; WIRE_SIZE] {
        let mut buf = [0u8; WIRE_SIZE];
        buf[ID_OFF..ID_OFF + 4].copy_from_slice(&self.id.to_be_bytes());
        buf[FLAGS_OFF] = self.flags;
        buf[LENGTH_OFF] = self.length;
        buf[STATUS_OFF] = self.status;
        buf[EXTRA_OFF] = self.extra;
        buf[DATA_OFF..DATA_OFF + MAX_LEN].copy_from_slice(&self.data);
        buf[TS_SEC_OFF..TS_SEC_OFF + 8].copy_from_slice(&self.ts_sec.to_be_bytes());
        buf[TS_NSEC_OFF..TS_NSEC_OFF + 8].copy_from_slice(&self.ts_nsec.to_be_bytes());
        buf[BUSLOAD_OFF..BUSLOAD_OFF + 2].copy_from_slice(&self.busload.to_be_bytes());
        buf[CTRLCHAR_OFF] = match self.kind {
            RecordKind::Data => ETX,
            RecordKind::Abort => EOT,
        };
        buf[CRC_OFF] = crc::calc(&buf[0..CRC_OFF], None);
        buf
    }

    /// Unpacks and validates a 96-byte wire record.
    ///
    /// Fails with [`RocketCanError::ProtocolError`] if the slice isn't
    /// exactly [`WIRE_SIZE`] bytes or `ctrlchar` is unrecognized, and with
    /// [`RocketCanError::ChecksumError`] if the trailing CRC doesn't match.
    pub fn unpack(bytes: &[u8]) -> Result<WireRecord> {
        if bytes.len() != WIRE_SIZE {
            return Err(RocketCanError::ProtocolError(format!(
                "expected a {WIRE_SIZE}-byte record, got {}",
                bytes.len()
            )));
        }
        let expected = crc::calc(&bytes[0..CRC_OFF], None);
        if expected != bytes[CRC_OFF] {
            return Err(RocketCanError::ChecksumError);
        }
        let kind = match bytes[CTRLCHAR_OFF] {
            ETX => RecordKind::Data,
            EOT => RecordKind::Abort,
            other => {
                return Err(RocketCanError::ProtocolError(format!(
                    "unrecognized control character 0x{other:02X}"
                )))
            }
        };

        let mut data = [0u8; MAX_LEN];
        data.copy_from_slice(&bytes[DATA_OFF..DATA_OFF + MAX_LEN]);

        Ok(WireRecord {
            id: u32::from_be_bytes(bytes[ID_OFF..ID_OFF + 4].try_into().unwrap()),
            flags: bytes[FLAGS_OFF],
            length: bytes[LENGTH_OFF],
            status: bytes[STATUS_OFF],
            extra: bytes[EXTRA_OFF],
            data,
            ts_sec: u64::from_be_bytes(bytes[TS_SEC_OFF..TS_SEC_OFF + 8].try_into().unwrap()),
            ts_nsec: u64::from_be_bytes(bytes[TS_NSEC_OFF..TS_NSEC_OFF + 8].try_into().unwrap()),
            busload: u16::from_be_bytes(bytes[BUSLOAD_OFF..BUSLOAD_OFF + 2].try_into().unwrap()),
            kind,
        })
    }

    /// Overlays the controller status byte onto an already-packed record
    /// and reseals the checksum, without touching any other field.
    pub fn add_status(bytes: &mut [u8; WIRE_SIZE], status: u8) {
        bytes[STATUS_OFF] = status;
        bytes[CRC_OFF] = crc::calc(&bytes[0..CRC_OFF], None);
    }

    /// Overlays the `extra` byte onto an already-packed record and reseals
    /// the checksum, without touching any other field.
    pub fn add_extra(bytes: &mut [u8; WIRE_SIZE], extra: u8) {
        bytes[EXTRA_OFF] = extra;
        bytes[CRC_OFF] = crc::calc(&bytes[0..CRC_OFF], None);
    }

    /// Overlays the bus-load percentage (0..10000 = 0.00..100.00%) onto an
    /// already-packed record and reseals the checksum.
    pub fn add_busload(bytes: &mut [u8; WIRE_SIZE], busload: u16) {
        bytes[BUSLOAD_OFF..BUSLOAD_OFF + 2].copy_from_slice(&busload.to_be_bytes());
        bytes[CRC_OFF] = crc::calc(&bytes[0..CRC_OFF], None);
    }
}

/// True if `bytes` is a well-formed, checksum-valid data record.
pub fn is_valid(bytes: &[u8]) -> bool {
    matches!(WireRecord::unpack(bytes), Ok(r) if r.kind == RecordKind::Data)
}

/// True if `bytes` is a well-formed, checksum-valid abort record.
pub fn is_abort(bytes: &[u8]) -> bool {
    matches!(WireRecord::unpack(bytes), Ok(r) if r.kind == RecordKind::Abort)
}

/// Builds the canonical abort record: id `0x001`, the `STS` flag set,
/// length 4, status `RESET`, `data[3] = RESET`, current wall-clock time,
/// `ctrlchar = EOT`, checksum sealed.
pub fn make_abort() -> [u8; WIRE_SIZE] {
    use std::time::{SystemTime, UNIX_EPOCH};

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    let mut data = [0u8; MAX_LEN];
    data[3] = crate::frame::status::RESET;

    let record = WireRecord {
        id: 0x001,
        flags: crate::frame::flag::STS,
        length: 4,
        status: crate::frame::status::RESET,
        extra: 0,
        data,
        ts_sec: now.as_secs(),
        ts_nsec: u64::from(now.subsec_nanos()),
        busload: 0,
        kind: RecordKind::Abort,
    };
    record.pack()
}
