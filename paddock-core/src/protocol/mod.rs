//! Telemetry wire protocol.
//!
//! Every record on the wire starts with a 29-byte [`PacketHeader`] whose
//! `packet_id` selects a [`RecordType`]. The total encoded length of each type
//! is fixed and comes from a static table; nothing in the data itself says how
//! long a record is.
//!
//! Layouts are packed little-endian. They are decoded with `bincode` 1.x
//! (fixed-width integers, little-endian, no length prefix for arrays) into
//! plain `#[derive(Deserialize)]` structs, so field declaration order is the
//! wire order.
//!
//! # Example
//!
//! ```rust
//! use paddock_core::protocol::{PacketHeader, Record, RecordType, HEADER_SIZE};
//!
//! let mut bytes = vec![0u8; RecordType::CarDamage.encoded_len()];
//! bytes[6] = RecordType::CarDamage.tag();
//!
//! let header = PacketHeader::parse(&bytes).unwrap();
//! assert_eq!(header.record_type(), Some(RecordType::CarDamage));
//!
//! let record = Record::decode(header, &bytes[HEADER_SIZE..]).unwrap();
//! assert_eq!(record.encode().unwrap(), bytes);
//! ```

use bitflags::bitflags;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, FromRepr, IntoStaticStr};

use crate::error::{ParseError, Result};

pub mod car_damage;
pub mod car_status;
pub mod event;
pub mod lap_data;
pub mod motion;
pub mod telemetry;

pub use car_damage::{CarDamageData, CarDamagePayload};
pub use car_status::{CarStatusData, CarStatusPayload};
pub use event::{ButtonFlags, Buttons, EventPayload};
pub use lap_data::{LapData, LapDataPayload};
pub use motion::{CarMotionData, MotionPayload};
pub use telemetry::{CarTelemetryData, CarTelemetryPayload};

// =============================================================================
// Constants
// =============================================================================

/// Largest datagram the game emits
pub const UDP_MAX_PACKET_SIZE: usize = 4096;

/// Encoded size of [`PacketHeader`]
pub const HEADER_SIZE: usize = 29;

/// Number of cars carried in every per-car array
pub const MAX_NUM_CARS: usize = 22;

/// Number of record types in the type table
pub const RECORD_TYPE_COUNT: usize = 14;

/// Total encoded length (header included) indexed by record type tag
const RECORD_LENGTHS: [usize; RECORD_TYPE_COUNT] = [
    1349, // Motion
    644,  // Session
    1131, // LapData
    45,   // Event
    1306, // Participants
    1107, // CarSetups
    1352, // CarTelemetry
    1239, // CarStatus
    1020, // FinalClassification
    1218, // LobbyInfo
    953,  // CarDamage
    1460, // SessionHistory
    231,  // TyreSets
    217,  // MotionEx
];

/// Single bounds check for record type tags, used everywhere a tag is
/// validated.
#[inline]
pub fn is_valid_tag(tag: u8) -> bool {
    (tag as usize) < RECORD_TYPE_COUNT
}

// =============================================================================
// Record types
// =============================================================================

/// Record type identifier carried in [`PacketHeader::packet_id`]
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    FromRepr,
    IntoStaticStr,
)]
#[strum(ascii_case_insensitive)]
#[repr(u8)]
pub enum RecordType {
    Motion = 0,
    Session = 1,
    LapData = 2,
    Event = 3,
    Participants = 4,
    CarSetups = 5,
    CarTelemetry = 6,
    CarStatus = 7,
    FinalClassification = 8,
    LobbyInfo = 9,
    CarDamage = 10,
    SessionHistory = 11,
    TyreSets = 12,
    MotionEx = 13,
}

impl RecordType {
    /// Look up a tag in the type table
    pub fn from_tag(tag: u8) -> Option<Self> {
        if !is_valid_tag(tag) {
            return None;
        }
        Self::from_repr(tag)
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Total encoded length, header included
    pub fn encoded_len(self) -> usize {
        RECORD_LENGTHS[self as usize]
    }

    /// Encoded length of the payload following the header
    pub fn payload_len(self) -> usize {
        self.encoded_len() - HEADER_SIZE
    }

    /// Whether records of this type are decoded and kept in history.
    /// Other types are framed and skipped.
    pub fn is_decoded(self) -> bool {
        matches!(
            self,
            RecordType::Motion
                | RecordType::LapData
                | RecordType::Event
                | RecordType::CarTelemetry
                | RecordType::CarStatus
                | RecordType::CarDamage
        )
    }

    /// Name of this type's history in store snapshots
    pub fn history_name(self) -> &'static str {
        match self {
            RecordType::Motion => "CarMotionDataPackets",
            RecordType::Session => "SessionPackets",
            RecordType::LapData => "LapDataPackets",
            RecordType::Event => "EventPackets",
            RecordType::Participants => "ParticipantsPackets",
            RecordType::CarSetups => "CarSetupsPackets",
            RecordType::CarTelemetry => "CarTelemetryDataPackets",
            RecordType::CarStatus => "CarStatusDataPackets",
            RecordType::FinalClassification => "FinalClassificationPackets",
            RecordType::LobbyInfo => "LobbyInfoPackets",
            RecordType::CarDamage => "CarDamageDataPackets",
            RecordType::SessionHistory => "SessionHistoryPackets",
            RecordType::TyreSets => "TyreSetsPackets",
            RecordType::MotionEx => "MotionExPackets",
        }
    }
}

bitflags! {
    /// Selection of record types, one bit per type tag
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RecordTypeMask: u32 {
        const MOTION = 1 << 0;
        const SESSION = 1 << 1;
        const LAP_DATA = 1 << 2;
        const EVENT = 1 << 3;
        const PARTICIPANTS = 1 << 4;
        const CAR_SETUPS = 1 << 5;
        const CAR_TELEMETRY = 1 << 6;
        const CAR_STATUS = 1 << 7;
        const FINAL_CLASSIFICATION = 1 << 8;
        const LOBBY_INFO = 1 << 9;
        const CAR_DAMAGE = 1 << 10;
        const SESSION_HISTORY = 1 << 11;
        const TYRE_SETS = 1 << 12;
        const MOTION_EX = 1 << 13;
    }
}

impl From<RecordType> for RecordTypeMask {
    fn from(record_type: RecordType) -> Self {
        RecordTypeMask::from_bits_retain(1 << record_type.tag())
    }
}

impl FromIterator<RecordType> for RecordTypeMask {
    fn from_iter<I: IntoIterator<Item = RecordType>>(iter: I) -> Self {
        iter.into_iter().fold(RecordTypeMask::empty(), |mask, record_type| {
            mask | RecordTypeMask::from(record_type)
        })
    }
}

impl RecordTypeMask {
    pub fn selects(self, record_type: RecordType) -> bool {
        self.contains(RecordTypeMask::from(record_type))
    }

    /// Selected types in tag order
    pub fn record_types(self) -> impl Iterator<Item = RecordType> {
        (0..RECORD_TYPE_COUNT as u8)
            .filter_map(RecordType::from_tag)
            .filter(move |record_type| self.selects(*record_type))
    }
}

// =============================================================================
// Header
// =============================================================================

/// Header present at the start of every record (29 bytes)
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PacketHeader {
    pub packet_format: u16,     // 0..2 e.g. 2023
    pub game_year: u8,          // 2
    pub game_major_version: u8, // 3
    pub game_minor_version: u8, // 4
    pub packet_version: u8,     // 5
    pub packet_id: u8,          // 6 record type tag
    #[serde(rename = "SessionUID")]
    pub session_uid: u64, // 7..15
    pub session_time: f32,              // 15..19
    pub frame_identifier: u32,          // 19..23
    pub overall_frame_identifier: u32,  // 23..27 not reset by flashbacks
    pub player_car_index: u8,           // 27
    pub secondary_player_car_index: u8, // 28 255 without split screen
}

impl PacketHeader {
    /// Decode the header at the start of `data`
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ParseError::TooShort {
                expected: HEADER_SIZE,
                actual: data.len(),
            });
        }
        Ok(bincode::deserialize(&data[..HEADER_SIZE])?)
    }

    /// Record type named by `packet_id`, if it is in the type table
    pub fn record_type(&self) -> Option<RecordType> {
        RecordType::from_tag(self.packet_id)
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        bincode::serialize_into(&mut *out, self)?;
        Ok(())
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// A decoded record body of a fixed record type
pub trait Payload: Sized {
    const RECORD_TYPE: RecordType;

    /// Decode from the bytes following the header
    fn decode(payload: &[u8]) -> Result<Self>;

    /// Append the exact wire bytes of this payload
    fn encode_into(&self, out: &mut Vec<u8>) -> Result<()>;
}

/// Decode a plain fixed layout covering the whole payload of `record_type`
pub(crate) fn decode_layout<T: DeserializeOwned>(
    record_type: RecordType,
    payload: &[u8],
) -> Result<T> {
    let expected = record_type.payload_len();
    if payload.len() < expected {
        return Err(ParseError::TooShort {
            expected,
            actual: payload.len(),
        });
    }
    Ok(bincode::deserialize(&payload[..expected])?)
}

pub(crate) fn encode_layout<T: Serialize>(body: &T, out: &mut Vec<u8>) -> Result<()> {
    bincode::serialize_into(&mut *out, body)?;
    Ok(())
}

/// A header paired with the payload that followed it
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Packet<T> {
    pub header: PacketHeader,
    pub body: T,
}

impl<T: Payload> Packet<T> {
    /// Pair a body with a header, stamping the header with the body's type
    pub fn new(mut header: PacketHeader, body: T) -> Self {
        header.packet_id = T::RECORD_TYPE.tag();
        Packet { header, body }
    }

    pub fn decode(header: PacketHeader, payload: &[u8]) -> Result<Self> {
        Ok(Packet {
            header,
            body: T::decode(payload)?,
        })
    }

    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        self.header.encode_into(out)?;
        self.body.encode_into(out)
    }
}

pub type MotionPacket = Packet<MotionPayload>;
pub type LapDataPacket = Packet<LapDataPayload>;
pub type EventPacket = Packet<EventPayload>;
pub type CarTelemetryPacket = Packet<CarTelemetryPayload>;
pub type CarStatusPacket = Packet<CarStatusPayload>;
pub type CarDamagePacket = Packet<CarDamagePayload>;

// =============================================================================
// Records
// =============================================================================

/// A decoded record of one of the decoded record types
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Record {
    Motion(MotionPacket),
    LapData(LapDataPacket),
    Event(EventPacket),
    CarTelemetry(CarTelemetryPacket),
    CarStatus(CarStatusPacket),
    CarDamage(CarDamagePacket),
}

macro_rules! record_from_packet {
    ($($variant:ident => $payload:ty),* $(,)?) => {
        $(
            impl From<Packet<$payload>> for Record {
                fn from(packet: Packet<$payload>) -> Self {
                    Record::$variant(packet)
                }
            }
        )*
    };
}

record_from_packet! {
    Motion => MotionPayload,
    LapData => LapDataPayload,
    Event => EventPayload,
    CarTelemetry => CarTelemetryPayload,
    CarStatus => CarStatusPayload,
    CarDamage => CarDamagePayload,
}

impl Record {
    /// Decode the payload that followed `header`.
    ///
    /// `payload` may extend past the record; only the type's declared length
    /// is read.
    pub fn decode(header: PacketHeader, payload: &[u8]) -> Result<Self> {
        let record_type = header
            .record_type()
            .ok_or(ParseError::UnknownRecordType(header.packet_id))?;

        match record_type {
            RecordType::Motion => Packet::decode(header, payload).map(Record::Motion),
            RecordType::LapData => Packet::decode(header, payload).map(Record::LapData),
            RecordType::Event => Packet::decode(header, payload).map(Record::Event),
            RecordType::CarTelemetry => {
                Packet::decode(header, payload).map(Record::CarTelemetry)
            }
            RecordType::CarStatus => Packet::decode(header, payload).map(Record::CarStatus),
            RecordType::CarDamage => Packet::decode(header, payload).map(Record::CarDamage),
            other => Err(ParseError::NotDecoded(other.into())),
        }
    }

    /// Decode a complete record (header and payload) from the start of `data`
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let header = PacketHeader::parse(data)?;
        Record::decode(header, &data[HEADER_SIZE..])
    }

    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Motion(_) => RecordType::Motion,
            Record::LapData(_) => RecordType::LapData,
            Record::Event(_) => RecordType::Event,
            Record::CarTelemetry(_) => RecordType::CarTelemetry,
            Record::CarStatus(_) => RecordType::CarStatus,
            Record::CarDamage(_) => RecordType::CarDamage,
        }
    }

    pub fn header(&self) -> &PacketHeader {
        match self {
            Record::Motion(p) => &p.header,
            Record::LapData(p) => &p.header,
            Record::Event(p) => &p.header,
            Record::CarTelemetry(p) => &p.header,
            Record::CarStatus(p) => &p.header,
            Record::CarDamage(p) => &p.header,
        }
    }

    /// Append the wire bytes (header and payload) of this record
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Record::Motion(p) => p.encode_into(out),
            Record::LapData(p) => p.encode_into(out),
            Record::Event(p) => p.encode_into(out),
            Record::CarTelemetry(p) => p.encode_into(out),
            Record::CarStatus(p) => p.encode_into(out),
            Record::CarDamage(p) => p.encode_into(out),
        }
    }

    /// Wire bytes of this record, exactly `record_type().encoded_len()` long
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.record_type().encoded_len());
        self.encode_into(&mut out)?;
        Ok(out)
    }
}
