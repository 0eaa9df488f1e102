//! # Paddock Core
//!
//! Platform-independent codec for the racing simulation UDP telemetry stream.
//!
//! This crate contains pure decoding and framing logic with **zero I/O
//! dependencies**. The tokio server in `paddock-server` owns the sockets,
//! the record store and the capture files.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  paddock-core (no tokio/async deps)                      │
//! │  ├── protocol/  (header, record type table, payloads)   │
//! │  ├── framer     (record boundaries across datagrams)    │
//! │  └── capture    (tagged and raw capture file entries)   │
//! └──────────────────────────────────────────────────────────┘
//!                          ▲
//!             ┌────────────┴────────────┐
//!             │  paddock-server         │
//!             │  (UDP, store, hub, web) │
//!             └─────────────────────────┘
//! ```
//!
//! ## Example: framing a datagram stream
//!
//! ```rust
//! use paddock_core::framer::{Frame, StreamFramer};
//! use paddock_core::protocol::{CarTelemetryPayload, Packet, PacketHeader, Record};
//!
//! let body = CarTelemetryPayload::default();
//! let record: Record = Packet::new(PacketHeader::default(), body).into();
//! let bytes = record.encode().unwrap();
//!
//! let mut framer = StreamFramer::new();
//! framer.feed(&bytes[..1000]);
//! assert_eq!(framer.next_frame(), Frame::NeedMoreData);
//! framer.feed(&bytes[1000..]);
//! assert_eq!(framer.next_frame(), Frame::Record(record));
//! ```

pub mod capture;
pub mod error;
pub mod framer;
pub mod protocol;

pub use capture::{CaptureFormat, TaggedReader};
pub use error::ParseError;
pub use framer::{Frame, StreamFramer};
pub use protocol::{PacketHeader, Record, RecordType, RecordTypeMask};
