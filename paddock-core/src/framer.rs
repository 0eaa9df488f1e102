//! Stream framer.
//!
//! Datagrams are not aligned to record boundaries: one datagram may hold
//! several records and one record may span several datagrams. The framer
//! accumulates raw bytes and hands out complete records using only the header
//! and the fixed per-type length table.

use crate::error::ParseError;
use crate::protocol::{PacketHeader, Record, RecordType, HEADER_SIZE, UDP_MAX_PACKET_SIZE};

/// Initial buffer capacity, room for eight full datagrams
pub const PROCESSING_BUFFER_SIZE: usize = UDP_MAX_PACKET_SIZE * 8;

/// Outcome of one [`StreamFramer::next_frame`] call
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A complete record was decoded and consumed
    Record(Record),
    /// Not enough bytes buffered; nothing was consumed
    NeedMoreData,
    /// The header named a type outside the type table. The bytes of the last
    /// feed were discarded.
    UnknownType { tag: u8, discarded: usize },
    /// A known type without a decoder was consumed
    Skipped(RecordType),
    /// A complete record failed to decode; its bytes were consumed anyway
    Dropped {
        record_type: RecordType,
        error: ParseError,
    },
}

#[derive(Debug)]
pub struct StreamFramer {
    buffer: Vec<u8>,
    last_feed_len: usize,
}

impl Default for StreamFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamFramer {
    pub fn new() -> Self {
        StreamFramer {
            buffer: Vec::with_capacity(PROCESSING_BUFFER_SIZE),
            last_feed_len: 0,
        }
    }

    /// Append the bytes of one received datagram
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.last_feed_len = data.len();
    }

    /// Number of bytes waiting to be framed
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_feed_len = 0;
    }

    /// Try to extract the next record from the front of the buffer.
    ///
    /// Call repeatedly after each [`feed`](Self::feed) until it returns
    /// [`Frame::NeedMoreData`].
    pub fn next_frame(&mut self) -> Frame {
        // The header is re-parsed on every attempt and only consumed together
        // with the whole record.
        let header = match PacketHeader::parse(&self.buffer) {
            Ok(header) => header,
            Err(_) => return Frame::NeedMoreData,
        };

        let Some(record_type) = header.record_type() else {
            let discarded = self.last_feed_len.min(self.buffer.len());
            self.consume(discarded);
            self.last_feed_len = 0;
            return Frame::UnknownType {
                tag: header.packet_id,
                discarded,
            };
        };

        let total = record_type.encoded_len();
        if self.buffer.len() < total {
            return Frame::NeedMoreData;
        }

        let frame = if record_type.is_decoded() {
            match Record::decode(header, &self.buffer[HEADER_SIZE..total]) {
                Ok(record) => Frame::Record(record),
                Err(error) => Frame::Dropped { record_type, error },
            }
        } else {
            Frame::Skipped(record_type)
        };

        self.consume(total);
        frame
    }

    fn consume(&mut self, len: usize) {
        self.buffer.drain(..len);
    }
}
