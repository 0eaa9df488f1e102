//! Capture file formats.
//!
//! A [`CaptureFormat::Tagged`] capture is a flat sequence of
//! `[type tag][header][payload]` entries with no framing markers, readable
//! only front to back. A [`CaptureFormat::Raw`] capture leaves out the tag
//! byte, so it is exactly the byte stream the game sends and can be replayed
//! verbatim.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{ParseError, Result};
use crate::protocol::{Record, RecordType};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CaptureFormat {
    #[default]
    Tagged,
    Raw,
}

impl CaptureFormat {
    /// File extension used for captures in this format
    pub fn extension(self) -> &'static str {
        match self {
            CaptureFormat::Tagged => "ftr",
            CaptureFormat::Raw => "bin",
        }
    }

    /// Format implied by a capture file extension
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension {
            "ftr" => Some(CaptureFormat::Tagged),
            "bin" => Some(CaptureFormat::Raw),
            _ => None,
        }
    }

    /// Append one capture entry for `record`
    pub fn encode_into(self, record: &Record, out: &mut Vec<u8>) -> Result<()> {
        if self == CaptureFormat::Tagged {
            out.push(record.record_type().tag());
        }
        record.encode_into(out)
    }
}

/// One entry of a tagged capture
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureEntry<'a> {
    pub record_type: RecordType,
    /// Header and payload, exactly `record_type.encoded_len()` bytes
    pub bytes: &'a [u8],
}

impl CaptureEntry<'_> {
    pub fn decode(&self) -> Result<Record> {
        Record::from_bytes(self.bytes)
    }
}

/// Iterates the entries of a tagged capture held in memory.
///
/// Stops after the first malformed entry, since nothing after it can be
/// located.
pub struct TaggedReader<'a> {
    data: &'a [u8],
}

impl<'a> TaggedReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        TaggedReader { data }
    }

    /// Bytes not yet read
    pub fn remaining(&self) -> usize {
        self.data.len()
    }
}

impl<'a> Iterator for TaggedReader<'a> {
    type Item = Result<CaptureEntry<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let (&tag, rest) = self.data.split_first()?;

        let Some(record_type) = RecordType::from_tag(tag) else {
            self.data = &[];
            return Some(Err(ParseError::UnknownRecordType(tag)));
        };

        let len = record_type.encoded_len();
        if rest.len() < len {
            self.data = &[];
            return Some(Err(ParseError::TooShort {
                expected: len,
                actual: rest.len(),
            }));
        }

        let (bytes, tail) = rest.split_at(len);
        self.data = tail;
        Some(Ok(CaptureEntry { record_type, bytes }))
    }
}
