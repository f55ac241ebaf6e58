//! Decoding of single hex file records.
//!
//! A record is one line of the form `:LLAAAATT<payload>CC`:
//!
//! ```text
//!  :  10  0400  00  0080002055040000...  7A
//!  |  |   |     |   |                    |
//!  |  |   |     |   |                    '-- checksum
//!  |  |   |     |   '-- LL payload bytes
//!  |  |   |     '-- record type
//!  |  |   '-- 16 bit address
//!  |  '-- payload length
//!  '-- start marker
//! ```

use std::fmt;

use crate::Error;

const START_MARKER: char = ':';

/// Bytes taken by the length, address, type and checksum fields.
const FRAMING_LEN: usize = 1 + 2 + 1 + 1;

/// Offset of the first payload byte.
const PAYLOAD_OFFSET: usize = 4;

/// The type of a record.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecordType {
    /// Payload bytes to be written at the record address.
    Data,
    /// Marks the end of the file.
    EndOfFile,
    /// Any other record type; skipped without effect on the image.
    Unknown(u8),
}

impl From<u8> for RecordType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => RecordType::Data,
            0x01 => RecordType::EndOfFile,
            other => RecordType::Unknown(other),
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::Data => f.write_str("data"),
            RecordType::EndOfFile => f.write_str("end of file"),
            RecordType::Unknown(value) => write!(f, "unknown ({:02X})", value),
        }
    }
}

/// A decoded record with a verified checksum.
///
/// A `Record` can only be obtained through [`Record::decode`], so holding one
/// means its checksum matched.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Record {
    /// Number of payload bytes, as declared by the record.
    pub length: u8,
    /// Offset within the current segment.
    pub address: u16,
    pub record_type: RecordType,
    pub payload: Vec<u8>,
    pub checksum: u8,
}

impl Record {
    /// Decode one line of the hex file. `line_index` is only used to tag
    /// errors.
    ///
    /// **Example**
    ///
    /// ```
    /// use uartboot::firmware::{Record, RecordType};
    ///
    /// let record = Record::decode(":00000001FF", 0)?;
    /// assert_eq!(record.record_type, RecordType::EndOfFile);
    /// # Ok::<(), uartboot::Error>(())
    /// ```
    pub fn decode(line: &str, line_index: usize) -> Result<Record, Error> {
        let malformed = |reason| Error::MalformedLine { line_index, reason };

        if !line.starts_with(START_MARKER) {
            return Err(malformed("expected ':' at the start of the line"));
        }
        let bytes = hex::decode(&line[START_MARKER.len_utf8()..]).map_err(|e| match e {
            hex::FromHexError::OddLength => malformed("odd number of hex digits"),
            _ => malformed("invalid hex digits"),
        })?;
        if bytes.len() < FRAMING_LEN {
            return Err(malformed("line too short"));
        }

        let length = bytes[0];
        if bytes.len() != FRAMING_LEN + length as usize {
            return Err(malformed("line length does not match the byte count"));
        }
        let (checksum, fields) = match bytes.split_last() {
            Some((checksum, fields)) => (*checksum, fields),
            None => return Err(malformed("line too short")),
        };

        let expected = checksum_of(fields.iter());
        if expected != checksum {
            return Err(Error::ChecksumMismatch {
                line_index,
                expected,
                actual: checksum,
            });
        }

        let payload = fields[PAYLOAD_OFFSET..].to_vec();
        Ok(Record {
            length,
            address: u16::from_be_bytes([fields[1], fields[2]]),
            record_type: fields[3].into(),
            payload,
            checksum,
        })
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Two's complement of the 8 bit sum of `bytes`.
fn checksum_of<'a>(bytes: impl Iterator<Item = &'a u8>) -> u8 {
    let sum = bytes.fold(0u8, |sum, byte| sum.wrapping_add(*byte));
    (!sum).wrapping_add(1)
}
