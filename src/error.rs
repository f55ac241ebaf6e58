//! Errors reported by `uartboot`.
//!
//! Every error is fatal for the run: nothing is retried and nothing is
//! recovered internally. The caller gets the tagged error back and can map it
//! to a message and an exit code with [`Error::exit_code`].

use std::fmt;

use thiserror::Error;

/// A step of the per-page handshake that expects an acknowledgement byte.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Step {
    /// Start-of-frame byte `0xA0`.
    StartOfFrame,
    /// The 4 byte little endian page address.
    Address,
    /// The page data.
    Data,
    /// The 4 byte little endian CRC-32 of the page data.
    Checksum,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::StartOfFrame => "SOF",
            Step::Address => "ADDR",
            Step::Data => "DATA",
            Step::Checksum => "CHK",
        };
        f.pad(name)
    }
}

/// Formats a reply byte, or the lack of one (read timeout).
pub(crate) struct Reply<'a>(pub &'a Option<u8>);

impl fmt::Display for Reply<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self.0 {
            Some(byte) => write!(f, "{:#04x}", byte),
            None => f.write_str("nothing (timeout)"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A line of the hex file does not follow the `:LLAAAATT...CC` layout.
    #[error("Invalid hexfile: malformed record at line {line_index}: {reason}")]
    MalformedLine {
        line_index: usize,
        reason: &'static str,
    },

    /// The trailing checksum of a record does not match its content.
    #[error(
        "Checksum failed on line {line_index}, expected: {expected:#04x}, got: {actual:#04x}"
    )]
    ChecksumMismatch {
        line_index: usize,
        expected: u8,
        actual: u8,
    },

    /// A data byte targets the bootloader region or lies past the end of the
    /// flash while the range checks are enforced.
    #[error("Hexfile contains data at {address:#06x} outside of the writable flash (line {line_index})")]
    RangeViolation { address: u32, line_index: usize },

    /// A data byte lies past the end of the memory image and cannot be stored.
    #[error("Hexfile contains data at {address:#06x} past the flash capacity (line {line_index})")]
    CapacityExceeded { address: u32, line_index: usize },

    /// Inconsistent flash layout or unparsable configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The device did not answer the bootloader init sequence with `0x01`.
    #[error("Failed to trigger bootloader (got {}), maybe your init sequence isn't matching?", Reply(.reply))]
    InitFailed { reply: Option<u8> },

    /// The device did not acknowledge a handshake step.
    #[error("No ACK for {step} (got {}) on page {address:#06x}", Reply(.reply))]
    NoAck {
        step: Step,
        address: u32,
        reply: Option<u8>,
    },

    /// The device acknowledged every step but failed to commit the page.
    #[error("Flash failed on page {address:#06x} (got {})", Reply(.reply))]
    FlashFailed { address: u32, reply: Option<u8> },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl Error {
    /// The process exit code for this error. Each error kind has its own code
    /// and codes never change between releases.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedLine { .. } => 1,
            Error::RangeViolation { .. } => 2,
            Error::ChecksumMismatch { .. } => 3,
            Error::InitFailed { .. } => 4,
            Error::NoAck { .. } => 5,
            Error::FlashFailed { .. } => 6,
            Error::Config(_) => 7,
            Error::CapacityExceeded { .. } => 8,
            Error::Io(_) => 9,
            Error::Serial(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let errors = vec![
            Error::MalformedLine {
                line_index: 0,
                reason: "",
            },
            Error::ChecksumMismatch {
                line_index: 0,
                expected: 0,
                actual: 1,
            },
            Error::RangeViolation {
                address: 0,
                line_index: 0,
            },
            Error::CapacityExceeded {
                address: 0,
                line_index: 0,
            },
            Error::Config(String::new()),
            Error::InitFailed { reply: None },
            Error::NoAck {
                step: Step::Data,
                address: 0,
                reply: None,
            },
            Error::FlashFailed {
                address: 0,
                reply: Some(0),
            },
            Error::Io(std::io::Error::from(std::io::ErrorKind::Other)),
            Error::Serial(serialport::Error::new(serialport::ErrorKind::NoDevice, "")),
        ];

        let codes: HashSet<i32> = errors.iter().map(Error::exit_code).collect();
        assert_eq!(codes.len(), errors.len());
        assert!(!codes.contains(&0));
    }

    #[test]
    fn no_ack_names_the_step() {
        let error = Error::NoAck {
            step: Step::Checksum,
            address: 0x400,
            reply: Some(0x55),
        };
        assert_eq!(error.to_string(), "No ACK for CHK (got 0x55) on page 0x0400");

        let error = Error::NoAck {
            step: Step::StartOfFrame,
            address: 0x400,
            reply: None,
        };
        assert_eq!(
            error.to_string(),
            "No ACK for SOF (got nothing (timeout)) on page 0x0400"
        );
    }
}
