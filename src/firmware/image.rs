//! Flat memory image built from decoded records.

use std::io::{self, BufRead};
use std::ops::ControlFlow;

use log::{debug, info, warn};

use super::record::{Record, RecordType};
use crate::Error;

// =============================================================================
// Flash layout and range policy
// =============================================================================

/// Boundaries of the device flash as seen by the bootloader.
///
/// Only constructible through [`FlashLayout::new`], which rejects inconsistent
/// values.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FlashLayout {
    bootloader_size: u32,
    flash_size: u32,
    page_size: u32,
}

impl FlashLayout {
    /// Validate and build a layout.
    ///
    /// Fails with [`Error::Config`] when `page_size` is zero or when the flash
    /// does not extend past the bootloader region.
    pub fn new(bootloader_size: u32, flash_size: u32, page_size: u32) -> Result<Self, Error> {
        if page_size == 0 {
            return Err(Error::Config("page size must not be zero".into()));
        }
        if flash_size <= bootloader_size {
            return Err(Error::Config(format!(
                "flash size {:#x} must be larger than the bootloader size {:#x}",
                flash_size, bootloader_size
            )));
        }
        if bootloader_size % page_size != 0 {
            warn!(
                "bootloader size {:#x} is not a multiple of the page size {}, \
                 the first page starts inside the bootloader region",
                bootloader_size, page_size
            );
        }

        Ok(FlashLayout {
            bootloader_size,
            flash_size,
            page_size,
        })
    }

    /// Size of the region reserved for the bootloader, starting at 0.
    pub fn bootloader_size(&self) -> u32 {
        self.bootloader_size
    }

    /// Total flash capacity.
    pub fn flash_size(&self) -> u32 {
        self.flash_size
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Whether `address` may receive data: past the bootloader, inside flash.
    pub fn is_writable(&self, address: u32) -> bool {
        address >= self.bootloader_size && address < self.flash_size
    }
}

/// What to do with data bytes outside of the writable flash range.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FlashRangePolicy {
    /// Abort with [`Error::RangeViolation`].
    Enforced,
    /// Store the byte anyway, as long as it fits into the image.
    Permissive,
}

impl Default for FlashRangePolicy {
    fn default() -> Self {
        FlashRangePolicy::Permissive
    }
}

// =============================================================================
// Memory image
// =============================================================================

/// Flat, zero-initialized copy of the flash built from hex records.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemoryImage {
    data: Vec<u8>,
    highest_written_address: u32,
    /// Base added to every record address. Segment records are not
    /// interpreted, so this stays 0.
    global_offset: u32,
    bytes_written: usize,
}

impl MemoryImage {
    /// An empty image covering `capacity` bytes.
    pub fn new(capacity: u32) -> Self {
        MemoryImage {
            data: vec![0; capacity as usize],
            highest_written_address: 0,
            global_offset: 0,
            bytes_written: 0,
        }
    }

    /// Decode `lines` and apply them in order until the end-of-file record.
    ///
    /// Surrounding whitespace is stripped and blank lines are skipped. Lines
    /// after the end-of-file record are not looked at.
    pub fn from_lines<I, S>(
        lines: I,
        layout: &FlashLayout,
        policy: FlashRangePolicy,
    ) -> Result<Self, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::build(lines.into_iter().map(Ok), layout, policy)
    }

    /// Same as [`MemoryImage::from_lines`], reading the lines from `reader`.
    ///
    /// Lines are read one at a time, so nothing past the end-of-file record
    /// is read. A line that is not valid UTF-8 is a malformed line.
    pub fn from_reader<R: BufRead>(
        reader: R,
        layout: &FlashLayout,
        policy: FlashRangePolicy,
    ) -> Result<Self, Error> {
        let lines = reader
            .lines()
            .enumerate()
            .map(|(line_index, line)| match line {
                Err(e) if e.kind() == io::ErrorKind::InvalidData => Err(Error::MalformedLine {
                    line_index,
                    reason: "line is not valid UTF-8",
                }),
                line => line.map_err(Error::from),
            });
        Self::build(lines, layout, policy)
    }

    fn build<I, S>(lines: I, layout: &FlashLayout, policy: FlashRangePolicy) -> Result<Self, Error>
    where
        I: Iterator<Item = Result<S, Error>>,
        S: AsRef<str>,
    {
        let mut image = MemoryImage::new(layout.flash_size());
        let mut lines_read = 0;

        for (line_index, line) in lines.enumerate() {
            let line = line?;
            lines_read += 1;
            let line = line.as_ref().trim();
            if line.is_empty() {
                continue;
            }

            let record = Record::decode(line, line_index)?;
            if let ControlFlow::Break(()) = image.apply(&record, line_index, layout, policy)? {
                info!("Read hexfile with {} lines", lines_read);
                return Ok(image);
            }
        }

        warn!(
            "Hexfile has no end of file record after {} lines",
            lines_read
        );
        Ok(image)
    }

    /// Apply a single record.
    ///
    /// Returns `Break` for the end-of-file record, `Continue` otherwise.
    /// Unknown record types leave the image untouched.
    pub fn apply(
        &mut self,
        record: &Record,
        line_index: usize,
        layout: &FlashLayout,
        policy: FlashRangePolicy,
    ) -> Result<ControlFlow<()>, Error> {
        match record.record_type {
            RecordType::EndOfFile => {
                debug!("Hexfile end at line {}", line_index);
                return Ok(ControlFlow::Break(()));
            }
            RecordType::Unknown(_) => {
                debug!(
                    "Ignoring {} record at line {}",
                    record.record_type, line_index
                );
                return Ok(ControlFlow::Continue(()));
            }
            RecordType::Data => {}
        }

        let base = self.global_offset + u32::from(record.address);
        for (i, byte) in record.payload.iter().enumerate() {
            let address = base + i as u32;
            if policy == FlashRangePolicy::Enforced && !layout.is_writable(address) {
                return Err(Error::RangeViolation {
                    address,
                    line_index,
                });
            }
            let slot = self
                .data
                .get_mut(address as usize)
                .ok_or(Error::CapacityExceeded {
                    address,
                    line_index,
                })?;
            *slot = *byte;
            self.bytes_written += 1;
            self.highest_written_address = self.highest_written_address.max(address);
        }

        Ok(ControlFlow::Continue(()))
    }

    /// Highest address that received a data byte, 0 when nothing was written.
    pub fn highest_written_address(&self) -> u32 {
        self.highest_written_address
    }

    /// Number of data bytes written, counting overwrites.
    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// `len` bytes starting at `address`. Whatever lies past the end of the
    /// image reads as zero.
    pub fn page(&self, address: u32, len: u32) -> Vec<u8> {
        let mut page = vec![0; len as usize];
        let start = (address as usize).min(self.data.len());
        let end = (address as usize + len as usize).min(self.data.len());
        page[..end - start].copy_from_slice(&self.data[start..end]);
        page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> FlashLayout {
        FlashLayout::new(0x400, 0x4000, 64).unwrap()
    }

    fn build(lines: &[&str], policy: FlashRangePolicy) -> Result<MemoryImage, Error> {
        MemoryImage::from_lines(lines.iter(), &layout(), policy)
    }

    #[test]
    fn layout_rejects_zero_page_size() {
        assert!(matches!(FlashLayout::new(0x400, 0x4000, 0), Err(Error::Config(_))));
    }

    #[test]
    fn layout_rejects_flash_not_larger_than_bootloader() {
        assert!(matches!(FlashLayout::new(0x400, 0x400, 64), Err(Error::Config(_))));
        assert!(matches!(FlashLayout::new(0x800, 0x400, 64), Err(Error::Config(_))));
        assert!(FlashLayout::new(0x3FF, 0x400, 64).is_ok());
    }

    #[test]
    fn data_is_written_at_record_address() {
        let image = build(
            &[":0404000001020304EE", ":02041000AABB85", ":00000001FF"],
            FlashRangePolicy::Enforced,
        )
        .unwrap();

        assert_eq!(&image.as_bytes()[0x400..0x404], &[1, 2, 3, 4]);
        assert_eq!(&image.as_bytes()[0x410..0x412], &[0xAA, 0xBB]);
        assert_eq!(image.highest_written_address(), 0x411);
        assert_eq!(image.bytes_written(), 6);
    }

    #[test]
    fn untouched_bytes_stay_zero() {
        let image = build(&[":0404000001020304EE", ":00000001FF"], FlashRangePolicy::Enforced)
            .unwrap();

        assert_eq!(image.capacity(), 0x4000);
        let written = 0x400..0x404;
        assert!(image
            .as_bytes()
            .iter()
            .enumerate()
            .filter(|(address, _)| !written.contains(address))
            .all(|(_, byte)| *byte == 0));
    }

    #[test]
    fn watermark_never_decreases() {
        let image = build(
            &[":02041000AABB85", ":0404000001020304EE", ":00000001FF"],
            FlashRangePolicy::Enforced,
        )
        .unwrap();
        assert_eq!(image.highest_written_address(), 0x411);
    }

    #[test]
    fn end_of_file_stops_processing() {
        let image = build(
            &[":00000001FF", "this line is never decoded"],
            FlashRangePolicy::Enforced,
        )
        .unwrap();
        assert_eq!(image.bytes_written(), 0);
    }

    #[test]
    fn unknown_records_are_ignored() {
        let image = build(
            &[":020000040800F2", ":0400000502000000F5", ":00000001FF"],
            FlashRangePolicy::Enforced,
        )
        .unwrap();
        assert_eq!(image.bytes_written(), 0);
        assert_eq!(image.highest_written_address(), 0);
    }

    #[test]
    fn blank_lines_are_skipped() {
        let image = build(
            &["  :0404000001020304EE  ", "", "   ", ":00000001FF"],
            FlashRangePolicy::Enforced,
        )
        .unwrap();
        assert_eq!(image.bytes_written(), 4);
    }

    #[test]
    fn decode_errors_carry_the_line_index() {
        match build(&["", "garbage"], FlashRangePolicy::Enforced) {
            Err(Error::MalformedLine { line_index, .. }) => assert_eq!(line_index, 1),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn strict_mode_rejects_the_last_bootloader_byte() {
        // One byte at 0x3FF.
        let lines = [":0103FF0042BB", ":00000001FF"];

        match build(&lines, FlashRangePolicy::Enforced) {
            Err(Error::RangeViolation {
                address,
                line_index,
            }) => {
                assert_eq!(address, 0x3FF);
                assert_eq!(line_index, 0);
            }
            other => panic!("unexpected result {:?}", other),
        }

        let image = build(&lines, FlashRangePolicy::Permissive).unwrap();
        assert_eq!(image.as_bytes()[0x3FF], 0x42);
        assert_eq!(image.highest_written_address(), 0x3FF);
    }

    #[test]
    fn strict_mode_rejects_data_past_the_flash() {
        let layout = FlashLayout::new(0x400, 0x800, 64).unwrap();
        // Two bytes at 0x7FF, the second one lies past the flash.
        let lines = [":0207FF00AABB93", ":00000001FF"];

        match MemoryImage::from_lines(lines.iter(), &layout, FlashRangePolicy::Enforced) {
            Err(Error::RangeViolation { address, .. }) => assert_eq!(address, 0x800),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn permissive_mode_cannot_write_past_the_capacity() {
        let layout = FlashLayout::new(0x400, 0x800, 64).unwrap();
        let lines = [":0207FF00AABB93", ":00000001FF"];

        match MemoryImage::from_lines(lines.iter(), &layout, FlashRangePolicy::Permissive) {
            Err(Error::CapacityExceeded {
                address,
                line_index,
            }) => {
                assert_eq!(address, 0x800);
                assert_eq!(line_index, 0);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn missing_end_of_file_is_tolerated() {
        let image = build(&[":0404000001020304EE"], FlashRangePolicy::Enforced).unwrap();
        assert_eq!(image.bytes_written(), 4);
    }

    #[test]
    fn reads_from_a_buffered_reader() {
        let text = ":0404000001020304EE\n:00000001FF\n";
        let image =
            MemoryImage::from_reader(text.as_bytes(), &layout(), FlashRangePolicy::Enforced)
                .unwrap();
        assert_eq!(image.highest_written_address(), 0x403);
    }

    #[test]
    fn invalid_utf8_is_a_malformed_line() {
        let text: &[u8] = b":0404000001020304EE\n\xff\xfe\n:00000001FF\n";
        match MemoryImage::from_reader(text, &layout(), FlashRangePolicy::Enforced) {
            Err(Error::MalformedLine { line_index, .. }) => assert_eq!(line_index, 1),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn nothing_is_read_past_the_end_of_file() {
        let text: &[u8] = b":0404000001020304EE\n:00000001FF\n\xff\xfe\n";
        let image =
            MemoryImage::from_reader(text, &layout(), FlashRangePolicy::Enforced).unwrap();
        assert_eq!(image.bytes_written(), 4);
    }

    #[test]
    fn pages_are_zero_padded_past_the_end() {
        let mut image = MemoryImage::new(8);
        let record = Record::decode(":020006001122C5", 0).unwrap();
        let layout = FlashLayout::new(0, 8, 4).unwrap();
        assert_eq!(
            image
                .apply(&record, 0, &layout, FlashRangePolicy::Enforced)
                .unwrap(),
            ControlFlow::Continue(())
        );

        assert_eq!(image.page(4, 4), vec![0, 0, 0x11, 0x22]);
        assert_eq!(image.page(6, 4), vec![0x11, 0x22, 0, 0]);
        assert_eq!(image.page(12, 4), vec![0, 0, 0, 0]);
    }
}
