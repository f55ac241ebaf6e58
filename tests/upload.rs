//! End to end runs: hex text through the image builder and the page planner,
//! then over a scripted link standing in for the bootloader.

use std::collections::VecDeque;
use std::io::{self, Read, Write};

use hex_literal::hex;
use indicatif::ProgressBar;

use uartboot::{Error, FlashLayout, FlashRangePolicy, Firmware, SettingsBuilder, Step};

/// Answers with pre-recorded replies and records everything the host sends.
/// Reading past the last reply times out like a serial port would.
struct Bootloader {
    replies: VecDeque<u8>,
    received: Vec<u8>,
}

impl Bootloader {
    fn new(replies: &[u8]) -> Self {
        Bootloader {
            replies: replies.iter().copied().collect(),
            received: Vec::new(),
        }
    }
}

impl Read for Bootloader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match (buf.first_mut(), self.replies.pop_front()) {
            (Some(slot), Some(byte)) => {
                *slot = byte;
                Ok(1)
            }
            (None, _) => Ok(0),
            (_, None) => Err(io::Error::new(io::ErrorKind::TimedOut, "timed out")),
        }
    }
}

impl Write for Bootloader {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.received.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn default_layout() -> FlashLayout {
    FlashLayout::new(0x400, 0x4000, 64).unwrap()
}

fn firmware(text: &str, policy: FlashRangePolicy) -> Result<Firmware, Error> {
    Firmware::from_reader(text.as_bytes(), default_layout(), policy)
}

#[test]
fn ignored_records_only_reboot_the_device() {
    let firmware = firmware(
        ":0400000502000000F5\n:00000001FF\n",
        FlashRangePolicy::Enforced,
    )
    .unwrap();
    assert!(firmware.plan.is_empty());

    let mut device = Bootloader::new(&[]);
    let report = firmware
        .upload(&mut device, None, ProgressBar::hidden())
        .unwrap();

    assert_eq!(device.received, vec![0xA2]);
    assert_eq!(report.pages_written, 0);
}

#[test]
fn data_below_the_bootloader_is_not_transferred_in_permissive_mode() {
    let text = ":0400000002000000FA\n:00000001FF\n";

    let firmware = firmware(text, FlashRangePolicy::Permissive).unwrap();
    assert_eq!(firmware.image.highest_written_address(), 3);
    assert!(firmware.plan.is_empty());

    let mut device = Bootloader::new(&[]);
    firmware
        .upload(&mut device, None, ProgressBar::hidden())
        .unwrap();
    assert_eq!(device.received, vec![0xA2]);

    assert!(matches!(
        self::firmware(text, FlashRangePolicy::Enforced),
        Err(Error::RangeViolation { address: 0, .. })
    ));
}

#[test]
fn corrupted_record_is_rejected_before_any_transfer() {
    assert!(matches!(
        firmware(":0400000002000000F6\n:00000001FF\n", FlashRangePolicy::Permissive),
        Err(Error::ChecksumMismatch {
            line_index: 0,
            expected: 0xFA,
            actual: 0xF6
        })
    ));
}

#[test]
fn two_pages_from_a_hex_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    // 4 bytes at 0x400 and 2 bytes at 0x440, the start of the second page.
    write!(
        file,
        ":0404000001020304EE\r\n:02044000AABB55\r\n:00000001FF\r\n"
    )
    .unwrap();

    let settings = SettingsBuilder::new()
        .hex_file(file.path().to_string_lossy())
        .strict(true)
        .finalize();
    let firmware = Firmware::load(&settings).unwrap();
    assert_eq!(firmware.plan.addresses(), &[0x400, 0x440]);

    let mut replies = vec![0x01];
    for _ in 0..2 {
        replies.extend_from_slice(&hex!("55 55 55 77 55"));
    }
    let mut device = Bootloader::new(&replies);
    let report = firmware
        .upload(&mut device, Some(&hex!("7F 7F")[..]), ProgressBar::hidden())
        .unwrap();

    assert_eq!(report.pages_written, 2);
    assert_eq!(report.bytes_written, 128);

    let sent = &device.received;
    assert_eq!(sent.len(), 2 + 2 * (1 + 4 + 64 + 4) + 1);
    assert_eq!(&sent[..3], &hex!("7F 7F A0"));
    assert_eq!(&sent[3..7], &hex!("00 04 00 00"));
    assert_eq!(&sent[7..11], &hex!("01 02 03 04"));
    assert_eq!(&sent[75..80], &hex!("A0 40 04 00 00"));
    assert_eq!(&sent[80..82], &hex!("AA BB"));
    assert_eq!(sent.last(), Some(&0xA2));
}

#[test]
fn wrong_checksum_ack_halts_before_the_next_page() {
    let firmware = firmware(
        ":0404000001020304EE\n:02044000AABB55\n:00000001FF\n",
        FlashRangePolicy::Enforced,
    )
    .unwrap();

    let mut device = Bootloader::new(&hex!("55 55 55 55"));
    match firmware.upload(&mut device, None, ProgressBar::hidden()) {
        Err(Error::NoAck {
            step: Step::Checksum,
            address: 0x400,
            reply: Some(0x55),
        }) => {}
        other => panic!("unexpected result {:?}", other),
    }
    assert_eq!(device.received.len(), 1 + 4 + 64 + 4);
}
