//! `uartboot` page upload protocol.
//!
//! Each page is pushed with a four step handshake, every step acknowledged
//! by the bootloader with a single byte:
//!
//! | Step           | Host -> Device                 | Device -> Host |
//! |----------------|--------------------------------|----------------|
//! | Init (option)  | caller supplied bytes          | `0x01`         |
//! | Start of frame | `0xA0`                         | `0x55`         |
//! | Address        | page address, 4 bytes LE       | `0x55`         |
//! | Data           | `page_size` bytes              | `0x55`         |
//! | Checksum       | CRC-32 of the data, 4 bytes LE | `0x77`         |
//! | Page complete  |                                | `0x55`         |
//! | Reboot         | `0xA2`                         |                |
//!
//! Any other reply, or no reply before the link read timeout, aborts the
//! whole upload. Nothing is retried.
//!
//! **Example** - Running the protocol over an open link:
//! ```ignore
//! use crate::upload_protocol::{self as upsm, UploadJob};
//!
//! let job = UploadJob { image: &image, plan: &plan, init_sequence: None };
//! let mut upload = upsm::factory(&mut port, job, ProgressBar::hidden());
//! let report = upload.run()?;
//! ```

use crc::{Crc, CRC_32_ISO_HDLC};

mod events;
mod link;
mod state_machine;
mod states;

pub use link::Link;
pub use state_machine::{factory, UploadJob, UploadProtocol, UploadReport};

/// Expected answer to the bootloader init sequence.
pub const INIT_ACK: u8 = 0x01;
/// Start of a page frame.
pub const START_OF_FRAME: u8 = 0xA0;
/// Acknowledgement of the frame, address and data steps and of the page
/// commit.
pub const ACK: u8 = 0x55;
/// Acknowledgement of the checksum step.
pub const CHECKSUM_ACK: u8 = 0x77;
/// Asks the bootloader to start the application. Not answered.
pub const REBOOT: u8 = 0xA2;

/// The standard CRC-32 sent after each page.
pub const PAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);
