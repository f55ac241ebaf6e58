//! `uartboot` uploads firmware to a device running a minimal UART bootloader.
//!
//! The firmware comes as an Intel HEX file. It is decoded into a flat image of
//! the device flash, cut into pages, and each page is pushed with a small
//! acknowledged handshake before the device is told to reboot into the new
//! application.
//!
//! The work is split in two independent halves:
//!
//! * [`firmware`] is a pure pipeline turning hex lines into a [`MemoryImage`]
//!   and a [`PagePlan`]. It validates every record checksum and, when asked
//!   to, rejects data that would overwrite the bootloader or that lies past
//!   the end of the flash.
//! * [`upload_protocol`] is a state machine doing nothing but I/O over a
//!   [`Link`](upload_protocol::Link), typically the serial port.
//!
//! The state machine follows these rules:
//!
//! * Can only be in one state at any time.
//! * Each state can have its own associated data if needed. Data shared by all
//!   states (the link, the image, statistics) lives in a session passed to
//!   every state.
//! * Transitions between states are triggered via typed **events**. A state
//!   transition is implemented with the `From` trait, converting the event into
//!   the next state. Only the transitions for which a `From` implementation
//!   exists are possible, anything else is rejected at compile time.
//! * Any protocol violation takes the machine straight to its final state with
//!   the error that caused it. Nothing is retried.
//!
//! Every failure is reported as one [`Error`] variant, which maps to a stable
//! process exit code with [`Error::exit_code`].

mod error;
mod flasher;
pub mod firmware;
mod settings;
pub mod upload_protocol;
mod utils;

pub use error::{Error, Step};
pub use firmware::{FlashLayout, FlashRangePolicy, MemoryImage, PagePlan};
pub use flasher::{flash, Firmware};
pub use settings::{parse_init_sequence, parse_number, Settings, SettingsBuilder};
pub use upload_protocol::UploadReport;
