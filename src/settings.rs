//! Settings related to the `uartboot` serial port, flash layout and upload.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

use std::time::Duration;

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::firmware::{FlashLayout, FlashRangePolicy};
use crate::Error;

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by `uartboot` and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path. When not set, the port is
    /// selected interactively.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,
    /// How long to wait for each reply of the bootloader.
    pub timeout: Duration,

    /// Path to the Intel HEX file to be uploaded.
    pub hex_file: String,

    /// Size of the flash region reserved for the bootloader.
    pub bootloader_size: u32,
    /// Flash capacity of the device.
    pub flash_size: u32,
    /// Flash page size, the unit of each transfer.
    pub page_size: u32,
    /// Bytes sent to get the device into its bootloader. When not set, the
    /// bootloader is assumed to be running already.
    pub init_sequence: Option<Vec<u8>>,
    /// Whether data outside of the writable flash aborts the upload.
    pub range_policy: FlashRangePolicy,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

impl Settings {
    /// The validated flash layout.
    pub fn layout(&self) -> Result<FlashLayout, Error> {
        FlashLayout::new(self.bootloader_size, self.flash_size, self.page_size)
    }
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```
/// use uartboot::SettingsBuilder;
///
/// let settings = SettingsBuilder::new()
///     .path("/dev/ttyUSB0")
///     .hex_file("firmware.hex")
///     .strict(true)
///     .finalize();
/// assert_eq!(settings.baud_rate, 57_600);
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 57_600,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                timeout: Duration::from_secs(3),
                hex_file: "main.hex".into(),
                bootloader_size: 0x400,
                flash_size: 0x4000,
                page_size: 64,
                init_sequence: None,
                range_policy: FlashRangePolicy::Permissive,
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().into_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the reply timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.settings.timeout = timeout;
        self
    }

    /// Set the path to the hex file
    pub fn hex_file<'a>(mut self, hex_file: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.hex_file = hex_file.into().into_owned();
        self
    }

    pub fn bootloader_size(mut self, bootloader_size: u32) -> Self {
        self.settings.bootloader_size = bootloader_size;
        self
    }

    pub fn flash_size(mut self, flash_size: u32) -> Self {
        self.settings.flash_size = flash_size;
        self
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.settings.page_size = page_size;
        self
    }

    /// Set the bytes that trigger the bootloader
    pub fn init_sequence(mut self, init_sequence: Vec<u8>) -> Self {
        self.settings.init_sequence = Some(init_sequence);
        self
    }

    /// Abort on data outside of the writable flash when `strict` is set
    pub fn strict(mut self, strict: bool) -> Self {
        self.settings.range_policy = if strict {
            FlashRangePolicy::Enforced
        } else {
            FlashRangePolicy::Permissive
        };
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an unsigned number the way it is written on the command line:
/// decimal, or hexadecimal/octal/binary with a `0x`/`0o`/`0b` prefix.
/// Underscores may separate digits.
pub fn parse_number(value: &str) -> Result<u32, Error> {
    parse_int::parse::<u32>(value.trim())
        .map_err(|e| Error::Config(format!("`{}` is not a valid number: {}", value, e)))
}

/// Parse a hex string such as `"55aa 0102"` into bytes. Whitespace between
/// bytes is ignored.
pub fn parse_init_sequence(value: &str) -> Result<Vec<u8>, Error> {
    let digits: String = value.split_whitespace().collect();
    if digits.is_empty() {
        return Err(Error::Config("the init sequence must not be empty".into()));
    }

    hex::decode(&digits)
        .map_err(|e| Error::Config(format!("`{}` is not a valid hex string: {}", value, e)))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            baud_rate: 57_600,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            timeout: Duration::from_secs(3),
            hex_file: "main.hex".into(),
            bootloader_size: 0x400,
            flash_size: 0x4000,
            page_size: 64,
            init_sequence: None,
            range_policy: FlashRangePolicy::Permissive,
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn baud_rate() {
    let baud_rate = 115_200;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn serial_framing() {
    let settings = SettingsBuilder::new()
        .data_bits(DataBits::Seven)
        .flow_control(FlowControl::Hardware)
        .parity(Parity::Even)
        .stop_bits(StopBits::Two)
        .timeout(Duration::from_millis(500))
        .finalize();
    assert_eq!(settings.data_bits, DataBits::Seven);
    assert_eq!(settings.flow_control, FlowControl::Hardware);
    assert_eq!(settings.parity, Parity::Even);
    assert_eq!(settings.stop_bits, StopBits::Two);
    assert_eq!(settings.timeout, Duration::from_millis(500));
}

#[test]
fn hex_file() {
    let settings = SettingsBuilder::new().hex_file("blinky.hex").finalize();
    assert_eq!(settings.hex_file, "blinky.hex");
}

#[test]
fn strict() {
    let settings = SettingsBuilder::new().strict(true).finalize();
    assert_eq!(settings.range_policy, FlashRangePolicy::Enforced);
    let settings = SettingsBuilder::new().strict(false).finalize();
    assert_eq!(settings.range_policy, FlashRangePolicy::Permissive);
}

#[test]
fn layout() {
    let layout = SettingsBuilder::new()
        .bootloader_size(0x800)
        .flash_size(0x8000)
        .page_size(128)
        .finalize()
        .layout()
        .unwrap();
    assert_eq!(layout.bootloader_size(), 0x800);
    assert_eq!(layout.flash_size(), 0x8000);
    assert_eq!(layout.page_size(), 128);

    let settings = SettingsBuilder::new().page_size(0).finalize();
    assert!(matches!(settings.layout(), Err(Error::Config(_))));
}

#[test]
fn numbers() {
    assert_eq!(parse_number("64").unwrap(), 64);
    assert_eq!(parse_number("0x400").unwrap(), 0x400);
    assert_eq!(parse_number(" 0x4000 ").unwrap(), 0x4000);
    assert_eq!(parse_number("0o17").unwrap(), 0o17);
    assert_eq!(parse_number("0b1010").unwrap(), 10);
    assert_eq!(parse_number("0x4_000").unwrap(), 0x4000);
    assert!(matches!(parse_number("0x"), Err(Error::Config(_))));
    assert!(matches!(parse_number("sixty"), Err(Error::Config(_))));
    assert!(matches!(parse_number("0x100000000"), Err(Error::Config(_))));
}

#[test]
fn init_sequences() {
    assert_eq!(parse_init_sequence("55aa").unwrap(), vec![0x55, 0xAA]);
    assert_eq!(
        parse_init_sequence("de ad BE EF").unwrap(),
        vec![0xDE, 0xAD, 0xBE, 0xEF]
    );
    assert!(parse_init_sequence("").is_err());
    assert!(parse_init_sequence("abc").is_err());
    assert!(parse_init_sequence("zz").is_err());
    assert!(parse_init_sequence("é1").is_err());
    assert!(matches!(parse_init_sequence("  "), Err(Error::Config(_))));
    assert!(matches!(parse_init_sequence("7f 7"), Err(Error::Config(_))));
}
