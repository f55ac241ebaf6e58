//! Runs a complete upload: hex file to image, image to pages, pages to the
//! device.
//!
//! **Example** - Flashing with the default layout:
//! ```no_run
//! use uartboot::{self as ub, SettingsBuilder};
//!
//! let settings = SettingsBuilder::new()
//!     .path("/dev/ttyUSB0")
//!     .hex_file("main.hex")
//!     .finalize();
//! let report = ub::flash(&settings)?;
//! println!("{} pages written", report.pages_written);
//! # Ok::<(), ub::Error>(())
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};

use crate::firmware::{FlashLayout, FlashRangePolicy, MemoryImage, PagePlan};
use crate::upload_protocol::{self as upsm, Link, UploadJob, UploadReport};
use crate::utils::{open_and_setup_port, select_port};
use crate::{Error, Settings};

// =============================================================================
// Public Interface
// =============================================================================

/// A decoded firmware image together with the pages needed to transfer it.
#[derive(Debug, Clone)]
pub struct Firmware {
    pub layout: FlashLayout,
    pub image: MemoryImage,
    pub plan: PagePlan,
}

impl Firmware {
    /// Read and decode the hex file named in `settings`.
    pub fn load(settings: &Settings) -> Result<Firmware, Error> {
        let layout = settings.layout()?;
        info!(
            "Valid flash range: {:#x} to {:#x}",
            layout.bootloader_size(),
            layout.flash_size()
        );

        debug!("Reading {}", settings.hex_file);
        let file = File::open(&settings.hex_file)?;
        Self::from_reader(BufReader::new(file), layout, settings.range_policy)
    }

    /// Decode the hex lines from `reader` and plan the pages.
    pub fn from_reader<R: BufRead>(
        reader: R,
        layout: FlashLayout,
        policy: FlashRangePolicy,
    ) -> Result<Firmware, Error> {
        let image = MemoryImage::from_reader(reader, &layout, policy)?;
        let plan = PagePlan::new(image.highest_written_address(), &layout);

        info!(
            "Got {} bytes of data up to {:#x}",
            image.bytes_written(),
            image.highest_written_address()
        );
        info!(
            "Padded data to {} bytes ({} pages)",
            plan.len() * layout.page_size() as usize,
            plan.len()
        );

        Ok(Firmware {
            layout,
            image,
            plan,
        })
    }

    /// Push the pages over `link` and reboot the device.
    pub fn upload<L: Link>(
        &self,
        link: &mut L,
        init_sequence: Option<&[u8]>,
        progress: ProgressBar,
    ) -> Result<UploadReport, Error> {
        let job = UploadJob {
            image: &self.image,
            plan: &self.plan,
            init_sequence,
        };
        upsm::factory(link, job, progress).run()
    }
}

/// Decode the hex file, open the serial port and upload the firmware.
///
/// The hex file is fully decoded before the port is opened, so a broken file
/// never reaches the device. The port is closed when this function returns,
/// whatever the outcome.
pub fn flash(settings: &Settings) -> Result<UploadReport, Error> {
    let firmware = Firmware::load(settings)?;

    let mut settings = settings.clone();
    if settings.path.is_none() {
        settings.path = select_port()?;
    }
    let mut port = open_and_setup_port(&settings)?;

    println!("[UB] ⚡ Flashing your device.");
    firmware.upload(
        &mut port,
        settings.init_sequence.as_deref(),
        progress_bar(firmware.plan.len()),
    )
}

// =============================================================================
// Private stuff
// =============================================================================

fn progress_bar(pages: usize) -> ProgressBar {
    let pb = ProgressBar::new(pages as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[UB] ⏩ Pages [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .progress_chars("=>-"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_the_configured_hex_file() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, ":0404000001020304EE").unwrap();
        writeln!(file, ":00000001FF").unwrap();

        let settings = crate::SettingsBuilder::new()
            .hex_file(file.path().to_string_lossy())
            .strict(true)
            .finalize();
        let firmware = Firmware::load(&settings).unwrap();

        assert_eq!(firmware.image.highest_written_address(), 0x403);
        assert_eq!(firmware.plan.addresses(), &[0x400]);
    }

    #[test]
    fn missing_hex_file_is_an_io_error() {
        let settings = crate::SettingsBuilder::new()
            .hex_file("/nonexistent/uartboot/main.hex")
            .finalize();
        assert!(matches!(Firmware::load(&settings), Err(Error::Io(_))));
    }

    #[test]
    fn invalid_layout_is_reported_before_reading() {
        let settings = crate::SettingsBuilder::new()
            .hex_file("/nonexistent/uartboot/main.hex")
            .flash_size(0x100)
            .finalize();
        assert!(matches!(Firmware::load(&settings), Err(Error::Config(_))));
    }
}
