//! Firmware image preparation: hex records to a flat image to flash pages.
//!
//! The pipeline has no I/O of its own beyond reading the hex lines:
//!
//! ```text
//!  lines --> Record::decode --> MemoryImage::apply --> PagePlan::new
//! ```
//!
//! **Example**
//!
//! ```
//! use uartboot::firmware::{FlashLayout, FlashRangePolicy, MemoryImage, PagePlan};
//!
//! let layout = FlashLayout::new(0x400, 0x4000, 64)?;
//! let lines = [":0404000001020304EE", ":00000001FF"];
//! let image = MemoryImage::from_lines(lines.iter(), &layout, FlashRangePolicy::Enforced)?;
//! let plan = PagePlan::new(image.highest_written_address(), &layout);
//! assert_eq!(plan.addresses(), &[0x400]);
//! # Ok::<(), uartboot::Error>(())
//! ```

mod image;
mod pages;
mod record;

pub use image::{FlashLayout, FlashRangePolicy, MemoryImage};
pub use pages::{plan, Page, PagePlan};
pub use record::{Record, RecordType};
