//! Splitting the written part of the image into flash pages.

use super::image::FlashLayout;

/// One page to be transferred.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Page {
    /// Position in the plan, starting at 1.
    pub number: usize,
    /// Start address of the page.
    pub address: u32,
}

/// The ordered, contiguous sequence of pages covering the written image.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PagePlan {
    addresses: Vec<u32>,
    page_size: u32,
}

impl PagePlan {
    /// Plan the pages needed to transfer everything up to
    /// `highest_written_address`.
    ///
    /// The last page boundary is `ceil(highest / page_size) * page_size` and
    /// pages start at the bootloader size rounded down to a page boundary. No
    /// page is planned when nothing was written past the bootloader.
    pub fn new(highest_written_address: u32, layout: &FlashLayout) -> Self {
        PagePlan {
            addresses: plan(highest_written_address, layout),
            page_size: layout.page_size(),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Number of pages, as reported in the progress.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// The page at `index` (0 based).
    pub fn get(&self, index: usize) -> Option<Page> {
        self.addresses.get(index).map(|&address| Page {
            number: index + 1,
            address,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = Page> + '_ {
        self.addresses
            .iter()
            .enumerate()
            .map(|(index, &address)| Page {
                number: index + 1,
                address,
            })
    }

    /// Page start addresses in transfer order.
    pub fn addresses(&self) -> &[u32] {
        &self.addresses
    }

    /// End of the last page, exclusive.
    pub fn end(&self) -> Option<u32> {
        self.addresses.last().map(|last| last + self.page_size)
    }
}

/// Page start addresses for the given watermark and layout.
pub fn plan(highest_written_address: u32, layout: &FlashLayout) -> Vec<u32> {
    let page_size = u64::from(layout.page_size());
    let highest = u64::from(highest_written_address);
    let bootloader_size = u64::from(layout.bootloader_size());

    let page_count = (highest + page_size - 1) / page_size;
    let last_page_boundary = page_count * page_size;
    let first_page = (bootloader_size / page_size) * page_size;

    if highest <= bootloader_size || first_page >= last_page_boundary {
        return Vec::new();
    }

    (first_page..last_page_boundary)
        .step_by(page_size as usize)
        .map(|address| address as u32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(bootloader_size: u32, page_size: u32) -> FlashLayout {
        FlashLayout::new(bootloader_size, 0x4000, page_size).unwrap()
    }

    #[test]
    fn nothing_written_past_the_bootloader() {
        let layout = layout(0x400, 64);
        assert!(plan(0, &layout).is_empty());
        assert!(plan(0x3FF, &layout).is_empty());
        assert!(plan(0x400, &layout).is_empty());
        assert!(PagePlan::new(0x100, &layout).is_empty());
    }

    #[test]
    fn partial_last_page_is_padded() {
        let layout = layout(0x400, 64);
        assert_eq!(plan(0x401, &layout), vec![0x400]);
        assert_eq!(plan(0x43F, &layout), vec![0x400]);
        assert_eq!(plan(0x441, &layout), vec![0x400, 0x440]);
    }

    #[test]
    fn aligned_watermark_ends_at_its_boundary() {
        let layout = layout(0x400, 64);
        assert_eq!(plan(0x480, &layout), vec![0x400, 0x440]);
    }

    #[test]
    fn unaligned_bootloader_rounds_down() {
        let layout = layout(0x410, 64);
        let pages = plan(0x4A0, &layout);

        assert_eq!(pages, vec![0x400, 0x440, 0x480]);
        // ceil(0x4A0 / 64) - floor(0x410 / 64)
        assert_eq!(pages.len(), 19 - 16);
    }

    #[test]
    fn pages_are_contiguous_and_bounded() {
        let layout = layout(0x400, 64);
        let plan = PagePlan::new(0x1234, &layout);
        let end = plan.end().unwrap();

        assert_eq!(end, 0x1240);
        for pair in plan.addresses().windows(2) {
            assert_eq!(pair[1] - pair[0], 64);
        }
        assert!(plan.iter().all(|page| page.address >= 0x400 && page.address < end));
        assert_eq!(plan.len(), (0x1240 - 0x400) / 64);
    }

    #[test]
    fn planning_is_deterministic() {
        let layout = layout(0x400, 128);
        assert_eq!(PagePlan::new(0x2F00, &layout), PagePlan::new(0x2F00, &layout));
    }

    #[test]
    fn pages_are_numbered_from_one() {
        let plan = PagePlan::new(0x4C0, &layout(0x400, 64));
        let numbers: Vec<usize> = plan.iter().map(|page| page.number).collect();

        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(
            plan.get(2),
            Some(Page {
                number: 3,
                address: 0x480
            })
        );
        assert_eq!(plan.get(3), None);
    }
}
