//! States for the `uartboot` upload protocol state machine.
//!
//! This module is private and restricted to the
//! [`upload_protocol`](crate::upload_protocol) scope. The public interface of
//! the upload protocol state machine is provided by
//! [`upload_protocol`](crate::upload_protocol).
//!
//! Refer to the [`state_machine`](super::state_machine) module for an overview
//! of states, events and transitions.

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, trace, Level::Debug};

use super::events::*;
use super::link::{exchange, receive, send, Link};
use super::state_machine::Session;
use super::{ACK, CHECKSUM_ACK, INIT_ACK, PAGE_CRC, REBOOT, START_OF_FRAME};
use crate::error::{Reply, Step};
use crate::firmware::Page;
use crate::Error;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into it.
pub(crate) trait Runnable {
    /// Does the work of the state over the session link and requests the
    /// next transition by returning the appropriate `event`.
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event;
}

/// Event to transfer the page at `index` of the plan, or to reboot when the
/// plan is exhausted.
fn next_page<L: Link>(session: &Session<'_, L>, index: usize) -> Event {
    match session.job.plan.get(index) {
        Some(page) => Event::StartFrame(StartFrameEvent { page }),
        None => Event::Reboot(RebootEvent {}),
    }
}

// Init State ==================================================================

/// The initial state of the upload protocol state machine.
///
/// When an init sequence is configured, it is sent to get the device into its
/// bootloader, which must answer with `0x01`. Without one, the bootloader is
/// assumed to be running already.
///
///  * **[`StartFrameEvent`] => [`StartOfFrameState`]** for the first page,
///  * **[`RebootEvent`] => [`RebootState`]** when no page is planned,
///  * **[`DoneEvent`] => [`DoneState`]** when the device does not answer.
#[derive(Debug)]
pub(crate) struct InitState {}
impl InitState {
    fn trigger_bootloader<L: Link>(&self, session: &mut Session<'_, L>) -> Result<Event, Error> {
        match session.job.init_sequence {
            Some(sequence) => {
                debug!("Sending init sequence: {:02x?}", sequence);
                send(session.link, sequence)?;
                let reply = receive(session.link)?;
                if reply != Some(INIT_ACK) {
                    return Err(Error::InitFailed { reply });
                }
                debug!("Bootloader answered the init sequence");
            }
            None => info!("Assuming bootloader is present."),
        }
        Ok(next_page(session, 0))
    }
}
impl Runnable for InitState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        trace!("=> Init");
        self.trigger_bootloader(session)
            .unwrap_or_else(Event::from)
    }
}

// StartOfFrame State ==========================================================

/// Opens the frame of a page.
///
///  * **[`SendAddressEvent`] => [`AddressState`]** on `0x55`,
///  * **[`DoneEvent`] => [`DoneState`]** otherwise.
#[derive(Debug)]
pub(crate) struct StartOfFrameState {
    pub page: Page,
}
impl Runnable for StartOfFrameState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        trace!("SOF -> {:#04X}", START_OF_FRAME);
        let page = self.page;
        exchange(
            session.link,
            Step::StartOfFrame,
            page.address,
            &[START_OF_FRAME],
            ACK,
        )
        .map(|_| Event::SendAddress(SendAddressEvent { page }))
        .unwrap_or_else(Event::from)
    }
}

// Address State ===============================================================

/// Sends the page start address, least significant byte first.
///
///  * **[`SendDataEvent`] => [`DataState`]** on `0x55`,
///  * **[`DoneEvent`] => [`DoneState`]** otherwise.
#[derive(Debug)]
pub(crate) struct AddressState {
    pub page: Page,
}
impl Runnable for AddressState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        let page = self.page;
        let address = page.address.to_le_bytes();
        trace!("ADDR-> {:02X?}", address);
        exchange(session.link, Step::Address, page.address, &address, ACK)
            .map(|_| Event::SendData(SendDataEvent { page }))
            .unwrap_or_else(Event::from)
    }
}

// Data State ==================================================================

/// Sends exactly one page of data taken from the memory image. Bytes past the
/// end of the image are sent as zero.
///
///  * **[`SendChecksumEvent`] => [`ChecksumState`]** on `0x55`,
///  * **[`DoneEvent`] => [`DoneState`]** otherwise.
#[derive(Debug)]
pub(crate) struct DataState {
    pub page: Page,
}
impl Runnable for DataState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        let page = self.page;
        let data = session
            .job
            .image
            .page(page.address, session.job.plan.page_size());

        // Dump the page in a hex table for debugging
        if log_enabled!(Debug) {
            let view = HexViewBuilder::new(&data)
                .address_offset(page.address as usize)
                .row_width(16)
                .finish();
            debug!("DATA->\n{}", view);
        }

        exchange(session.link, Step::Data, page.address, &data, ACK)
            .map(|_| {
                Event::SendChecksum(SendChecksumEvent {
                    page,
                    checksum: PAGE_CRC.checksum(&data),
                })
            })
            .unwrap_or_else(Event::from)
    }
}

// Checksum State ==============================================================

/// Sends the CRC-32 of the page data, least significant byte first. The
/// device acknowledges this step with `0x77`.
///
///  * **[`AwaitCommitEvent`] => [`CommitState`]** on `0x77`,
///  * **[`DoneEvent`] => [`DoneState`]** otherwise.
#[derive(Debug)]
pub(crate) struct ChecksumState {
    pub page: Page,
    pub checksum: u32,
}
impl Runnable for ChecksumState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        let page = self.page;
        trace!("CHK -> {:08X}", self.checksum);
        exchange(
            session.link,
            Step::Checksum,
            page.address,
            &self.checksum.to_le_bytes(),
            CHECKSUM_ACK,
        )
        .map(|_| Event::AwaitCommit(AwaitCommitEvent { page }))
        .unwrap_or_else(Event::from)
    }
}

// Commit State ================================================================

/// Waits for the device to confirm the page was written to flash.
///
///  * **[`StartFrameEvent`] => [`StartOfFrameState`]** for the next page,
///  * **[`RebootEvent`] => [`RebootState`]** after the last page,
///  * **[`DoneEvent`] => [`DoneState`]** when the device reports a failure.
#[derive(Debug)]
pub(crate) struct CommitState {
    pub page: Page,
}
impl CommitState {
    fn await_commit<L: Link>(&self, session: &mut Session<'_, L>) -> Result<Event, Error> {
        let reply = receive(session.link)?;
        if reply != Some(ACK) {
            return Err(Error::FlashFailed {
                address: self.page.address,
                reply,
            });
        }
        trace!("PAGE<- {}", Reply(&reply));

        session.pages_written += 1;
        session.bytes_written += session.job.plan.page_size() as usize;
        session.progress.inc(1);
        info!(
            "Page {}/{} written.",
            self.page.number,
            session.job.plan.len()
        );

        // Page numbers start at 1, so the number is the index of the next one.
        Ok(next_page(session, self.page.number))
    }
}
impl Runnable for CommitState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        self.await_commit(session).unwrap_or_else(Event::from)
    }
}

// Reboot State ================================================================

/// Tells the bootloader to start the freshly written application. The device
/// does not answer.
///
///  * **[`DoneEvent`] => [`DoneState`]** always.
#[derive(Debug)]
pub(crate) struct RebootState {}
impl Runnable for RebootState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        info!("Rebooting device.");
        trace!("RBT -> {:#04X}", REBOOT);
        Event::Done(DoneEvent {
            error: send(session.link, &[REBOOT]).err(),
        })
    }
}

// Done State ==================================================================

/// Reached when the upload completes, successfully or not.
///
/// Like in a 2-phase exit, the state first runs like any other one to report
/// the outcome, then triggers the [`ExitEvent`] which ends the event loop.
#[derive(Debug)]
pub(crate) struct DoneState {
    /// The error that aborted the upload, if any. Taken when exiting.
    pub error: Option<Error>,
    /// When `true` instructs the state machine to exit its event loop.
    pub should_exit: bool,
}
impl Runnable for DoneState {
    fn run<L: Link>(&mut self, session: &mut Session<'_, L>) -> Event {
        match &self.error {
            Some(error) => {
                debug!("=> Done with errors: {}", error);
                session.progress.abandon();
            }
            None => {
                debug!("=> Done with no errors");
                session.progress.finish();
            }
        }

        Event::Exit(ExitEvent {
            error: self.error.take(),
        })
    }
}
