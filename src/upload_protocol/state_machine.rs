//! `uartboot` upload protocol state machine.
//!
//! The upload has an optional init step, then the four step handshake for
//! every planned page followed by the commit confirmation, and finally the
//! reboot command. Any unexpected reply ends the upload right away.
//!
//! ```text
//!                  START
//!                    |
//!                    v
//!               .---------.   no pages    .--------.
//!               |  Init   |-------------->| Reboot |
//!               '---------'               '--------'
//!                    |                       ^   |
//!                    v        last page      |   |
//!             .--------------.---------------'   |
//!        .--->| StartOfFrame |                   |
//!        |    '--------------'                   |
//!        |           |                           |
//!        |           v                           |
//!        |      .---------.                      |
//!        |      | Address |                      |
//!        |      '---------'                      |
//!        |           |                           |
//!        |           v                           |
//!   next |       .------.       any wrong        |
//!   page |       | Data |       reply or         |
//!        |       '------'       timeout          |
//!        |           |             |             |
//!        |           v             v             v
//!        |     .----------.   ..........    .------.
//!        |     | Checksum |   : abort  :--->| Done |--> END
//!        |     '----------'   ''''''''''    '------'
//!        |           |
//!        |           v
//!        |      .--------.
//!        '------| Commit |
//!               '--------'
//! ```
//!
//! States are implemented in terms of typed **events** and `From`
//! transitions: only the transitions for which a `From` implementation exists
//! are possible.

use indicatif::ProgressBar;

use super::events::*;
use super::link::Link;
use super::states::*;
use crate::firmware::{MemoryImage, PagePlan};
use crate::Error;

// =============================================================================
// Public Interface
// =============================================================================

/// What to upload.
#[derive(Debug, Copy, Clone)]
pub struct UploadJob<'a> {
    /// The image the page data is read from.
    pub image: &'a MemoryImage,
    /// The pages to transfer, in order.
    pub plan: &'a PagePlan,
    /// Bytes that get the device into its bootloader, if needed.
    pub init_sequence: Option<&'a [u8]>,
}

/// Summary of a successful upload.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct UploadReport {
    pub pages_written: usize,
    pub bytes_written: usize,
}

/// Represents the `uartboot` upload protocol state machine. Use the
/// `factory()` function to get an instance then run it by calling its `run()`
/// method.
pub struct UploadProtocol<'a, L: Link> {
    session: Session<'a, L>,
    sm: ProtocolStates,
}
impl<'a, L: Link> UploadProtocol<'a, L> {
    /// The upload event loop runs until the `Done` state is reached and its
    /// `should_exit` flag is set. It then returns the report of the upload,
    /// or the error that aborted it.
    ///
    /// The machine is consumed, an upload cannot be run twice:
    ///
    /// ```compile_fail
    /// # use indicatif::ProgressBar;
    /// # use uartboot::{FlashLayout, MemoryImage, PagePlan};
    /// # use uartboot::upload_protocol::{factory, UploadJob};
    /// # let layout = FlashLayout::new(0x400, 0x4000, 64).unwrap();
    /// # let image = MemoryImage::new(0x4000);
    /// # let plan = PagePlan::new(0, &layout);
    /// # let mut link = std::io::Cursor::new(Vec::new());
    /// let job = UploadJob { image: &image, plan: &plan, init_sequence: None };
    /// let protocol = factory(&mut link, job, ProgressBar::hidden());
    /// let _ = protocol.run();
    /// let _ = protocol.run();
    /// ```
    pub fn run(mut self) -> Result<UploadReport, Error> {
        loop {
            self.sm = self.sm.step(&mut self.session);
            if let ProtocolStates::Done(state) = &mut self.sm {
                if state.should_exit {
                    return match state.error.take() {
                        Some(error) => Err(error),
                        None => Ok(UploadReport {
                            pages_written: self.session.pages_written,
                            bytes_written: self.session.bytes_written,
                        }),
                    };
                }
            }
        }
    }
}

/// Factory function for the `uartboot` upload protocol state machine. Use it
/// to get an instance, which you can run by invoking its `run()` method.
///
/// `progress` is advanced by one for each committed page.
pub fn factory<'a, L: Link>(
    link: &'a mut L,
    job: UploadJob<'a>,
    progress: ProgressBar,
) -> UploadProtocol<'a, L> {
    progress.set_length(job.plan.len() as u64);
    UploadProtocol {
        session: Session {
            link,
            job,
            progress,
            pages_written: 0,
            bytes_written: 0,
        },
        // The machine naturally starts in the `Init` state.
        sm: ProtocolStates::Init(InitState {}),
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Data shared by all states: the link, the job and the upload statistics.
pub(crate) struct Session<'a, L: Link> {
    pub link: &'a mut L,
    pub job: UploadJob<'a>,
    pub progress: ProgressBar,
    pub pages_written: usize,
    pub bytes_written: usize,
}

/// An enum wrapper around the states of the upload protocol state machine.
#[derive(Debug)]
enum ProtocolStates {
    Init(InitState),
    StartOfFrame(StartOfFrameState),
    Address(AddressState),
    Data(DataState),
    Checksum(ChecksumState),
    Commit(CommitState),
    Reboot(RebootState),
    Done(DoneState),
}
impl ProtocolStates {
    /// The unit of work in the state machine event loop. It runs the current
    /// state and turns the returned event into the next state. An event that
    /// has no transition from the current state is a bug.
    fn step<L: Link>(&mut self, session: &mut Session<'_, L>) -> Self {
        match self {
            ProtocolStates::Init(state) => match state.run(session) {
                Event::StartFrame(ev) => ProtocolStates::StartOfFrame(ev.into()),
                Event::Reboot(ev) => ProtocolStates::Reboot(ev.into()),
                Event::Done(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
            ProtocolStates::StartOfFrame(state) => match state.run(session) {
                Event::SendAddress(ev) => ProtocolStates::Address(ev.into()),
                Event::Done(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
            ProtocolStates::Address(state) => match state.run(session) {
                Event::SendData(ev) => ProtocolStates::Data(ev.into()),
                Event::Done(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
            ProtocolStates::Data(state) => match state.run(session) {
                Event::SendChecksum(ev) => ProtocolStates::Checksum(ev.into()),
                Event::Done(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
            ProtocolStates::Checksum(state) => match state.run(session) {
                Event::AwaitCommit(ev) => ProtocolStates::Commit(ev.into()),
                Event::Done(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
            ProtocolStates::Commit(state) => match state.run(session) {
                Event::StartFrame(ev) => ProtocolStates::StartOfFrame(ev.into()),
                Event::Reboot(ev) => ProtocolStates::Reboot(ev.into()),
                Event::Done(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
            ProtocolStates::Reboot(state) => match state.run(session) {
                Event::Done(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
            ProtocolStates::Done(state) => match state.run(session) {
                Event::Exit(ev) => ProtocolStates::Done(ev.into()),
                event => unreachable!("illegal event {:#?} at current state {:#?}", event, state),
            },
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<StartFrameEvent> for StartOfFrameState {
    fn from(event: StartFrameEvent) -> StartOfFrameState {
        StartOfFrameState { page: event.page }
    }
}

impl From<SendAddressEvent> for AddressState {
    fn from(event: SendAddressEvent) -> AddressState {
        AddressState { page: event.page }
    }
}

impl From<SendDataEvent> for DataState {
    fn from(event: SendDataEvent) -> DataState {
        DataState { page: event.page }
    }
}

impl From<SendChecksumEvent> for ChecksumState {
    fn from(event: SendChecksumEvent) -> ChecksumState {
        ChecksumState {
            page: event.page,
            checksum: event.checksum,
        }
    }
}

impl From<AwaitCommitEvent> for CommitState {
    fn from(event: AwaitCommitEvent) -> CommitState {
        CommitState { page: event.page }
    }
}

impl From<RebootEvent> for RebootState {
    fn from(_: RebootEvent) -> RebootState {
        RebootState {}
    }
}

impl From<DoneEvent> for DoneState {
    fn from(event: DoneEvent) -> DoneState {
        DoneState {
            error: event.error,
            should_exit: false,
        }
    }
}

impl From<ExitEvent> for DoneState {
    fn from(event: ExitEvent) -> DoneState {
        DoneState {
            error: event.error,
            should_exit: true,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
