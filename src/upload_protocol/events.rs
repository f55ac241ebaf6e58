//! Events for the `uartboot` upload protocol state machine.
//!
//! This module is private and restricted to the
//! [`upload_protocol`](crate::upload_protocol) scope.
//!
//! Each event requests one transition and carries the data the target state
//! needs. Refer to the [`state_machine`](super::state_machine) module for an
//! overview of states, events and transitions.

use crate::firmware::Page;
use crate::Error;

// StartFrameEvent =============================================================

/// Fired to start the transfer of `page` with the start-of-frame byte.
///
/// Happens after the init step for the first page and after each committed
/// page for the following one.
#[derive(Debug)]
pub(crate) struct StartFrameEvent {
    pub page: Page,
}

// SendAddressEvent ============================================================

/// Fired when the start of frame was acknowledged.
#[derive(Debug)]
pub(crate) struct SendAddressEvent {
    pub page: Page,
}

// SendDataEvent ===============================================================

/// Fired when the page address was acknowledged.
#[derive(Debug)]
pub(crate) struct SendDataEvent {
    pub page: Page,
}

// SendChecksumEvent ===========================================================

/// Fired when the page data was acknowledged.
#[derive(Debug)]
pub(crate) struct SendChecksumEvent {
    pub page: Page,
    /// CRC-32 of the bytes that were sent in the data step.
    pub checksum: u32,
}

// AwaitCommitEvent ============================================================

/// Fired when the checksum was acknowledged. The device now writes the page
/// and reports the outcome.
#[derive(Debug)]
pub(crate) struct AwaitCommitEvent {
    pub page: Page,
}

// RebootEvent =================================================================

/// Fired once every planned page is committed, or right after the init step
/// when there is nothing to transfer.
#[derive(Debug)]
pub(crate) struct RebootEvent {}

// DoneEvent ===================================================================

/// Fired when the upload completes, `error` tells whether it was aborted.
#[derive(Debug)]
pub(crate) struct DoneEvent {
    pub error: Option<Error>,
}

// ExitEvent ===================================================================

/// The last event of the state machine. Ends the event loop and hands the
/// outcome back to the caller of [`UploadProtocol::run`](super::UploadProtocol::run).
#[derive(Debug)]
pub(crate) struct ExitEvent {
    pub error: Option<Error>,
}

// Events enum =================================================================

#[derive(Debug)]
pub(crate) enum Event {
    StartFrame(StartFrameEvent),
    SendAddress(SendAddressEvent),
    SendData(SendDataEvent),
    SendChecksum(SendChecksumEvent),
    AwaitCommit(AwaitCommitEvent),
    Reboot(RebootEvent),
    Done(DoneEvent),
    Exit(ExitEvent),
}

impl From<Error> for Event {
    /// Any error aborts the upload.
    fn from(error: Error) -> Self {
        Event::Done(DoneEvent { error: Some(error) })
    }
}
