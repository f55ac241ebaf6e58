//! Byte level access to the bootloader.

use std::io::{self, Read, Write};

use log::trace;

use crate::error::{Error, Reply, Step};

/// A duplex byte channel to the device with a bounded read timeout.
///
/// Implemented for anything that is `Read + Write`, in particular the
/// `Box<dyn SerialPort>` returned by `serialport`. A read that times out must
/// fail with [`io::ErrorKind::TimedOut`].
pub trait Link: Read + Write {}

impl<T: Read + Write> Link for T {}

/// Write all of `bytes` and flush them to the device.
pub(crate) fn send<L: Link>(link: &mut L, bytes: &[u8]) -> Result<(), Error> {
    link.write_all(bytes)?;
    link.flush()?;
    Ok(())
}

/// Read a single reply byte. A timeout yields `None`, it is handled like a
/// wrong reply by the callers.
pub(crate) fn receive<L: Link>(link: &mut L) -> Result<Option<u8>, Error> {
    let mut buf = [0u8; 1];
    match link.read_exact(&mut buf) {
        Ok(()) => Ok(Some(buf[0])),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::UnexpectedEof | io::ErrorKind::WouldBlock
            ) =>
        {
            trace!("read timed out: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Send `bytes` for a handshake `step` and check that the device answered
/// with `expected`.
pub(crate) fn exchange<L: Link>(
    link: &mut L,
    step: Step,
    address: u32,
    bytes: &[u8],
    expected: u8,
) -> Result<(), Error> {
    send(link, bytes)?;
    let reply = receive(link)?;
    if reply != Some(expected) {
        return Err(Error::NoAck {
            step,
            address,
            reply,
        });
    }
    trace!("{:<4}<- {}", step, Reply(&reply));
    Ok(())
}
