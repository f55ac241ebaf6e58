//! Helper functions to deal with serial ports.

mod ports;

pub(crate) use ports::{open_and_setup_port, select_port};
