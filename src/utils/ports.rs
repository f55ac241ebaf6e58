//! Serial port device manipulation.

use console::{style, Term};
use dialoguer::{theme::ColorfulTheme, Select};
use log::{debug, info};
use serialport::{available_ports, SerialPort, SerialPortType};

use crate::{Error, Settings};

//==============================================================================
// Public Interface
//==============================================================================

/// Ask the user to pick one of the serial ports present on the system.
///
/// Returns `None` when there is no port to choose from or the selection was
/// cancelled.
pub(crate) fn select_port() -> Result<Option<String>, Error> {
    let ports = enumerate_serial_ports();
    if ports.is_empty() {
        println!("{}", style("[UB] 🔌 No serial port found").yellow());
        return Ok(None);
    }

    let labels: Vec<&str> = ports.iter().map(|(_, label)| label.as_str()).collect();
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the port of the device")
        .items(&labels)
        .default(0)
        .interact_on_opt(&Term::stderr())?;

    Ok(selection.map(|index| ports[index].0.clone()))
}

/// Open the port named in `settings` and configure it for the bootloader.
///
/// Opening is attempted a few times since USB serial adapters may take a
/// moment to show up after the device was plugged in or reset.
pub(crate) fn open_and_setup_port(settings: &Settings) -> Result<Box<dyn SerialPort>, Error> {
    use retry::{delay, retry_with_index};

    let path = settings
        .path
        .as_deref()
        .ok_or_else(|| Error::Config("no serial port selected".into()))?;

    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(3),
        |attempt| -> Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Opening {} (attempt {})", path, attempt);
            serialport::new(path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control)
                .timeout(settings.timeout)
                .open()
        },
    );

    match result {
        Ok(port) => {
            info!("Connected to {} at {} baud", path, settings.baud_rate);
            debug!("data_bits    : {:?}", settings.data_bits);
            debug!("stop_bits    : {:?}", settings.stop_bits);
            debug!("parity       : {:?}", settings.parity);
            debug!("flow control : {:?}", settings.flow_control);
            debug!("timeout      : {:?}", settings.timeout);
            Ok(port)
        }
        Err(retry::Error::Operation {
            error,
            total_delay,
            tries,
        }) => {
            info!(
                "Failed to open the port after {:?} and {} tries: {}",
                total_delay, tries, error,
            );
            Err(error.into())
        }
        Err(retry::Error::Internal(reason)) => Err(serialport::Error::new(
            serialport::ErrorKind::Unknown,
            format!("internal error while opening the port: {}", reason),
        )
        .into()),
    }
}

//==============================================================================
// Private stuff
//==============================================================================

/// Serial ports on the system as `(name, label)`, USB adapters labelled with
/// their manufacturer and product.
fn enumerate_serial_ports() -> Vec<(String, String)> {
    match available_ports() {
        Ok(ports) => ports
            .into_iter()
            .map(|port| {
                let label = match &port.port_type {
                    SerialPortType::UsbPort(usb) => format!(
                        "{}: ({} / {})",
                        port.port_name,
                        usb.manufacturer.as_deref().unwrap_or(""),
                        usb.product.as_deref().unwrap_or("")
                    ),
                    _ => port.port_name.clone(),
                };
                (port.port_name, label)
            })
            .collect(),
        Err(ref e) => {
            info!("error: {}", e);
            Vec::new()
        }
    }
}
