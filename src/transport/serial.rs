//! Serial port link.

use tokio_serial::{DataBits, SerialPortBuilder, SerialStream, StopBits};

use super::StreamLink;
use crate::config::{Parity, SerialConfig};
use crate::error::{IcePlantError, Result};

/// Build the port settings for `config`.
///
/// The port-level timeout is the driver's; reads are bounded separately by
/// the link.
pub fn serial_builder(config: &SerialConfig) -> Result<SerialPortBuilder> {
    let data_bits = match config.data_bits {
        5 => DataBits::Five,
        6 => DataBits::Six,
        7 => DataBits::Seven,
        8 => DataBits::Eight,
        other => {
            return Err(IcePlantError::Config(format!(
                "unsupported data bits: {}",
                other
            )))
        }
    };
    let stop_bits = match config.stop_bits {
        1 => StopBits::One,
        2 => StopBits::Two,
        other => {
            return Err(IcePlantError::Config(format!(
                "unsupported stop bits: {}",
                other
            )))
        }
    };
    let parity = match config.parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Odd => tokio_serial::Parity::Odd,
        Parity::Even => tokio_serial::Parity::Even,
    };

    Ok(tokio_serial::new(&config.port, config.baud_rate)
        .data_bits(data_bits)
        .stop_bits(stop_bits)
        .parity(parity))
}

/// Open the configured serial port.
pub fn open_serial(config: &SerialConfig) -> Result<StreamLink<SerialStream>> {
    let builder = serial_builder(config)?;
    let stream = SerialStream::open(&builder)?;

    tracing::info!(
        port = %config.port,
        baud = config.baud_rate,
        data_bits = config.data_bits,
        parity = ?config.parity,
        stop_bits = config.stop_bits,
        "Opened serial port"
    );
    Ok(StreamLink::new(stream, config.port.clone()))
}
