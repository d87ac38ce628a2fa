//! Physical serial port backed by `serial2`.

use std::io;
use std::time::Duration;

use serial2::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};
use tracing::{debug, info};

use crate::config::LinkConfig;
use crate::error::PortError;
use crate::link::SerialLink;

/// An open serial device configured for this protocol: 8 data bits, no
/// parity, one stop bit, no flow control.
#[derive(Debug)]
pub struct SerialDevice {
    port: SerialPort,
    path: String,
    baudrate: u32,
}

impl SerialDevice {
    /// Opens and configures the device named by `config`.
    ///
    /// Applies the adaptive read timeout unless the caller picked an
    /// explicit one (see [`LinkConfig::effective_read_timeout`]).
    pub fn open(config: &LinkConfig) -> Result<Self, PortError> {
        let baudrate = config.baudrate;
        let mut port = SerialPort::open(&config.path, |mut settings: Settings| {
            settings.set_raw();
            settings.set_baud_rate(baudrate)?;
            settings.set_char_size(CharSize::Bits8);
            settings.set_stop_bits(StopBits::One);
            settings.set_parity(Parity::None);
            settings.set_flow_control(FlowControl::None);
            Ok(settings)
        })
        .map_err(|source| PortError::Unavailable {
            path: config.path.clone(),
            source,
        })?;

        let timeout = config.effective_read_timeout();
        port.set_read_timeout(timeout)
            .map_err(|source| PortError::Unavailable {
                path: config.path.clone(),
                source,
            })?;

        info!(
            path = %config.path,
            baudrate,
            read_timeout_ms = timeout.as_millis() as u64,
            "serial port opened"
        );

        Ok(Self {
            port,
            path: config.path.clone(),
            baudrate,
        })
    }
}

impl SerialLink for SerialDevice {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), PortError> {
        let writer = &self.port;
        writer.write_all(bytes).map_err(PortError::WriteFailed)?;
        // Drain the transmit buffer immediately; at high rates a buffered
        // frame adds a full round-trip of latency to the stop-and-wait loop.
        writer.flush().map_err(PortError::WriteFailed)?;
        Ok(())
    }

    fn flush_tx(&mut self) -> Result<(), PortError> {
        let writer = &self.port;
        writer.flush().map_err(PortError::WriteFailed)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, PortError> {
        match self.port.read(buf) {
            Ok(n) => Ok(n),
            Err(err)
                if err.kind() == io::ErrorKind::TimedOut
                    || err.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(err) => Err(PortError::ReadFailed(err)),
        }
    }

    fn set_baud_rate(&mut self, baudrate: u32) -> Result<(), PortError> {
        if self.baudrate == baudrate {
            debug!(baudrate, "baud rate unchanged");
            return Ok(());
        }

        let mut settings = self
            .port
            .get_configuration()
            .map_err(|source| PortError::RateChange { rate: baudrate, source })?;
        settings
            .set_baud_rate(baudrate)
            .map_err(|source| PortError::RateChange { rate: baudrate, source })?;
        self.port
            .set_configuration(&settings)
            .map_err(|source| PortError::RateChange { rate: baudrate, source })?;

        info!(path = %self.path, from = self.baudrate, to = baudrate, "baud rate switched");
        self.baudrate = baudrate;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), PortError> {
        self.port
            .set_read_timeout(timeout)
            .map_err(PortError::ReadFailed)
    }

    fn baud_rate(&self) -> u32 {
        self.baudrate
    }
}
