//! # D-star Data Channel Module
//!
//! Everything that touches the radio's serial data channel lives here:
//!
//! - [`SerialTransport`] - exclusive ownership of the port, raw reads/writes
//! - [`framing`] - the on-wire frame codec
//! - [`arbiter`] - half-duplex turn-taking and send pacing
//! - [`supervisor`] - the background read/dispatch/send loop and reconnects
//!
//! ## Transport ownership
//!
//! One `SerialTransport` owns one OS port handle. It never reconnects on its
//! own: a failed read or write invalidates the connection and the supervisor
//! decides when (and whether) to reopen. Multiple radios mean multiple
//! independent transports; there is no process-wide port state.
//!
//! ## The hardware seam
//!
//! The supervisor drives the port through the [`LinkPort`]/[`PortOpener`]
//! traits, so arbitration and framing are testable against in-memory ports.
//! The `serialport`-backed implementation is gated behind the `serial`
//! feature (on by default).
//!
//! ## Configuration
//!
//! Port parameters come from the main configuration system:
//!
//! ```toml
//! port = "/dev/ttyACM0"
//! speed = 9600
//! databits = 8
//! parity = "none"
//! stopbits = 1
//! ```

pub mod arbiter;
pub mod errors;
pub mod framing;
pub mod supervisor;

use std::io;

use log::debug;
#[cfg(feature = "serial")]
use log::trace;

use crate::config::Parity;
use errors::LinkError;

/// Bound on a single blocking port read. Short enough that the supervisor's
/// loop stays responsive to shutdown requests.
#[cfg(feature = "serial")]
const READ_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(100);

/// A byte-stream port carrying the radio's data channel.
///
/// `read` returns `Ok(0)` when nothing arrived within the port's timeout; it
/// never blocks indefinitely. Any `Err` means the connection is gone.
pub trait LinkPort: Send {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Opens (and re-opens) the underlying port. The supervisor owns *when* to
/// call this; implementations only know *how* to produce a port.
pub trait PortOpener: Send {
    fn open(&mut self) -> Result<Box<dyn LinkPort>, LinkError>;
}

/// Serial parameters for the radio's USB data port.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port: String,
    pub speed: u32,
    pub databits: u8,
    pub parity: Parity,
    pub stopbits: u8,
}

impl From<&crate::config::LinkConfig> for SerialSettings {
    fn from(config: &crate::config::LinkConfig) -> Self {
        Self {
            port: config.port.clone(),
            speed: config.speed,
            databits: config.databits,
            parity: config.parity,
            stopbits: config.stopbits,
        }
    }
}

/// Owns the physical connection. Created closed; the supervisor opens it and
/// recreates it after failures. A failed read or write drops the handle, and
/// subsequent calls fail with `LinkDown` until the next `open`.
pub struct SerialTransport {
    opener: Box<dyn PortOpener>,
    port: Option<Box<dyn LinkPort>>,
}

impl SerialTransport {
    pub fn new(opener: Box<dyn PortOpener>) -> Self {
        Self { opener, port: None }
    }

    /// Open the port. A no-op when already open.
    pub fn open(&mut self) -> Result<(), LinkError> {
        if self.port.is_some() {
            return Ok(());
        }
        self.port = Some(self.opener.open()?);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Bounded read. `Ok(0)` means no data arrived within the port timeout.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::LinkDown)?;
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => {
                self.port = None;
                Err(LinkError::Io(e))
            }
        }
    }

    /// Write a whole frame. Callers must not retry on failure; the supervisor
    /// owns reconnection.
    pub fn write(&mut self, data: &[u8]) -> Result<(), LinkError> {
        let port = self.port.as_mut().ok_or(LinkError::LinkDown)?;
        match port.write_all(data) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.port = None;
                Err(LinkError::Io(e))
            }
        }
    }

    pub fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("serial connection released");
        }
    }
}

/// `PortOpener` backed by the `serialport` crate.
#[cfg(feature = "serial")]
pub struct SerialPortOpener {
    settings: SerialSettings,
}

#[cfg(feature = "serial")]
impl SerialPortOpener {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

#[cfg(feature = "serial")]
impl PortOpener for SerialPortOpener {
    fn open(&mut self) -> Result<Box<dyn LinkPort>, LinkError> {
        let s = &self.settings;
        debug!(
            "opening serial port {} at {} baud ({}{}{})",
            s.port,
            s.speed,
            s.databits,
            match s.parity {
                Parity::None => "N",
                Parity::Even => "E",
                Parity::Odd => "O",
            },
            s.stopbits
        );
        let builder = serialport::new(&s.port, s.speed)
            .timeout(READ_TIMEOUT)
            .data_bits(map_databits(s.databits)?)
            .parity(map_parity(s.parity))
            .stop_bits(map_stopbits(s.stopbits)?)
            .flow_control(serialport::FlowControl::None);
        let mut port = builder.open().map_err(|e| match e.kind() {
            serialport::ErrorKind::InvalidInput => {
                LinkError::ConfigRejected(format!("{}: {}", s.port, e))
            }
            _ => LinkError::PortUnavailable(format!("{}: {}", s.port, e)),
        })?;
        // Drain whatever the radio buffered before we attached (menu chatter,
        // a stale partial frame from a previous session).
        let mut purge_buf = [0u8; 512];
        if let Ok(available) = port.bytes_to_read() {
            if available > 0 {
                use std::io::Read;
                let _ = port.read(&mut purge_buf);
                trace!("purged {} stale bytes from {}", available, s.port);
            }
        }
        Ok(Box::new(NativePort { inner: port }))
    }
}

#[cfg(feature = "serial")]
struct NativePort {
    inner: Box<dyn serialport::SerialPort>,
}

#[cfg(feature = "serial")]
impl LinkPort for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use std::io::Read;
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            // Timeout is normal: no carrier right now
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use std::io::Write;
        self.inner.write_all(data)?;
        self.inner.flush()
    }
}

#[cfg(feature = "serial")]
fn map_databits(databits: u8) -> Result<serialport::DataBits, LinkError> {
    match databits {
        5 => Ok(serialport::DataBits::Five),
        6 => Ok(serialport::DataBits::Six),
        7 => Ok(serialport::DataBits::Seven),
        8 => Ok(serialport::DataBits::Eight),
        other => Err(LinkError::ConfigRejected(format!(
            "unsupported databits {}",
            other
        ))),
    }
}

#[cfg(feature = "serial")]
fn map_parity(parity: Parity) -> serialport::Parity {
    match parity {
        Parity::None => serialport::Parity::None,
        Parity::Even => serialport::Parity::Even,
        Parity::Odd => serialport::Parity::Odd,
    }
}

#[cfg(feature = "serial")]
fn map_stopbits(stopbits: u8) -> Result<serialport::StopBits, LinkError> {
    match stopbits {
        1 => Ok(serialport::StopBits::One),
        2 => Ok(serialport::StopBits::Two),
        other => Err(LinkError::ConfigRejected(format!(
            "unsupported stopbits {}",
            other
        ))),
    }
}
