//! Byte-level access to the controller UART.
//!
//! [`SerialLink`] is the seam between the transport session and whatever
//! drives the physical port. The session only needs four primitives: write a
//! whole frame, ask whether a byte is waiting, read one byte, and sleep a
//! number of polling ticks. [`SerialPortLink`] implements it on top of the
//! `serialport` crate; tests substitute a scripted link.

use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::Result;

/// Blocking byte transport consumed by [`TransportSession`](crate::session::TransportSession).
pub trait SerialLink {
    /// Write `data` in one go.
    ///
    /// Returns `false` if the driver accepted fewer bytes than requested.
    fn write_bytes(&mut self, data: &[u8]) -> bool;

    /// True if at least one received byte is waiting
    fn byte_available(&mut self) -> bool;

    /// Take one received byte. Only called after `byte_available` returned true.
    fn read_byte(&mut self) -> io::Result<u8>;

    /// Block for `ticks` polling ticks
    fn sleep_ticks(&mut self, ticks: u32);
}

impl<L: SerialLink + ?Sized> SerialLink for Box<L> {
    fn write_bytes(&mut self, data: &[u8]) -> bool {
        (**self).write_bytes(data)
    }

    fn byte_available(&mut self) -> bool {
        (**self).byte_available()
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        (**self).read_byte()
    }

    fn sleep_ticks(&mut self, ticks: u32) {
        (**self).sleep_ticks(ticks)
    }
}

/// [`SerialLink`] over an OS serial port.
pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    tick: Duration,
}

impl SerialPortLink {
    /// Open `path` at `baud_rate`, 8N1 without flow control
    pub fn open(path: &str, baud_rate: u32, tick: Duration) -> Result<Self> {
        info!(path, baud_rate, "Opening controller serial link");
        let port = serialport::new(path, baud_rate)
            .data_bits(DataBits::Eight)
            .stop_bits(StopBits::One)
            .parity(Parity::None)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open()?;
        Ok(Self::from_port(port, tick))
    }

    pub fn from_port(port: Box<dyn SerialPort>, tick: Duration) -> Self {
        Self { port, tick }
    }

    pub fn tick(&self) -> Duration {
        self.tick
    }
}

impl SerialLink for SerialPortLink {
    fn write_bytes(&mut self, data: &[u8]) -> bool {
        match self.port.write(data) {
            Ok(written) if written == data.len() => match self.port.flush() {
                Ok(()) => true,
                Err(e) => {
                    warn!("Serial flush failed: {}", e);
                    false
                }
            },
            Ok(written) => {
                warn!(written, requested = data.len(), "Short serial write");
                false
            }
            Err(e) => {
                warn!("Serial write failed: {}", e);
                false
            }
        }
    }

    fn byte_available(&mut self) -> bool {
        match self.port.bytes_to_read() {
            Ok(n) => n > 0,
            Err(e) => {
                warn!("Could not query serial input queue: {}", e);
                false
            }
        }
    }

    fn read_byte(&mut self) -> io::Result<u8> {
        let mut buf = [0u8; 1];
        self.port.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn sleep_ticks(&mut self, ticks: u32) {
        thread::sleep(self.tick * ticks);
    }
}
