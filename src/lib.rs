//! Mhz19b NDIR CO2 sensor driver
//!
//! Blocking driver for the Winsen MH-Z19B speaking the 9-byte UART protocol
//! over any byte stream implementing [`Transport`].
//!
//! Copyright 2019 Ryan Kurte

use core::fmt::{self, Debug};

extern crate embedded_hal;
use embedded_hal::blocking::delay::DelayMs;

#[macro_use]
extern crate log;

pub mod base;
pub use base::{Diagnostics, Frame, Transport};

pub mod device;
pub use device::{Argument, Command, Range};
use device::*;

#[cfg(test)]
mod mock;

/// Maximum number of stray bytes discarded by a single cache flush
pub const DRAIN_LIMIT: usize = 256;

/// Mhz19b error object
#[derive(Debug, PartialEq)]
pub enum Error<ConnErr> {
    /// Underlying transport error
    Conn(ConnErr),
    /// Argument outside the sensor's documented range, no I/O was performed
    InvalidArgument(Argument),
    /// Transport accepted fewer than 9 bytes
    ShortWrite(usize),
    /// Transport returned fewer than 9 bytes
    ShortRead(usize),
    /// No bytes became available within the poll bound
    NoResponse,
    /// Bytes available after polling were not exactly one frame
    UnexpectedAvailableCount(usize),
    /// Response did not start with 0xFF
    BadHeader(u8),
    /// Response checksum did not match its contents
    ChecksumMismatch { computed: u8, received: u8 },
    /// Response echoed a different command
    CommandMismatch { expected: u8, received: u8 },
}

impl <ConnErr> From<ConnErr> for Error<ConnErr> {
    fn from(conn_err: ConnErr) -> Self {
        Error::Conn(conn_err)
    }
}

impl <ConnErr: Debug> fmt::Display for Error<ConnErr> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Conn(e) => write!(f, "transport error: {:?}", e),
            Error::InvalidArgument(Argument::Span(v)) => {
                write!(f, "span level {} outside {}-{} ppm", v, SPAN_MIN, SPAN_MAX)
            }
            Error::InvalidArgument(Argument::Range(v)) => {
                write!(f, "range {} is not 2000 or 5000 ppm", v)
            }
            Error::ShortWrite(n) => write!(f, "short write, {} of {} bytes", n, FRAME_LEN),
            Error::ShortRead(n) => write!(f, "short read, {} of {} bytes", n, FRAME_LEN),
            Error::NoResponse => write!(f, "no response from sensor"),
            Error::UnexpectedAvailableCount(n) => {
                write!(f, "{} bytes available, expected {}", n, FRAME_LEN)
            }
            Error::BadHeader(b) => write!(f, "bad header 0x{:02x}", b),
            Error::ChecksumMismatch { computed, received } => write!(
                f,
                "checksum mismatch, computed 0x{:02x} received 0x{:02x}",
                computed, received
            ),
            Error::CommandMismatch { expected, received } => write!(
                f,
                "command mismatch, expected 0x{:02x} received 0x{:02x}",
                expected, received
            ),
        }
    }
}

impl <ConnErr: Debug> std::error::Error for Error<ConnErr> {}

/// Mhz19b measurement object
#[derive(PartialEq, Clone, Debug)]
pub struct Measurement {
    /// CO2 concentration in parts-per-million (PPM)
    pub co2: u16,
    /// Temperature in degrees celsius
    /// Approximate, the sensor does not calibrate this value
    pub temperature: i16,
}

impl Measurement {
    /// Decode a validated gas concentration response
    /// The status byte (offset 5) is not decoded
    pub fn from_frame(frame: &Frame) -> Self {
        Measurement {
            co2: (frame[2] as u16) << 8 | (frame[3] as u16),
            temperature: frame[4] as i16 - TEMPERATURE_OFFSET,
        }
    }
}

/// Driver configuration
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Config {
    /// Maximum number of polls for response availability
    pub poll_retries: u32,
    /// Delay between polls in milliseconds
    pub poll_interval_ms: u32,
    /// Require the response to echo the command code
    pub check_echo: bool,
}

impl Config {
    /// Set the maximum number of availability polls per wait
    pub fn poll_retries(mut self, retries: u32) -> Self {
        self.poll_retries = retries;
        self
    }

    /// Set the delay between availability polls
    pub fn poll_interval_ms(mut self, ms: u32) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Enable or disable checking the response echoes the command code
    pub fn check_echo(mut self, check: bool) -> Self {
        self.check_echo = check;
        self
    }
}

impl Default for Config {
    /// 20 polls at 100 ms covers the sensor's worst case response latency
    fn default() -> Self {
        Config {
            poll_retries: 20,
            poll_interval_ms: 100,
            check_echo: true,
        }
    }
}

/// Mhz19b sensor object
/// This is generic over a serial transport, a blocking delay and an optional diagnostics sink
pub struct Mhz19b<Conn, Delay, Diag = ()> {
    conn: Conn,
    delay: Delay,
    config: Config,
    diag: Diag,
    buff: Frame,
}

impl <Conn, Delay> Mhz19b<Conn, Delay, ()> where
    Conn: Transport,
    Delay: DelayMs<u32>,
{
    /// Create a new Mhz19b sensor instance without diagnostics
    pub fn new(conn: Conn, delay: Delay, config: Config) -> Self {
        Mhz19b{ conn, delay, config, diag: (), buff: [0u8; FRAME_LEN] }
    }
}

impl <Conn, Delay, Diag> Mhz19b<Conn, Delay, Diag> where
    Conn: Transport,
    Delay: DelayMs<u32>,
    Diag: Diagnostics,
{
    /// Create a new Mhz19b sensor instance recording per-operation status into `diag`
    pub fn with_diagnostics(conn: Conn, delay: Delay, config: Config, mut diag: Diag) -> Self {
        diag.clear();
        diag.append(format_args!("Mhz19b initialised"));

        Mhz19b{ conn, delay, config, diag, buff: [0u8; FRAME_LEN] }
    }

    /// Diagnostics recorded by the last operation
    pub fn diagnostics(&self) -> &Diag {
        &self.diag
    }

    /// Release the underlying transport and delay
    pub fn free(self) -> (Conn, Delay) {
        (self.conn, self.delay)
    }

    /// Read the CO2 concentration in ppm
    pub fn read_co2(&mut self) -> Result<u16, Error<Conn::Error>> {
        self.read_measurement().map(|m| m.co2)
    }

    /// Read CO2 concentration and the approximate sensor temperature
    pub fn read_measurement(&mut self) -> Result<Measurement, Error<Conn::Error>> {
        self.diag.clear();
        debug!("Reading gas concentration");

        self.execute(&Command::ReadCo2)?;

        let expected = match self.config.check_echo {
            true => Some(CMD_READ_CO2),
            false => None,
        };

        if let Err(e) = base::validate(&self.buff, expected) {
            if let Error::ChecksumMismatch { computed, received } = &e {
                self.diag.append(format_args!(
                    "Checksum not OK, received: {:02x} should be: {:02x}",
                    received, computed
                ));
            }
            self.fail(&e);
            return Err(e);
        }

        let m = Measurement::from_frame(&self.buff);

        debug!("CO2: {} ppm, temperature: {} C", m.co2, m.temperature);
        self.diag.append(format_args!("PPM: {}", m.co2));
        self.diag.append(format_args!("Temperature: {}", m.temperature));

        Ok(m)
    }

    /// Zero point calibration
    /// The sensor should have been at ~400 ppm for over 20 minutes
    pub fn calibrate_zero(&mut self) -> Result<(), Error<Conn::Error>> {
        self.command(&Command::CalibrateZero).map(|_| ())
    }

    /// Span point calibration against a reference level of 1000 - 5000 ppm
    pub fn calibrate_span(&mut self, level: u16) -> Result<(), Error<Conn::Error>> {
        self.command(&Command::CalibrateSpan(level)).map(|_| ())
    }

    /// Enable or disable Automatic Baseline Correction
    pub fn set_auto_calibration(&mut self, enabled: bool) -> Result<(), Error<Conn::Error>> {
        self.command(&Command::SetAutoCalibration(enabled)).map(|_| ())
    }

    /// Set the detection range, either 2000 or 5000 ppm
    pub fn set_range(&mut self, range: u16) -> Result<(), Error<Conn::Error>> {
        self.diag.clear();

        let range = Range::try_from(range).map_err(|a| self.invalid(a))?;

        self.execute(&Command::SetRange(range))
    }

    /// Send an arbitrary command, returning the unvalidated response frame
    pub fn command(&mut self, command: &Command) -> Result<Frame, Error<Conn::Error>> {
        self.diag.clear();

        self.execute(command)?;

        Ok(self.buff)
    }

    fn execute(&mut self, command: &Command) -> Result<(), Error<Conn::Error>> {
        command.validate().map_err(|a| self.invalid(a))?;

        debug!("Executing command: {:?}", command);
        self.buff = base::build(command);

        if let Err(e) = self.exchange() {
            self.fail(&e);
            return Err(e);
        }

        Ok(())
    }

    /// Transmit the working buffer and replace it with the sensor response
    fn exchange(&mut self) -> Result<(), Error<Conn::Error>> {
        trace!("Writing frame: {:02x?}", self.buff);

        let n = self.conn.write(&self.buff)?;
        self.conn.flush()?;
        if n != FRAME_LEN {
            return Err(Error::ShortWrite(n));
        }

        self.diag.append(format_args!("Request sent"));

        let available = self.wait_available(FRAME_LEN)?;
        if available == 0 {
            return Err(Error::NoResponse);
        }
        if available != FRAME_LEN {
            return Err(Error::UnexpectedAvailableCount(available));
        }

        let n = self.conn.read_bytes(&mut self.buff)?;
        if n != FRAME_LEN {
            return Err(Error::ShortRead(n));
        }

        trace!("Read frame: {:02x?}", self.buff);
        self.diag.append(format_args!("Response: {:02x?}", self.buff));

        Ok(())
    }

    /// Poll until at least `min` bytes are available or the retry bound is reached
    fn wait_available(&mut self, min: usize) -> Result<usize, Conn::Error> {
        let mut available = 0;

        for i in 0..self.config.poll_retries {
            available = self.conn.available()?;
            if available >= min {
                break;
            }

            if i + 1 < self.config.poll_retries {
                self.delay.delay_ms(self.config.poll_interval_ms);
            }
        }

        Ok(available)
    }

    /// Discard any bytes left over from a failed exchange so the next frame starts aligned
    fn flush_cache(&mut self) -> Result<usize, Conn::Error> {
        self.conn.flush()?;

        // Let in-flight bytes settle
        self.wait_available(1)?;

        let mut discarded = 0;
        while discarded < DRAIN_LIMIT && self.conn.available()? > 0 {
            match self.conn.read()? {
                Some(_) => discarded += 1,
                None => break,
            }
        }

        Ok(discarded)
    }

    fn fail(&mut self, e: &Error<Conn::Error>) {
        warn!("Exchange failed: {}", e);
        self.diag.append(format_args!("Error: {}", e));

        match self.flush_cache() {
            Ok(0) => (),
            Ok(n) => debug!("Discarded {} stray bytes", n),
            Err(e) => warn!("Error flushing serial cache: {:?}", e),
        }
    }

    fn invalid(&mut self, a: Argument) -> Error<Conn::Error> {
        let e = Error::InvalidArgument(a);
        warn!("Rejected command: {}", e);
        self.diag.append(format_args!("Error: {}", e));
        e
    }
}
