//! Mhz19b command-line utility
//!
//! Copyright 2019 Ryan Kurte

use std::io::{self, Read, Write};
use std::str::FromStr;
use std::time::Duration;

extern crate embedded_hal;
extern crate linux_embedded_hal;
use linux_embedded_hal::Delay;

extern crate serialport;
use serialport::SerialPort;

extern crate structopt;
use structopt::StructOpt;

extern crate humantime;
use humantime::{Duration as HumanDuration};

#[macro_use] extern crate log;
extern crate simplelog;
use simplelog::{TermLogger, LevelFilter};

extern crate sensor_mhz19b;
use sensor_mhz19b::{Config, Mhz19b, Transport};

#[derive(StructOpt)]
#[structopt(name = "mhz19b-util")]
/// A Command Line Interface (CLI) for interacting with a local MH-Z19B CO2 sensor over UART
pub struct Options {

    /// Specify the serial port to use to connect to the mhz19b device
    #[structopt(short = "d", long = "port", default_value = "/dev/ttyS0", env = "MHZ19B_PORT")]
    port: String,

    /// Serial baud rate
    #[structopt(long = "baud", default_value = "9600")]
    baud: u32,

    /// Maximum number of polls while waiting for a response
    #[structopt(long = "poll-retries", default_value = "20")]
    poll_retries: u32,

    /// Delay between response polls
    #[structopt(long = "poll-delay", default_value = "100ms")]
    poll_delay: HumanDuration,

    /// Disable checking the response echoes the command
    #[structopt(long = "no-echo-check")]
    no_echo_check: bool,

    #[structopt(subcommand)]
    operation: Operation,

    /// Enable verbose logging
    #[structopt(long = "log-level", default_value = "info")]
    level: LevelFilter,
}

#[derive(StructOpt)]
pub enum Operation {
    #[structopt(name = "read")]
    /// Periodically read CO2 concentration
    Read {
        /// Specify period for taking measurements
        #[structopt(short = "p", long = "sample-period", default_value = "10s")]
        period: HumanDuration,

        /// Number of allowed read errors prior to exiting
        #[structopt(long = "allowed-errors", default_value = "3")]
        allowed_errors: usize,
    },

    #[structopt(name = "zero")]
    /// Zero point calibration (sensor at ~400 ppm for 20 minutes)
    Zero,

    #[structopt(name = "span")]
    /// Span point calibration against a reference concentration
    Span {
        /// Reference concentration in ppm (1000 - 5000)
        level: u16,
    },

    #[structopt(name = "abc")]
    /// Enable or disable automatic baseline correction
    Abc {
        /// on or off
        state: Switch,
    },

    #[structopt(name = "range")]
    /// Set the detection range
    Range {
        /// 2000 or 5000 ppm
        range: u16,
    },
}

pub enum Switch {
    On,
    Off,
}

impl FromStr for Switch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" | "true" | "1" => Ok(Switch::On),
            "off" | "false" | "0" => Ok(Switch::Off),
            _ => Err(format!("expected on or off, found '{}'", s)),
        }
    }
}

/// Serial port adaptor for the sensor transport
struct Port(Box<dyn SerialPort>);

impl Transport for Port {
    type Error = serialport::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        Ok(self.0.write(data)?)
    }

    fn available(&mut self) -> Result<usize, Self::Error> {
        Ok(self.0.bytes_to_read()? as usize)
    }

    fn read_bytes(&mut self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = 0;

        while n < buff.len() {
            match self.0.read(&mut buff[n..]) {
                Ok(0) => break,
                Ok(k) => n += k,
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(n)
    }

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        if self.0.bytes_to_read()? == 0 {
            return Ok(None);
        }

        let mut b = [0u8; 1];
        match self.0.read(&mut b) {
            Ok(1) => Ok(Some(b[0])),
            Ok(_) => Ok(None),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(self.0.flush()?)
    }
}

fn main() {
    // Load options
    let opts = Options::from_args();

    // Setup logging
    TermLogger::init(opts.level, simplelog::Config::default()).unwrap();

    debug!("Opening serial port");
    let port = match serialport::new(opts.port.as_str(), opts.baud)
        .timeout(Duration::from_millis(100))
        .open()
    {
        Ok(v) => v,
        Err(e) => {
            error!("Error opening serial port '{}': {:?}", &opts.port, e);
            std::process::exit(-1);
        }
    };

    let poll_interval_ms = match u32::try_from(opts.poll_delay.as_millis()) {
        Ok(v) => v,
        Err(_) => {
            error!("Poll delay {} is too long", opts.poll_delay);
            std::process::exit(-4);
        }
    };

    let config = Config::default()
        .poll_retries(opts.poll_retries)
        .poll_interval_ms(poll_interval_ms)
        .check_echo(!opts.no_echo_check);

    let mut sensor = Mhz19b::new(Port(port), Delay, config);

    let res = match opts.operation {
        Operation::Read { period, allowed_errors } => {
            let mut errors = 0;

            loop {
                debug!("Starting sensor read cycle");

                match sensor.read_measurement() {
                    Ok(m) => {
                        info!("CO2: {} ppm, Temperature: {} C", m.co2, m.temperature);
                        errors = 0;
                    },
                    Err(e) => {
                        warn!("Error reading sensor data: {}", e);
                        errors += 1;
                    },
                }

                if errors > allowed_errors {
                    error!("Exceeded maximum allowed read errors");
                    std::process::exit(-3);
                }

                // Wait for another sensor reading
                std::thread::sleep(*period);
            }
        },
        Operation::Zero => sensor.calibrate_zero(),
        Operation::Span { level } => sensor.calibrate_span(level),
        Operation::Abc { state: Switch::On } => sensor.set_auto_calibration(true),
        Operation::Abc { state: Switch::Off } => sensor.set_auto_calibration(false),
        Operation::Range { range } => sensor.set_range(range),
    };

    match res {
        Ok(()) => info!("Command complete"),
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(-2);
        }
    }
}
