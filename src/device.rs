//! Mhz19b device definitions
//!
//! Copyright 2019 Ryan Kurte

/// Length of every command and response frame
pub const FRAME_LEN: usize = 9;

/// Frame start byte
pub const HEADER: u8 = 0xFF;

/// Sensor number, the MH-Z19B only answers to 0x01
pub const SENSOR_NUMBER: u8 = 0x01;

/// Temperature offset applied by the sensor to byte 4 of a gas concentration response
pub const TEMPERATURE_OFFSET: i16 = 40;

/// Minimum accepted span calibration level (ppm)
pub const SPAN_MIN: u16 = 1000;
/// Maximum accepted span calibration level (ppm)
pub const SPAN_MAX: u16 = 5000;

/// ABC enable argument
pub const ABC_ON: u8 = 0xA0;
/// ABC disable argument
pub const ABC_OFF: u8 = 0x00;

/// Mhz19b command op codes
pub const CMD_READ_CO2: u8 = 0x86;
pub const CMD_CALIBRATE_ZERO: u8 = 0x87;
pub const CMD_CALIBRATE_SPAN: u8 = 0x88;
pub const CMD_SET_ABC: u8 = 0x79;
pub const CMD_SET_RANGE: u8 = 0x99;

/// Sensor detection range
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Range {
    /// 0 - 2000 ppm
    Ppm2000 = 2000,
    /// 0 - 5000 ppm
    Ppm5000 = 5000,
}

impl TryFrom<u16> for Range {
    type Error = Argument;

    fn try_from(v: u16) -> Result<Self, Self::Error> {
        match v {
            2000 => Ok(Range::Ppm2000),
            5000 => Ok(Range::Ppm5000),
            _ => Err(Argument::Range(v)),
        }
    }
}

/// Caller supplied argument rejected before any I/O
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Argument {
    /// Span level outside of 1000 - 5000 ppm
    Span(u16),
    /// Detection range other than 2000 or 5000 ppm
    Range(u16),
}

/// Mhz19b UART Command
/// Each variant carries only the arguments it places in D0 / D1 of the frame
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum Command {
    /// Read gas concentration (and the uncalibrated temperature)
    ReadCo2,

    /// Zero point calibration
    /// The sensor must have been in a stable ~400 ppm environment for over 20 minutes
    CalibrateZero,

    /// Span point calibration at the supplied ppm level (1000 - 5000)
    /// Zero calibration should be performed first
    CalibrateSpan(u16),

    /// Enable or disable Automatic Baseline Correction (ABC)
    SetAutoCalibration(bool),

    /// Set the detection range
    SetRange(Range),
}

impl Command {
    /// Op code placed at offset 2 of the frame
    pub fn op_code(&self) -> u8 {
        match self {
            Command::ReadCo2 => CMD_READ_CO2,
            Command::CalibrateZero => CMD_CALIBRATE_ZERO,
            Command::CalibrateSpan(_) => CMD_CALIBRATE_SPAN,
            Command::SetAutoCalibration(_) => CMD_SET_ABC,
            Command::SetRange(_) => CMD_SET_RANGE,
        }
    }

    /// Argument bytes (D0, D1) for the command
    pub fn args(&self) -> (u8, u8) {
        match self {
            Command::ReadCo2 | Command::CalibrateZero => (0, 0),
            Command::CalibrateSpan(level) => ((level >> 8) as u8, (level & 0xFF) as u8),
            Command::SetAutoCalibration(true) => (ABC_ON, 0),
            Command::SetAutoCalibration(false) => (ABC_OFF, 0),
            Command::SetRange(r) => {
                let v = *r as u16;
                ((v >> 8) as u8, (v & 0xFF) as u8)
            }
        }
    }

    /// Check command arguments are within the sensor's documented bounds
    pub fn validate(&self) -> Result<(), Argument> {
        match self {
            Command::CalibrateSpan(level) if *level < SPAN_MIN || *level > SPAN_MAX => {
                Err(Argument::Span(*level))
            }
            _ => Ok(()),
        }
    }
}
