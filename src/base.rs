//! Base communication implementation for interacting with Mhz19b device
//!
//! Copyright 2019 Ryan Kurte

use core::fmt::{self, Debug, Write as _};

use crate::device::*;
use crate::Error;

/// Command and response frame
pub type Frame = [u8; FRAME_LEN];

/// Byte stream transport used to talk to the sensor.
/// All methods block except `available`, which must be polled.
pub trait Transport {
    type Error: Debug;

    /// Write bytes, returning the number actually written
    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error>;
    /// Number of bytes ready to be read
    fn available(&mut self) -> Result<usize, Self::Error>;
    /// Read up to `buff.len()` bytes, returning the number actually read
    fn read_bytes(&mut self, buff: &mut [u8]) -> Result<usize, Self::Error>;
    /// Read a single byte if one is ready
    fn read(&mut self) -> Result<Option<u8>, Self::Error>;
    /// Force out any pending writes
    fn flush(&mut self) -> Result<(), Self::Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    type Error = T::Error;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        (**self).write(data)
    }
    fn available(&mut self) -> Result<usize, Self::Error> {
        (**self).available()
    }
    fn read_bytes(&mut self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        (**self).read_bytes(buff)
    }
    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        (**self).read()
    }
    fn flush(&mut self) -> Result<(), Self::Error> {
        (**self).flush()
    }
}

/// Append-only sink for short per-operation status messages
pub trait Diagnostics {
    /// Discard the previous operation's messages
    fn clear(&mut self);
    /// Append a status line
    fn append(&mut self, args: fmt::Arguments);
}

/// Disabled diagnostics
impl Diagnostics for () {
    fn clear(&mut self) {}
    fn append(&mut self, _args: fmt::Arguments) {}
}

impl Diagnostics for String {
    fn clear(&mut self) {
        String::clear(self)
    }

    fn append(&mut self, args: fmt::Arguments) {
        if !self.is_empty() {
            self.push('\n');
        }
        // Writing to a String cannot fail
        let _ = self.write_fmt(args);
    }
}

/// Helper for device checksum calculation over bytes 1..=7 of a frame
pub fn checksum(payload: &[u8]) -> u8 {
    let sum = payload.iter().fold(0u8, |sum, v| sum.wrapping_add(*v));
    (0xFF - sum).wrapping_add(1)
}

/// Check a payload against a received checksum
pub fn verify(payload: &[u8], crc: u8) -> bool {
    checksum(payload) == crc
}

/// Build a frame from raw op code and argument bytes
pub fn build_raw(command: u8, d0: u8, d1: u8) -> Frame {
    let mut frame: Frame = [HEADER, SENSOR_NUMBER, command, d0, d1, 0, 0, 0, 0];
    frame[8] = checksum(&frame[1..8]);
    frame
}

/// Build the outbound frame for a command
pub fn build(command: &Command) -> Frame {
    let (d0, d1) = command.args();
    build_raw(command.op_code(), d0, d1)
}

/// Validate a response frame header, checksum and (optionally) command echo
pub fn validate<E>(frame: &Frame, expected: Option<u8>) -> Result<(), Error<E>> {
    if frame[0] != HEADER {
        return Err(Error::BadHeader(frame[0]));
    }

    let computed = checksum(&frame[1..8]);
    if computed != frame[8] {
        return Err(Error::ChecksumMismatch{ computed, received: frame[8] });
    }

    match expected {
        Some(c) if c != frame[1] => Err(Error::CommandMismatch{ expected: c, received: frame[1] }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_checksum() {
        // Test vectors from datasheet
        let tests: &[([u8; 7], u8)] = &[
            ([0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00], 0x79),
            ([0x01, 0x88, 0x07, 0xD0, 0x00, 0x00, 0x00], 0xA0),
            ([0x86, 0x02, 0x60, 0x47, 0x00, 0x00, 0x00], 0xD1),
        ];

        for t in tests {
            let v = checksum(&t.0);
            assert_eq!(v, t.1);
            assert!(verify(&t.0, v));
        }
    }

    #[test]
    fn test_checksum_detects_single_bit_flips() {
        let payloads: &[[u8; 7]] = &[
            [0x00; 7],
            [0xFF; 7],
            [0x86, 0x03, 0xE8, 0x28, 0x40, 0x12, 0x34],
            [0x01, 0x99, 0x13, 0x88, 0x00, 0x00, 0x00],
        ];

        for p in payloads {
            let crc = checksum(p);
            assert_eq!(crc, checksum(p));

            for byte in 0..p.len() {
                for bit in 0..8 {
                    let mut flipped = *p;
                    flipped[byte] ^= 1 << bit;
                    assert_ne!(checksum(&flipped), crc, "byte {} bit {}", byte, bit);
                }
            }
        }
    }

    #[test]
    fn test_build_read_co2() {
        let f = build(&Command::ReadCo2);
        assert_eq!(f, [0xFF, 0x01, 0x86, 0x00, 0x00, 0x00, 0x00, 0x00, 0x79]);
    }

    #[test]
    fn test_build_span() {
        let f = build_raw(CMD_CALIBRATE_SPAN, (2000u16 >> 8) as u8, (2000u16 & 0xFF) as u8);
        assert_eq!(f[3], 0x07);
        assert_eq!(f[4], 0xD0);
        assert_eq!(f[8], 0xA0);
        assert_eq!(f, build(&Command::CalibrateSpan(2000)));
    }

    #[test]
    fn test_build_recomputes_checksum() {
        for c in &[
            Command::CalibrateZero,
            Command::SetAutoCalibration(true),
            Command::SetAutoCalibration(false),
            Command::SetRange(Range::Ppm2000),
            Command::SetRange(Range::Ppm5000),
        ] {
            let f = build(c);
            assert_eq!(f[0], HEADER);
            assert_eq!(f[2], c.op_code());
            assert_eq!(&f[5..8], &[0, 0, 0]);
            assert!(verify(&f[1..8], f[8]));
        }
    }

    #[test]
    fn test_validate() {
        let ok = [0xFF, 0x86, 0x03, 0xE8, 0x28, 0x00, 0x00, 0x00, 0x67];
        assert_eq!(validate::<()>(&ok, Some(CMD_READ_CO2)), Ok(()));
        assert_eq!(validate::<()>(&ok, None), Ok(()));

        let mut bad_header = ok;
        bad_header[0] = 0xFE;
        assert_eq!(validate::<()>(&bad_header, None), Err(Error::BadHeader(0xFE)));

        let mut bad_crc = ok;
        bad_crc[8] = 0x68;
        assert_eq!(
            validate::<()>(&bad_crc, Some(CMD_READ_CO2)),
            Err(Error::ChecksumMismatch{ computed: 0x67, received: 0x68 })
        );

        let mut other = ok;
        other[1] = 0x99;
        other[8] = checksum(&other[1..8]);
        assert_eq!(
            validate::<()>(&other, Some(CMD_READ_CO2)),
            Err(Error::CommandMismatch{ expected: 0x86, received: 0x99 })
        );
        assert_eq!(validate::<()>(&other, None), Ok(()));
    }

    #[test]
    fn test_string_diagnostics() {
        let mut d = String::new();
        d.append(format_args!("one {}", 1));
        d.append(format_args!("two"));
        assert_eq!(d, "one 1\ntwo");
        Diagnostics::clear(&mut d);
        assert!(d.is_empty());
    }
}
