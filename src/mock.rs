//! Simulated serial transport for driver tests
//!
//! Copyright 2019 Ryan Kurte

use std::collections::VecDeque;

use embedded_hal::blocking::delay::DelayMs;

use crate::base::Transport;

#[derive(Debug, Clone, PartialEq)]
pub struct MockError;

/// Serial transport that answers each write with the next scripted reply
#[derive(Debug, Default)]
pub struct Mock {
    /// Bytes currently readable
    pub rx: VecDeque<u8>,
    /// Replies released into `rx`, one per write
    pub replies: VecDeque<Vec<u8>>,
    /// Number of `available` polls before a reply becomes readable
    pub latency: usize,
    /// Cap on bytes accepted per write
    pub write_limit: Option<usize>,
    /// Cap on bytes returned per `read_bytes`
    pub read_limit: Option<usize>,
    /// Return an error from the next write
    pub fail_write: bool,
    /// Return an error from every `available` poll while set
    pub fail_available: bool,

    pub written: Vec<Vec<u8>>,
    pub polls: usize,
    pub flushes: usize,

    pending: Option<(usize, Vec<u8>)>,
}

impl Mock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for the next write
    pub fn reply(mut self, data: &[u8]) -> Self {
        self.replies.push_back(data.to_vec());
        self
    }

    /// Bytes already sitting in the receive buffer
    pub fn stray(mut self, data: &[u8]) -> Self {
        self.rx.extend(data.iter().copied());
        self
    }

    pub fn latency(mut self, polls: usize) -> Self {
        self.latency = polls;
        self
    }
}

impl Transport for Mock {
    type Error = MockError;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        if self.fail_write {
            self.fail_write = false;
            return Err(MockError);
        }

        let n = self.write_limit.map_or(data.len(), |l| l.min(data.len()));
        self.written.push(data[..n].to_vec());

        if let Some(r) = self.replies.pop_front() {
            self.pending = Some((self.latency, r));
        }

        Ok(n)
    }

    fn available(&mut self) -> Result<usize, Self::Error> {
        self.polls += 1;

        if self.fail_available {
            return Err(MockError);
        }

        let release = match &mut self.pending {
            Some((remaining, _)) if *remaining > 0 => {
                *remaining -= 1;
                false
            }
            Some(_) => true,
            None => false,
        };

        if release {
            if let Some((_, r)) = self.pending.take() {
                self.rx.extend(r);
            }
        }

        Ok(self.rx.len())
    }

    fn read_bytes(&mut self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        let mut n = buff.len().min(self.rx.len());
        if let Some(l) = self.read_limit {
            n = n.min(l);
        }

        for (i, b) in self.rx.drain(..n).enumerate() {
            buff[i] = b;
        }

        Ok(n)
    }

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        Ok(self.rx.pop_front())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.flushes += 1;
        Ok(())
    }
}

/// Line that never stops receiving, every poll reports a full buffer
#[derive(Debug, Default)]
pub struct Chatter {
    pub drained: usize,
}

impl Transport for Chatter {
    type Error = MockError;

    fn write(&mut self, data: &[u8]) -> Result<usize, Self::Error> {
        Ok(data.len())
    }

    fn available(&mut self) -> Result<usize, Self::Error> {
        Ok(1000)
    }

    fn read_bytes(&mut self, buff: &mut [u8]) -> Result<usize, Self::Error> {
        buff.fill(0xAA);
        Ok(buff.len())
    }

    fn read(&mut self) -> Result<Option<u8>, Self::Error> {
        self.drained += 1;
        Ok(Some(0xAA))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Delay that records requested sleeps instead of blocking
#[derive(Debug, Default)]
pub struct CountingDelay {
    pub calls: usize,
    pub total_ms: u32,
}

impl DelayMs<u32> for CountingDelay {
    fn delay_ms(&mut self, ms: u32) {
        self.calls += 1;
        self.total_ms += ms;
    }
}
