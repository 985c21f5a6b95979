//! Frequency band selection

use thiserror::Error;

/// An invalid frequency band
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[error("invalid frequency band: start ({start_hz} Hz) must be below end ({end_hz} Hz)")]
pub struct BandError {
    start_hz: u64,
    end_hz: u64,
}

/// A contiguous range of frequencies to sweep, in Hz
///
/// The band is fixed for the life of the scan session. The default
/// search range for distress beacons is 406.0 – 407.0 MHz.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrequencyBand {
    start_hz: u64,
    end_hz: u64,
}

impl FrequencyBand {
    /// Try to construct a band from its bounds
    ///
    /// The start frequency must be strictly below the end frequency.
    pub fn new(start_hz: u64, end_hz: u64) -> Result<Self, BandError> {
        if start_hz < end_hz {
            Ok(Self { start_hz, end_hz })
        } else {
            Err(BandError { start_hz, end_hz })
        }
    }

    /// Lower bound, in Hz
    pub fn start_hz(&self) -> u64 {
        self.start_hz
    }

    /// Upper bound, in Hz
    pub fn end_hz(&self) -> u64 {
        self.end_hz
    }
}
