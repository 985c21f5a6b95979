//! # beacon406: 406 MHz distress beacon acquisition
//!
//! This crate drives a scan-lock-decode control loop for
//! [406 MHz emergency beacons](https://en.wikipedia.org/wiki/Distress_radiobeacon).
//! It repeatedly sweeps a frequency band for signal energy, locks onto
//! the strongest candidate, and runs an external demodulate → filter →
//! decode pipeline at that frequency until frames stop arriving.
//!
//! ## Disclaimer
//!
//! This crate has not been certified as a distress receiver or for any
//! other purpose. The author **strongly discourages** its use in any
//! safety-critical applications. A hobby SDR receive chain is not a
//! substitute for the Cospas-Sarsat satellite system.
//!
//! ## Example
//!
//! The control loop composes five collaborators. Production
//! implementations shell out to `rtl_power`, `rtl_fm`, `sox`, the
//! `dec406` decoder, and the `reset_usb` helper; each sits behind a
//! trait so it can be replaced in tests.
//!
//! ```no_run
//! use std::path::Path;
//!
//! use beacon406::{
//!     Dec406Pipeline, FrequencyBand, OutputFiles, RetryPolicy, RtlPowerScan, ScanController,
//!     TelegramNotifier, UsbTunerReset,
//! };
//!
//! let band = FrequencyBand::new(406_000_000, 407_000_000)?;
//! let files = OutputFiles::new(Path::new("/tmp/beacon406"));
//!
//! let mut controller = ScanController::new(
//!     band,
//!     RtlPowerScan::new(0),
//!     UsbTunerReset::new(),
//!     Dec406Pipeline::new(0, false, &files.status, &files.trame),
//!     None::<TelegramNotifier>,
//!     files,
//!     RetryPolicy::default(),
//! );
//!
//! // Runs until the scan tool fails outright.
//! controller.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Background
//!
//! 406 MHz beacons (EPIRBs, PLBs, ELTs) transmit a short digital burst
//! every fifty seconds or so while active. The burst is far stronger
//! than the noise floor, which makes a crude strategy effective: sweep
//! the band with a power scan, pick the hottest bin, and park a
//! narrowband decoder there for as long as frames keep coming. The
//! decoding itself is delegated to an external decoder process; this
//! crate only orchestrates the chain and interprets its output files.

mod band;
mod controller;
mod device;
mod notify;
mod peak;
mod pipeline;
mod spectrum;

pub use band::{BandError, FrequencyBand};
pub use controller::{ControlError, OutputFiles, RetryPolicy, ScanController};
pub use device::{TunerReset, UsbTunerReset};
pub use notify::{AlertSink, TelegramNotifier};
pub use peak::{select_peak, PeakCandidate, NO_SIGNAL_DB};
pub use pipeline::{Dec406Pipeline, DecodeAttempt, DecodePrograms, DecodeRunner, FRAME_FOUND_MARKER};
pub use spectrum::{RtlPowerScan, ScanError, SpectrumSource};
