//! Scan-lock-decode control loop
//!
//! The controller cycles through four states until the scan tool
//! fails outright:
//!
//! ```txt
//!   start
//!   ||
//!   \/                 no peak / output missing (retry)
//! +-----------+        ||============||
//! | RESETTING | ==> +----------+     ||
//! +-----------+     | SCANNING | <===||<========||
//!       /\          +----------+                ||
//!       ||               ||                     ||
//!       ||           peak found            frame missed
//!       ||               \/                     ||
//!       ||          +----------+                ||
//!       ||========= | DECODING | == frame ==||  ||
//!        session    +----------+    found   ||  ||
//!        restart         /\                 ||  ||
//!                        ||=================||==||
//! ```
//!
//! Scanning is slow (a full integration window per pass) and decoding
//! is comparatively cheap, so once a frequency produces a frame the
//! controller stays locked there and keeps decoding until a window
//! passes without one. Only then does it fall back to a fresh
//! broadband scan.
//!
//! A scan pass that exits cleanly but leaves no output file behind is
//! a known tuner failure mode. The controller answers it with a
//! hardware reset and another pass, governed by [`RetryPolicy`].

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};
use thiserror::Error;

use crate::band::FrequencyBand;
use crate::device::TunerReset;
use crate::notify::AlertSink;
use crate::peak::{select_peak, PeakCandidate};
use crate::pipeline::DecodeRunner;
use crate::spectrum::{ScanError, SpectrumSource};

/// Session timestamp format, UTC
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%z";

/// Fatal control-loop error
///
/// Any of these ends the session; the transient faults (missing scan
/// output, empty decodes, failed alerts) never surface here.
#[derive(Error, Debug)]
pub enum ControlError {
    /// The power-scan tool failed to run
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// Scan output kept vanishing and the retry budget ran out
    #[error("scan produced no output after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    /// An output file could not be created or read
    #[error("output file error: {0}")]
    Output(#[from] io::Error),
}

/// Retry policy for transient tuner faults
///
/// Applies to scan passes whose output file never appears. The
/// default retries forever with no pause, which keeps a flaky tuner
/// in service unattended; bound it when running under supervision.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Give up after this many output-less passes; `None` retries
    /// forever
    pub max_attempts: Option<u32>,

    /// Pause between retries
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
        }
    }
}

/// Well-known file names inside the output directory
///
/// All three are overwritten every cycle and must exist before the
/// decode pipeline writes to them.
#[derive(Clone, Debug)]
pub struct OutputFiles {
    /// Decoder diagnostic text; carries the frame-found marker on a
    /// hit
    pub status: PathBuf,
    /// Decoded frame text
    pub trame: PathBuf,
    /// Raw power-scan samples
    pub power_log: PathBuf,
}

impl OutputFiles {
    pub fn new(dir: &Path) -> Self {
        Self {
            status: dir.join("code"),
            trame: dir.join("trame"),
            power_log: dir.join("log_power.csv"),
        }
    }
}

/// The scan-lock-decode state machine
///
/// Composes a spectrum source, a tuner reset adapter, a decode
/// runner, and an optional alert sink. All collaborators block the
/// controller; there is no concurrency anywhere in the loop.
pub struct ScanController<S, R, D, N> {
    band: FrequencyBand,
    spectrum: S,
    tuner: R,
    decoder: D,
    alert: Option<N>,
    files: OutputFiles,
    retry: RetryPolicy,
}

impl<S, R, D, N> ScanController<S, R, D, N>
where
    S: SpectrumSource,
    R: TunerReset,
    D: DecodeRunner,
    N: AlertSink,
{
    pub fn new(
        band: FrequencyBand,
        spectrum: S,
        tuner: R,
        decoder: D,
        alert: Option<N>,
        files: OutputFiles,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            band,
            spectrum,
            tuner,
            decoder,
            alert,
            files,
            retry,
        }
    }

    /// Run the control loop
    ///
    /// Loops over scan sessions until a fatal error occurs; this
    /// method never returns `Ok`. The only ways out are a
    /// [`ControlError`] or external process termination.
    pub fn run(&mut self) -> Result<(), ControlError> {
        self.prepare_outputs()?;
        loop {
            self.session()?;
        }
    }

    // One full session: reset, scan to a lock, decode until the
    // beacon goes quiet.
    fn session(&mut self) -> Result<(), ControlError> {
        self.tuner.reset_if_present();
        let started = Utc::now().format(TIMESTAMP_FORMAT).to_string();

        let peak = self.scan_until_peak()?;
        info!(
            "peak {:.3} MHz at {:.1} dB",
            peak.frequency_hz / 1e6,
            peak.level_db
        );

        self.decode_while_found(peak, &started);
        Ok(())
    }

    // SCANNING: repeat passes until a bin rises above the no-signal
    // floor. A pass with no output file is a transient tuner fault:
    // reset and retry under the policy. A quiet band is not a fault
    // and rescans without counting.
    fn scan_until_peak(&mut self) -> Result<PeakCandidate, ControlError> {
        info!("scanning {}...{} Hz", self.band.start_hz(), self.band.end_hz());
        let mut attempts: u32 = 0;

        loop {
            self.spectrum.scan(self.band, &self.files.power_log)?;

            let rows = match std::fs::read_to_string(&self.files.power_log) {
                Ok(rows) => rows,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    attempts += 1;
                    warn!("scan output missing, resetting tuner (attempt {})", attempts);
                    if let Some(max) = self.retry.max_attempts {
                        if attempts >= max {
                            return Err(ControlError::RetriesExhausted { attempts });
                        }
                    }
                    self.tuner.reset_if_present();
                    if !self.retry.backoff.is_zero() {
                        thread::sleep(self.retry.backoff);
                    }
                    continue;
                }
                Err(err) => return Err(ControlError::Output(err)),
            };

            let peak = select_peak(rows.lines());
            if peak.is_signal() {
                return Ok(peak); // → PEAK_FOUND
            }
            debug!("no signal above the noise floor, rescanning");
        }
    }

    // DECODING: stay locked and keep decoding while frames arrive.
    // The first attempt without a frame drops the lock.
    fn decode_while_found(&mut self, peak: PeakCandidate, started: &str) {
        loop {
            info!("starting decode at {:.3} MHz", peak.frequency_hz / 1e6);
            let attempt = self.decoder.run_once(peak.frequency_hz);

            if !attempt.trame.is_empty() {
                info!("{}", attempt.trame);
            }
            if !attempt.found {
                debug!("no frame this window, back to scanning");
                return; // → SCANNING
            }

            if let Some(alert) = self.alert.as_mut() {
                if !alert.notify(started) {
                    warn!("alert delivery failed");
                }
            }
        }
    }

    // Touch the three output files so the subprocess stages always
    // have somewhere to write.
    fn prepare_outputs(&self) -> Result<(), ControlError> {
        for path in [&self.files.status, &self.files.trame, &self.files.power_log] {
            info!("output file: {}", path.display());
            touch(path)?;
        }
        Ok(())
    }
}

// Create the file if absent; leave existing contents alone.
fn touch(path: &Path) -> io::Result<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::fs;
    use std::rc::Rc;

    use crate::pipeline::DecodeAttempt;

    const SIGNAL_ROW: &str = "d, t, 406000000, 406100000, 1000, 55, -150, -90, -160";
    const QUIET_ROW: &str = "d, t, 406000000, 406100000, 1000, 55";

    /// Scripted spectrum source: each step either writes the given
    /// rows or leaves the output file absent. The last step repeats.
    struct ScriptedScan {
        steps: Vec<Option<&'static str>>,
        calls: Rc<Cell<u32>>,
    }

    impl SpectrumSource for ScriptedScan {
        fn scan(&mut self, _band: FrequencyBand, output: &Path) -> Result<(), ScanError> {
            let index = (self.calls.get() as usize).min(self.steps.len() - 1);
            self.calls.set(self.calls.get() + 1);
            match self.steps[index] {
                Some(rows) => fs::write(output, rows).unwrap(),
                None => {
                    let _ = fs::remove_file(output);
                }
            }
            Ok(())
        }
    }

    /// Spectrum source whose tool always fails
    struct FailingScan;

    impl SpectrumSource for FailingScan {
        fn scan(&mut self, _band: FrequencyBand, _output: &Path) -> Result<(), ScanError> {
            Err(ScanError::Launch(io::Error::new(
                io::ErrorKind::NotFound,
                "no such tool",
            )))
        }
    }

    struct CountingReset {
        count: Rc<Cell<u32>>,
    }

    impl TunerReset for CountingReset {
        fn reset_if_present(&mut self) {
            self.count.set(self.count.get() + 1);
        }
    }

    /// Scripted decoder: pops one result per call, then reports
    /// nothing found.
    struct ScriptedDecode {
        results: RefCell<VecDeque<DecodeAttempt>>,
        frequencies: Rc<RefCell<Vec<f64>>>,
    }

    impl DecodeRunner for ScriptedDecode {
        fn run_once(&mut self, frequency_hz: f64) -> DecodeAttempt {
            self.frequencies.borrow_mut().push(frequency_hz);
            self.results.borrow_mut().pop_front().unwrap_or_default()
        }
    }

    struct RecordingAlert {
        sent: Rc<RefCell<Vec<String>>>,
    }

    impl AlertSink for RecordingAlert {
        fn notify(&mut self, timestamp: &str) -> bool {
            self.sent.borrow_mut().push(timestamp.to_owned());
            true
        }
    }

    fn band() -> FrequencyBand {
        FrequencyBand::new(406_000_000, 406_100_000).unwrap()
    }

    fn controller_with(
        steps: Vec<Option<&'static str>>,
        decodes: Vec<DecodeAttempt>,
        retry: RetryPolicy,
        dir: &Path,
    ) -> (
        ScanController<ScriptedScan, CountingReset, ScriptedDecode, RecordingAlert>,
        Rc<Cell<u32>>,
        Rc<Cell<u32>>,
        Rc<RefCell<Vec<String>>>,
        Rc<RefCell<Vec<f64>>>,
    ) {
        let scans = Rc::new(Cell::new(0));
        let resets = Rc::new(Cell::new(0));
        let sent = Rc::new(RefCell::new(Vec::new()));
        let frequencies = Rc::new(RefCell::new(Vec::new()));

        let controller = ScanController::new(
            band(),
            ScriptedScan {
                steps,
                calls: scans.clone(),
            },
            CountingReset {
                count: resets.clone(),
            },
            ScriptedDecode {
                results: RefCell::new(decodes.into()),
                frequencies: frequencies.clone(),
            },
            Some(RecordingAlert { sent: sent.clone() }),
            OutputFiles::new(dir),
            retry,
        );
        (controller, scans, resets, sent, frequencies)
    }

    #[test]
    fn test_missing_output_resets_and_stays_scanning() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, scans, resets, _, _) = controller_with(
            vec![None, None, None, Some(SIGNAL_ROW)],
            vec![],
            RetryPolicy::default(),
            dir.path(),
        );

        let peak = controller.scan_until_peak().unwrap();
        assert_eq!(peak.frequency_hz, 406_001_000.0);
        assert_eq!(scans.get(), 4);
        assert_eq!(resets.get(), 3);
    }

    #[test]
    fn test_retry_budget_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _, _, _, _) = controller_with(
            vec![None],
            vec![],
            RetryPolicy {
                max_attempts: Some(3),
                backoff: Duration::ZERO,
            },
            dir.path(),
        );

        match controller.scan_until_peak() {
            Err(ControlError::RetriesExhausted { attempts }) => assert_eq!(attempts, 3),
            other => panic!("expected retries exhausted, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_quiet_band_rescans_without_reset() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, scans, resets, _, _) = controller_with(
            vec![Some(QUIET_ROW), Some(SIGNAL_ROW)],
            vec![],
            RetryPolicy::default(),
            dir.path(),
        );

        let peak = controller.scan_until_peak().unwrap();
        assert!(peak.is_signal());
        assert_eq!(scans.get(), 2);
        assert_eq!(resets.get(), 0);
    }

    #[test]
    fn test_scan_tool_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let mut controller = ScanController::new(
            band(),
            FailingScan,
            CountingReset {
                count: Rc::new(Cell::new(0)),
            },
            ScriptedDecode {
                results: RefCell::new(VecDeque::new()),
                frequencies: Rc::new(RefCell::new(Vec::new())),
            },
            None::<RecordingAlert>,
            OutputFiles::new(dir.path()),
            RetryPolicy::default(),
        );

        assert!(matches!(
            controller.session(),
            Err(ControlError::Scan(ScanError::Launch(_)))
        ));
    }

    #[test]
    fn test_session_decodes_until_miss_and_alerts_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let hit = DecodeAttempt {
            found: true,
            trame: "1 D0D0DEADBEEF".to_owned(),
        };
        let (mut controller, _, resets, sent, frequencies) = controller_with(
            vec![Some(SIGNAL_ROW)],
            vec![hit.clone(), hit, DecodeAttempt::default()],
            RetryPolicy::default(),
            dir.path(),
        );

        controller.session().unwrap();

        // locked on the same frequency for every attempt
        assert_eq!(frequencies.borrow().as_slice(), [
            406_001_000.0,
            406_001_000.0,
            406_001_000.0
        ]);
        // one alert per decoded frame, all with the session timestamp
        let sent = sent.borrow();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert!(!sent[0].is_empty());
        // session reset once, up front
        assert_eq!(resets.get(), 1);
    }

    #[test]
    fn test_no_alert_without_frame() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, _, _, sent, _) = controller_with(
            vec![Some(SIGNAL_ROW)],
            vec![DecodeAttempt::default()],
            RetryPolicy::default(),
            dir.path(),
        );

        controller.session().unwrap();
        assert!(sent.borrow().is_empty());
    }

    #[test]
    fn test_prepare_outputs_touches_files() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _, _, _, _) = controller_with(
            vec![Some(SIGNAL_ROW)],
            vec![],
            RetryPolicy::default(),
            dir.path(),
        );

        controller.prepare_outputs().unwrap();
        assert!(dir.path().join("code").exists());
        assert!(dir.path().join("trame").exists());
        assert!(dir.path().join("log_power.csv").exists());
    }
}
