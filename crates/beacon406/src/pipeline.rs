//! Narrowband decode pipeline
//!
//! One decode attempt runs three processes chained stdout-to-stdin:
//!
//! ```txt
//! rtl_fm (tune + FM demod) → sox (resample + band-pass) → dec406
//! ```
//!
//! The tuning stage is capped at a fixed wall-clock window; once it is
//! killed, end-of-input cascades down the chain and the decoder exits
//! on its own. Pipeline exit codes are never inspected: the only
//! authoritative outcome is what the decoder wrote to its two output
//! files. The decoder announces a received frame by printing a fixed
//! marker to its diagnostic stream.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, warn};

/// Marker the decoder prints on its diagnostic stream when a frame
/// was received
pub const FRAME_FOUND_MARKER: &str = "TROUVE";

/// Wall-clock cap on the tuning stage
///
/// A beacon bursts roughly every fifty seconds, so one window is long
/// enough to catch a transmission from an active beacon.
const TUNE_TIME_LIMIT: Duration = Duration::from_secs(56);

/// Poll interval while waiting out a stage's time limit
const LIMIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Audio rate between the demodulator and the filter
const AUDIO_RATE: &str = "12k";

/// Outcome of one decode pipeline run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeAttempt {
    /// True if the decoder reported a complete beacon frame
    pub found: bool,

    /// Decoded frame text, possibly empty
    ///
    /// Captured regardless of `found` so partial output can still be
    /// shown to the operator.
    pub trame: String,
}

/// Runs one bounded decode attempt at a locked frequency
pub trait DecodeRunner {
    fn run_once(&mut self, frequency_hz: f64) -> DecodeAttempt;
}

/// One stage of a subprocess pipeline
///
/// Stages carry their program and arguments as explicit lists; they
/// are never assembled into a shell string.
#[derive(Clone, Debug)]
struct Stage {
    program: PathBuf,
    args: Vec<String>,
    /// Kill the stage if it outlives this limit
    time_limit: Option<Duration>,
}

/// Executables used by the decode pipeline
#[derive(Clone, Debug)]
pub struct DecodePrograms {
    /// Tuner / FM demodulator
    pub tune: PathBuf,
    /// Audio resampler and band-pass filter
    pub filter: PathBuf,
    /// Beacon frame decoder
    pub decode: PathBuf,
}

impl Default for DecodePrograms {
    fn default() -> Self {
        Self {
            tune: "rtl_fm".into(),
            filter: "sox".into(),
            decode: "./dec406_V7".into(),
        }
    }
}

/// `rtl_fm` → `sox` → `dec406` decode chain
///
/// The decoder's standard output (the decoded frame text) lands in
/// the trame file and its diagnostics in the status file. Both files
/// are overwritten on every run.
pub struct Dec406Pipeline {
    ppm: i32,
    osm: bool,
    status_path: PathBuf,
    trame_path: PathBuf,
    programs: DecodePrograms,
}

impl Dec406Pipeline {
    /// New pipeline with the production tool set
    ///
    /// `osm` selects the decoder's alternate decode mode.
    pub fn new<P, Q>(ppm: i32, osm: bool, status_path: P, trame_path: Q) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self::with_programs(ppm, osm, status_path, trame_path, DecodePrograms::default())
    }

    /// New pipeline with alternate executables
    pub fn with_programs<P, Q>(
        ppm: i32,
        osm: bool,
        status_path: P,
        trame_path: Q,
        programs: DecodePrograms,
    ) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            ppm,
            osm,
            status_path: status_path.into(),
            trame_path: trame_path.into(),
            programs,
        }
    }

    fn stages(&self, frequency_hz: f64) -> Vec<Stage> {
        let mut decode_args = vec![
            "--100".to_owned(),
            "--M3".to_owned(),
            "--une_minute".to_owned(),
        ];
        if self.osm {
            decode_args.push("--osm".to_owned());
        }

        vec![
            Stage {
                program: self.programs.tune.clone(),
                args: vec![
                    "-p".to_owned(),
                    self.ppm.to_string(),
                    "-M".to_owned(),
                    "fm".to_owned(),
                    "-s".to_owned(),
                    AUDIO_RATE.to_owned(),
                    "-f".to_owned(),
                    frequency_hz.to_string(),
                ],
                time_limit: Some(TUNE_TIME_LIMIT),
            },
            Stage {
                program: self.programs.filter.clone(),
                args: [
                    "-t", "raw", "-r", AUDIO_RATE, "-e", "s", "-b", "16", "-c", "1", "-", "-t",
                    "wav", "-", "lowpass", "3000", "highpass", "400",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
                time_limit: None,
            },
            Stage {
                program: self.programs.decode.clone(),
                args: decode_args,
                time_limit: None,
            },
        ]
    }
}

impl DecodeRunner for Dec406Pipeline {
    fn run_once(&mut self, frequency_hz: f64) -> DecodeAttempt {
        let stages = self.stages(frequency_hz);
        if let Err(err) = run_stages(&stages, &self.trame_path, &self.status_path) {
            warn!("decode pipeline did not run: {}", err);
        }

        // outcome is judged purely from the output files; a missing
        // file reads as "no frame"
        let found = fs::read_to_string(&self.status_path)
            .map(|status| status_indicates_frame(&status))
            .unwrap_or(false);
        let trame = fs::read_to_string(&self.trame_path).unwrap_or_default();

        DecodeAttempt { found, trame }
    }
}

/// True if the decoder's diagnostic text announces a received frame
fn status_indicates_frame(status: &str) -> bool {
    status.contains(FRAME_FOUND_MARKER)
}

/// Run a chain of stages, directing the final stage's stdout and
/// stderr into the given files
///
/// Stages in the middle of the chain have their stderr discarded.
/// Exit statuses are logged but never treated as failure; only a
/// stage that cannot be spawned is an error.
fn run_stages(stages: &[Stage], stdout_path: &Path, stderr_path: &Path) -> io::Result<()> {
    let mut children: Vec<Child> = Vec::with_capacity(stages.len());

    for (index, stage) in stages.iter().enumerate() {
        let mut cmd = Command::new(&stage.program);
        cmd.args(&stage.args);

        match children.last_mut().and_then(|prev| prev.stdout.take()) {
            Some(upstream) => cmd.stdin(upstream),
            None => cmd.stdin(Stdio::null()),
        };

        if index + 1 == stages.len() {
            cmd.stdout(File::create(stdout_path)?);
            cmd.stderr(File::create(stderr_path)?);
        } else {
            cmd.stdout(Stdio::piped());
            cmd.stderr(Stdio::null());
        }

        match cmd.spawn() {
            Ok(child) => children.push(child),
            Err(err) => {
                for mut child in children {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                return Err(err);
            }
        }
    }

    for (stage, child) in stages.iter().zip(children.iter_mut()) {
        if let Some(limit) = stage.time_limit {
            enforce_time_limit(child, limit);
        }
    }

    for mut child in children {
        match child.wait() {
            Ok(status) if status.success() => {}
            Ok(status) => debug!("pipeline stage exited with {}", status),
            Err(err) => warn!("unable to await pipeline stage: {}", err),
        }
    }

    Ok(())
}

// Wait for the child to exit on its own; kill it at the deadline.
fn enforce_time_limit(child: &mut Child, limit: Duration) {
    let deadline = Instant::now() + limit;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(err) => {
                warn!("unable to poll pipeline stage: {}", err);
                return;
            }
        }
        if Instant::now() >= deadline {
            debug!("stage time limit reached, terminating");
            let _ = child.kill();
            return;
        }
        std::thread::sleep(LIMIT_POLL_INTERVAL);
    }
}
