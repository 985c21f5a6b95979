//! Wideband power scanning
//!
//! One scan pass integrates the whole band for almost a minute, so the
//! controller sees at most one row set per cycle. The scan tool owns
//! the tuner for the duration of the pass.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

use log::debug;
use thiserror::Error;

use crate::band::FrequencyBand;

/// Frequency bin size requested from the scan tool (Hz)
const SCAN_BIN_HZ: u32 = 400;

/// Integration window and single-shot runtime (seconds)
const SCAN_WINDOW_SECS: u32 = 55;

/// Error running the power-scan tool
///
/// Both variants abort the scan session: a tool that cannot launch or
/// exits in error indicates a configuration or hardware problem that
/// retrying will not fix.
#[derive(Error, Debug)]
pub enum ScanError {
    /// The scan tool could not be started
    #[error("unable to launch power-scan tool: {0}")]
    Launch(#[from] io::Error),

    /// The scan tool ran but exited with a failure status
    #[error("power-scan tool failed: {0}")]
    ToolFailed(ExitStatus),
}

/// Source of wideband power measurements
pub trait SpectrumSource {
    /// Scan `band` once, writing CSV rows to `output`
    ///
    /// Success means only that the tool ran and exited cleanly. The
    /// file at `output` may still be absent afterwards; the caller
    /// treats that as a transient tuner fault, not an error.
    fn scan(&mut self, band: FrequencyBand, output: &Path) -> Result<(), ScanError>;
}

/// `rtl_power` front end
pub struct RtlPowerScan {
    program: PathBuf,
    ppm: i32,
}

impl RtlPowerScan {
    /// Scan with `rtl_power` from the search path
    ///
    /// `ppm` is the tuner crystal correction, in parts-per-million.
    pub fn new(ppm: i32) -> Self {
        Self::with_program("rtl_power", ppm)
    }

    /// Scan with an alternate executable
    pub fn with_program<P>(program: P, ppm: i32) -> Self
    where
        P: Into<PathBuf>,
    {
        Self {
            program: program.into(),
            ppm,
        }
    }

    fn command(&self, band: FrequencyBand, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-p")
            .arg(self.ppm.to_string())
            .arg("-f")
            .arg(format!(
                "{}:{}:{}",
                band.start_hz(),
                band.end_hz(),
                SCAN_BIN_HZ
            ))
            .arg(format!("-i{}", SCAN_WINDOW_SECS))
            .arg("-P")
            .arg("-O")
            .arg("-1")
            .arg(format!("-e{}", SCAN_WINDOW_SECS))
            .arg("-w")
            .arg("hamming")
            .arg(output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

impl SpectrumSource for RtlPowerScan {
    fn scan(&mut self, band: FrequencyBand, output: &Path) -> Result<(), ScanError> {
        debug!(
            "running power scan over {}:{} Hz",
            band.start_hz(),
            band.end_hz()
        );
        let status = self.command(band, output).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ScanError::ToolFailed(status))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_arguments() {
        let band = FrequencyBand::new(406_000_000, 407_000_000).unwrap();
        let scan = RtlPowerScan::new(-2);
        let cmd = scan.command(band, Path::new("/tmp/log_power.csv"));

        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            [
                "-p",
                "-2",
                "-f",
                "406000000:407000000:400",
                "-i55",
                "-P",
                "-O",
                "-1",
                "-e55",
                "-w",
                "hamming",
                "/tmp/log_power.csv",
            ]
        );
        assert_eq!(cmd.get_program(), "rtl_power");
    }
}
