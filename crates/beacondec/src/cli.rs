use std::fmt::Display;
use std::path::PathBuf;

use clap::{error::ErrorKind, CommandFactory, Parser};

const USAGE_SHORT: &str = r#"
This program drives an RTL-SDR dongle to hunt for 406 MHz distress beacons. It sweeps the configured band for signal energy, locks onto the strongest frequency, and runs an external FM-demodulate / filter / decode chain there until frames stop arriving.

See --help for more details.

ALWAYS TEST YOUR RECEIVING SETUP!
"#;

const USAGE_LONG: &str = r#"
This program drives an RTL-SDR dongle to hunt for 406 MHz distress beacons. It sweeps the configured band with rtl_power, locks onto the strongest frequency bin, and pipes

    rtl_fm | sox | dec406_V7

at that frequency until a decode window passes without a frame. Decoded frames land in the output directory ("trame"), decoder diagnostics in "code", and raw scan samples in "log_power.csv".

The external tools must be available: rtl_power and rtl_fm from rtl-sdr, sox, the dec406 decoder, and the reset_usb helper for power-cycling a wedged dongle. The scanner keeps itself alive through tuner glitches by resetting the dongle and rescanning.

With both --telegram-token and --telegram-chatid set, every decoded frame raises a Telegram alert stamped with the scan session's start time. Leaving either unset disables alerting.

ALWAYS TEST YOUR RECEIVING SETUP!
"#;

/// Top-level program arguments
#[derive(Parser, Clone, Debug)]
#[command(version)]
#[command(about, long_about = None)]
#[command(after_help = USAGE_SHORT, after_long_help = USAGE_LONG)]
#[command(max_term_width = 100)]
pub struct Args {
    /// Verbosity level (-vvv for more)
    #[arg(short, long, default_value_t = 0, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print nothing, not even decoded frames
    #[arg(short, long)]
    pub quiet: bool,

    /// Scan start frequency (Hz)
    #[arg(short = 's', long, default_value_t = 406_000_000)]
    pub freq_start: u64,

    /// Scan end frequency (Hz)
    #[arg(short = 'e', long, default_value_t = 407_000_000)]
    pub freq_end: u64,

    /// Tuner crystal correction (parts-per-million)
    #[arg(long, default_value_t = 0)]
    pub ppm: i32,

    /// Pass the alternate decode mode flag to the decoder
    #[arg(long)]
    pub osm: bool,

    /// Telegram bot token for alerting
    #[arg(short = 'T', long)]
    pub telegram_token: Option<String>,

    /// Telegram chat to alert
    #[arg(short = 'C', long)]
    pub telegram_chatid: Option<String>,

    /// Directory for output files
    ///
    /// Must exist. If omitted, a fresh temporary directory is
    /// created and kept.
    #[arg(short = 'O', long)]
    pub output_directory: Option<PathBuf>,
}

/// A program-level error with exit code
#[derive(Debug)]
pub struct CliError {
    error: anyhow::Error,
    exit_code: i32,
}

impl CliError {
    /// Create new error with a custom exit code
    pub fn new(error: anyhow::Error, code: i32) -> CliError {
        CliError {
            error,
            exit_code: code,
        }
    }

    /// Print this error to the terminal
    ///
    /// Errors from clap are printed verbatim. Other types of errors
    /// are printed indirectly via clap's fancy formatter.
    pub fn print(&self) -> std::io::Result<()> {
        if let Some(e) = self.error.downcast_ref::<clap::Error>() {
            e.print()
        } else {
            Args::command()
                .error(ErrorKind::Format, self.to_string())
                .print()
        }
    }

    /// Print this error to the terminal and exit
    pub fn exit(&self) -> ! {
        drop(self.print());
        std::process::exit(self.exit_code);
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.error)
    }
}

impl std::error::Error for CliError {}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> CliError {
        CliError::new(err, 1)
    }
}

impl From<clap::Error> for CliError {
    fn from(err: clap::Error) -> CliError {
        let code = if err.use_stderr() { 1 } else { 0 };
        CliError::new(err.into(), code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clap() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }

    #[test]
    fn test_default_band() {
        let args = Args::try_parse_from(["beacondec"]).unwrap();
        assert_eq!(args.freq_start, 406_000_000);
        assert_eq!(args.freq_end, 407_000_000);
        assert_eq!(args.ppm, 0);
        assert!(!args.osm);
        assert!(args.telegram_token.is_none());
    }

    #[test]
    fn test_short_options() {
        let args =
            Args::try_parse_from(["beacondec", "-s", "406020000", "-e", "406040000", "-T", "tok"])
                .unwrap();
        assert_eq!(args.freq_start, 406_020_000);
        assert_eq!(args.freq_end, 406_040_000);
        assert_eq!(args.telegram_token.as_deref(), Some("tok"));
    }
}
