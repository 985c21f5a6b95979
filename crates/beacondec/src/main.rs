use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::Parser;
use log::{info, LevelFilter};

use beacon406::{
    Dec406Pipeline, FrequencyBand, OutputFiles, RetryPolicy, RtlPowerScan, ScanController,
    TelegramNotifier, UsbTunerReset,
};

mod cli;

use cli::{Args, CliError};

fn main() {
    match beacondec() {
        Ok(()) => {}
        Err(cli_error) => cli_error.exit(),
    }
}

fn beacondec() -> Result<(), CliError> {
    // Parse options and start logging
    let args = Args::try_parse()?;
    log_setup(&args);

    let band = FrequencyBand::new(args.freq_start, args.freq_end).map_err(anyhow::Error::new)?;

    let outdir = output_directory(&args)?;
    info!("output directory: {}", outdir.display());

    let files = OutputFiles::new(&outdir);
    let alert = TelegramNotifier::from_credentials(
        args.telegram_token.clone(),
        args.telegram_chatid.clone(),
    );
    if alert.is_none() {
        info!("telegram alerting disabled");
    }

    let mut controller = ScanController::new(
        band,
        RtlPowerScan::new(args.ppm),
        UsbTunerReset::new(),
        Dec406Pipeline::new(args.ppm, args.osm, &files.status, &files.trame),
        alert,
        files,
        RetryPolicy::default(),
    );

    // runs until the scan tool fails outright
    controller.run().map_err(anyhow::Error::new)?;
    Ok(())
}

fn log_setup(args: &Args) {
    if args.quiet {
        // no logging
        return;
    } else if std::env::var_os("RUST_LOG").is_none() {
        // parameter controls
        let log_filter = match args.verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        pretty_env_logger::formatted_builder()
            .filter_module("beacon406", log_filter)
            .filter_module("beacondec", log_filter)
            .init();
    } else {
        // environment controls
        pretty_env_logger::init();
    }
}

// Resolve the output directory: the one the user named, or a fresh
// temporary directory that outlives the process. Aborts if the
// resolved directory does not exist.
fn output_directory(args: &Args) -> Result<PathBuf, CliError> {
    let dir = match &args.output_directory {
        Some(dir) => dir.clone(),
        None => tempfile::tempdir()
            .context("unable to create a temporary output directory")?
            .keep(),
    };

    if !dir.is_dir() {
        return Err(anyhow!("output directory \"{}\" not found, aborting", dir.display()).into());
    }

    Ok(dir)
}
