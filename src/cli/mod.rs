//! Command-line parsing for the single-star calibrator.
//!
//! Argument parsing and command dispatch stay separate from the photometry
//! code; `app` folds these structs into a `RunConfig`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{Band, DEFAULT_MAX_SEPARATION_ARCSEC};

pub mod prompt;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "starcal", version, about = "Single-star photometric zero-point calibration")]
pub struct Cli {
    /// Log level spec (e.g. `info`, `debug`, `starcal=trace`). Falls back to `STARCAL_LOG`.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write rotated log files into this directory.
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Measure one star end to end and append the result to the log.
    Measure(MeasureArgs),
    /// Build and print the two SNR curves only (no catalog needed).
    Curve(MeasureArgs),
    /// Write a synthetic single-star FITS frame.
    Synth(SynthArgs),
    /// List the built-in instrument profiles.
    Profiles,
}

/// Options shared by `measure` and `curve`.
#[derive(Debug, Args, Clone)]
pub struct MeasureArgs {
    /// FITS image. Prompted for when omitted on a terminal.
    #[arg(long, value_name = "FITS")]
    pub image: Option<PathBuf>,

    /// Approximate source column (0-based).
    #[arg(short = 'x', long = "x", allow_negative_numbers = true)]
    pub x: Option<f64>,

    /// Approximate source row (0-based).
    #[arg(short = 'y', long = "y", allow_negative_numbers = true)]
    pub y: Option<f64>,

    /// User FWHM hypothesis (pixels).
    #[arg(long)]
    pub fwhm: Option<f64>,

    /// Standard-star catalog CSV. Falls back to `STARCAL_CATALOG`.
    #[arg(long, value_name = "CSV")]
    pub catalog: Option<PathBuf>,

    /// Instrument profile name; skips header detection.
    #[arg(long)]
    pub instrument: Option<String>,

    /// Custom instrument profile (JSON).
    #[arg(long, value_name = "JSON")]
    pub profile_file: Option<PathBuf>,

    /// Result log (TSV, appended). Falls back to `STARCAL_RESULTS`.
    #[arg(long, value_name = "TSV")]
    pub results: Option<PathBuf>,

    /// Write both SNR curves to JSON.
    #[arg(long = "export-curve", value_name = "JSON")]
    pub export_curve: Option<PathBuf>,

    /// Where to write the sky-subtracted frame (default `<stem>_bkg.fits`).
    #[arg(long, value_name = "FITS")]
    pub bkg_image: Option<PathBuf>,

    /// Catalog separation above which the match is flagged.
    #[arg(long, default_value_t = DEFAULT_MAX_SEPARATION_ARCSEC)]
    pub max_separation_arcsec: f64,
}

/// Options for `synth`.
#[derive(Debug, Args, Clone)]
pub struct SynthArgs {
    /// Output FITS path.
    #[arg(short = 'o', long, value_name = "FITS")]
    pub output: PathBuf,

    #[arg(long, default_value_t = 100)]
    pub width: usize,

    #[arg(long, default_value_t = 100)]
    pub height: usize,

    /// Sky level (ADU).
    #[arg(long, default_value_t = 100.0)]
    pub sky: f64,

    /// Star column (0-based).
    #[arg(long, default_value_t = 50.0)]
    pub star_x: f64,

    /// Star row (0-based).
    #[arg(long, default_value_t = 50.0)]
    pub star_y: f64,

    /// Total star flux (ADU).
    #[arg(long, default_value_t = 50_000.0)]
    pub flux: f64,

    #[arg(long, default_value_t = 4.0)]
    pub fwhm: f64,

    /// Per-pixel Gaussian noise (ADU); 0 disables noise.
    #[arg(long, default_value_t = 5.0)]
    pub noise: f64,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    #[arg(long, value_enum, default_value_t = Band::V)]
    pub band: Band,

    #[arg(long, default_value_t = 10.0)]
    pub exposure: f64,

    #[arg(long, default_value_t = 1.2)]
    pub airmass: f64,

    /// Built-in instrument profile name.
    #[arg(long, default_value = "iac80")]
    pub instrument: String,

    /// Custom instrument profile (JSON); overrides `--instrument`.
    #[arg(long, value_name = "JSON")]
    pub profile_file: Option<PathBuf>,

    /// Detector mode (default: the profile's first mode).
    #[arg(long)]
    pub detector_mode: Option<String>,

    /// Right ascension of the frame center (degrees).
    #[arg(long, default_value_t = 150.0)]
    pub ra: f64,

    /// Declination of the frame center (degrees).
    #[arg(long, default_value_t = 20.0, allow_negative_numbers = true)]
    pub dec: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn measure_flags_parse() {
        let cli = Cli::parse_from([
            "starcal", "measure", "--image", "a.fits", "-x", "50.5", "-y", "49", "--fwhm", "4", "--log-level", "debug",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        let Command::Measure(args) = cli.command else {
            panic!("expected measure");
        };
        assert_eq!(args.x, Some(50.5));
        assert_eq!(args.y, Some(49.0));
        assert_eq!(args.max_separation_arcsec, DEFAULT_MAX_SEPARATION_ARCSEC);
        assert!(args.catalog.is_none());
    }
}
