//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and parses CLI arguments
//! - starts logging
//! - folds flags, environment and prompts into a `RunConfig`
//! - runs the pipeline and prints the report
//! - appends the result log and writes optional exports

use std::path::PathBuf;

use clap::Parser;

use crate::cli::{Cli, Command, MeasureArgs, SynthArgs, prompt};
use crate::data::SyntheticFrame;
use crate::domain::{PathKind, RunConfig, SnrCurve};
use crate::error::AppError;
use crate::instrument::InstrumentProfile;

pub mod pipeline;

/// Entry point for the `starcal` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = crate::logging::resolve_level(cli.log_level.as_deref());
    let _logger = crate::logging::init(&level, cli.log_dir.as_deref())?;

    match cli.command {
        Command::Measure(args) => handle_measure(&args),
        Command::Curve(args) => handle_curve(&args),
        Command::Synth(args) => handle_synth(&args),
        Command::Profiles => handle_profiles(),
    }
}

fn handle_measure(args: &MeasureArgs) -> Result<(), AppError> {
    let config = run_config_from_args(args)?;
    let run = execute_measure(&config)?;
    println!("{}", crate::report::format_measurement(&run));
    Ok(())
}

fn handle_curve(args: &MeasureArgs) -> Result<(), AppError> {
    let config = run_config_from_args(args)?;
    let run = pipeline::run_curves(&config)?;
    if let Some(path) = &config.export_curve {
        let sky_median = run.background.stats.median;
        export_curves(path, &config, run.inspection.exposure.band, sky_median, run.curves())?;
    }
    println!("{}", crate::report::format_curves(&run));
    Ok(())
}

/// Run the full pipeline, then persist its outputs.
///
/// The result log is touched only once the pipeline has succeeded.
pub fn execute_measure(config: &RunConfig) -> Result<pipeline::MeasurementRun, AppError> {
    let run = pipeline::run_measurement(config)?;

    if let Some(path) = &config.results_path {
        crate::io::append_result(path, &run.result)?;
    }
    if let Some(path) = &config.export_curve {
        export_curves(
            path,
            config,
            run.result.exposure.band,
            run.result.sky.median,
            run.curves.curves(),
        )?;
    }
    Ok(run)
}

fn export_curves(
    path: &std::path::Path,
    config: &RunConfig,
    band: crate::domain::Band,
    sky_median: f64,
    curves: &[(PathKind, SnrCurve)],
) -> Result<(), AppError> {
    let doc = crate::io::curve_file(&config.image_path, band, sky_median, curves);
    crate::io::write_curve_json(path, &doc)?;
    log::info!("Exported SNR curves to {}", path.display());
    Ok(())
}

fn handle_synth(args: &SynthArgs) -> Result<(), AppError> {
    let profile = match &args.profile_file {
        Some(path) => InstrumentProfile::from_json_file(path)?,
        None => InstrumentProfile::by_name(&args.instrument)?,
    };
    let detector_mode = match &args.detector_mode {
        Some(mode) => {
            let mode = crate::instrument::normalize_mode(mode);
            profile.detector(&mode)?;
            mode
        }
        None => profile
            .detector_modes
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| AppError::config(format!("Profile '{}' has no detector modes.", profile.name)))?,
    };

    let frame = SyntheticFrame {
        width: args.width,
        height: args.height,
        sky: args.sky,
        star_x: args.star_x,
        star_y: args.star_y,
        star_flux: args.flux,
        fwhm: args.fwhm,
        noise_sigma: args.noise,
        seed: args.seed,
        band: args.band,
        exposure_time: args.exposure,
        air_mass: args.airmass,
        detector_mode,
        profile,
        ra: args.ra,
        dec: args.dec,
    };
    let image = frame.generate()?;
    image.save(&args.output)?;

    let (ra, dec) = frame.star_sky_position()?;
    log::info!("Wrote synthetic frame to {}", args.output.display());
    println!(
        "Wrote {} ({}x{}, {} profile). Star at ({}, {}) px = RA {ra:.7}, Dec {dec:+.7}.",
        args.output.display(),
        frame.width,
        frame.height,
        frame.profile.name,
        frame.star_x,
        frame.star_y
    );
    Ok(())
}

fn handle_profiles() -> Result<(), AppError> {
    println!("{}", crate::report::format_profiles(&InstrumentProfile::builtin()));
    Ok(())
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Fold flags, environment defaults and (on a terminal) prompts into a `RunConfig`.
pub fn run_config_from_args(args: &MeasureArgs) -> Result<RunConfig, AppError> {
    let image_path = match &args.image {
        Some(path) => prompt::validate_image_path(path)?,
        None => prompt::prompt_for_image()?,
    };
    let x = match args.x {
        Some(x) => x,
        None => prompt::prompt_for_f64("Approximate x (column, 0-based)", "-x <px>", |v| v >= 0.0)?,
    };
    let y = match args.y {
        Some(y) => y,
        None => prompt::prompt_for_f64("Approximate y (row, 0-based)", "-y <px>", |v| v >= 0.0)?,
    };
    let user_fwhm = match args.fwhm {
        Some(fwhm) => fwhm,
        None => prompt::prompt_for_f64("FWHM hypothesis (px)", "--fwhm <px>", |v| v > 0.0)?,
    };

    if !(x.is_finite() && y.is_finite()) {
        return Err(AppError::config(format!("Invalid position ({x}, {y}).")));
    }
    if !(user_fwhm.is_finite() && user_fwhm > 0.0) {
        return Err(AppError::config(format!("--fwhm must be > 0 (got {user_fwhm}).")));
    }
    if !(args.max_separation_arcsec.is_finite() && args.max_separation_arcsec >= 0.0) {
        return Err(AppError::config(format!(
            "--max-separation-arcsec must be >= 0 (got {}).",
            args.max_separation_arcsec
        )));
    }

    Ok(RunConfig {
        image_path,
        x,
        y,
        user_fwhm,
        catalog_path: args.catalog.clone().or_else(|| env_path("STARCAL_CATALOG")),
        instrument: args.instrument.clone(),
        profile_file: args.profile_file.clone(),
        results_path: args.results.clone().or_else(|| env_path("STARCAL_RESULTS")),
        export_curve: args.export_curve.clone(),
        bkg_image: args.bkg_image.clone(),
        max_separation_arcsec: args.max_separation_arcsec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::pipeline::tests::{fixture, scratch_dir, unit_gain_profile};
    use crate::domain::DEFAULT_MAX_SEPARATION_ARCSEC;

    fn args(image: PathBuf) -> MeasureArgs {
        MeasureArgs {
            image: Some(image),
            x: Some(50.0),
            y: Some(50.0),
            fwhm: Some(4.0),
            catalog: Some(PathBuf::from("catalog.csv")),
            instrument: None,
            profile_file: None,
            results: Some(PathBuf::from("results.tsv")),
            export_curve: None,
            bkg_image: None,
            max_separation_arcsec: DEFAULT_MAX_SEPARATION_ARCSEC,
        }
    }

    #[test]
    fn flags_fold_into_run_config() {
        let dir = scratch_dir("config");
        let image = dir.join("a.fits");
        std::fs::write(&image, b"").unwrap();

        let config = run_config_from_args(&args(image.clone())).unwrap();
        assert_eq!(config.image_path, image);
        assert_eq!(config.user_fwhm, 4.0);
        assert_eq!(config.catalog_path, Some(PathBuf::from("catalog.csv")));

        let bad = MeasureArgs { fwhm: Some(0.0), ..args(image.clone()) };
        assert_eq!(run_config_from_args(&bad).unwrap_err().exit_code(), 2);

        let missing = MeasureArgs { image: Some(dir.join("nope.fits")), ..args(image) };
        assert_eq!(run_config_from_args(&missing).unwrap_err().exit_code(), 4);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn successful_runs_append_and_export() {
        let dir = scratch_dir("append");
        let frame = SyntheticFrame {
            profile: unit_gain_profile(),
            ..SyntheticFrame::default()
        };
        let mut config = fixture(&dir, &frame, 4.5);
        config.results_path = Some(dir.join("results.tsv"));
        config.export_curve = Some(dir.join("curves.json"));

        execute_measure(&config).unwrap();
        execute_measure(&config).unwrap();

        let log = std::fs::read_to_string(dir.join("results.tsv")).unwrap();
        assert_eq!(log.lines().count(), 3);
        let curves = crate::io::curve::read_curve_json(&dir.join("curves.json")).unwrap();
        assert_eq!(curves.curves.len(), 2);
        assert_eq!(curves.curves[1].seed_fwhm, 4.5);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn failed_runs_leave_the_result_log_alone() {
        let dir = scratch_dir("noappend");
        let frame = SyntheticFrame::default();
        let mut config = fixture(&dir, &frame, 4.0);
        config.results_path = Some(dir.join("results.tsv"));
        config.catalog_path = Some(dir.join("missing.csv"));

        let err = execute_measure(&config).unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(!dir.join("results.tsv").exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
