//! The measurement pipeline shared by `measure` and `curve`.
//!
//! Stages run strictly in dependency order:
//! header -> background -> sky-subtracted artifact -> centroid -> SNR curves
//! -> peaks -> catalog match -> calibration.
//!
//! The CLI front-end only formats what comes back from here.

use std::path::PathBuf;

use crate::catalog::{SkyMatch, match_centroid};
use crate::domain::{MeasurementResult, PathKind, PathMeasurement, RunConfig, SnrCurve, Source};
use crate::error::AppError;
use crate::image::{Image, default_bkg_path};
use crate::instrument::{HeaderInspection, inspect};
use crate::io::catalog::{Catalog, load_catalog};
use crate::photometry::{BackgroundEstimate, calibrate, estimate_background, locate_peak, refine_centroid, snr_curve};

/// Everything up to and including the SNR curves.
#[derive(Debug, Clone)]
pub struct CurveRun {
    pub image: Image,
    pub inspection: HeaderInspection,
    pub background: BackgroundEstimate,
    /// Where the sky-subtracted frame was written.
    pub bkg_path: PathBuf,
    pub source: Source,
}

impl CurveRun {
    /// The two curves in path order (fitted, user).
    pub fn curves(&self) -> &[(PathKind, SnrCurve)] {
        &self.source.curves
    }
}

/// All outputs of a full `measure` run.
#[derive(Debug, Clone)]
pub struct MeasurementRun {
    pub curves: CurveRun,
    pub catalog: Catalog,
    pub sky_match: SkyMatch,
    pub result: MeasurementResult,
}

/// Header, background, centroid and both SNR curves.
pub fn run_curves(config: &RunConfig) -> Result<CurveRun, AppError> {
    let mut source = Source::new(config.x, config.y);

    // 1) Image + header.
    let image = Image::open(&config.image_path)?;
    let inspection = inspect(&image.header, config.instrument.as_deref(), config.profile_file.as_deref())?;
    let profile = &inspection.profile;
    let exposure = &inspection.exposure;

    // 2) Sky.
    let background = estimate_background(&image.data)?;
    let sky = background.stats;
    source.sky = Some(sky);

    // 3) Sky-subtracted artifact; centroid and curves read this frame.
    let subtracted = image.subtract_sky(sky.median);
    let bkg_path = config
        .bkg_image
        .clone()
        .unwrap_or_else(|| default_bkg_path(&config.image_path));
    subtracted.save(&bkg_path)?;
    log::info!("Wrote sky-subtracted frame to {}", bkg_path.display());

    // 4) Centroid.
    let centroid = refine_centroid(&subtracted.data, config.x, config.y, profile.plate_scale)?;
    source.centroid = Some(centroid);

    // 5) One curve per seed FWHM.
    for (kind, seed) in [(PathKind::Fitted, centroid.fwhm_px), (PathKind::User, config.user_fwhm)] {
        let curve = snr_curve(
            &subtracted.data,
            centroid.x,
            centroid.y,
            seed,
            sky.median,
            profile,
            &exposure.detector_mode,
        )?;
        if let Some(best) = curve.optimal() {
            log::info!(
                "SNR ({}, seed {seed:.3} px): optimal r={:.2} px ({}×FWHM), SNR={:.2}, flux={} ADU",
                kind.display_name(),
                best.radius,
                best.multiplier,
                best.snr,
                best.flux
            );
        }
        source.curves.push((kind, curve));
    }

    Ok(CurveRun {
        image,
        inspection,
        background,
        bkg_path,
        source,
    })
}

/// The full pipeline: curves, peaks, catalog match and zero points.
///
/// Nothing is written to the result log here; the caller appends only after
/// this returns `Ok`.
pub fn run_measurement(config: &RunConfig) -> Result<MeasurementRun, AppError> {
    let catalog_path = config.catalog_path.as_ref().ok_or_else(|| {
        AppError::config("No catalog given; pass --catalog <CSV> or set STARCAL_CATALOG.")
    })?;

    let mut curves = run_curves(config)?;
    let sky = curves.background.stats;
    let centroid = curves
        .source
        .centroid
        .ok_or_else(|| AppError::domain("Centroid missing after refinement."))?;

    // 6) Peaks on the original frame; absence is not an error.
    let seeds: Vec<(PathKind, f64)> = curves.curves().iter().map(|(k, c)| (*k, c.seed_fwhm)).collect();
    for (kind, seed) in seeds {
        let peak = locate_peak(&curves.image.data, &sky, &centroid, seed)?;
        curves.source.peaks.push((kind, peak));
    }

    // 7) Catalog match.
    let catalog = load_catalog(catalog_path)?;
    let wcs = curves.image.require_wcs()?;
    let sky_match = match_centroid(&centroid, wcs, &catalog.entries, config.max_separation_arcsec)?;

    // 8) Zero points.
    let inspection = &curves.inspection;
    let exposure = &inspection.exposure;
    let extinction = inspection.profile.extinction(exposure.band)?;

    let mut paths = Vec::with_capacity(2);
    for kind in [PathKind::Fitted, PathKind::User] {
        let curve = curves
            .source
            .curve(kind)
            .ok_or_else(|| AppError::domain(format!("No SNR curve for the {} path.", kind.display_name())))?
            .clone();
        let optimal = curve
            .optimal()
            .ok_or_else(|| AppError::domain("SNR curve has no points."))?;
        let calibration = calibrate(
            optimal.flux,
            exposure.exposure_time,
            &sky_match.matched.entry,
            exposure.band,
            extinction,
            exposure.air_mass,
        )?;
        log::info!(
            "Zero point ({}): {:.4} (inst {:.4})",
            kind.display_name(),
            calibration.zero_point,
            calibration.instrumental_mag
        );
        paths.push(PathMeasurement {
            kind,
            seed_fwhm_px: curve.seed_fwhm,
            seed_fwhm_arcsec: curve.seed_fwhm * inspection.profile.plate_scale,
            snr_first: curve.first_snr().unwrap_or(0.0),
            optimal,
            flux: optimal.flux,
            peak: curves.source.peak(kind),
            instrumental_mag: calibration.instrumental_mag,
            zero_point: calibration.zero_point,
            curve,
        });
    }
    let [fitted, user]: [PathMeasurement; 2] = paths
        .try_into()
        .map_err(|_| AppError::domain("Expected exactly two measurement paths."))?;

    let result = MeasurementResult {
        timestamp: chrono::Utc::now(),
        image: config.image_path.display().to_string(),
        instrument: inspection.profile.name.clone(),
        exposure: exposure.clone(),
        gain: inspection.detector.gain,
        readout_noise: inspection.detector.readout_noise,
        initial_x: curves.source.initial_x,
        initial_y: curves.source.initial_y,
        centroid,
        ra: sky_match.ra,
        dec: sky_match.dec,
        sky,
        matched: sky_match.matched.clone(),
        fitted,
        user,
    };

    Ok(MeasurementRun {
        curves,
        catalog,
        sky_match,
        result,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::SyntheticFrame;
    use crate::instrument::{DetectorNoise, InstrumentProfile};
    use std::collections::BTreeMap;
    use std::path::Path;

    /// Scratch directory unique to one test.
    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("starcal_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// The IAC80 profile with a single unit-gain mode (gain 1, readout noise 5).
    pub(crate) fn unit_gain_profile() -> InstrumentProfile {
        InstrumentProfile {
            detector_modes: BTreeMap::from([("1".to_string(), DetectorNoise { gain: 1.0, readout_noise: 5.0 })]),
            ..InstrumentProfile::iac80()
        }
    }

    /// Write the frame, its profile, and a two-star catalog; return a config.
    pub(crate) fn fixture(dir: &Path, frame: &SyntheticFrame, user_fwhm: f64) -> RunConfig {
        let image_path = dir.join("star.fits");
        frame.generate().unwrap().save(&image_path).unwrap();

        let profile_path = dir.join("profile.json");
        std::fs::write(&profile_path, serde_json::to_string(&frame.profile).unwrap()).unwrap();

        let (ra, dec) = frame.star_sky_position().unwrap();
        let catalog_path = dir.join("catalog.csv");
        std::fs::write(
            &catalog_path,
            format!(
                "name,ra,dec,U,eU,B,eB,V,eV,R,eR,I,eI\n\
                 TARGET,{ra},{dec},13.1,0.02,12.9,0.01,12.5,0.01,12.2,,12.0,\n\
                 FIELD,{},{dec},11.0,,11.0,,11.0,,11.0,,11.0,\n",
                ra + 0.05
            ),
        )
        .unwrap();

        RunConfig {
            image_path,
            x: frame.star_x + 0.7,
            y: frame.star_y - 0.6,
            user_fwhm,
            catalog_path: Some(catalog_path),
            instrument: None,
            profile_file: Some(profile_path),
            results_path: None,
            export_curve: None,
            bkg_image: None,
            max_separation_arcsec: 10.0,
        }
    }

    #[test]
    fn synthetic_star_end_to_end() {
        let dir = scratch_dir("e2e");
        let frame = SyntheticFrame {
            profile: unit_gain_profile(),
            ..SyntheticFrame::default()
        };
        let config = fixture(&dir, &frame, 5.0);

        let run = run_measurement(&config).unwrap();
        let result = &run.result;

        assert!((result.sky.median - 100.0).abs() < 1.0, "sky median {}", result.sky.median);
        assert!(
            (result.centroid.x - 50.0).abs() < 0.5 && (result.centroid.y - 50.0).abs() < 0.5,
            "centroid ({}, {})",
            result.centroid.x,
            result.centroid.y
        );
        assert!((result.centroid.fwhm_px - 4.0).abs() < 0.8, "fwhm {}", result.centroid.fwhm_px);

        let fitted = &result.fitted;
        assert_eq!(fitted.curve.points.len(), 8);
        assert!(
            (1.0..=1.5).contains(&fitted.optimal.multiplier),
            "optimal at {}×FWHM",
            fitted.optimal.multiplier
        );
        assert_eq!(result.user.seed_fwhm_px, 5.0);
        assert!((result.user.seed_fwhm_arcsec - 5.0 * 0.304).abs() < 1e-12);

        assert_eq!(result.matched.entry.name, "TARGET");
        assert!(result.matched.separation_arcsec < 1.0, "sep {}", result.matched.separation_arcsec);
        assert_eq!(result.gain, 1.0);

        let peak = fitted.peak.expect("fitted path should find the star");
        assert!(peak.distance < 1.5, "peak distance {}", peak.distance);

        for path in result.paths() {
            let inst = -2.5 * (path.flux / 10.0).log10();
            assert!((path.instrumental_mag - inst).abs() < 1e-9);
            let zp = 12.5 - inst + 0.13 * 1.2;
            assert!((path.zero_point - zp).abs() < 1e-9);
        }

        assert!(run.curves.bkg_path.ends_with("star_bkg.fits"));
        let bkg = Image::open(&run.curves.bkg_path).unwrap();
        let skysub = bkg.header.get_f64("SKYSUB").unwrap();
        assert!((skysub - result.sky.median).abs() < 1e-9);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_peak_is_not_fatal() {
        let dir = scratch_dir("nopeak");
        let frame = SyntheticFrame {
            width: 60,
            height: 60,
            star_x: 30.0,
            star_y: 30.0,
            profile: unit_gain_profile(),
            ..SyntheticFrame::default()
        };
        // A detection kernel this wide cannot fit anywhere on a 60 px frame.
        let config = fixture(&dir, &frame, 48.0);

        let run = run_measurement(&config).unwrap();
        assert!(run.result.fitted.peak.is_some());
        assert!(run.result.user.peak.is_none());
        assert!(run.result.user.zero_point.is_finite());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn curves_need_no_catalog() {
        let dir = scratch_dir("curves");
        let frame = SyntheticFrame::default();
        let mut config = fixture(&dir, &frame, 4.0);
        config.catalog_path = None;
        config.profile_file = None;
        config.bkg_image = Some(dir.join("custom_bkg.fits"));

        let run = run_curves(&config).unwrap();
        assert_eq!(run.inspection.profile.name, "iac80");
        assert_eq!(run.curves().len(), 2);
        assert!(dir.join("custom_bkg.fits").exists());

        let err = run_measurement(&config).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn star_near_the_edge_is_a_domain_error() {
        let dir = scratch_dir("edge");
        let frame = SyntheticFrame::default();
        let mut config = fixture(&dir, &frame, 4.0);
        config.x = 3.0;

        let err = run_measurement(&config).unwrap_err();
        assert_eq!(err.exit_code(), 3, "{err}");

        let _ = std::fs::remove_dir_all(&dir);
    }
}
