//! Append-only tab-separated result log.
//!
//! The first write to a new (or empty) file emits the header row; every
//! successful run then appends one row. Optional values are empty cells, and
//! per-path columns are prefixed `fit_` (fitted FWHM) and `usr_` (user FWHM).

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::domain::{MeasurementResult, PathKind, PathMeasurement};
use crate::error::AppError;

const RUN_COLUMNS: [&str; 25] = [
    "timestamp",
    "image",
    "instrument",
    "band",
    "exptime",
    "airmass",
    "detector_mode",
    "gain",
    "readout_noise",
    "x0",
    "y0",
    "x",
    "y",
    "fwhm_px",
    "fwhm_arcsec",
    "ra",
    "dec",
    "sky_median",
    "sky_mean",
    "sky_std",
    "star",
    "cat_mag",
    "cat_mag_err",
    "sep_arcsec",
    "sep_3d",
];

const PATH_COLUMNS: [&str; 12] = [
    "seed_fwhm_px",
    "seed_fwhm_arcsec",
    "opt_radius",
    "opt_snr",
    "snr_first",
    "flux",
    "fluxes",
    "peak",
    "peak_mag",
    "peak_dist",
    "inst_mag",
    "zero_point",
];

/// Header row names, in column order.
pub fn header() -> Vec<String> {
    let mut out: Vec<String> = RUN_COLUMNS.iter().map(|c| c.to_string()).collect();
    for kind in [PathKind::Fitted, PathKind::User] {
        out.extend(PATH_COLUMNS.iter().map(|c| format!("{}_{c}", kind.prefix())));
    }
    out
}

/// One log row for `result`, aligned with [`header`].
pub fn row(result: &MeasurementResult) -> Vec<String> {
    let band = result.exposure.band;
    let cat = result.matched.entry.magnitude(band);
    let mut out = vec![
        result.timestamp.to_rfc3339(),
        result.image.clone(),
        result.instrument.clone(),
        band.to_string(),
        num(result.exposure.exposure_time),
        num(result.exposure.air_mass),
        result.exposure.detector_mode.clone(),
        num(result.gain),
        num(result.readout_noise),
        fixed(result.initial_x, 3),
        fixed(result.initial_y, 3),
        fixed(result.centroid.x, 3),
        fixed(result.centroid.y, 3),
        fixed(result.centroid.fwhm_px, 3),
        fixed(result.centroid.fwhm_arcsec, 3),
        fixed(result.ra, 7),
        fixed(result.dec, 7),
        fixed(result.sky.median, 3),
        fixed(result.sky.mean, 3),
        fixed(result.sky.std, 3),
        result.matched.entry.name.clone(),
        cat.map(|m| fixed(m.value, 3)).unwrap_or_default(),
        cat.and_then(|m| m.error).map(|e| fixed(e, 3)).unwrap_or_default(),
        fixed(result.matched.separation_arcsec, 3),
        format!("{:.6e}", result.matched.separation_3d),
    ];
    for path in result.paths() {
        out.extend(path_cells(path));
    }
    out
}

fn path_cells(path: &PathMeasurement) -> Vec<String> {
    let fluxes: Vec<String> = path.curve.fluxes().iter().map(|f| num(*f)).collect();
    vec![
        fixed(path.seed_fwhm_px, 3),
        fixed(path.seed_fwhm_arcsec, 3),
        fixed(path.optimal.radius, 3),
        fixed(path.optimal.snr, 3),
        fixed(path.snr_first, 3),
        num(path.flux),
        fluxes.join(";"),
        path.peak.map(|p| fixed(p.peak, 3)).unwrap_or_default(),
        path.peak.map(|p| fixed(p.mag, 4)).unwrap_or_default(),
        path.peak.map(|p| fixed(p.distance, 3)).unwrap_or_default(),
        fixed(path.instrumental_mag, 4),
        fixed(path.zero_point, 4),
    ]
}

fn num(v: f64) -> String {
    format!("{v}")
}

fn fixed(v: f64, decimals: usize) -> String {
    format!("{v:.decimals$}")
}

/// Append `result` to the log at `path`, writing the header if the file is new or empty.
pub fn append_result(path: &Path, result: &MeasurementResult) -> Result<(), AppError> {
    let expected = header();
    let is_empty = match std::fs::metadata(path) {
        Ok(meta) => meta.len() == 0,
        Err(_) => true,
    };
    if !is_empty {
        check_existing_header(path, &expected)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| AppError::io(format!("Failed to open result log '{}': {e}", path.display())))?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(file);
    let write_err = |e: csv::Error| AppError::io(format!("Failed to write result log '{}': {e}", path.display()));

    if is_empty {
        writer.write_record(&expected).map_err(write_err)?;
    }
    writer.write_record(row(result)).map_err(write_err)?;
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush result log '{}': {e}", path.display())))?;

    log::info!("Appended result to {}", path.display());
    Ok(())
}

/// Warn when an existing log was written with a different column layout.
fn check_existing_header(path: &Path, expected: &[String]) -> Result<(), AppError> {
    let file = std::fs::File::open(path)
        .map_err(|e| AppError::io(format!("Failed to read result log '{}': {e}", path.display())))?;
    let mut first = String::new();
    BufReader::new(file)
        .read_line(&mut first)
        .map_err(|e| AppError::io(format!("Failed to read result log '{}': {e}", path.display())))?;
    let found: Vec<&str> = first.trim_end_matches(['\r', '\n']).split('\t').collect();
    if found != expected.iter().map(String::as_str).collect::<Vec<_>>() {
        log::warn!(
            "Result log '{}' has a different header ({} columns, expected {}); appending anyway",
            path.display(),
            found.len(),
            expected.len()
        );
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::{
        Band, CatalogEntry, CatalogMatch, Centroid, ExposureContext, Magnitude, PeakMeasurement, SkyStats, SnrCurve,
        SnrPoint,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeMap;

    fn path(kind: PathKind, peak: Option<PeakMeasurement>) -> PathMeasurement {
        let point = SnrPoint { multiplier: 1.0, radius: 4.0, flux: 5000.0, snr: 60.0 };
        PathMeasurement {
            kind,
            seed_fwhm_px: 4.0,
            seed_fwhm_arcsec: 1.2,
            curve: SnrCurve { seed_fwhm: 4.0, points: vec![point] },
            optimal: point,
            snr_first: 60.0,
            flux: 5000.0,
            peak,
            instrumental_mag: -7.5,
            zero_point: 20.1,
        }
    }

    pub(crate) fn sample_result() -> MeasurementResult {
        let entry = CatalogEntry {
            name: "SA 92 250".into(),
            ra: 13.9,
            dec: 0.7,
            magnitudes: BTreeMap::from([(Band::V, Magnitude { value: 12.5, error: None })]),
        };
        MeasurementResult {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 22, 15, 0).unwrap(),
            image: "star.fits".into(),
            instrument: "iac80".into(),
            exposure: ExposureContext {
                exposure_time: 10.0,
                air_mass: 1.2,
                band: Band::V,
                detector_mode: "2".into(),
            },
            gain: 1.63,
            readout_noise: 5.6,
            initial_x: 50.0,
            initial_y: 51.0,
            centroid: Centroid { x: 50.1, y: 50.9, fwhm_px: 4.0, fwhm_arcsec: 1.2 },
            ra: 13.9,
            dec: 0.7,
            sky: SkyStats { median: 100.0, mean: 100.2, std: 5.0 },
            matched: CatalogMatch { entry, separation_arcsec: 0.4, separation_3d: 2e-6 },
            fitted: path(PathKind::Fitted, Some(PeakMeasurement { x: 50.0, y: 51.0, peak: 900.0, mag: -9.1, distance: 0.2 })),
            user: path(PathKind::User, None),
        }
    }

    #[test]
    fn header_and_row_align() {
        let header = header();
        let row = row(&sample_result());
        assert_eq!(header.len(), row.len());
        assert_eq!(header.len(), RUN_COLUMNS.len() + 2 * PATH_COLUMNS.len());
        assert!(header.contains(&"fit_zero_point".to_string()));
        assert!(header.contains(&"usr_peak".to_string()));

        let idx = |name: &str| header.iter().position(|h| h == name).unwrap();
        assert_eq!(row[idx("cat_mag_err")], "");
        assert_eq!(row[idx("usr_peak")], "");
        assert_eq!(row[idx("fit_peak")], "900.000");
        assert_eq!(row[idx("fit_fluxes")], "5000");
    }

    #[test]
    fn header_is_written_once() {
        let path = std::env::temp_dir().join(format!("starcal_results_{}.tsv", std::process::id()));
        let _ = std::fs::remove_file(&path);

        append_result(&path, &sample_result()).unwrap();
        append_result(&path, &sample_result()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3, "{text}");
        assert!(lines[0].starts_with("timestamp\timage\t"));
        assert_eq!(lines[1], lines[2]);
        assert_eq!(lines[1].split('\t').count(), header().len());
    }
}
