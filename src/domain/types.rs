//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - passed stage-to-stage by the measurement pipeline
//! - exported to the result log (TSV) and curve JSON
//! - printed by the terminal report

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Photometric band (Johnson–Cousins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum)]
pub enum Band {
    U,
    B,
    V,
    R,
    I,
}

impl Band {
    pub const ALL: [Band; 5] = [Band::U, Band::B, Band::V, Band::R, Band::I];

    pub fn as_str(self) -> &'static str {
        match self {
            Band::U => "U",
            Band::B => "B",
            Band::V => "V",
            Band::R => "R",
            Band::I => "I",
        }
    }

    /// Parse a single band code, case-insensitive (`"v"` → `V`).
    pub fn from_code(code: &str) -> Option<Band> {
        let code = code.trim();
        Band::ALL
            .into_iter()
            .find(|band| band.as_str().eq_ignore_ascii_case(code))
    }

    /// Parse a header filter value such as `"V"`, `"Johnson V"` or `"V_JOHNSON"`.
    ///
    /// The first token that is exactly one recognized band letter wins.
    pub fn from_filter_name(value: &str) -> Option<Band> {
        if let Some(band) = Band::from_code(value) {
            return Some(band);
        }
        value
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|token| !token.is_empty())
            .find_map(Band::from_code)
    }
}

impl std::fmt::Display for Band {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exposure parameters extracted once from the image header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExposureContext {
    /// Exposure time (seconds, > 0).
    pub exposure_time: f64,
    /// Air mass (> 0).
    pub air_mass: f64,
    pub band: Band,
    /// Normalized detector-mode identifier (key into the gain table).
    pub detector_mode: String,
}

/// Robust sky statistics over unmasked pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SkyStats {
    pub median: f64,
    pub mean: f64,
    pub std: f64,
}

/// Refined source position and width.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Centroid {
    /// Column (0-based, sub-pixel).
    pub x: f64,
    /// Row (0-based, sub-pixel).
    pub y: f64,
    pub fwhm_px: f64,
    pub fwhm_arcsec: f64,
}

/// One point of the SNR curve of growth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnrPoint {
    /// Aperture radius as a multiple of the seed FWHM.
    pub multiplier: f64,
    /// Aperture radius (pixels).
    pub radius: f64,
    /// Background-subtracted flux (ADU, rounded).
    pub flux: f64,
    pub snr: f64,
}

/// SNR curve of growth for one seed FWHM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnrCurve {
    pub seed_fwhm: f64,
    pub points: Vec<SnrPoint>,
}

impl SnrCurve {
    /// The point with maximum SNR (first one on ties).
    pub fn optimal(&self) -> Option<SnrPoint> {
        self.points.iter().copied().fold(None, |best, p| match best {
            Some(b) if b.snr >= p.snr => Some(b),
            _ => Some(p),
        })
    }

    pub fn first_snr(&self) -> Option<f64> {
        self.points.first().map(|p| p.snr)
    }

    pub fn fluxes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.flux).collect()
    }
}

/// Nearest point-source detection to the refined centroid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakMeasurement {
    pub x: f64,
    pub y: f64,
    /// Peak pixel value (sky-subtracted).
    pub peak: f64,
    /// Detection magnitude, `-2.5 log10(flux)` over the detection footprint.
    pub mag: f64,
    /// Distance from the refined centroid (pixels).
    pub distance: f64,
}

/// A catalog magnitude with its (optional) uncertainty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Magnitude {
    pub value: f64,
    pub error: Option<f64>,
}

/// One standard star from the calibration catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    /// Right ascension (degrees).
    pub ra: f64,
    /// Declination (degrees).
    pub dec: f64,
    pub magnitudes: BTreeMap<Band, Magnitude>,
}

impl CatalogEntry {
    pub fn magnitude(&self, band: Band) -> Option<Magnitude> {
        self.magnitudes.get(&band).copied()
    }
}

/// Nearest catalog entry plus how far away it is.
///
/// No distance threshold is applied; callers judge validity from the separation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogMatch {
    pub entry: CatalogEntry,
    pub separation_arcsec: f64,
    /// Chord length between the unit vectors (dimensionless).
    pub separation_3d: f64,
}

/// Which seed FWHM a measurement path starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathKind {
    /// FWHM measured by the centroid refiner.
    Fitted,
    /// FWHM supplied by the user.
    User,
}

impl PathKind {
    pub fn display_name(self) -> &'static str {
        match self {
            PathKind::Fitted => "fitted FWHM",
            PathKind::User => "user FWHM",
        }
    }

    /// Column prefix in the result log.
    pub fn prefix(self) -> &'static str {
        match self {
            PathKind::Fitted => "fit",
            PathKind::User => "usr",
        }
    }
}

/// Everything measured along one seed-FWHM path.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathMeasurement {
    pub kind: PathKind,
    pub seed_fwhm_px: f64,
    pub seed_fwhm_arcsec: f64,
    pub curve: SnrCurve,
    pub optimal: SnrPoint,
    pub snr_first: f64,
    /// Flux used for calibration (flux at the optimal aperture).
    pub flux: f64,
    pub peak: Option<PeakMeasurement>,
    pub instrumental_mag: f64,
    pub zero_point: f64,
}

/// Stage-by-stage accumulator for the target star.
///
/// Created from the user's approximate position and filled in as the
/// pipeline advances; read-only once calibration starts.
#[derive(Debug, Clone, Default)]
pub struct Source {
    pub initial_x: f64,
    pub initial_y: f64,
    pub sky: Option<SkyStats>,
    pub centroid: Option<Centroid>,
    pub curves: Vec<(PathKind, SnrCurve)>,
    pub peaks: Vec<(PathKind, Option<PeakMeasurement>)>,
}

impl Source {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            initial_x: x,
            initial_y: y,
            ..Self::default()
        }
    }

    pub fn curve(&self, kind: PathKind) -> Option<&SnrCurve> {
        self.curves.iter().find(|(k, _)| *k == kind).map(|(_, c)| c)
    }

    pub fn peak(&self, kind: PathKind) -> Option<PeakMeasurement> {
        self.peaks
            .iter()
            .find(|(k, _)| *k == kind)
            .and_then(|(_, p)| *p)
    }
}

/// Final, append-only record of one run.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementResult {
    pub timestamp: DateTime<Utc>,
    pub image: String,
    pub instrument: String,
    pub exposure: ExposureContext,
    pub gain: f64,
    pub readout_noise: f64,
    pub initial_x: f64,
    pub initial_y: f64,
    pub centroid: Centroid,
    pub ra: f64,
    pub dec: f64,
    pub sky: SkyStats,
    pub matched: CatalogMatch,
    pub fitted: PathMeasurement,
    pub user: PathMeasurement,
}

impl MeasurementResult {
    pub fn paths(&self) -> [&PathMeasurement; 2] {
        [&self.fitted, &self.user]
    }
}

/// Portable SNR curve export (`--export-curve`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveFile {
    pub tool: String,
    pub created: DateTime<Utc>,
    pub image: String,
    pub band: Band,
    pub sky_median: f64,
    pub curves: Vec<CurveExport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveExport {
    pub path: PathKind,
    pub seed_fwhm: f64,
    pub optimal: Option<SnrPoint>,
    pub points: Vec<SnrPoint>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags, `.env`/environment, and defaults.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub image_path: PathBuf,
    /// Approximate source column (0-based).
    pub x: f64,
    /// Approximate source row (0-based).
    pub y: f64,
    /// User-supplied FWHM hypothesis (pixels).
    pub user_fwhm: f64,
    pub catalog_path: Option<PathBuf>,
    /// Instrument name override (skips header detection).
    pub instrument: Option<String>,
    /// Custom instrument profile (JSON).
    pub profile_file: Option<PathBuf>,
    pub results_path: Option<PathBuf>,
    pub export_curve: Option<PathBuf>,
    /// Where to write the background-subtracted frame (default: `<stem>_bkg.fits`).
    pub bkg_image: Option<PathBuf>,
    /// Separation above which a catalog match is reported as suspicious.
    pub max_separation_arcsec: f64,
}

pub const DEFAULT_MAX_SEPARATION_ARCSEC: f64 = 10.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_parsing_is_case_insensitive() {
        assert_eq!(Band::from_code("v"), Some(Band::V));
        assert_eq!(Band::from_code(" I "), Some(Band::I));
        assert_eq!(Band::from_code("g"), None);
        assert_eq!(Band::from_filter_name("Johnson B"), Some(Band::B));
        assert_eq!(Band::from_filter_name("R_COUSINS"), Some(Band::R));
        assert_eq!(Band::from_filter_name("Halpha"), None);
    }

    #[test]
    fn optimal_point_prefers_first_on_ties() {
        let point = |multiplier: f64, snr: f64| SnrPoint {
            multiplier,
            radius: multiplier * 4.0,
            flux: 100.0,
            snr,
        };
        let curve = SnrCurve {
            seed_fwhm: 4.0,
            points: vec![point(0.5, 10.0), point(1.0, 20.0), point(1.5, 20.0), point(2.0, 5.0)],
        };
        let best = curve.optimal().unwrap();
        assert_eq!(best.multiplier, 1.0);
        assert_eq!(curve.first_snr(), Some(10.0));
    }
}
