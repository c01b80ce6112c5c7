//! Synthetic single-star frames.
//!
//! A frame is a flat sky plus one circular Gaussian star, with optional seeded
//! Gaussian noise, and a header carrying the exposure keywords of the chosen
//! instrument profile and a north-up TAN WCS centered on the frame.

use ndarray::Array2;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};

use crate::domain::Band;
use crate::error::AppError;
use crate::image::{Image, TanWcs};
use crate::instrument::InstrumentProfile;
use crate::io::fits::{FitsHeader, HeaderValue};
use crate::math::moments::GAUSSIAN_SIGMA_TO_FWHM;

/// Sub-samples per pixel axis when integrating the star profile.
const SUBSAMPLES: usize = 5;

#[derive(Debug, Clone)]
pub struct SyntheticFrame {
    pub width: usize,
    pub height: usize,
    /// Sky level (ADU).
    pub sky: f64,
    pub star_x: f64,
    pub star_y: f64,
    /// Total star flux (ADU).
    pub star_flux: f64,
    pub fwhm: f64,
    /// Per-pixel noise standard deviation (ADU); 0 disables noise.
    pub noise_sigma: f64,
    pub seed: u64,
    pub band: Band,
    pub exposure_time: f64,
    pub air_mass: f64,
    pub detector_mode: String,
    pub profile: InstrumentProfile,
    /// Sky coordinates of the frame center (degrees).
    pub ra: f64,
    pub dec: f64,
}

impl Default for SyntheticFrame {
    fn default() -> Self {
        let profile = InstrumentProfile::iac80();
        let detector_mode = profile.detector_modes.keys().next().cloned().unwrap_or_default();
        Self {
            width: 100,
            height: 100,
            sky: 100.0,
            star_x: 50.0,
            star_y: 50.0,
            star_flux: 50_000.0,
            fwhm: 4.0,
            noise_sigma: 5.0,
            seed: 42,
            band: Band::V,
            exposure_time: 10.0,
            air_mass: 1.2,
            detector_mode,
            profile,
            ra: 150.0,
            dec: 20.0,
        }
    }
}

impl SyntheticFrame {
    fn validate(&self) -> Result<(), AppError> {
        if self.width == 0 || self.height == 0 {
            return Err(AppError::config("Synthetic frame size must be > 0."));
        }
        let positive = [
            ("fwhm", self.fwhm),
            ("exposure time", self.exposure_time),
            ("air mass", self.air_mass),
        ];
        if let Some((name, v)) = positive.iter().find(|(_, v)| !(v.is_finite() && *v > 0.0)) {
            return Err(AppError::config(format!("Synthetic {name} must be > 0 (got {v}).")));
        }
        if !(self.noise_sigma.is_finite() && self.noise_sigma >= 0.0) {
            return Err(AppError::config(format!(
                "Synthetic noise sigma must be >= 0 (got {}).",
                self.noise_sigma
            )));
        }
        Ok(())
    }

    /// The WCS written into the frame header.
    pub fn wcs(&self) -> Result<TanWcs, AppError> {
        let cx = (self.width as f64 - 1.0) / 2.0;
        let cy = (self.height as f64 - 1.0) / 2.0;
        TanWcs::north_up(cx, cy, self.ra, self.dec, self.profile.plate_scale)
    }

    /// Sky coordinates of the injected star.
    pub fn star_sky_position(&self) -> Result<(f64, f64), AppError> {
        Ok(self.wcs()?.pixel_to_sky(self.star_x, self.star_y))
    }

    pub fn header(&self) -> Result<FitsHeader, AppError> {
        let keys = &self.profile.keys;
        let identity = self.profile.aliases.first().cloned().unwrap_or_else(|| self.profile.name.clone());

        let mut header = FitsHeader::new();
        header.set("INSTRUME", HeaderValue::Str(identity), Some("synthetic frame"));
        header.set(&keys.exposure_time, HeaderValue::Float(self.exposure_time), Some("[s]"));
        header.set(&keys.air_mass, HeaderValue::Float(self.air_mass), None);
        header.set(&keys.filter, HeaderValue::Str(self.band.as_str().to_string()), None);
        header.set(&keys.detector_mode, HeaderValue::Str(self.detector_mode.clone()), None);
        self.wcs()?.write_header(&mut header);
        header.push_commentary(
            "HISTORY",
            &format!("starcal synth: flux {} fwhm {} seed {}", self.star_flux, self.fwhm, self.seed),
        );
        Ok(header)
    }

    pub fn generate(&self) -> Result<Image, AppError> {
        self.validate()?;

        let mut data = Array2::from_elem((self.height, self.width), self.sky);
        render_gaussian(&mut data, self.star_x, self.star_y, self.star_flux, self.fwhm);

        if self.noise_sigma > 0.0 {
            let mut rng = StdRng::seed_from_u64(self.seed);
            let normal = Normal::new(0.0, self.noise_sigma)
                .map_err(|e| AppError::config(format!("Noise distribution error: {e}")))?;
            data.mapv_inplace(|v| v + normal.sample(&mut rng));
        }

        Ok(Image::new(data, self.header()?))
    }
}

/// Add a circular Gaussian of total `flux` centered at `(x, y)` to `data`.
///
/// Each pixel receives the profile integrated over its area (by sub-sampling).
/// Pixels beyond ~6σ are left untouched.
pub fn render_gaussian(data: &mut Array2<f64>, x: f64, y: f64, flux: f64, fwhm: f64) {
    let sigma = fwhm / GAUSSIAN_SIGMA_TO_FWHM;
    if !(sigma > 0.0) {
        return;
    }
    let norm = flux / (2.0 * std::f64::consts::PI * sigma * sigma);
    let reach = (6.0 * sigma).ceil() + 1.0;
    let (height, width) = data.dim();

    let row0 = (y - reach).floor().max(0.0) as usize;
    let col0 = (x - reach).floor().max(0.0) as usize;
    let row1 = ((y + reach).ceil().max(0.0) as usize).min(height);
    let col1 = ((x + reach).ceil().max(0.0) as usize).min(width);

    let step = 1.0 / SUBSAMPLES as f64;
    let offsets: Vec<f64> = (0..SUBSAMPLES).map(|i| -0.5 + step * (i as f64 + 0.5)).collect();
    let cell = step * step;

    for row in row0..row1 {
        for col in col0..col1 {
            let mut sum = 0.0;
            for &oy in &offsets {
                for &ox in &offsets {
                    let dx = col as f64 + ox - x;
                    let dy = row as f64 + oy - y;
                    sum += (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp();
                }
            }
            data[[row, col]] += norm * sum * cell;
        }
    }
}
