//! SNR curve of growth over apertures of 0.5–4.0 × the seed FWHM.
//!
//! ```text
//! SNR = F·g / sqrt(F·g + π r² · sky · g + π r² · ron²)
//! ```
//!
//! with `F` the aperture flux (ADU), `g` the gain (e⁻/ADU), `sky` the sky
//! level per pixel (ADU) and `ron` the readout noise (e⁻).

use std::f64::consts::PI;

use ndarray::Array2;

use crate::domain::{SnrCurve, SnrPoint};
use crate::error::AppError;
use crate::instrument::profile::{DetectorNoise, InstrumentProfile};
use crate::photometry::aperture::aperture_flux;

/// Aperture radii as multiples of the seed FWHM.
pub const APERTURE_MULTIPLIERS: [f64; 8] = [0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0];

/// Signal-to-noise ratio of `flux` in an aperture of `radius` pixels.
///
/// Returns 0 when the flux is not positive or the noise term vanishes.
pub fn snr(flux: f64, radius: f64, sky_level: f64, noise: DetectorNoise) -> f64 {
    let area = PI * radius * radius;
    let signal = flux * noise.gain;
    let variance = signal + area * sky_level * noise.gain + area * noise.readout_noise.powi(2);
    if signal <= 0.0 || !(variance > 0.0) {
        return 0.0;
    }
    signal / variance.sqrt()
}

/// Build the curve for one seed FWHM on the sky-subtracted frame.
pub fn snr_curve(
    data: &Array2<f64>,
    x: f64,
    y: f64,
    seed_fwhm: f64,
    sky_level: f64,
    profile: &InstrumentProfile,
    detector_mode: &str,
) -> Result<SnrCurve, AppError> {
    let noise = profile.detector(detector_mode)?;
    if !(seed_fwhm.is_finite() && seed_fwhm > 0.0) {
        return Err(AppError::domain(format!("Seed FWHM must be > 0 (got {seed_fwhm}).")));
    }

    let points = APERTURE_MULTIPLIERS
        .iter()
        .map(|&multiplier| {
            let radius = multiplier * seed_fwhm;
            let flux = aperture_flux(data, x, y, radius)?;
            let snr = snr(flux, radius, sky_level, noise);
            log::debug!("  r={radius:.2} px ({multiplier}×FWHM): flux={flux} ADU, SNR={snr:.2}");
            Ok(SnrPoint {
                multiplier,
                radius,
                flux,
                snr,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let curve = SnrCurve { seed_fwhm, points };
    if let Some(best) = curve.optimal() {
        log::debug!(
            "SNR curve (FWHM {seed_fwhm:.3} px): peak SNR {:.2} at r={:.2} px ({}×FWHM), flux {} ADU",
            best.snr,
            best.radius,
            best.multiplier,
            best.flux
        );
    }
    Ok(curve)
}
