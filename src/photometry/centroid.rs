//! Single-pass centroid and FWHM refinement inside a fixed aperture.

use ndarray::Array2;

use crate::domain::Centroid;
use crate::error::AppError;
use crate::math::moments::Moments;
use crate::math::overlap::pixel_coverage;

/// Radius (pixels) of the refinement aperture.
pub const CENTROID_APERTURE_RADIUS: f64 = 8.0;

/// Refine `(x, y)` to the flux-weighted centroid of the sky-subtracted frame.
///
/// Pixels are weighted by their value times the fraction of the pixel inside
/// the aperture. The aperture must lie entirely on the frame.
pub fn refine_centroid(data: &Array2<f64>, x: f64, y: f64, plate_scale: f64) -> Result<Centroid, AppError> {
    let r = CENTROID_APERTURE_RADIUS;
    let (height, width) = data.dim();
    let inside = |c: f64, len: usize| c.is_finite() && c - r >= 0.0 && c + r <= len as f64 - 1.0;
    if !inside(x, width) || !inside(y, height) {
        return Err(AppError::domain(format!(
            "Centroid aperture (r={r} px) at ({x:.2}, {y:.2}) extends past the {width}x{height} frame."
        )));
    }

    let row0 = (y - r).floor() as usize;
    let row1 = ((y + r).ceil() as usize).min(height - 1);
    let col0 = (x - r).floor() as usize;
    let col1 = ((x + r).ceil() as usize).min(width - 1);

    let mut samples = Vec::with_capacity((row1 - row0 + 1) * (col1 - col0 + 1));
    for row in row0..=row1 {
        for col in col0..=col1 {
            let coverage = pixel_coverage(col as f64, row as f64, x, y, r);
            if coverage > 0.0 {
                samples.push((col as f64, row as f64, coverage * data[[row, col]]));
            }
        }
    }

    let moments = Moments::from_samples(samples).ok_or_else(|| {
        AppError::domain(format!(
            "No positive flux inside the centroid aperture at ({x:.2}, {y:.2})."
        ))
    })?;

    let fwhm_px = moments.fwhm();
    let centroid = Centroid {
        x: moments.cx,
        y: moments.cy,
        fwhm_px,
        fwhm_arcsec: fwhm_px * plate_scale,
    };
    log::info!(
        "Centroid: ({:.2}, {:.2}) -> ({:.3}, {:.3}), FWHM {:.3} px = {:.3}\" (aspect {:.2})",
        x,
        y,
        centroid.x,
        centroid.y,
        centroid.fwhm_px,
        centroid.fwhm_arcsec,
        moments.aspect_ratio()
    );
    Ok(centroid)
}
