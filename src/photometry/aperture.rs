//! Circular-aperture photometry with exact fractional pixel weights.

use ndarray::Array2;

use crate::error::AppError;
use crate::math::overlap::pixel_coverage;

/// Sum of `data` inside the circle of `radius` at `(x, y)`, rounded to whole ADU.
///
/// Each pixel contributes its value times the exact area of the pixel inside the
/// circle. Parts of the aperture that fall off the frame contribute nothing.
pub fn aperture_flux(data: &Array2<f64>, x: f64, y: f64, radius: f64) -> Result<f64, AppError> {
    if !(radius.is_finite() && radius > 0.0) {
        return Err(AppError::domain(format!("Aperture radius must be > 0 (got {radius}).")));
    }
    if !(x.is_finite() && y.is_finite()) {
        return Err(AppError::domain(format!("Aperture center ({x}, {y}) is not finite.")));
    }

    let (height, width) = data.dim();
    let (Some((row0, row1)), Some((col0, col1))) = (span(y, radius, height), span(x, radius, width)) else {
        return Ok(0.0);
    };

    let mut flux = 0.0;
    for row in row0..=row1 {
        for col in col0..=col1 {
            let weight = pixel_coverage(col as f64, row as f64, x, y, radius);
            if weight > 0.0 {
                flux += weight * data[[row, col]];
            }
        }
    }
    Ok(flux.round())
}

/// Inclusive pixel-index range touched by `[c - r, c + r]`, clipped to `0..len`.
fn span(c: f64, r: f64, len: usize) -> Option<(usize, usize)> {
    let lo = (c - r - 0.5).floor().max(0.0);
    let hi = (c + r + 0.5).ceil().min(len as f64 - 1.0);
    (len > 0 && lo <= hi).then_some((lo as usize, hi as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn uniform_frame_gives_circle_area() {
        let data = Array2::from_elem((40, 40), 1.0);
        for r in [0.5, 1.3, 5.0, 9.75] {
            let flux = aperture_flux(&data, 20.2, 19.7, r).unwrap();
            assert_eq!(flux, (PI * r * r).round(), "radius {r}");
        }
    }

    #[test]
    fn flux_is_non_decreasing_with_radius_and_repeatable() {
        let data = Array2::from_elem((50, 50), 12.5);
        let mut previous = 0.0;
        for step in 1..=40 {
            let r = 0.5 * step as f64;
            let flux = aperture_flux(&data, 24.6, 25.1, r).unwrap();
            assert!(flux >= previous, "r={r}: {flux} < {previous}");
            assert_eq!(flux, aperture_flux(&data, 24.6, 25.1, r).unwrap());
            previous = flux;
        }
    }

    #[test]
    fn aperture_is_clipped_at_the_frame_edge() {
        let data = Array2::from_elem((20, 20), 1.0);
        // Centered on the corner of pixel (0, 0): a quarter of the circle is on the frame.
        let flux = aperture_flux(&data, -0.5, -0.5, 4.0).unwrap();
        assert_eq!(flux, (PI * 4.0).round());
        assert_eq!(aperture_flux(&data, -30.0, 5.0, 3.0).unwrap(), 0.0);
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let data = Array2::from_elem((5, 5), 1.0);
        assert_eq!(aperture_flux(&data, 2.0, 2.0, 0.0).unwrap_err().exit_code(), 3);
        assert_eq!(aperture_flux(&data, 2.0, 2.0, -1.0).unwrap_err().exit_code(), 3);
    }
}
