//! Intensity-weighted image moments.

use nalgebra::{Matrix2, SymmetricEigen};

/// `2·sqrt(2·ln 2)`: FWHM of a Gaussian in units of sigma.
pub const GAUSSIAN_SIGMA_TO_FWHM: f64 = 2.354_820_045_030_949;

/// Zeroth, first and central second moments of a weighted point set.
#[derive(Debug, Clone, Copy)]
pub struct Moments {
    /// Total weight (flux).
    pub m0: f64,
    pub cx: f64,
    pub cy: f64,
    /// Central second-moment (covariance) matrix `[[xx, xy], [xy, yy]]`.
    pub covariance: Matrix2<f64>,
}

impl Moments {
    /// Accumulate moments from `(x, y, weight)` samples.
    ///
    /// Returns `None` when the total weight is not positive.
    pub fn from_samples<I>(samples: I) -> Option<Moments>
    where
        I: IntoIterator<Item = (f64, f64, f64)>,
    {
        let samples: Vec<(f64, f64, f64)> = samples.into_iter().collect();
        let m0: f64 = samples.iter().map(|&(_, _, w)| w).sum();
        if !(m0.is_finite() && m0 > 0.0) {
            return None;
        }
        let cx = samples.iter().map(|&(x, _, w)| x * w).sum::<f64>() / m0;
        let cy = samples.iter().map(|&(_, y, w)| y * w).sum::<f64>() / m0;

        let mut xx = 0.0;
        let mut yy = 0.0;
        let mut xy = 0.0;
        for &(x, y, w) in &samples {
            let dx = x - cx;
            let dy = y - cy;
            xx += w * dx * dx;
            yy += w * dy * dy;
            xy += w * dx * dy;
        }

        Some(Moments {
            m0,
            cx,
            cy,
            covariance: Matrix2::new(xx / m0, xy / m0, xy / m0, yy / m0),
        })
    }

    /// Eigenvalues of the covariance, largest first, clamped at zero.
    pub fn principal_variances(&self) -> (f64, f64) {
        let eig = SymmetricEigen::new(self.covariance);
        let a = eig.eigenvalues[0].max(0.0);
        let b = eig.eigenvalues[1].max(0.0);
        if a >= b { (a, b) } else { (b, a) }
    }

    /// Gaussian-equivalent FWHM from the mean of the principal variances.
    pub fn fwhm(&self) -> f64 {
        let (a, b) = self.principal_variances();
        GAUSSIAN_SIGMA_TO_FWHM * (0.5 * (a + b)).sqrt()
    }

    /// Ratio of the principal sigmas (≥ 1 for a non-degenerate spot).
    pub fn aspect_ratio(&self) -> f64 {
        let (a, b) = self.principal_variances();
        if b > 0.0 { (a / b).sqrt() } else { f64::INFINITY }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian_samples(cx: f64, cy: f64, sx: f64, sy: f64) -> Vec<(f64, f64, f64)> {
        let mut out = Vec::new();
        for y in 0..60 {
            for x in 0..60 {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                let w = (-(dx * dx) / (2.0 * sx * sx) - (dy * dy) / (2.0 * sy * sy)).exp();
                out.push((x as f64, y as f64, w));
            }
        }
        out
    }

    #[test]
    fn moments_recover_gaussian_center_and_width() {
        let sigma = 2.0;
        let m = Moments::from_samples(gaussian_samples(30.25, 29.5, sigma, sigma)).unwrap();
        assert!((m.cx - 30.25).abs() < 1e-6, "cx {}", m.cx);
        assert!((m.cy - 29.5).abs() < 1e-6, "cy {}", m.cy);
        let fwhm = m.fwhm();
        assert!((fwhm - GAUSSIAN_SIGMA_TO_FWHM * sigma).abs() < 0.1, "fwhm {fwhm}");
        assert!((m.aspect_ratio() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn elongated_spot_has_large_aspect_ratio() {
        let m = Moments::from_samples(gaussian_samples(30.0, 30.0, 4.0, 2.0)).unwrap();
        assert!((m.aspect_ratio() - 2.0).abs() < 0.05, "aspect {}", m.aspect_ratio());
    }

    #[test]
    fn zero_weight_has_no_moments() {
        assert!(Moments::from_samples(vec![(0.0, 0.0, 0.0), (1.0, 1.0, 0.0)]).is_none());
    }
}
