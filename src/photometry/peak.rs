//! Point-source detection (DAOFIND-style) and nearest-peak selection.
//!
//! The sky-subtracted frame is convolved with a zero-sum Gaussian kernel of the
//! seed FWHM; local maxima above the threshold (scaled to the kernel's
//! amplitude units) become candidates, which are then measured on the data and
//! filtered on sharpness and roundness. Detection magnitudes use the sum of the
//! kernel-sized cutout: `-2.5 log10(sum)`.

use ndarray::{Array2, Axis, s};

use crate::domain::{Centroid, PeakMeasurement, SkyStats};
use crate::error::AppError;

/// Detection threshold in units of the sky standard deviation.
pub const DETECTION_THRESHOLD_SIGMA: f64 = 5.0;

/// Kernel truncation radius (σ).
const SIGMA_RADIUS: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct FinderConfig {
    /// Threshold above the subtracted sky (ADU).
    pub threshold: f64,
    pub fwhm: f64,
    pub sharp_lo: f64,
    pub sharp_hi: f64,
    pub round_lo: f64,
    pub round_hi: f64,
}

impl FinderConfig {
    pub fn new(threshold: f64, fwhm: f64) -> Self {
        Self {
            threshold,
            fwhm,
            sharp_lo: 0.2,
            sharp_hi: 1.0,
            round_lo: -1.0,
            round_hi: 1.0,
        }
    }
}

/// One candidate detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub x: f64,
    pub y: f64,
    pub peak: f64,
    pub flux: f64,
    pub mag: f64,
    pub sharpness: f64,
    pub roundness1: f64,
    pub roundness2: f64,
}

/// Zero-sum circular Gaussian kernel.
#[derive(Debug, Clone)]
struct Kernel {
    /// Normalized kernel: `(g - mean(g)) / var(g)` inside the mask, 0 outside.
    weights: Array2<f64>,
    gaussian: Array2<f64>,
    mask: Array2<bool>,
    radius: usize,
    npixels: usize,
    /// Converts a data-unit threshold into convolved (amplitude) units.
    rel_err: f64,
}

impl Kernel {
    fn new(fwhm: f64) -> Result<Self, AppError> {
        let sigma = fwhm / crate::math::moments::GAUSSIAN_SIGMA_TO_FWHM;
        let a = 1.0 / (2.0 * sigma * sigma);
        let f = SIGMA_RADIUS * SIGMA_RADIUS / 2.0;
        let radius = ((f / a).sqrt() as usize).max(2);
        let size = 2 * radius + 1;

        let mut mask = Array2::from_elem((size, size), false);
        let mut gaussian = Array2::zeros((size, size));
        for ((row, col), g) in gaussian.indexed_iter_mut() {
            let dx = col as f64 - radius as f64;
            let dy = row as f64 - radius as f64;
            let r2 = dx * dx + dy * dy;
            if a * r2 <= f || r2 <= 4.0 {
                mask[[row, col]] = true;
                *g = (-a * r2).exp();
            }
        }

        let npixels = mask.iter().filter(|&&m| m).count();
        let sum: f64 = gaussian.sum();
        let sum2: f64 = gaussian.iter().map(|g| g * g).sum();
        let variance = sum2 - sum * sum / npixels as f64;
        if !(variance > 0.0) {
            return Err(AppError::domain(format!("Detection kernel for FWHM {fwhm} is degenerate.")));
        }
        let mean = sum / npixels as f64;
        let weights = Array2::from_shape_fn((size, size), |(row, col)| {
            if mask[[row, col]] {
                (gaussian[[row, col]] - mean) / variance
            } else {
                0.0
            }
        });

        Ok(Self {
            weights,
            gaussian,
            mask,
            radius,
            npixels,
            rel_err: 1.0 / variance.sqrt(),
        })
    }
}

/// DAOFIND-style point-source finder.
#[derive(Debug, Clone)]
pub struct StarFinder {
    config: FinderConfig,
    kernel: Kernel,
}

impl StarFinder {
    pub fn new(config: FinderConfig) -> Result<Self, AppError> {
        if !(config.fwhm.is_finite() && config.fwhm > 0.0) {
            return Err(AppError::domain(format!("Detection FWHM must be > 0 (got {}).", config.fwhm)));
        }
        if !(config.threshold.is_finite() && config.threshold >= 0.0) {
            return Err(AppError::domain(format!(
                "Detection threshold must be >= 0 (got {}).",
                config.threshold
            )));
        }
        let kernel = Kernel::new(config.fwhm)?;
        Ok(Self { config, kernel })
    }

    /// All detections in a sky-subtracted frame.
    pub fn find(&self, data: &Array2<f64>) -> Vec<Detection> {
        let convolved = convolve(data, &self.kernel.weights);
        let threshold = self.config.threshold * self.kernel.rel_err;
        let peaks = local_maxima(&convolved, threshold, self.kernel.radius);
        log::debug!("Star finder: {} local maxima above {threshold:.3}", peaks.len());

        peaks
            .into_iter()
            .filter_map(|(row, col)| self.measure(data, &convolved, row, col))
            .filter(|d| self.accept(d))
            .collect()
    }

    fn measure(&self, data: &Array2<f64>, convolved: &Array2<f64>, row: usize, col: usize) -> Option<Detection> {
        let k = &self.kernel;
        let r = k.radius;
        let (height, width) = data.dim();
        if row < r || col < r || row + r >= height || col + r >= width {
            return None;
        }
        let cutout = data.slice(s![row - r..=row + r, col - r..=col + r]);
        let conv_cutout = convolved.slice(s![row - r..=row + r, col - r..=col + r]);

        let peak = cutout[[r, r]];
        let conv_peak = conv_cutout[[r, r]];

        let masked_sum: f64 = cutout
            .iter()
            .zip(k.mask.iter())
            .filter(|(_, m)| **m)
            .map(|(v, _)| *v)
            .sum();
        let others_mean = (masked_sum - peak) / (k.npixels - 1) as f64;
        let sharpness = (peak - others_mean) / conv_peak;

        let roundness1 = symmetry_roundness(&conv_cutout.to_owned(), r);
        let (dx, hx) = marginal_fit(&cutout.to_owned(), &k.gaussian, r, Axis(0))?;
        let (dy, hy) = marginal_fit(&cutout.to_owned(), &k.gaussian, r, Axis(1))?;
        let roundness2 = 2.0 * (hx - hy) / (hx + hy);

        let flux = cutout.sum();
        if !(flux > 0.0) {
            return None;
        }
        Some(Detection {
            x: col as f64 + dx,
            y: row as f64 + dy,
            peak,
            flux,
            mag: -2.5 * flux.log10(),
            sharpness,
            roundness1,
            roundness2,
        })
    }

    fn accept(&self, d: &Detection) -> bool {
        let c = &self.config;
        (c.sharp_lo..=c.sharp_hi).contains(&d.sharpness)
            && (c.round_lo..=c.round_hi).contains(&d.roundness1)
            && (c.round_lo..=c.round_hi).contains(&d.roundness2)
            && d.x.is_finite()
            && d.y.is_finite()
    }
}

/// Run detection on the full frame and return the detection nearest the centroid.
///
/// `data` still contains the sky; the median is subtracted first and the
/// threshold is `5 × std`. `None` when nothing is detected.
pub fn locate_peak(
    data: &Array2<f64>,
    sky: &SkyStats,
    centroid: &Centroid,
    fwhm: f64,
) -> Result<Option<PeakMeasurement>, AppError> {
    let finder = StarFinder::new(FinderConfig::new(DETECTION_THRESHOLD_SIGMA * sky.std, fwhm))?;
    let subtracted = data.mapv(|v| v - sky.median);
    let detections = finder.find(&subtracted);

    let nearest = detections
        .iter()
        .map(|d| (d, (d.x - centroid.x).hypot(d.y - centroid.y)))
        .min_by(|a, b| a.1.total_cmp(&b.1));

    match nearest {
        Some((d, distance)) => {
            log::info!(
                "Peak (FWHM {fwhm:.3} px): {} detection(s); nearest at ({:.2}, {:.2}), {distance:.2} px away, peak {:.1} ADU, mag {:.3}",
                detections.len(),
                d.x,
                d.y,
                d.peak,
                d.mag
            );
            Ok(Some(PeakMeasurement {
                x: d.x,
                y: d.y,
                peak: d.peak,
                mag: d.mag,
                distance,
            }))
        }
        None => {
            log::warn!("Peak (FWHM {fwhm:.3} px): no sources detected above {DETECTION_THRESHOLD_SIGMA}σ");
            Ok(None)
        }
    }
}

/// Direct 2-D correlation with a symmetric kernel; off-frame samples count as 0.
fn convolve(data: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (height, width) = data.dim();
    let (kh, kw) = kernel.dim();
    let (ph, pw) = (kh / 2, kw / 2);
    Array2::from_shape_fn((height, width), |(row, col)| {
        let mut sum = 0.0;
        for ((ky, kx), &w) in kernel.indexed_iter() {
            if w == 0.0 {
                continue;
            }
            let (Some(r), Some(c)) = ((row + ky).checked_sub(ph), (col + kx).checked_sub(pw)) else {
                continue;
            };
            if r < height && c < width {
                sum += data[[r, c]] * w;
            }
        }
        sum
    })
}

/// `(row, col)` of pixels above `threshold` that strictly exceed every
/// neighbor within a square footprint of `radius`. An exact plateau yields no
/// maximum; real convolved data breaks such ties.
fn local_maxima(convolved: &Array2<f64>, threshold: f64, radius: usize) -> Vec<(usize, usize)> {
    let (height, width) = convolved.dim();
    let mut peaks = Vec::new();
    for ((row, col), &value) in convolved.indexed_iter() {
        if !(value > threshold) {
            continue;
        }
        let rows = row.saturating_sub(radius)..=(row + radius).min(height - 1);
        let is_peak = rows.into_iter().all(|r| {
            let cols = col.saturating_sub(radius)..=(col + radius).min(width - 1);
            cols.into_iter()
                .all(|c| (r == row && c == col) || convolved[[r, c]] < value)
        });
        if is_peak {
            peaks.push((row, col));
        }
    }
    peaks
}

/// Four-quadrant symmetry of the convolved cutout (0 for a round source).
fn symmetry_roundness(conv_cutout: &Array2<f64>, r: usize) -> f64 {
    let mut cutout = conv_cutout.clone();
    cutout[[r, r]] = 0.0;
    let q1: f64 = cutout.slice(s![..=r, r + 1..]).sum();
    let q2: f64 = cutout.slice(s![..r, ..=r]).sum();
    let q3: f64 = cutout.slice(s![r.., ..r]).sum();
    let q4: f64 = cutout.slice(s![r + 1.., r..]).sum();
    let total: f64 = cutout.iter().map(|v| v.abs()).sum();
    if total == 0.0 {
        0.0
    } else {
        2.0 * (-q1 + q2 - q3 + q4) / total
    }
}

/// Centroid offset and Gaussian amplitude along one axis from the marginal sums.
///
/// `Axis(0)` collapses rows (x marginal), `Axis(1)` collapses columns (y marginal).
fn marginal_fit(cutout: &Array2<f64>, gaussian: &Array2<f64>, r: usize, axis: Axis) -> Option<(f64, f64)> {
    let data = cutout.sum_axis(axis);
    let kernel = gaussian.sum_axis(axis);
    let weights: Vec<f64> = (0..data.len())
        .map(|i| (r as f64 + 1.0 - (i as f64 - r as f64).abs()).max(0.0))
        .collect();

    let mut w_sum = 0.0;
    let mut k_sum = 0.0;
    let mut k2_sum = 0.0;
    let mut d_sum = 0.0;
    let mut dk_sum = 0.0;
    for ((&d, &k), &w) in data.iter().zip(kernel.iter()).zip(&weights) {
        w_sum += w;
        k_sum += k * w;
        k2_sum += k * k * w;
        d_sum += d * w;
        dk_sum += d * k * w;
    }
    let numer = dk_sum - d_sum * k_sum / w_sum;
    let denom = k2_sum - k_sum * k_sum / w_sum;
    if !(numer > 0.0 && denom > 0.0) {
        return None;
    }
    let amplitude = numer / denom;

    let mut moment = 0.0;
    let mut total = 0.0;
    for (i, (&d, &w)) in data.iter().zip(&weights).enumerate() {
        moment += d * w * (i as f64 - r as f64);
        total += d * w;
    }
    let offset = if total > 0.0 { moment / total } else { 0.0 };
    Some((offset, amplitude))
}
