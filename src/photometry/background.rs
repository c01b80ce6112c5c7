//! Global sky background from source-masked, sigma-clipped pixels.
//!
//! Sources are flagged at `median + 5σ` of the clipped frame, kept when a
//! connected region has at least 10 pixels, and grown by a radius-10 disk
//! before the final statistics are taken. The result is one flat sky level for
//! the whole frame.

use ndarray::Array2;

use crate::domain::SkyStats;
use crate::error::AppError;
use crate::image::segment::{dilate_circular, filter_small_regions};
use crate::math::stats::{CLIP_MAX_ITERS, CLIP_SIGMA, sigma_clipped_stats};

/// Detection significance above the clipped background (σ).
pub const DETECTION_SIGMA: f64 = 5.0;

/// Smallest connected region treated as a source.
pub const MIN_SOURCE_PIXELS: usize = 10;

/// Radius (pixels) by which each source region is grown before masking.
pub const MASK_DILATION_RADIUS: usize = 10;

/// Robust sky statistics plus the mask that produced them.
#[derive(Debug, Clone)]
pub struct BackgroundEstimate {
    pub stats: SkyStats,
    /// `true` where a pixel was excluded as (part of) a source.
    pub source_mask: Array2<bool>,
}

impl BackgroundEstimate {
    pub fn masked_pixels(&self) -> usize {
        self.source_mask.iter().filter(|&&m| m).count()
    }
}

/// Estimate the sky over the whole frame.
pub fn estimate_background(data: &Array2<f64>) -> Result<BackgroundEstimate, AppError> {
    let all: Vec<f64> = data.iter().copied().collect();
    let first = sigma_clipped_stats(&all, CLIP_SIGMA, CLIP_MAX_ITERS)
        .ok_or_else(|| AppError::domain("Background estimation failed: the frame has no finite pixels."))?;

    let threshold = first.median + DETECTION_SIGMA * first.std;
    let candidates = data.mapv(|v| v > threshold);
    let sources = filter_small_regions(&candidates, MIN_SOURCE_PIXELS);
    let source_mask = dilate_circular(&sources, MASK_DILATION_RADIUS);

    let unmasked: Vec<f64> = data
        .iter()
        .zip(source_mask.iter())
        .filter(|(_, masked)| !**masked)
        .map(|(v, _)| *v)
        .collect();
    log::debug!(
        "Background: detection threshold {threshold:.3}, {} of {} pixels masked",
        data.len() - unmasked.len(),
        data.len()
    );

    let stats = sigma_clipped_stats(&unmasked, CLIP_SIGMA, CLIP_MAX_ITERS).ok_or_else(|| {
        AppError::domain("Background estimation failed: no pixels survive source masking.")
    })?;

    log::info!(
        "Sky: median={:.3} mean={:.3} std={:.3} ADU",
        stats.median,
        stats.mean,
        stats.std
    );
    Ok(BackgroundEstimate { stats, source_mask })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synth::render_gaussian;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Normal};

    fn noisy_sky(width: usize, height: usize, level: f64, sigma: f64, seed: u64) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(level, sigma).unwrap();
        Array2::from_shape_fn((height, width), |_| noise.sample(&mut rng))
    }

    #[test]
    fn recovers_sky_level_around_a_bright_star() {
        let mut data = noisy_sky(100, 100, 100.0, 5.0, 7);
        render_gaussian(&mut data, 50.0, 50.0, 50_000.0, 4.0);

        let estimate = estimate_background(&data).unwrap();
        assert!((estimate.stats.median - 100.0).abs() < 1.0, "median {}", estimate.stats.median);
        assert!((estimate.stats.std - 5.0).abs() < 1.0, "std {}", estimate.stats.std);
        assert!(estimate.source_mask[[50, 50]]);
        assert!(estimate.source_mask[[50, 62]], "dilation should reach past the core");
        assert!(!estimate.source_mask[[5, 5]]);
    }

    #[test]
    fn isolated_hot_pixels_are_not_masked() {
        let mut data = noisy_sky(60, 60, 50.0, 2.0, 11);
        data[[10, 10]] = 10_000.0;
        data[[40, 20]] = 10_000.0;
        let estimate = estimate_background(&data).unwrap();
        assert_eq!(estimate.masked_pixels(), 0);
        assert!((estimate.stats.median - 50.0).abs() < 0.5);
    }

    #[test]
    fn frame_without_finite_pixels_is_a_domain_error() {
        let data = Array2::from_elem((3, 3), f64::NAN);
        let err = estimate_background(&data).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("no finite pixels"), "{err}");
    }

    #[test]
    fn star_filling_the_frame_leaves_no_sky() {
        // The dilated star region reaches every corner of a 15x15 frame.
        let mut data = Array2::from_elem((15, 15), 100.0);
        render_gaussian(&mut data, 7.0, 7.0, 50_000.0, 4.0);
        let err = estimate_background(&data).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("no pixels survive source masking"), "{err}");
    }
}
