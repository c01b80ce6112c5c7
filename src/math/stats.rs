//! Robust summary statistics.
//!
//! Sky estimation works on whole frames (10⁶+ pixels), so the median uses
//! `select_nth_unstable_by` instead of a full sort.

use crate::domain::SkyStats;

/// Default clipping threshold (standard deviations).
pub const CLIP_SIGMA: f64 = 3.0;

/// Default maximum number of clipping iterations.
pub const CLIP_MAX_ITERS: usize = 5;

/// Median of `values` (mean of the two middle values for even lengths).
///
/// Returns `None` for an empty slice. NaNs are ordered last.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut buf = values.to_vec();
    Some(median_in_place(&mut buf))
}

fn median_in_place(buf: &mut [f64]) -> f64 {
    let n = buf.len();
    let mid = n / 2;
    let cmp = |a: &f64, b: &f64| a.total_cmp(b);
    let (lower, upper, _) = buf.select_nth_unstable_by(mid, cmp);
    let upper = *upper;
    if n % 2 == 1 {
        return upper;
    }
    // The largest element of the lower partition is the other middle value.
    let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    0.5 * (lower_max + upper)
}

/// Mean and population standard deviation.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some((mean, var.sqrt()))
}

/// Iterative sigma clipping about the median.
///
/// Each pass rejects values further than `sigma` standard deviations from the
/// median of the surviving set; stops after `max_iters` passes or when a pass
/// rejects nothing. Returns `None` if no values survive.
pub fn sigma_clipped_stats(values: &[f64], sigma: f64, max_iters: usize) -> Option<SkyStats> {
    let mut kept: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();

    for iter in 0..max_iters {
        if kept.is_empty() {
            return None;
        }
        let center = median(&kept)?;
        let (_, std) = mean_std(&kept)?;
        let before = kept.len();
        kept.retain(|v| (v - center).abs() <= sigma * std);
        log::trace!("sigma clip pass {iter}: kept {} of {before}", kept.len());
        if kept.len() == before {
            break;
        }
    }

    let (mean, std) = mean_std(&kept)?;
    let median = median(&kept)?;
    Some(SkyStats { median, mean, std })
}
