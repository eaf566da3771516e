//! Automatic thresholding on 256-bin histograms
//!
//! All solvers treat the bin index as the intensity and convert the chosen bin
//! back with [`Histogram::value_of`].

use crate::histogram::{BINS, Histogram};

use tracing::debug;

pub const LI_MAX_ITERATIONS: usize = 50;

/// A threshold as both bin index and intensity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Threshold {
    pub bin: usize,
    pub value: f64,
}

impl Threshold {
    fn from_bin(histogram: &Histogram, bin: usize) -> Self {
        Self {
            bin,
            value: histogram.value_of(bin),
        }
    }
}

/// Boundaries of a three-class split
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClassBounds {
    pub lower: Threshold,
    pub upper: Threshold,
}

impl ClassBounds {
    /// 0 below `lower`, 1 in `[lower, upper)`, 2 at or above `upper`
    #[inline]
    pub fn classify(&self, value: f64) -> u8 {
        if value >= self.upper.value {
            2
        } else if value >= self.lower.value {
            1
        } else {
            0
        }
    }
}

/// Otsu's method for automatic threshold selection
///
/// Picks the bin maximizing the between-class variance
/// `wB * wF * (mB - mF)^2`. Bins where either class is empty are skipped and
/// ties keep the lowest bin. An empty or single-valued histogram yields bin 0.
pub fn otsu(histogram: &Histogram) -> Threshold {
    let bin = otsu_bin(histogram.counts());
    debug!(bin, "otsu threshold");
    Threshold::from_bin(histogram, bin)
}

pub(crate) fn otsu_bin(counts: &[i32; BINS]) -> usize {
    let total: f64 = counts.iter().map(|&c| c as f64).sum();
    let sum_total: f64 = counts
        .iter()
        .enumerate()
        .map(|(bin, &count)| bin as f64 * count as f64)
        .sum();

    let mut weight_background = 0.0;
    let mut sum_background = 0.0;
    let mut best: Option<(usize, f64)> = None;

    for (t, &count) in counts.iter().enumerate() {
        weight_background += count as f64;
        sum_background += t as f64 * count as f64;
        if weight_background == 0.0 {
            continue;
        }

        let weight_foreground = total - weight_background;
        if weight_foreground == 0.0 {
            break;
        }

        let mean_background = sum_background / weight_background;
        let mean_foreground = (sum_total - sum_background) / weight_foreground;

        let variance =
            weight_background * weight_foreground * (mean_background - mean_foreground).powi(2);

        if best.is_none_or(|(_, max_variance)| variance > max_variance) {
            best = Some((t, variance));
        }
    }

    best.map_or(0, |(t, _)| t)
}

/// Iterative threshold in the spirit of Li's minimum cross-entropy method
///
/// Starts at the rounded histogram mean and repeatedly sets the threshold to
/// the logarithmic mean of the two class means,
/// `round((mF - mB) / (ln mF - ln mB))`, with the background taken as bins
/// `<= t`. Stops on a fixed point, after [`LI_MAX_ITERATIONS`], or when a
/// class empties, in which case the last threshold is kept. This is a
/// simplified update, not the textbook minimum-cross-entropy iteration.
pub fn li(histogram: &Histogram) -> Threshold {
    let (bin, iterations) = li_iterate(histogram);
    debug!(bin, iterations, "li threshold");
    Threshold::from_bin(histogram, bin)
}

/// Returns the threshold bin and the number of iterations run
pub(crate) fn li_iterate(histogram: &Histogram) -> (usize, usize) {
    let Some(mean) = histogram.mean_bin() else {
        return (0, 0);
    };
    let counts = histogram.counts();
    let mut threshold = (mean.round() as usize).min(BINS - 1);

    for iteration in 1..=LI_MAX_ITERATIONS {
        let (background, foreground) = counts.split_at(threshold + 1);
        let (weight_background, sum_background) = class_moments(background, 0);
        let (weight_foreground, sum_foreground) = class_moments(foreground, threshold + 1);
        if weight_background == 0.0 || weight_foreground == 0.0 {
            return (threshold, iteration);
        }

        let mean_background = sum_background / weight_background;
        let mean_foreground = sum_foreground / weight_foreground;
        let next = (mean_foreground - mean_background)
            / (mean_foreground.ln() - mean_background.ln());
        if !next.is_finite() {
            return (threshold, iteration);
        }

        let next = next.round().clamp(0.0, (BINS - 1) as f64) as usize;
        if next == threshold {
            return (threshold, iteration);
        }
        threshold = next;
    }

    (threshold, LI_MAX_ITERATIONS)
}

fn class_moments(counts: &[i32], offset: usize) -> (f64, f64) {
    counts
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(weight, sum), (i, &count)| {
            (
                weight + count as f64,
                sum + (offset + i) as f64 * count as f64,
            )
        })
}

/// Three-class split from two Otsu passes
///
/// The second pass runs on the histogram restricted to bins at or above the
/// first threshold. The upper boundary is kept at least one bin above the lower.
pub fn multi_otsu(histogram: &Histogram) -> ClassBounds {
    let lower = otsu_bin(histogram.counts());
    let restricted = histogram.restricted_from(lower);
    let second = otsu_bin(restricted.counts());
    let upper = (lower + 1).max(second);
    debug!(lower, second, upper, "multi-otsu thresholds");
    ClassBounds {
        lower: Threshold::from_bin(histogram, lower),
        upper: Threshold::from_bin(histogram, upper),
    }
}
