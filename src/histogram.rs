//! 256-bin intensity histograms.
//!
//! Volumes above [`SUBSAMPLE_THRESHOLD`] samples are visited with a fixed
//! stride so that roughly [`SUBSAMPLE_TARGET`] samples are binned. This is an
//! approximation: counts from a subsampled scan differ slightly from a full
//! scan, and [`Histogram::total`] is the number of samples actually binned.

use crate::volume::{Volume, VolumeError, Voxel, guarded_span, with_samples};

pub const BINS: usize = 256;
pub const SUBSAMPLE_THRESHOLD: usize = 2_000_000;
pub const SUBSAMPLE_TARGET: usize = 500_000;

/// Stride used when scanning `len` samples
pub fn subsample_stride(len: usize) -> usize {
    if len > SUBSAMPLE_THRESHOLD {
        (len / SUBSAMPLE_TARGET).max(1)
    } else {
        1
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Histogram {
    counts: [i32; BINS],
    /// Bins per intensity unit, `256 / (max - min)`
    bin_width: f64,
    min: f64,
    max: f64,
}

impl Histogram {
    /// Empty histogram over `[min, max]`. A degenerate range is treated as 1.
    pub fn empty(min: f64, max: f64) -> Self {
        Self {
            counts: [0; BINS],
            bin_width: BINS as f64 / guarded_span(min, max),
            min,
            max,
        }
    }

    pub fn from_counts(counts: [i32; BINS], min: f64, max: f64) -> Self {
        Self {
            counts,
            ..Self::empty(min, max)
        }
    }

    /// Bin `samples` over `[min, max]`, subsampling large inputs
    pub fn from_samples<T: Voxel>(samples: &[T], min: f64, max: f64) -> Self {
        let mut histogram = Self::empty(min, max);
        for &sample in samples.iter().step_by(subsample_stride(samples.len())) {
            if let Some(bin) = histogram.bin_of(sample.to_f64()) {
                histogram.counts[bin] += 1;
            }
        }
        histogram
    }

    /// Histogram of a volume over its own min/max
    pub fn from_volume(volume: &Volume) -> Result<Self, VolumeError> {
        Ok(with_samples!(volume.data(), samples => {
            Self::from_samples(samples, volume.min(), volume.max())
        }))
    }

    pub fn counts(&self) -> &[i32; BINS] {
        &self.counts
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Number of samples binned
    pub fn total(&self) -> i64 {
        self.counts.iter().map(|&c| c as i64).sum()
    }

    /// Bin of `value`, or `None` when it lies outside `[min, max]`
    #[inline]
    pub fn bin_of(&self, value: f64) -> Option<usize> {
        if !(value >= self.min && value <= self.max) {
            return None;
        }
        Some(self.clamped_bin(value))
    }

    /// Bin of `value`, clamped to `[0, 255]`
    #[inline]
    pub fn clamped_bin(&self, value: f64) -> usize {
        let bin = ((value - self.min) * self.bin_width).floor();
        if bin.is_nan() || bin < 0.0 {
            0
        } else {
            (bin as usize).min(BINS - 1)
        }
    }

    /// Intensity at the lower edge of `bin`
    #[inline]
    pub fn value_of(&self, bin: usize) -> f64 {
        self.min + bin as f64 / self.bin_width
    }

    /// Cumulative distribution normalized by [`Histogram::total`]; all zeros
    /// for an empty histogram
    pub fn cdf(&self) -> [f64; BINS] {
        let total = self.total();
        let mut cdf = [0.0; BINS];
        if total == 0 {
            return cdf;
        }
        let mut cumulative = 0i64;
        for (out, &count) in cdf.iter_mut().zip(self.counts.iter()) {
            cumulative += count as i64;
            *out = cumulative as f64 / total as f64;
        }
        cdf
    }

    /// Copy with every bin below `bin` zeroed
    pub fn restricted_from(&self, bin: usize) -> Self {
        let mut restricted = self.clone();
        restricted.counts[..bin.min(BINS)].fill(0);
        restricted
    }

    /// Mean bin index, or `None` when empty
    pub fn mean_bin(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        let weighted: f64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(bin, &count)| bin as f64 * count as f64)
            .sum();
        Some(weighted / total as f64)
    }
}
