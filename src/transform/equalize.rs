use crate::histogram::{BINS, Histogram};
use crate::progress::{Progress, fill_in_chunks};
use crate::volume::{Dimensions, Voxel, exact_range};

use rayon::prelude::*;

/// Global histogram equalization: each voxel maps to
/// `min + cdf(bin) * (max - min)`
pub(super) fn equalize<T: Voxel>(
    samples: &[T],
    min: f64,
    max: f64,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let histogram = Histogram::from_samples(samples, min, max);
    let range = max - min;
    let lut = histogram.cdf().map(|cdf| (min + cdf * range) as f32);
    if histogram.total() == 0 {
        return fill_in_chunks(samples.len(), progress, (0, 100), |i| samples[i].to_f64() as f32);
    }
    fill_in_chunks(samples.len(), progress, (0, 100), |i| {
        lut[histogram.clamped_bin(samples[i].to_f64())]
    })
}

/// Contrast-limited equalization applied to each Z-slice as a whole.
///
/// Each slice gets its own histogram over the slice's range. Bins are clipped
/// at `slice_len / 256 * clip_limit` and the clipped excess is spread evenly
/// over all bins. Voxels are remapped into the volume's `[min, max]`. There is
/// no tiling inside a slice.
pub(super) fn clahe<T: Voxel>(
    samples: &[T],
    dims: Dimensions,
    min: f64,
    max: f64,
    clip_limit: f64,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let slice_len = dims.slice_len();
    let mut output = vec![0.0f32; samples.len()];
    if slice_len == 0 {
        return output;
    }
    let range = max - min;
    let limit = (slice_len as f64 / BINS as f64) * clip_limit;

    for (z, (slice, out)) in samples
        .chunks(slice_len)
        .zip(output.chunks_mut(slice_len))
        .enumerate()
    {
        let (slice_min, slice_max) = exact_range(slice);
        let histogram = Histogram::from_samples(slice, slice_min, slice_max);

        let mut bins = histogram.counts().map(|count| count as f64);
        let mut excess = 0.0;
        for bin in bins.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let share = excess / BINS as f64;
        bins.iter_mut().for_each(|bin| *bin += share);

        let total: f64 = bins.iter().sum();
        let mut cdf = [0.0f64; BINS];
        let mut cumulative = 0.0;
        for (c, bin) in cdf.iter_mut().zip(bins.iter()) {
            cumulative += bin;
            *c = if total > 0.0 { cumulative / total } else { 0.0 };
        }

        out.par_iter_mut().zip(slice.par_iter()).for_each(|(o, &v)| {
            *o = (min + cdf[histogram.clamped_bin(v.to_f64())] * range) as f32;
        });
        progress.report_fraction(0, 100, z + 1, dims.z);
    }

    output
}

/// Map the source distribution onto `reference`.
///
/// For every source bin the reference bin with the closest normalized CDF
/// value is chosen (first one on ties); the output is that bin scaled into
/// the reference's intensity range.
pub(super) fn match_histogram<T: Voxel>(
    samples: &[T],
    min: f64,
    max: f64,
    reference: &Histogram,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let source = Histogram::from_samples(samples, min, max);
    let source_cdf = source.cdf();
    let reference_cdf = reference.cdf();
    let reference_range = reference.max() - reference.min();

    let mapping = source_cdf.map(|target| {
        let mut best_bin = 0;
        let mut best_distance = f64::INFINITY;
        for (bin, &cdf) in reference_cdf.iter().enumerate() {
            let distance = (cdf - target).abs();
            if distance < best_distance {
                best_distance = distance;
                best_bin = bin;
            }
        }
        (reference.min() + best_bin as f64 / (BINS - 1) as f64 * reference_range) as f32
    });

    fill_in_chunks(samples.len(), progress, (0, 100), |i| {
        mapping[source.clamped_bin(samples[i].to_f64())]
    })
}
