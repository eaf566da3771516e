use crate::progress::{Progress, fill_in_chunks};
use crate::volume::{Dimensions, Voxel};

use rayon::prelude::*;

const KERNEL: [f64; 3] = [0.2, 0.6, 0.2];

#[derive(Clone, Copy, Debug)]
enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Flat-index stride and extent along this axis
    fn stride_and_extent(self, dims: Dimensions) -> (usize, usize) {
        match self {
            Axis::X => (1, dims.x),
            Axis::Y => (dims.x, dims.y),
            Axis::Z => (dims.slice_len(), dims.z),
        }
    }
}

/// Three separable passes of the [0.2, 0.6, 0.2] kernel along X, Y and Z.
/// The first and last voxel along the pass axis are copied unchanged.
pub(super) fn gaussian_smooth<T: Voxel>(
    samples: &[T],
    dims: Dimensions,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let mut current: Vec<f32> = samples.par_iter().map(|v| v.to_f64() as f32).collect();
    if current.is_empty() {
        return current;
    }
    let mut scratch = vec![0.0f32; current.len()];

    for (pass, axis) in [Axis::X, Axis::Y, Axis::Z].into_iter().enumerate() {
        let start = (pass * 100 / 3) as u8;
        let end = ((pass + 1) * 100 / 3) as u8;
        smooth_pass(&current, &mut scratch, dims, axis, progress, (start, end));
        std::mem::swap(&mut current, &mut scratch);
    }

    current
}

fn smooth_pass(
    input: &[f32],
    output: &mut [f32],
    dims: Dimensions,
    axis: Axis,
    progress: &mut Progress<'_>,
    span: (u8, u8),
) {
    let (stride, extent) = axis.stride_and_extent(dims);
    let slice_len = dims.slice_len();

    for (z, slice) in output.chunks_mut(slice_len).enumerate() {
        let offset = z * slice_len;
        slice.par_iter_mut().enumerate().for_each(|(j, out)| {
            let i = offset + j;
            let position = (i / stride) % extent;
            *out = if position == 0 || position + 1 == extent {
                input[i]
            } else {
                (KERNEL[0] * input[i - stride] as f64
                    + KERNEL[1] * input[i] as f64
                    + KERNEL[2] * input[i + stride] as f64) as f32
            };
        });
        progress.report_fraction(span.0, span.1, z + 1, dims.z);
    }
}

/// `v + strength * (v - blur)` with a 5-point blur over the flat neighbours
/// at ±1 and ±width. The first and last `width + 1` elements use a blur of 0.
pub(super) fn unsharp_mask<T: Voxel>(
    samples: &[T],
    dims: Dimensions,
    strength: f64,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let len = samples.len();
    let width = dims.x;
    let at = |i: usize| samples[i].to_f64();

    fill_in_chunks(len, progress, (0, 100), |i| {
        let value = at(i);
        let blurred = if i > width && i + width + 1 < len {
            (value + at(i - 1) + at(i + 1) + at(i - width) + at(i + width)) / 5.0
        } else {
            0.0
        };
        (value + strength * (value - blurred)) as f32
    })
}

/// Median of the 3x3 in-plane neighbourhood for every interior pixel of each
/// Z-slice. Slice borders keep their original value; neighbouring slices do
/// not contribute.
pub(super) fn median<T: Voxel>(
    samples: &[T],
    dims: Dimensions,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let mut output: Vec<f32> = samples.par_iter().map(|v| v.to_f64() as f32).collect();
    let slice_len = dims.slice_len();
    if output.is_empty() || dims.x < 3 || dims.y < 3 {
        progress.report(100);
        return output;
    }

    for (z, slice) in output.chunks_mut(slice_len).enumerate() {
        let base = z * slice_len;
        slice
            .par_chunks_mut(dims.x)
            .enumerate()
            .skip(1)
            .take(dims.y - 2)
            .for_each(|(y, row)| {
                for (x, out) in row.iter_mut().enumerate().take(dims.x - 1).skip(1) {
                    let mut window = [0.0f32; 9];
                    let mut k = 0;
                    for ny in y - 1..=y + 1 {
                        for nx in x - 1..=x + 1 {
                            window[k] = samples[base + ny * dims.x + nx].to_f64() as f32;
                            k += 1;
                        }
                    }
                    let (_, median, _) = window.select_nth_unstable_by(4, f32::total_cmp);
                    *out = *median;
                }
            });
        progress.report_fraction(0, 100, z + 1, dims.z);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gaussian_spreads_impulse() {
        let dims = Dimensions::new(5, 5, 5);
        let mut samples = vec![0.0f32; dims.len()];
        samples[dims.index(2, 2, 2)] = 1000.0;
        let out = gaussian_smooth(&samples, dims, &mut Progress::none());
        assert_relative_eq!(out[dims.index(2, 2, 2)], 1000.0 * 0.6 * 0.6 * 0.6, epsilon = 1e-2);
        assert_relative_eq!(out[dims.index(1, 2, 2)], 1000.0 * 0.2 * 0.6 * 0.6, epsilon = 1e-2);
        assert_relative_eq!(out[dims.index(1, 1, 1)], 1000.0 * 0.2 * 0.2 * 0.2, epsilon = 1e-2);
        // mass is preserved away from the borders
        let sum: f32 = out.iter().sum();
        assert_relative_eq!(sum, 1000.0, epsilon = 1e-1);
    }

    #[test]
    fn test_gaussian_keeps_borders_along_each_axis() {
        let dims = Dimensions::new(3, 1, 1);
        let out = gaussian_smooth(&[10.0f32, 0.0, 10.0], dims, &mut Progress::none());
        assert_eq!(out, vec![10.0, 4.0, 10.0]);
    }

    #[test]
    fn test_gaussian_progress_covers_three_passes() {
        let dims = Dimensions::new(3, 3, 2);
        let mut seen = Vec::new();
        {
            let mut progress = Progress::new(|p| seen.push(p));
            gaussian_smooth(&vec![1u8; dims.len()], dims, &mut progress);
        }
        assert_eq!(seen, vec![17, 33, 50, 66, 83, 100]);
    }

    #[test]
    fn test_unsharp_mask_interior_and_edges() {
        let dims = Dimensions::new(3, 3, 1);
        let samples: Vec<f32> = vec![1.0, 1.0, 1.0, 1.0, 6.0, 1.0, 1.0, 1.0, 1.0];
        let out = unsharp_mask(&samples, dims, 1.0, &mut Progress::none());
        // center: blur = (6 + 4) / 5 = 2
        assert_relative_eq!(out[4], 10.0);
        // everything else is within width + 1 of an end and uses a blur of 0
        assert_relative_eq!(out[0], 2.0);
        assert_relative_eq!(out[8], 2.0);
    }

    #[test]
    fn test_unsharp_mask_flat_interior_unchanged() {
        let dims = Dimensions::new(4, 4, 2);
        let samples = vec![5i16; dims.len()];
        let out = unsharp_mask(&samples, dims, 2.0, &mut Progress::none());
        assert_relative_eq!(out[dims.index(2, 2, 0)], 5.0);
    }

    #[test]
    fn test_median_removes_salt_noise() {
        let dims = Dimensions::new(4, 4, 2);
        let mut samples = vec![10u16; dims.len()];
        samples[dims.index(1, 1, 0)] = 1000;
        samples[dims.index(0, 0, 1)] = 1000;
        let out = median(&samples, dims, &mut Progress::none());
        assert_relative_eq!(out[dims.index(1, 1, 0)], 10.0);
        // border pixels are left alone
        assert_relative_eq!(out[dims.index(0, 0, 1)], 1000.0);
    }

    #[test]
    fn test_median_ignores_neighbouring_slices() {
        let dims = Dimensions::new(3, 3, 3);
        let mut samples = vec![0.0f64; dims.len()];
        for y in 0..3 {
            for x in 0..3 {
                samples[dims.index(x, y, 0)] = 50.0;
                samples[dims.index(x, y, 2)] = 50.0;
            }
        }
        let out = median(&samples, dims, &mut Progress::none());
        assert_relative_eq!(out[dims.index(1, 1, 1)], 0.0);
        assert_relative_eq!(out[dims.index(1, 1, 0)], 50.0);
    }
}
