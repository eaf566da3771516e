use crate::progress::{Progress, fill_in_chunks};
use crate::volume::{Dimensions, Voxel, guarded_span};

use rayon::prelude::*;

const BIAS_STRENGTH: f64 = 0.3;
const BIAS_FLOOR: f64 = 0.1;

/// `min + ((v - min) / range)^gamma * range`, negative offsets clamped to 0
pub(super) fn gamma<T: Voxel>(
    samples: &[T],
    min: f64,
    max: f64,
    gamma: f64,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let range = guarded_span(min, max);
    fill_in_chunks(samples.len(), progress, (0, 100), |i| {
        let normalized = ((samples[i].to_f64() - min) / range).max(0.0);
        (min + normalized.powf(gamma) * range) as f32
    })
}

/// Logistic stretch of the normalized intensity around `cutoff`
pub(super) fn sigmoid<T: Voxel>(
    samples: &[T],
    min: f64,
    max: f64,
    gain: f64,
    cutoff: f64,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let range = guarded_span(min, max);
    fill_in_chunks(samples.len(), progress, (0, 100), |i| {
        let normalized = (samples[i].to_f64() - min) / range;
        let stretched = 1.0 / (1.0 + (-gain * (normalized - cutoff)).exp());
        (min + stretched * range) as f32
    })
}

/// Divide out a synthetic radial vignette `1 - 0.3 * d^2` (floored at 0.1),
/// where `d` is the per-axis normalized distance from the volume center.
/// Runs in a single step.
pub(super) fn bias_field<T: Voxel>(
    samples: &[T],
    dims: Dimensions,
    progress: &mut Progress<'_>,
) -> Vec<f32> {
    let half = (dims.x as f64 / 2.0, dims.y as f64 / 2.0, dims.z as f64 / 2.0);
    let output = samples
        .par_iter()
        .enumerate()
        .map(|(i, v)| {
            let (x, y, z) = dims.coords(i);
            let dx = (x as f64 - half.0) / half.0;
            let dy = (y as f64 - half.1) / half.1;
            let dz = (z as f64 - half.2) / half.2;
            let bias = (1.0 - BIAS_STRENGTH * (dx * dx + dy * dy + dz * dz)).max(BIAS_FLOOR);
            (v.to_f64() / bias) as f32
        })
        .collect();
    progress.report(100);
    output
}
