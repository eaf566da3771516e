//! Intensity transforms
//!
//! Every transform reads a volume and returns a new `f32` volume of the same
//! shape; the input is never modified. The new min/max are estimated from
//! every [`RANGE_SAMPLE_STRIDE`]-th output sample rather than an exhaustive
//! scan, so they can miss isolated extremes.

mod equalize;
mod filter;
mod intensity;

use crate::enums::{Intent, TransformKind};
use crate::histogram::Histogram;
use crate::progress::Progress;
use crate::volume::{Volume, VolumeError, sampled_range, with_samples};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use web_time::Instant;

pub const RANGE_SAMPLE_STRIDE: usize = 10;

pub const BRIGHTEN_GAMMA: f64 = 0.7;
pub const DARKEN_GAMMA: f64 = 1.5;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Histogram matching requires a reference volume")]
    MissingReference,

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transform {
    HistogramEqualization,
    /// Slice-wise contrast-limited equalization without spatial tiling
    Clahe { clip_limit: f64 },
    Gamma { gamma: f64 },
    Sigmoid { gain: f64, cutoff: f64 },
    /// Separable [0.2, 0.6, 0.2] passes along X, Y and Z
    GaussianSmooth,
    UnsharpMask { strength: f64 },
    HistogramMatching,
    /// Radial vignette correction standing in for N4
    BiasField,
    /// 3x3 in-plane median
    Median,
}

impl Transform {
    /// Default parameters for each transform kind
    pub fn default_for(kind: TransformKind) -> Self {
        match kind {
            TransformKind::HistogramEqualization => Transform::HistogramEqualization,
            TransformKind::Clahe => Transform::Clahe { clip_limit: 2.0 },
            TransformKind::Gamma => Transform::Gamma { gamma: 1.0 },
            TransformKind::Brighten => Transform::Gamma {
                gamma: BRIGHTEN_GAMMA,
            },
            TransformKind::Darken => Transform::Gamma {
                gamma: DARKEN_GAMMA,
            },
            TransformKind::Sigmoid => Transform::Sigmoid {
                gain: 10.0,
                cutoff: 0.5,
            },
            TransformKind::GaussianSmooth => Transform::GaussianSmooth,
            TransformKind::UnsharpMask => Transform::UnsharpMask { strength: 1.0 },
            TransformKind::HistogramMatching => Transform::HistogramMatching,
            TransformKind::BiasField => Transform::BiasField,
            TransformKind::Median => Transform::Median,
        }
    }

    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::HistogramEqualization => TransformKind::HistogramEqualization,
            Transform::Clahe { .. } => TransformKind::Clahe,
            Transform::Gamma { .. } => TransformKind::Gamma,
            Transform::Sigmoid { .. } => TransformKind::Sigmoid,
            Transform::GaussianSmooth => TransformKind::GaussianSmooth,
            Transform::UnsharpMask { .. } => TransformKind::UnsharpMask,
            Transform::HistogramMatching => TransformKind::HistogramMatching,
            Transform::BiasField => TransformKind::BiasField,
            Transform::Median => TransformKind::Median,
        }
    }

    pub fn needs_reference(&self) -> bool {
        matches!(self, Transform::HistogramMatching)
    }
}

/// Apply `transform` to `volume`
///
/// # Errors
///
/// Returns [`TransformError::MissingReference`] before doing any work when
/// histogram matching is requested without `reference`.
pub fn apply(
    volume: &Volume,
    transform: &Transform,
    reference: Option<&Volume>,
    progress: &mut Progress<'_>,
) -> Result<Volume, TransformError> {
    let started = Instant::now();
    let dims = volume.dimensions();
    let (min, max) = (volume.min(), volume.max());

    macro_rules! run {
        ($samples:ident => $body:expr) => {{
            progress.begin();
            with_samples!(volume.data(), $samples => $body)
        }};
    }

    let values: Vec<f32> = match transform {
        Transform::HistogramMatching => {
            let Some(reference) = reference else {
                return Err(TransformError::MissingReference);
            };
            let reference = Histogram::from_volume(reference)?;
            run!(samples => equalize::match_histogram(samples, min, max, &reference, progress))
        }
        Transform::HistogramEqualization => {
            run!(samples => equalize::equalize(samples, min, max, progress))
        }
        Transform::Clahe { clip_limit } => {
            run!(samples => equalize::clahe(samples, dims, min, max, *clip_limit, progress))
        }
        Transform::Gamma { gamma } => {
            run!(samples => intensity::gamma(samples, min, max, *gamma, progress))
        }
        Transform::Sigmoid { gain, cutoff } => {
            run!(samples => intensity::sigmoid(samples, min, max, *gain, *cutoff, progress))
        }
        Transform::GaussianSmooth => {
            run!(samples => filter::gaussian_smooth(samples, dims, progress))
        }
        Transform::UnsharpMask { strength } => {
            run!(samples => filter::unsharp_mask(samples, dims, *strength, progress))
        }
        Transform::BiasField => run!(samples => intensity::bias_field(samples, dims, progress)),
        Transform::Median => run!(samples => filter::median(samples, dims, progress)),
    };
    progress.report(100);

    let (out_min, out_max) = sampled_range(&values, RANGE_SAMPLE_STRIDE);
    let mut header = volume.header().clone();
    header.intent = Intent::None;
    let output = Volume::from_vec(values, dims, out_min, out_max, header)?;

    info!(
        transform = ?transform.kind(),
        voxels = dims.len(),
        min = out_min,
        max = out_max,
        "transform finished in {:.2}ms",
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(output)
}
