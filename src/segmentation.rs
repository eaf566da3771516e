//! Per-voxel classification into label masks.
//!
//! Progress is split as 0–10 for setup (including histogram-based thresholds),
//! 10–90 for the chunked voxel scan, and 90–100 for building the mask.

use crate::enums::SegmentationMethod;
use crate::histogram::Histogram;
use crate::mask::Mask;
use crate::progress::{Progress, fill_in_chunks};
use crate::threshold::{self, ClassBounds};
use crate::volume::{Header, Volume, VolumeError, Voxel, with_samples};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use web_time::Instant;

/// Label written by the local adaptive stand-in
pub const LOCAL_ADAPTIVE_LABEL: u8 = 3;

const DEFAULT_KERNEL_SIZE: usize = 15;

#[derive(Debug, Error)]
pub enum SegmentationError {
    #[error("Manual drawing is applied with the brush, not computed by the engine")]
    ManualDraw,

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

/// Method selection and the user-set bounds it reads
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentationParams {
    pub method: SegmentationMethod,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub lower: f64,
    #[serde(default)]
    pub upper: f64,
    /// Accepted for local adaptive thresholding but not used
    #[serde(default = "default_kernel_size")]
    pub kernel_size: usize,
}

fn default_kernel_size() -> usize {
    DEFAULT_KERNEL_SIZE
}

impl SegmentationParams {
    /// Defaults for `method` on a volume spanning `[min, max]`: threshold at
    /// the midpoint, range bounds at 25% and 75%
    pub fn default_for(method: SegmentationMethod, min: f64, max: f64) -> Self {
        let range = max - min;
        Self {
            method,
            threshold: min + range * 0.5,
            lower: min + range * 0.25,
            upper: min + range * 0.75,
            kernel_size: DEFAULT_KERNEL_SIZE,
        }
    }
}

/// Resolved voxel decision rule
#[derive(Clone, Copy, Debug, PartialEq)]
enum Rule {
    AtLeast { threshold: f64, label: u8 },
    AtMost(f64),
    Between { lower: f64, upper: f64 },
    Classes(ClassBounds),
}

impl Rule {
    fn resolve(volume: &Volume, params: &SegmentationParams) -> Result<Self, SegmentationError> {
        let rule = match params.method {
            SegmentationMethod::Binary | SegmentationMethod::Truncate => Rule::AtLeast {
                threshold: params.threshold,
                label: 1,
            },
            SegmentationMethod::BinaryInv => Rule::AtMost(params.threshold),
            SegmentationMethod::RangePass => Rule::Between {
                lower: params.lower,
                upper: params.upper,
            },
            SegmentationMethod::Otsu => Rule::AtLeast {
                threshold: threshold::otsu(&Histogram::from_volume(volume)?).value,
                label: 1,
            },
            SegmentationMethod::Li => Rule::AtLeast {
                threshold: threshold::li(&Histogram::from_volume(volume)?).value,
                label: 1,
            },
            SegmentationMethod::MultiOtsu => {
                Rule::Classes(threshold::multi_otsu(&Histogram::from_volume(volume)?))
            }
            SegmentationMethod::LocalAdaptive => {
                debug!(
                    kernel_size = params.kernel_size,
                    "local adaptive falls back to a global threshold"
                );
                Rule::AtLeast {
                    threshold: params.threshold,
                    label: LOCAL_ADAPTIVE_LABEL,
                }
            }
            SegmentationMethod::ManualDraw => return Err(SegmentationError::ManualDraw),
        };
        Ok(rule)
    }

    #[inline]
    fn label(&self, value: f64) -> u8 {
        match *self {
            Rule::AtLeast { threshold, label } => {
                if value >= threshold {
                    label
                } else {
                    0
                }
            }
            Rule::AtMost(threshold) => u8::from(value <= threshold),
            Rule::Between { lower, upper } => u8::from(lower <= value && value <= upper),
            Rule::Classes(bounds) => bounds.classify(value),
        }
    }
}

/// Label every voxel of `volume` according to `params`
///
/// Automatic methods derive their thresholds from the volume's histogram on
/// every call; the others read the bounds in `params`.
///
/// # Errors
///
/// [`SegmentationError::ManualDraw`] for [`SegmentationMethod::ManualDraw`],
/// which is handled by [`Mask::paint_sphere`].
pub fn segment(
    volume: &Volume,
    params: &SegmentationParams,
    progress: &mut Progress<'_>,
) -> Result<Mask, SegmentationError> {
    let started = Instant::now();
    progress.begin();
    let rule = Rule::resolve(volume, params)?;
    debug!(method = ?params.method, ?rule, "resolved segmentation rule");
    progress.report(10);

    let labels = with_samples!(volume.data(), samples => scan(samples, &rule, progress));
    progress.report(90);

    let header = Header {
        pix_dims: volume.header().pix_dims,
        extras: volume.header().extras.clone(),
        ..Default::default()
    };
    let mask = Mask::from_vec(labels, volume.dimensions(), header)?;
    progress.report(100);

    info!(
        method = ?params.method,
        voxels = mask.len(),
        foreground = mask.count_nonzero(),
        "segmentation finished in {:.2}ms",
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(mask)
}

fn scan<T: Voxel>(samples: &[T], rule: &Rule, progress: &mut Progress<'_>) -> Vec<u8> {
    fill_in_chunks(samples.len(), progress, (10, 90), |i| {
        rule.label(samples[i].to_f64())
    })
}
