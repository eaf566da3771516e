//! Comparison of two co-registered studies.

use crate::enums::Intent;
use crate::mask::Mask;
use crate::volume::{Dimensions, Header, Volume, VolumeError, Voxel, exact_range, with_samples};

use rayon::prelude::*;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DifferenceError {
    #[error("Volumes differ in length: {left} vs {right} voxels")]
    LengthMismatch { left: usize, right: usize },

    #[error("Mask has {actual} voxels, expected {expected}")]
    MaskLengthMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Volume(#[from] VolumeError),
}

/// Category of a voxel in a segmentation comparison
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Change {
    None = 0,
    /// Present in the first mask only
    Removed = 1,
    /// Present in the second mask only
    New = 2,
    Stable = 3,
}

impl Change {
    #[inline]
    pub fn classify(in_first: bool, in_second: bool) -> Self {
        match (in_first, in_second) {
            (false, false) => Change::None,
            (true, false) => Change::Removed,
            (false, true) => Change::New,
            (true, true) => Change::Stable,
        }
    }
}

/// Voxel-wise `b - a` as f32, with min/max from an exhaustive scan
///
/// # Errors
///
/// [`DifferenceError::LengthMismatch`] when the volumes hold different
/// numbers of voxels.
pub fn volume_difference(a: &Volume, b: &Volume) -> Result<Volume, DifferenceError> {
    if a.len() != b.len() {
        return Err(DifferenceError::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let values = with_samples!(a.data(), first => {
        with_samples!(b.data(), second => subtract(first, second))
    });
    let (min, max) = exact_range(&values);

    let mut header = a.header().clone();
    header.intent = Intent::None;
    let difference = Volume::from_vec(values, a.dimensions(), min, max, header)?;
    info!(voxels = difference.len(), min, max, "volume difference");
    Ok(difference)
}

fn subtract<A: Voxel, B: Voxel>(first: &[A], second: &[B]) -> Vec<f32> {
    first
        .par_iter()
        .zip(second.par_iter())
        .map(|(&a, &b)| (b.to_f64() - a.to_f64()) as f32)
        .collect()
}

/// Four-way comparison of two masks by voxel presence (label > 0), labelled
/// with [`Change`]. A missing mask counts as all background.
///
/// # Errors
///
/// [`DifferenceError::MaskLengthMismatch`] when a mask does not match `dims`.
pub fn segmentation_difference(
    first: Option<&Mask>,
    second: Option<&Mask>,
    dims: Dimensions,
) -> Result<Mask, DifferenceError> {
    let first_labels = labels_checked(first, dims)?;
    let second_labels = labels_checked(second, dims)?;
    let present = |labels: Option<&[u8]>, i: usize| labels.is_some_and(|l| l[i] > 0);

    let changes: Vec<u8> = (0..dims.len())
        .into_par_iter()
        .map(|i| Change::classify(present(first_labels, i), present(second_labels, i)) as u8)
        .collect();

    let spacing = first
        .or(second)
        .map_or_else(Header::default, |mask| Header::with_spacing(mask.header().pix_dims));
    let mask = Mask::from_vec(changes, dims, spacing)?;
    info!(
        removed = mask.count_label(Change::Removed as u8),
        new = mask.count_label(Change::New as u8),
        stable = mask.count_label(Change::Stable as u8),
        "segmentation difference"
    );
    Ok(mask)
}

fn labels_checked(mask: Option<&Mask>, dims: Dimensions) -> Result<Option<&[u8]>, DifferenceError> {
    let Some(mask) = mask else {
        return Ok(None);
    };
    if mask.len() != dims.len() {
        return Err(DifferenceError::MaskLengthMismatch {
            expected: dims.len(),
            actual: mask.len(),
        });
    }
    Ok(Some(mask.as_slice()?))
}
