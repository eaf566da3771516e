//! # Volume engine
//!
//! This crate is the processing core of a browser-based viewer for
//! volumetric scans (MRI, CT, PET). It holds decoded NIfTI/DICOM volumes in
//! memory and provides:
//!  - Intensity transforms (histogram equalization, CLAHE, gamma, sigmoid,
//!    smoothing, sharpening, histogram matching, bias-field correction,
//!    median filtering)
//!  - Threshold segmentation, including Otsu, Li and multi-level Otsu
//!  - A spherical brush for editing label masks by hand
//!  - Voxel-wise comparison of two studies and of two segmentations
//!  - A bridge to a remote classifier for model-based segmentation
//!
//! Volumes are stored as (depth, height, width) arrays in standard layout,
//! so a voxel (x, y, z) sits at flat index `z * dim_x * dim_y + y * dim_x + x`.
//! Heavy per-voxel work runs in parallel using rayon, in chunks between which
//! an optional [`Progress`] callback is invoked.
//!
//! File parsing, rendering and GPU compute are left to the host application.
//!
//! # Examples
//!
//! ## Segmenting a smoothed volume
//!
//! ```
//! # use volume_engine::{Dimensions, Header, Progress, SegmentationMethod, SegmentationParams};
//! # use volume_engine::{Transform, Volume, segmentation, transform};
//! let dims = Dimensions::new(8, 8, 8);
//! let samples: Vec<i16> = (0..dims.len() as i16).collect();
//! let volume = Volume::from_vec_exact(samples, dims, Header::default())
//!     .expect("should have matched the dimensions");
//!
//! let mut progress = Progress::none();
//! let smoothed = transform::apply(&volume, &Transform::GaussianSmooth, None, &mut progress)
//!     .expect("should have smoothed the volume");
//! let (min, max) = (smoothed.min(), smoothed.max());
//! let params = SegmentationParams::default_for(SegmentationMethod::Otsu, min, max);
//! let mask = segmentation::segment(&smoothed, &params, &mut Progress::new(|p| println!("{p}%")))
//!     .expect("should have segmented the volume");
//! assert_eq!(mask.len(), volume.len());
//! ```

pub mod config;
pub mod difference;
pub mod enums;
pub mod histogram;
pub mod inference;
pub mod mask;
pub mod progress;
pub mod segmentation;
pub mod threshold;
pub mod transform;
pub mod volume;

pub use config::{PipelineConfig, PipelineOutput, run_pipeline};
pub use enums::{Datatype, Intent, Orientation, SegmentationMethod, TransformKind};
pub use mask::Mask;
pub use progress::Progress;
pub use segmentation::SegmentationParams;
pub use transform::Transform;
pub use volume::{Dimensions, Header, Volume, VolumeData, Voxel};
