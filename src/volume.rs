use crate::enums::{Datatype, Intent, Orientation};

use image::{GrayImage, ImageBuffer};
use ndarray::{Array3, ArrayView2, s};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("Sample count {actual} does not match dimensions {dims:?} ({expected} voxels)")]
    LengthMismatch {
        dims: Dimensions,
        expected: usize,
        actual: usize,
    },

    #[error("Volume samples are not contiguous in memory")]
    NonContiguous,

    #[error("Unknown datatype code {0}")]
    UnknownDatatype(i16),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// Scalar sample kinds a volume can hold
pub trait Voxel: bytemuck::Pod + Send + Sync + 'static {
    const DATATYPE: Datatype;

    fn to_f64(self) -> f64;

    fn into_data(array: Array3<Self>) -> VolumeData;
}

macro_rules! impl_voxel {
    ($ty:ty, $variant:ident) => {
        impl Voxel for $ty {
            const DATATYPE: Datatype = Datatype::$variant;

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn into_data(array: Array3<Self>) -> VolumeData {
                VolumeData::$variant(array)
            }
        }
    };
}

impl_voxel!(u8, U8);
impl_voxel!(i16, I16);
impl_voxel!(u16, U16);
impl_voxel!(i32, I32);
impl_voxel!(f32, F32);
impl_voxel!(f64, F64);

/// Samples of a volume, shaped (depth, height, width) in standard layout so
/// that the flat index of (x, y, z) is `z * dim_x * dim_y + y * dim_x + x`.
#[derive(Clone, Debug, PartialEq)]
pub enum VolumeData {
    U8(Array3<u8>),
    I16(Array3<i16>),
    U16(Array3<u16>),
    I32(Array3<i32>),
    F32(Array3<f32>),
    F64(Array3<f64>),
}

/// Run `$body` with `$samples` bound to the flat sample slice of `$data`,
/// whatever its element type. Propagates [`VolumeError::NonContiguous`] with `?`.
macro_rules! with_samples {
    ($data:expr, $samples:ident => $body:expr) => {
        match $data {
            $crate::volume::VolumeData::U8(array) => {
                let $samples = $crate::volume::contiguous(array)?;
                $body
            }
            $crate::volume::VolumeData::I16(array) => {
                let $samples = $crate::volume::contiguous(array)?;
                $body
            }
            $crate::volume::VolumeData::U16(array) => {
                let $samples = $crate::volume::contiguous(array)?;
                $body
            }
            $crate::volume::VolumeData::I32(array) => {
                let $samples = $crate::volume::contiguous(array)?;
                $body
            }
            $crate::volume::VolumeData::F32(array) => {
                let $samples = $crate::volume::contiguous(array)?;
                $body
            }
            $crate::volume::VolumeData::F64(array) => {
                let $samples = $crate::volume::contiguous(array)?;
                $body
            }
        }
    };
}
pub(crate) use with_samples;

pub(crate) fn contiguous<T>(array: &Array3<T>) -> Result<&[T], VolumeError> {
    array.as_slice().ok_or(VolumeError::NonContiguous)
}

impl VolumeData {
    pub fn datatype(&self) -> Datatype {
        match self {
            VolumeData::U8(_) => Datatype::U8,
            VolumeData::I16(_) => Datatype::I16,
            VolumeData::U16(_) => Datatype::U16,
            VolumeData::I32(_) => Datatype::I32,
            VolumeData::F32(_) => Datatype::F32,
            VolumeData::F64(_) => Datatype::F64,
        }
    }

    /// Shape as (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        match self {
            VolumeData::U8(array) => array.dim(),
            VolumeData::I16(array) => array.dim(),
            VolumeData::U16(array) => array.dim(),
            VolumeData::I32(array) => array.dim(),
            VolumeData::F32(array) => array.dim(),
            VolumeData::F64(array) => array.dim(),
        }
    }

    pub fn len(&self) -> usize {
        let (depth, height, width) = self.dim();
        depth * height * width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Dimensions {
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Self { x, y, z }
    }

    /// Build from an ndarray shape (depth, height, width)
    pub fn from_shape((z, y, x): (usize, usize, usize)) -> Self {
        Self { x, y, z }
    }

    /// ndarray shape (depth, height, width)
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.z, self.y, self.x)
    }

    pub fn len(&self) -> usize {
        self.x * self.y * self.z
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of voxels in one Z-slice
    pub fn slice_len(&self) -> usize {
        self.x * self.y
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        z * self.x * self.y + y * self.x + x
    }

    /// Inverse of [`Dimensions::index`]
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize, usize) {
        let slice_len = self.slice_len();
        let rem = index % slice_len;
        (rem % self.x, rem / self.x, index / slice_len)
    }

    pub fn contains(&self, x: usize, y: usize, z: usize) -> bool {
        x < self.x && y < self.y && z < self.z
    }
}

/// Metadata carried alongside the samples.
///
/// `extras` is passed through untouched by every operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub datatype: Datatype,
    pub intent: Intent,
    /// Physical voxel spacing (x, y, z) in millimetres
    pub pix_dims: (f32, f32, f32),
    pub extras: BTreeMap<String, String>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            datatype: Datatype::default(),
            intent: Intent::default(),
            pix_dims: (1.0, 1.0, 1.0),
            extras: BTreeMap::new(),
        }
    }
}

impl Header {
    pub fn with_spacing(pix_dims: (f32, f32, f32)) -> Self {
        Self {
            pix_dims,
            ..Default::default()
        }
    }

    /// Physical volume of a single voxel in cubic millimetres
    pub fn voxel_volume(&self) -> f64 {
        let (x, y, z) = self.pix_dims;
        x as f64 * y as f64 * z as f64
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Volume {
    data: VolumeData,
    min: f64,
    max: f64,
    header: Header,
}

impl Volume {
    /// Wrap an array shaped (depth, height, width). The header's datatype is
    /// overwritten to match `T`.
    pub fn new<T: Voxel>(data: Array3<T>, min: f64, max: f64, mut header: Header) -> Self {
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        header.datatype = T::DATATYPE;
        Self {
            data: T::into_data(data),
            min,
            max,
            header,
        }
    }

    /// Build from flat samples. Fails when `samples.len()` differs from the
    /// voxel count of `dims`.
    pub fn from_vec<T: Voxel>(
        samples: Vec<T>,
        dims: Dimensions,
        min: f64,
        max: f64,
        header: Header,
    ) -> Result<Self, VolumeError> {
        if samples.len() != dims.len() {
            return Err(VolumeError::LengthMismatch {
                dims,
                expected: dims.len(),
                actual: samples.len(),
            });
        }
        let array = Array3::from_shape_vec(dims.shape(), samples)?;
        Ok(Self::new(array, min, max, header))
    }

    /// Like [`Volume::from_vec`], computing the exact intensity range
    pub fn from_vec_exact<T: Voxel>(
        samples: Vec<T>,
        dims: Dimensions,
        header: Header,
    ) -> Result<Self, VolumeError> {
        let (min, max) = exact_range(&samples);
        Self::from_vec(samples, dims, min, max, header)
    }

    /// Get the dimensions of the volume (depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::from_shape(self.dim())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &VolumeData {
        &self.data
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn datatype(&self) -> Datatype {
        self.data.datatype()
    }

    /// Sample at (x, y, z) as f64
    pub fn value_at(&self, x: usize, y: usize, z: usize) -> Option<f64> {
        let index = [z, y, x];
        match &self.data {
            VolumeData::U8(array) => array.get(index).map(|v| v.to_f64()),
            VolumeData::I16(array) => array.get(index).map(|v| v.to_f64()),
            VolumeData::U16(array) => array.get(index).map(|v| v.to_f64()),
            VolumeData::I32(array) => array.get(index).map(|v| v.to_f64()),
            VolumeData::F32(array) => array.get(index).map(|v| v.to_f64()),
            VolumeData::F64(array) => array.get(index).map(|v| v.to_f64()),
        }
    }

    /// All samples widened to f64, in flat index order
    pub fn to_f64_vec(&self) -> Result<Vec<f64>, VolumeError> {
        Ok(with_samples!(&self.data, samples => {
            samples.par_iter().map(|v| v.to_f64()).collect()
        }))
    }

    /// Minimum and maximum over every sample
    pub fn exact_range(&self) -> Result<(f64, f64), VolumeError> {
        Ok(with_samples!(&self.data, samples => exact_range(samples)))
    }

    pub fn get_slice_from_axis<T: Voxel>(
        array: &Array3<T>,
        index: usize,
        orientation: Orientation,
    ) -> ArrayView2<'_, T> {
        match orientation {
            Orientation::Axial => array.slice(s![index, .., ..]),
            Orientation::Coronal => array.slice(s![.., index, ..]),
            Orientation::Sagittal => array.slice(s![.., .., index]),
        }
    }

    /// Extract one slice as an 8-bit image, windowed by the volume's min/max
    pub fn slice_image(&self, index: usize, orientation: Orientation) -> Option<GrayImage> {
        if !self.is_valid_index(index, orientation) {
            return None;
        }
        let (min, span) = (self.min, guarded_span(self.min, self.max));
        match &self.data {
            VolumeData::U8(array) => Self::slice_to_image(array, index, orientation, min, span),
            VolumeData::I16(array) => Self::slice_to_image(array, index, orientation, min, span),
            VolumeData::U16(array) => Self::slice_to_image(array, index, orientation, min, span),
            VolumeData::I32(array) => Self::slice_to_image(array, index, orientation, min, span),
            VolumeData::F32(array) => Self::slice_to_image(array, index, orientation, min, span),
            VolumeData::F64(array) => Self::slice_to_image(array, index, orientation, min, span),
        }
    }

    #[inline]
    fn normalize_to_u8(value: f64, min: f64, span: f64) -> u8 {
        (((value - min) / span) * 255.0).clamp(0.0, 255.0) as u8
    }

    fn slice_to_image<T: Voxel>(
        array: &Array3<T>,
        index: usize,
        orientation: Orientation,
        min: f64,
        span: f64,
    ) -> Option<GrayImage> {
        let slice = Self::get_slice_from_axis(array, index, orientation);
        let (height, width) = slice.dim();
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v.to_f64(), min, span))
            .collect();
        ImageBuffer::from_raw(width as u32, height as u32, pixel_data)
    }

    fn is_valid_index(&self, index: usize, orientation: Orientation) -> bool {
        let dim = self.dim();
        let max_index = match orientation {
            Orientation::Axial => dim.0,
            Orientation::Coronal => dim.1,
            Orientation::Sagittal => dim.2,
        };
        index < max_index
    }
}

/// `max - min`, or 1 when the range is degenerate
#[inline]
pub fn guarded_span(min: f64, max: f64) -> f64 {
    let span = max - min;
    if span > 0.0 && span.is_finite() {
        span
    } else {
        1.0
    }
}

/// Exact min/max over all finite samples; (0, 0) when there are none
pub fn exact_range<T: Voxel>(samples: &[T]) -> (f64, f64) {
    strided_range(samples, 1)
}

/// Min/max over every `stride`-th sample, starting at index 0
pub fn sampled_range<T: Voxel>(samples: &[T], stride: usize) -> (f64, f64) {
    strided_range(samples, stride.max(1))
}

fn strided_range<T: Voxel>(samples: &[T], stride: usize) -> (f64, f64) {
    let (min, max) = samples
        .iter()
        .step_by(stride)
        .map(|v| v.to_f64())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if min > max { (0.0, 0.0) } else { (min, max) }
}
