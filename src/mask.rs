//! Label masks and the interactive brush.

use crate::enums::{Datatype, Intent};
use crate::volume::{Dimensions, Header, Volume, VolumeError, contiguous, exact_range};

use ndarray::Array3;
use tracing::trace;

/// Byte-valued label volume. Label 0 is background.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    labels: Array3<u8>,
    header: Header,
}

/// Voxel count and physical volume of one label
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelStatistics {
    pub label: u8,
    pub voxels: usize,
    /// Cubic millimetres, from the header's voxel spacing
    pub volume_mm3: f64,
}

impl Mask {
    pub fn new(labels: Array3<u8>, mut header: Header) -> Self {
        let labels = if labels.is_standard_layout() {
            labels
        } else {
            labels.as_standard_layout().into_owned()
        };
        header.datatype = Datatype::U8;
        header.intent = Intent::Label;
        Self { labels, header }
    }

    pub fn from_vec(
        labels: Vec<u8>,
        dims: Dimensions,
        header: Header,
    ) -> Result<Self, VolumeError> {
        if labels.len() != dims.len() {
            return Err(VolumeError::LengthMismatch {
                dims,
                expected: dims.len(),
                actual: labels.len(),
            });
        }
        Ok(Self::new(Array3::from_shape_vec(dims.shape(), labels)?, header))
    }

    pub fn zeros(dims: Dimensions, header: Header) -> Self {
        Self::new(Array3::zeros(dims.shape()), header)
    }

    /// All-background mask with the shape and spacing of `volume`
    pub fn zeros_like(volume: &Volume) -> Self {
        let header = Header {
            pix_dims: volume.header().pix_dims,
            extras: volume.header().extras.clone(),
            ..Default::default()
        };
        Self::zeros(volume.dimensions(), header)
    }

    /// Return the mask in `slot`, allocating an empty one sized to `volume` first
    /// if there is none yet
    pub fn ensure<'a>(slot: &'a mut Option<Mask>, volume: &Volume) -> &'a mut Mask {
        slot.get_or_insert_with(|| Mask::zeros_like(volume))
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::from_shape(self.labels.dim())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &Array3<u8> {
        &self.labels
    }

    pub fn as_slice(&self) -> Result<&[u8], VolumeError> {
        contiguous(&self.labels)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> Option<u8> {
        self.labels.get([z, y, x]).copied()
    }

    pub fn count_nonzero(&self) -> usize {
        self.labels.iter().filter(|&&label| label > 0).count()
    }

    pub fn count_label(&self, label: u8) -> usize {
        self.labels.iter().filter(|&&l| l == label).count()
    }

    /// Set every voxel within Euclidean distance `radius` of `center` (x, y, z)
    /// to `value`, clipped to the mask bounds. Only the bounding cube of the
    /// sphere is visited. Returns the number of voxels written.
    pub fn paint_sphere(&mut self, center: (usize, usize, usize), radius: u32, value: u8) -> usize {
        let dims = self.dimensions();
        let r = radius as i64;
        let r2 = r * r;
        let (cx, cy, cz) = (center.0 as i64, center.1 as i64, center.2 as i64);
        let mut written = 0;

        for dz in -r..=r {
            let z = cz + dz;
            if z < 0 || z >= dims.z as i64 {
                continue;
            }
            for dy in -r..=r {
                let y = cy + dy;
                if y < 0 || y >= dims.y as i64 {
                    continue;
                }
                for dx in -r..=r {
                    let x = cx + dx;
                    if x < 0 || x >= dims.x as i64 {
                        continue;
                    }
                    if dx * dx + dy * dy + dz * dz <= r2 {
                        self.labels[[z as usize, y as usize, x as usize]] = value;
                        written += 1;
                    }
                }
            }
        }

        trace!(?center, radius, value, written, "painted sphere");
        written
    }

    /// Per-label voxel counts and physical volumes, ascending by label,
    /// background excluded
    pub fn label_statistics(&self) -> Vec<LabelStatistics> {
        let mut counts = [0usize; 256];
        for &label in self.labels.iter() {
            counts[label as usize] += 1;
        }
        let voxel_volume = self.header.voxel_volume();
        counts
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, count)| **count > 0)
            .map(|(label, &voxels)| LabelStatistics {
                label: label as u8,
                voxels,
                volume_mm3: voxels as f64 * voxel_volume,
            })
            .collect()
    }

    /// Convert into a label volume with its exact label range
    pub fn into_volume(self) -> Result<Volume, VolumeError> {
        let (min, max) = exact_range(contiguous(&self.labels)?);
        let mut header = self.header;
        header.intent = Intent::Label;
        Ok(Volume::new(self.labels, min, max, header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty(size: usize) -> Mask {
        Mask::zeros(Dimensions::new(size, size, size), Header::default())
    }

    #[test]
    fn test_paint_sphere_voxel_counts() {
        // lattice points inside a ball of radius r
        for (radius, expected) in [(0, 1), (1, 7), (2, 33), (3, 123)] {
            let mut mask = empty(11);
            let written = mask.paint_sphere((5, 5, 5), radius, 1);
            assert_eq!(written, expected, "radius {radius}");
            assert_eq!(mask.count_nonzero(), expected, "radius {radius}");
        }
    }

    #[test]
    fn test_paint_sphere_radius_one_pattern() {
        let mut mask = empty(3);
        mask.paint_sphere((1, 1, 1), 1, 1);
        assert_eq!(mask.get(1, 1, 1), Some(1));
        assert_eq!(mask.get(0, 1, 1), Some(1));
        assert_eq!(mask.get(1, 1, 2), Some(1));
        assert_eq!(mask.get(0, 0, 1), Some(0));
        assert_eq!(mask.get(0, 0, 0), Some(0));
    }

    #[test]
    fn test_paint_sphere_is_idempotent() {
        let mut mask = empty(9);
        mask.paint_sphere((4, 4, 4), 2, 1);
        let once = mask.clone();
        mask.paint_sphere((4, 4, 4), 2, 1);
        assert_eq!(mask, once);
    }

    #[test]
    fn test_paint_sphere_clips_at_corner() {
        let mut mask = empty(5);
        let written = mask.paint_sphere((0, 0, 0), 1, 1);
        // center plus one neighbour along each positive axis
        assert_eq!(written, 4);
        assert_eq!(mask.count_nonzero(), 4);
    }

    #[test]
    fn test_erase_restores_background() {
        let mut mask = empty(9);
        mask.paint_sphere((4, 4, 4), 3, 1);
        mask.paint_sphere((4, 4, 4), 1, 0);
        assert_eq!(mask.count_nonzero(), 123 - 7);
        assert_eq!(mask.get(4, 4, 4), Some(0));
    }

    #[test]
    fn test_ensure_allocates_once() {
        let dims = Dimensions::new(4, 4, 2);
        let header = Header::with_spacing((0.5, 0.5, 2.0));
        let volume = Volume::from_vec_exact(vec![1i16; dims.len()], dims, header).unwrap();
        let mut slot = None;
        Mask::ensure(&mut slot, &volume).paint_sphere((1, 1, 0), 0, 1);
        Mask::ensure(&mut slot, &volume).paint_sphere((2, 2, 1), 0, 1);
        let mask = slot.unwrap();
        assert_eq!(mask.dimensions(), dims);
        assert_eq!(mask.count_nonzero(), 2);
        assert_eq!(mask.header().pix_dims, (0.5, 0.5, 2.0));
    }

    #[test]
    fn test_label_statistics_use_spacing() {
        let dims = Dimensions::new(2, 2, 1);
        let header = Header::with_spacing((2.0, 1.0, 3.0));
        let mask = Mask::from_vec(vec![0, 1, 2, 2], dims, header).unwrap();
        let stats = mask.label_statistics();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0], LabelStatistics { label: 1, voxels: 1, volume_mm3: 6.0 });
        assert_eq!(stats[1], LabelStatistics { label: 2, voxels: 2, volume_mm3: 12.0 });
    }

    #[test]
    fn test_into_volume_marks_labels() {
        let dims = Dimensions::new(4, 1, 1);
        let mask = Mask::from_vec(vec![0, 3, 1, 0], dims, Header::default()).unwrap();
        let volume = mask.into_volume().unwrap();
        assert_eq!(volume.dimensions(), dims);
        assert_eq!(volume.value_at(1, 0, 0), Some(3.0));
        assert_eq!(volume.datatype(), Datatype::U8);
        assert_eq!(volume.header().intent, Intent::Label);
        assert_eq!((volume.min(), volume.max()), (0.0, 3.0));
    }
}
