//! Shared phantoms for the integration tests

#![allow(dead_code)]

use volume_engine::{Dimensions, Header, Volume, Voxel};

/// 4x4x4 u8 volume whose value is its flat index
pub fn ramp() -> Volume {
    let dims = Dimensions::new(4, 4, 4);
    Volume::from_vec((0..64u8).collect(), dims, 0.0, 63.0, Header::default()).unwrap()
}

pub fn volume_of<T: Voxel>(samples: Vec<T>, dims: Dimensions) -> Volume {
    Volume::from_vec_exact(samples, dims, Header::with_spacing((1.0, 1.0, 2.0))).unwrap()
}

/// Dark background with a bright cube in the middle third
pub fn cube_phantom(size: usize) -> Volume {
    let dims = Dimensions::new(size, size, size);
    let inner = size / 3..size - size / 3;
    let samples: Vec<i16> = (0..dims.len())
        .map(|i| {
            let (x, y, z) = dims.coords(i);
            let inside = inner.contains(&x) && inner.contains(&y) && inner.contains(&z);
            let noise = ((i * 31) % 17) as i16;
            if inside { 1000 + noise } else { 100 + noise }
        })
        .collect();
    volume_of(samples, dims)
}

/// Non-zero counts of `histogram`, in bin order
pub fn occupied_bins(histogram: &volume_engine::histogram::Histogram) -> Vec<i32> {
    histogram.counts().iter().copied().filter(|&c| c > 0).collect()
}
