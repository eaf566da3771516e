use std::{env, fs};

use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use volume_engine::{
    Dimensions, Header, Orientation, PipelineConfig, Progress, SegmentationMethod,
    SegmentationParams, Transform, Volume,
    inference::{HttpTransport, infer},
    run_pipeline,
};

const INFERENCE_URL_VAR: &str = "VOLUME_ENGINE_INFERENCE_URL";

/// Two nested spheres of different intensity on a dark background
fn phantom(size: usize) -> Volume {
    let dims = Dimensions::new(size, size, size);
    let center = size as f64 / 2.0;
    let samples: Vec<i16> = (0..dims.len())
        .map(|i| {
            let (x, y, z) = dims.coords(i);
            let d = ((x as f64 - center).powi(2)
                + (y as f64 - center).powi(2)
                + (z as f64 - center).powi(2))
            .sqrt();
            let base = if d < size as f64 * 0.15 {
                900
            } else if d < size as f64 * 0.35 {
                400
            } else {
                20
            };
            base + ((i * 7919) % 61) as i16
        })
        .collect();
    Volume::from_vec_exact(samples, dims, Header::with_spacing((1.0, 1.0, 1.5)))
        .expect("should have built the phantom volume")
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let volume = phantom(64);
    let config = match env::args().nth(1) {
        Some(path) => {
            let json = fs::read_to_string(&path).expect("should have read the pipeline config");
            PipelineConfig::from_json(&json).expect("should have parsed the pipeline config")
        }
        None => PipelineConfig {
            transforms: vec![Transform::Median, Transform::GaussianSmooth],
            segmentation: Some(SegmentationParams::default_for(
                SegmentationMethod::MultiOtsu,
                volume.min(),
                volume.max(),
            )),
        },
    };

    let mut progress = Progress::new(|p| info!("progress {p}%"));
    let output =
        run_pipeline(&volume, &config, None, &mut progress).expect("should have run the pipeline");

    let center = output.volume.dim().1 / 2;
    let image = output
        .volume
        .slice_image(center, Orientation::Coronal)
        .expect("should have returned image at center of volume");
    image.save("result.png").expect("should have saved result.png");

    if let Some(mask) = output.mask {
        for stats in mask.label_statistics() {
            info!(
                label = stats.label,
                voxels = stats.voxels,
                volume_mm3 = stats.volume_mm3,
                "label"
            );
        }
        let image = mask
            .into_volume()
            .expect("should have converted the mask")
            .slice_image(center, Orientation::Coronal)
            .expect("should have returned mask slice at center of volume");
        image.save("mask.png").expect("should have saved mask.png");
    }

    if let Ok(url) = env::var(INFERENCE_URL_VAR) {
        let transport = HttpTransport::new(&url);
        match infer(&transport, &volume, "default").await {
            Ok(mask) => info!(foreground = mask.count_nonzero(), "remote segmentation received"),
            Err(err) => error!("remote segmentation failed: {err}"),
        }
    }
}
