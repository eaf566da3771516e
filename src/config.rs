//! Declarative processing pipelines.
//!
//! A pipeline is a list of transforms applied in order, optionally followed by
//! a segmentation of the transformed volume:
//!
//! ```json
//! {
//!   "transforms": [{ "kind": "median" }, { "kind": "gamma", "gamma": 0.7 }],
//!   "segmentation": { "method": "otsu" }
//! }
//! ```

use crate::mask::Mask;
use crate::progress::Progress;
use crate::segmentation::{SegmentationError, SegmentationParams, segment};
use crate::transform::{Transform, TransformError, apply};
use crate::volume::Volume;

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use thiserror::Error;
use tracing::{debug, info};
use web_time::Instant;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid pipeline configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Transform stage failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Segmentation stage failed: {0}")]
    Segmentation(#[from] SegmentationError),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub transforms: Vec<Transform>,
    pub segmentation: Option<SegmentationParams>,
}

impl PipelineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn stages(&self) -> usize {
        self.transforms.len() + usize::from(self.segmentation.is_some())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOutput {
    /// The input itself when no transform ran
    pub volume: Volume,
    pub mask: Option<Mask>,
}

/// Run every stage of `config` on `volume`
///
/// Stages split the progress range evenly. `reference` is only read by
/// histogram matching.
pub fn run_pipeline(
    volume: &Volume,
    config: &PipelineConfig,
    reference: Option<&Volume>,
    progress: &mut Progress<'_>,
) -> Result<PipelineOutput, ConfigError> {
    let started = Instant::now();
    progress.begin();
    let stages = config.stages();
    let bounds = |stage: usize| -> (u8, u8) {
        ((stage * 100 / stages) as u8, ((stage + 1) * 100 / stages) as u8)
    };

    let mut current = Cow::Borrowed(volume);
    for (stage, transform) in config.transforms.iter().enumerate() {
        let (start, end) = bounds(stage);
        debug!(stage, transform = ?transform.kind(), "running transform stage");
        let output = apply(&current, transform, reference, &mut progress.scoped(start, end))?;
        current = Cow::Owned(output);
    }

    let mask = match &config.segmentation {
        Some(params) => {
            let (start, end) = bounds(config.transforms.len());
            debug!(method = ?params.method, "running segmentation stage");
            Some(segment(&current, params, &mut progress.scoped(start, end))?)
        }
        None => None,
    };
    progress.report(100);

    info!(
        stages,
        "pipeline finished in {:.2}ms",
        started.elapsed().as_secs_f64() * 1000.0
    );
    Ok(PipelineOutput {
        volume: current.into_owned(),
        mask,
    })
}
