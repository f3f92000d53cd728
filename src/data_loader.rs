use std::path::Path;

use ndarray::{Array1, Array3, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::dataset_ops::ExampleDataset;
use crate::error::{PafError, Result};
use crate::io::object_from_json;
use crate::record::{Example, IMAGE_KEY, INSTANCES_KEY, SKELETON_INDS_KEY};
use crate::skeleton::Skeleton;

/// A point that may be missing from the annotation.
pub type LabeledPoint = Option<[f32; 2]>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabeledFrame {
    pub height: usize,
    pub width: usize,
    #[serde(default = "default_channels")]
    pub channels: usize,
    /// One list of points per instance, in skeleton node order.
    pub instances: Vec<Vec<LabeledPoint>>,
}

fn default_channels() -> usize {
    1
}

/// Skeleton plus labeled frames, as stored in a labels JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Labels {
    pub skeleton: Skeleton,
    pub frames: Vec<LabeledFrame>,
}

impl Labels {
    /// Converts every frame into an example with a blank image of the frame's
    /// size. Missing points become NaN.
    pub fn to_examples(&self) -> Result<Vec<Example>> {
        let n_nodes = self.skeleton.n_nodes();
        self.frames
            .iter()
            .enumerate()
            .map(|(frame_idx, frame)| {
                if let Some(points) = frame.instances.iter().find(|pts| pts.len() != n_nodes) {
                    return Err(PafError::ShapeMismatch {
                        key: format!("frames[{frame_idx}].instances"),
                        expected: format!("{n_nodes} points per instance"),
                        actual: vec![points.len()],
                    });
                }
                Ok(frame_to_example(frame, n_nodes))
            })
            .collect()
    }
}

fn frame_to_example(frame: &LabeledFrame, n_nodes: usize) -> Example {
    let n_instances = frame.instances.len();
    let instances = Array3::from_shape_fn((n_instances, n_nodes, 2), |(i, n, c)| {
        frame.instances[i][n].map_or(f32::NAN, |p| p[c])
    });
    Example::new()
        .with(
            IMAGE_KEY,
            ArrayD::zeros(IxDyn(&[frame.height, frame.width, frame.channels])),
        )
        .with(INSTANCES_KEY, instances.into_dyn())
        .with(SKELETON_INDS_KEY, Array1::<f32>::zeros(n_instances).into_dyn())
}

/// Loads a labels JSON file.
pub fn load_labels(path: impl AsRef<Path>) -> Result<Labels> {
    let path = path.as_ref();
    log::trace!("loading labels from {}", path.display());
    let labels: Labels = object_from_json(path)?;
    log::debug!(
        "loaded {} frames for skeleton `{}`",
        labels.frames.len(),
        labels.skeleton.name()
    );
    Ok(labels)
}

/// Loads a labels file as a dataset of examples.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<(Skeleton, ExampleDataset)> {
    let labels = load_labels(path)?;
    let examples = labels.to_examples()?;
    Ok((
        labels.skeleton,
        Dataset::from_vec(examples).map(Ok),
    ))
}
