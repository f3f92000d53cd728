use std::sync::{Arc, Mutex};

use ndarray::{Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::dataset::{BoxedIter, Dataset, Lookahead, Parallelism};
use crate::dataset_ops::{ExampleDataset, Transformer};
use crate::edge_maps::{get_edge_points, make_multi_pafs};
use crate::error::{PafError, Result};
use crate::record::{Example, IMAGE_KEY, INSTANCES_KEY, PAFS_KEY, SKELETON_INDS_KEY};
use crate::skeleton::Skeleton;
use crate::util::SamplingGrid;

/// Options for [`PartAffinityFieldsGenerator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PafGeneratorConfig {
    /// Spread of the Gaussian weighting the fields by distance to each edge,
    /// in units of the current image grid (scaling done by earlier stages is
    /// not taken into account).
    pub sigma: f32,
    /// Stride of the output grid relative to the image. Increase it to get
    /// fields smaller than the images.
    pub output_stride: usize,
    /// Skeletons providing the edge topology. Exactly one is supported.
    pub skeletons: Vec<Skeleton>,
    /// Emit `[height, width, n_edges * 2]` instead of `[height, width, n_edges, 2]`.
    pub flatten_channels: bool,
    /// Examples processed concurrently; `None` uses every rayon worker.
    pub num_parallel_calls: Option<usize>,
}

impl Default for PafGeneratorConfig {
    fn default() -> Self {
        Self {
            sigma: 1.0,
            output_stride: 1,
            skeletons: Vec::new(),
            flatten_channels: false,
            num_parallel_calls: None,
        }
    }
}

/// Adds `part_affinity_fields` to every example of a dataset.
///
/// The sampling grid is inferred from the first example's image, so all
/// images in the dataset are expected to share its size. To map a grid point
/// back to the image, multiply it by `output_stride`.
#[derive(Debug, Clone)]
pub struct PartAffinityFieldsGenerator {
    config: PafGeneratorConfig,
}

impl PartAffinityFieldsGenerator {
    pub fn new(config: PafGeneratorConfig) -> Result<PartAffinityFieldsGenerator> {
        if !(config.sigma.is_finite() && config.sigma > 0.0) {
            return Err(PafError::Config(format!("sigma must be positive, got {}", config.sigma)));
        }
        if config.output_stride == 0 {
            return Err(PafError::Config("output_stride must be at least 1".to_string()));
        }
        match config.skeletons.len() {
            1 => {}
            0 => return Err(PafError::Config("a skeleton is required".to_string())),
            n => {
                return Err(PafError::Config(format!(
                    "{n} skeletons given but only a single skeleton is supported"
                )));
            }
        }
        Ok(PartAffinityFieldsGenerator { config })
    }

    pub fn config(&self) -> &PafGeneratorConfig {
        &self.config
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.config.skeletons[0]
    }

    /// Precomputes the grid and edge list for images of the given size.
    pub fn setup(&self, image_height: usize, image_width: usize) -> Result<PafSetup> {
        let grid = SamplingGrid::new(image_height, image_width, self.config.output_stride)?;
        let skeleton = self.skeleton();
        log::debug!(
            "PAF grid {}x{} (stride {}) for {} edges of `{}`",
            grid.height(),
            grid.width(),
            self.config.output_stride,
            skeleton.n_edges(),
            skeleton.name()
        );
        Ok(PafSetup {
            grid,
            edge_inds: skeleton.edge_inds().to_vec(),
            n_nodes: skeleton.n_nodes(),
            sigma: self.config.sigma,
            flatten_channels: self.config.flatten_channels,
        })
    }
}

/// Read-only state shared by every per-example transform.
#[derive(Debug, Clone)]
pub struct PafSetup {
    pub grid: SamplingGrid,
    pub edge_inds: Vec<(usize, usize)>,
    pub n_nodes: usize,
    pub sigma: f32,
    pub flatten_channels: bool,
}

impl PafSetup {
    /// Generates the fields for one example and attaches them under
    /// `part_affinity_fields`. Other keys are left untouched.
    pub fn generate(&self, mut example: Example) -> Result<Example> {
        example.require(SKELETON_INDS_KEY)?;
        let instances = example.instances()?;
        if instances.dim().1 != self.n_nodes {
            return Err(PafError::shape_mismatch(
                INSTANCES_KEY,
                format!("[n_instances, {}, 2]", self.n_nodes),
                instances.shape(),
            ));
        }
        let instances = filter_in_frame(instances, self.grid.max_xy());
        let (edge_sources, edge_destinations) = get_edge_points(instances.view(), &self.edge_inds)?;
        let pafs = make_multi_pafs(
            &self.grid,
            edge_sources.view(),
            edge_destinations.view(),
            self.sigma,
        )?;
        let pafs = if self.flatten_channels {
            let (h, w, n_edges, _) = pafs.dim();
            pafs.into_shape_with_order((h, w, n_edges * 2))?.into_dyn()
        } else {
            pafs.into_dyn()
        };
        example.insert(PAFS_KEY, pafs);
        Ok(example)
    }
}

/// Keeps the instances with at least one point strictly inside
/// `(0, max_x) x (0, max_y)`. Missing (NaN) points are never inside.
pub fn filter_in_frame(instances: ArrayView3<f32>, (max_x, max_y): (f32, f32)) -> Array3<f32> {
    let keep: Vec<usize> = instances
        .outer_iter()
        .enumerate()
        .filter(|(_, points)| {
            points.outer_iter().any(|p| {
                let (x, y) = (p[0], p[1]);
                x > 0.0 && y > 0.0 && x < max_x && y < max_y
            })
        })
        .map(|(i, _)| i)
        .collect();
    if keep.len() < instances.dim().0 {
        log::trace!("dropped {} out of frame instances", instances.dim().0 - keep.len());
    }
    instances.select(Axis(0), &keep)
}

impl Transformer for PartAffinityFieldsGenerator {
    fn input_keys(&self) -> Vec<String> {
        vec![
            IMAGE_KEY.to_string(),
            INSTANCES_KEY.to_string(),
            SKELETON_INDS_KEY.to_string(),
        ]
    }

    fn output_keys(&self) -> Vec<String> {
        let mut keys = self.input_keys();
        keys.push(PAFS_KEY.to_string());
        keys
    }

    /// Peeks the first example to size the grid, then maps every example in
    /// parallel. The peeked example is still the first one produced.
    fn transform_dataset(&self, input: ExampleDataset) -> Result<ExampleDataset> {
        let mut stream = Lookahead::new(input.iter());
        let image_size = match stream.peek() {
            Some(Ok(example)) => Some(example.image_size()?),
            Some(Err(_)) => None,
            None => return Err(PafError::EmptyDataset),
        };
        let Some((image_height, image_width)) = image_size else {
            return Err(stream
                .next()
                .and_then(Result::err)
                .unwrap_or(PafError::EmptyDataset));
        };
        let setup = Arc::new(self.setup(image_height, image_width)?);

        let first_pass = Mutex::new(Some(stream));
        let source = Dataset::from_fn(move || -> BoxedIter<Result<Example>> {
            match first_pass.lock().ok().and_then(|mut pass| pass.take()) {
                Some(stream) => Box::new(stream),
                None => input.iter(),
            }
        });
        let parallelism = Parallelism::from(self.config.num_parallel_calls);
        Ok(source.par_map(
            move |element| element.and_then(|example| setup.generate(example)),
            parallelism,
        ))
    }
}
