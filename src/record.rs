use std::collections::BTreeMap;

use ndarray::{ArrayD, ArrayView3, Ix3};

use crate::error::{PafError, Result};

pub const IMAGE_KEY: &str = "image";
pub const INSTANCES_KEY: &str = "instances";
pub const SKELETON_INDS_KEY: &str = "skeleton_inds";
pub const PAFS_KEY: &str = "part_affinity_fields";

/// One element of a dataset: named tensors keyed by string.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Example {
    fields: BTreeMap<String, ArrayD<f32>>,
}

impl Example {
    pub fn new() -> Example {
        Example::default()
    }

    pub fn with(mut self, key: &str, value: ArrayD<f32>) -> Example {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.fields.insert(key.to_string(), value)
    }

    pub fn get(&self, key: &str) -> Option<&ArrayD<f32>> {
        self.fields.get(key)
    }

    pub fn require(&self, key: &str) -> Result<&ArrayD<f32>> {
        self.get(key).ok_or_else(|| PafError::MissingKey(key.to_string()))
    }

    pub fn remove(&mut self, key: &str) -> Option<ArrayD<f32>> {
        self.fields.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Height and width of the `image` tensor.
    pub fn image_size(&self) -> Result<(usize, usize)> {
        let image = self.require(IMAGE_KEY)?;
        match image.shape() {
            [h, w, ..] => Ok((*h, *w)),
            shape => Err(PafError::shape_mismatch(IMAGE_KEY, "[height, width, channels]", shape)),
        }
    }

    /// The `instances` tensor as `[n_instances, n_nodes, 2]`.
    pub fn instances(&self) -> Result<ArrayView3<'_, f32>> {
        let instances = self.require(INSTANCES_KEY)?;
        let shape = instances.shape();
        if shape.len() != 3 || shape[2] != 2 {
            return Err(PafError::shape_mismatch(
                INSTANCES_KEY,
                "[n_instances, n_nodes, 2]",
                shape,
            ));
        }
        Ok(instances.view().into_dimensionality::<Ix3>()?)
    }
}

impl FromIterator<(String, ArrayD<f32>)> for Example {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        Example {
            fields: iter.into_iter().collect(),
        }
    }
}
