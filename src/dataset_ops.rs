use ndarray::{ArrayD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;
use crate::error::{PafError, Result};
use crate::record::Example;

/// A dataset of examples in which any element may be an error.
pub type ExampleDataset = Dataset<Result<Example>>;

/// A pipeline stage operating on a whole dataset.
///
/// For training, order the stages shuffle -> batch -> repeat, with
/// prefetching last.
pub trait Transformer: Send + Sync {
    /// Keys that incoming examples are expected to have.
    fn input_keys(&self) -> Vec<String> {
        Vec::new()
    }

    /// Keys that outgoing examples will have.
    fn output_keys(&self) -> Vec<String> {
        self.input_keys()
    }

    fn transform_dataset(&self, input: ExampleDataset) -> Result<ExampleDataset>;
}

/// Shuffles element order with a fixed-size sampling buffer.
///
/// Place it before repetition: a repeated input never ends, so the buffer
/// mixes elements across epochs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Shuffler {
    /// If false, the dataset passes through unmodified.
    pub shuffle: bool,
    pub buffer_size: usize,
    /// Draw a new order on every pass over the dataset.
    pub reshuffle_each_iteration: bool,
    pub seed: Option<u64>,
}

impl Default for Shuffler {
    fn default() -> Self {
        Self {
            shuffle: true,
            buffer_size: 64,
            reshuffle_each_iteration: true,
            seed: None,
        }
    }
}

impl Transformer for Shuffler {
    fn transform_dataset(&self, input: ExampleDataset) -> Result<ExampleDataset> {
        if !self.shuffle {
            return Ok(input);
        }
        log::debug!("shuffling with buffer of {}", self.buffer_size);
        Ok(input.shuffle(self.buffer_size, self.reshuffle_each_iteration, self.seed))
    }
}

fn default_fill_value() -> f32 {
    f32::NAN
}

/// Stacks consecutive examples into batches.
///
/// Failed examples are passed through as their own `Err` items and the
/// remaining examples still fill batches. Every key gains a leading batch axis. Scalars are promoted to rank 1
/// first. Keys whose shapes vary within a batch are padded to the largest
/// extent along each axis with `fill_value`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Batcher {
    pub batch_size: usize,
    /// Drop a trailing batch with fewer than `batch_size` examples. Use true
    /// for training and false for inference.
    pub drop_remainder: bool,
    #[serde(skip, default = "default_fill_value")]
    pub fill_value: f32,
}

impl Default for Batcher {
    fn default() -> Self {
        Self {
            batch_size: 8,
            drop_remainder: false,
            fill_value: default_fill_value(),
        }
    }
}

impl Transformer for Batcher {
    fn transform_dataset(&self, input: ExampleDataset) -> Result<ExampleDataset> {
        if self.batch_size == 0 {
            return Err(PafError::Config("batch_size must be at least 1".to_string()));
        }
        log::debug!(
            "batching {} examples per batch (drop_remainder: {})",
            self.batch_size,
            self.drop_remainder
        );
        let fill_value = self.fill_value;
        Ok(input
            .try_chunks(self.batch_size, self.drop_remainder)
            .map(move |chunk| chunk.and_then(|examples| batch_examples(&examples, fill_value))))
    }
}

/// Stacks `examples` along a new leading axis, padding ragged keys.
pub fn batch_examples(examples: &[Example], fill_value: f32) -> Result<Example> {
    let Some(first) = examples.first() else {
        return Ok(Example::new());
    };
    first
        .keys()
        .map(|key| {
            let arrays = examples
                .iter()
                .map(|ex| ex.require(key).map(promote_scalar))
                .collect::<Result<Vec<_>>>()?;
            if let Some(ex) = examples.iter().find(|ex| ex.len() != first.len()) {
                let extra = ex.keys().find(|k| !first.contains_key(k)).unwrap_or(key);
                return Err(PafError::MissingKey(extra.to_string()));
            }
            Ok((key.to_string(), stack_padded(key, &arrays, fill_value)?))
        })
        .collect()
}

fn promote_scalar(array: &ArrayD<f32>) -> ArrayD<f32> {
    if array.ndim() == 0 {
        array.clone().insert_axis(Axis(0))
    } else {
        array.clone()
    }
}

fn stack_padded(key: &str, arrays: &[ArrayD<f32>], fill_value: f32) -> Result<ArrayD<f32>> {
    let rank = arrays[0].ndim();
    let mut max_shape = vec![0usize; rank];
    for array in arrays {
        if array.ndim() != rank {
            return Err(PafError::shape_mismatch(key, format!("rank {rank}"), array.shape()));
        }
        for (m, &s) in max_shape.iter_mut().zip(array.shape()) {
            *m = (*m).max(s);
        }
    }
    let mut batch_shape = vec![arrays.len()];
    batch_shape.extend_from_slice(&max_shape);
    let mut batch = ArrayD::from_elem(IxDyn(&batch_shape), fill_value);
    for (i, array) in arrays.iter().enumerate() {
        let mut slot = batch.index_axis_mut(Axis(0), i);
        slot.slice_each_axis_mut(|ax| Slice::from(0..array.shape()[ax.axis.index()]))
            .assign(array);
    }
    Ok(batch)
}

/// Repeats the dataset for a number of epochs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Repeater {
    /// If false, the dataset passes through unmodified.
    pub repeat: bool,
    /// Number of passes; negative values repeat forever.
    pub epochs: i64,
}

impl Default for Repeater {
    fn default() -> Self {
        Self {
            repeat: true,
            epochs: -1,
        }
    }
}

impl Transformer for Repeater {
    fn transform_dataset(&self, input: ExampleDataset) -> Result<ExampleDataset> {
        if !self.repeat {
            return Ok(input);
        }
        let count = usize::try_from(self.epochs).ok();
        log::debug!("repeating for {:?} epochs", count);
        Ok(input.repeat(count))
    }
}

/// Produces examples ahead of the consumer on a background thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Prefetcher {
    /// If false, the dataset passes through unmodified.
    pub prefetch: bool,
    /// Examples to keep ready; `None` picks one per rayon worker thread.
    pub buffer_size: Option<usize>,
}

impl Default for Prefetcher {
    fn default() -> Self {
        Self {
            prefetch: true,
            buffer_size: None,
        }
    }
}

impl Transformer for Prefetcher {
    fn transform_dataset(&self, input: ExampleDataset) -> Result<ExampleDataset> {
        if !self.prefetch {
            return Ok(input);
        }
        let buffer_size = self.buffer_size.unwrap_or_else(rayon::current_num_threads);
        log::debug!("prefetching {} examples", buffer_size);
        Ok(input.prefetch(buffer_size))
    }
}
