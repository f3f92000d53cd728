use serde::{Deserialize, Serialize};

use crate::dataset_ops::{Batcher, ExampleDataset, Prefetcher, Repeater, Shuffler, Transformer};
use crate::error::Result;
use crate::paf_generator::{PafGeneratorConfig, PartAffinityFieldsGenerator};

/// Configuration of a full training data pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub part_affinity_fields: PafGeneratorConfig,
    pub shuffler: Shuffler,
    /// Batching is skipped when absent.
    pub batcher: Option<Batcher>,
    pub repeater: Repeater,
    pub prefetcher: Prefetcher,
}

/// An ordered chain of transformers.
pub struct Pipeline {
    transformers: Vec<Box<dyn Transformer>>,
}

impl Pipeline {
    pub fn new() -> Pipeline {
        Pipeline {
            transformers: Vec::new(),
        }
    }

    /// Builds PAF generation -> shuffle -> batch -> repeat -> prefetch.
    pub fn from_config(config: &PipelineConfig) -> Result<Pipeline> {
        let mut pipeline = Pipeline::new()
            .with(PartAffinityFieldsGenerator::new(config.part_affinity_fields.clone())?)
            .with(config.shuffler.clone());
        if let Some(batcher) = &config.batcher {
            pipeline = pipeline.with(batcher.clone());
        }
        Ok(pipeline
            .with(config.repeater.clone())
            .with(config.prefetcher.clone()))
    }

    pub fn with<T: Transformer + 'static>(mut self, transformer: T) -> Pipeline {
        self.transformers.push(Box::new(transformer));
        self
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformers.is_empty()
    }

    /// Keys every example must carry on entry: the union of each stage's
    /// inputs that no earlier stage produces.
    pub fn input_keys(&self) -> Vec<String> {
        let mut produced: Vec<String> = Vec::new();
        let mut required: Vec<String> = Vec::new();
        for transformer in &self.transformers {
            for key in transformer.input_keys() {
                if !produced.contains(&key) && !required.contains(&key) {
                    required.push(key);
                }
            }
            produced.extend(transformer.output_keys());
        }
        required
    }

    pub fn make_dataset(&self, source: ExampleDataset) -> Result<ExampleDataset> {
        self.transformers
            .iter()
            .try_fold(source, |ds, transformer| transformer.transform_dataset(ds))
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Pipeline::new()
    }
}
