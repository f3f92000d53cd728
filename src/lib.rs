pub mod data_loader;
pub mod dataset;
pub mod dataset_ops;
pub mod edge_maps;
pub mod error;
pub mod io;
pub mod paf_generator;
pub mod pipeline;
pub mod record;
pub mod skeleton;
pub mod util;
pub mod visualization;

pub use dataset::{Dataset, Lookahead, Parallelism};
pub use dataset_ops::{Batcher, ExampleDataset, Prefetcher, Repeater, Shuffler, Transformer};
pub use error::{PafError, Result};
pub use paf_generator::{PafGeneratorConfig, PafSetup, PartAffinityFieldsGenerator};
pub use pipeline::{Pipeline, PipelineConfig};
pub use record::Example;
pub use skeleton::Skeleton;
pub use util::SamplingGrid;
