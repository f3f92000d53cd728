use ndarray::{Array1, ArrayD, IxDyn, arr3};
use paf_pipeline::io::{object_from_json, object_to_json};
use paf_pipeline::record::{IMAGE_KEY, INSTANCES_KEY, PAFS_KEY, SKELETON_INDS_KEY};
use paf_pipeline::{Dataset, Example, PafError, Pipeline, PipelineConfig};
use tempfile::TempDir;

const CONFIG: &str = r#"{
    "part_affinity_fields": {
        "sigma": 2.0,
        "skeletons": [
            {"name": "fly", "nodes": ["head", "thorax", "abdomen"], "edges": [["head", "thorax"], ["thorax", "abdomen"]]}
        ]
    },
    "shuffler": {"buffer_size": 3, "seed": 42},
    "batcher": {"batch_size": 4},
    "repeater": {"epochs": 2},
    "prefetcher": {"buffer_size": 2}
}"#;

fn frames(n: usize) -> Vec<Example> {
    (0..n)
        .map(|i| {
            let y = 3.0 + i as f32;
            Example::new()
                .with(IMAGE_KEY, ArrayD::zeros(IxDyn(&[16, 16, 1])))
                .with(INSTANCES_KEY, arr3(&[[[2.0f32, y], [7.0, y], [12.0, y]]]).into_dyn())
                .with(SKELETON_INDS_KEY, Array1::<f32>::zeros(1).into_dyn())
        })
        .collect()
}

#[test]
fn test_config_from_json_applies_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("pipeline.json");
    std::fs::write(&path, CONFIG).unwrap();

    let config: PipelineConfig = object_from_json(&path).unwrap();
    assert_eq!(config.part_affinity_fields.sigma, 2.0);
    assert_eq!(config.part_affinity_fields.output_stride, 1);
    assert!(!config.part_affinity_fields.flatten_channels);
    assert_eq!(config.part_affinity_fields.skeletons[0].edge_inds(), &[(0, 1), (1, 2)]);
    assert!(config.shuffler.shuffle);
    assert!(config.shuffler.reshuffle_each_iteration);
    assert_eq!(config.shuffler.seed, Some(42));
    let batcher = config.batcher.as_ref().unwrap();
    assert_eq!(batcher.batch_size, 4);
    assert!(!batcher.drop_remainder);
    assert!(batcher.fill_value.is_nan());
    assert!(config.repeater.repeat);
    assert_eq!(config.repeater.epochs, 2);
    assert!(config.prefetcher.prefetch);

    // Saving and reloading keeps the skeleton by name.
    let copy_path = temp_dir.path().join("copy.json");
    object_to_json(&copy_path, &config).unwrap();
    let reloaded: PipelineConfig = object_from_json(&copy_path).unwrap();
    assert_eq!(
        reloaded.part_affinity_fields.skeletons[0].edge_names(),
        config.part_affinity_fields.skeletons[0].edge_names()
    );
}

#[test]
fn test_full_pipeline_batches_and_repeats() {
    let config: PipelineConfig = serde_json::from_str(CONFIG).unwrap();
    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.len(), 5);
    assert_eq!(pipeline.input_keys(), vec![IMAGE_KEY, INSTANCES_KEY, SKELETON_INDS_KEY]);

    let dataset = pipeline
        .make_dataset(Dataset::from_vec(frames(6)).map(Ok))
        .unwrap();
    let batches: Vec<Example> = dataset.iter().collect::<Result<_, _>>().unwrap();
    // Two epochs of one full batch and one remainder.
    assert_eq!(batches.len(), 4);
    let sizes: Vec<usize> = batches.iter().map(|b| b.require(PAFS_KEY).unwrap().shape()[0]).collect();
    assert_eq!(sizes, vec![4, 2, 4, 2]);
    assert_eq!(batches[0].require(PAFS_KEY).unwrap().shape(), &[4, 16, 16, 2, 2]);
    assert_eq!(batches[0].require(INSTANCES_KEY).unwrap().shape(), &[4, 1, 3, 2]);
}

#[test]
fn test_pipeline_without_batcher_keeps_examples() {
    let mut config: PipelineConfig = serde_json::from_str(CONFIG).unwrap();
    config.batcher = None;
    config.repeater.repeat = false;
    let pipeline = Pipeline::from_config(&config).unwrap();
    assert_eq!(pipeline.len(), 4);
    let dataset = pipeline
        .make_dataset(Dataset::from_vec(frames(5)).map(Ok))
        .unwrap();
    let shapes: Vec<Vec<usize>> = dataset
        .iter()
        .map(|ex| ex.unwrap().require(PAFS_KEY).unwrap().shape().to_vec())
        .collect();
    assert_eq!(shapes, vec![vec![16, 16, 2, 2]; 5]);
}

#[test]
fn test_default_config_needs_a_skeleton() {
    let result = Pipeline::from_config(&PipelineConfig::default());
    assert!(matches!(result, Err(PafError::Config(_))));
}

#[test]
fn test_unknown_edge_node_is_rejected() {
    let json = r#"{"part_affinity_fields": {"skeletons": [
        {"nodes": ["a", "b"], "edges": [["a", "c"]]}
    ]}}"#;
    assert!(serde_json::from_str::<PipelineConfig>(json).is_err());
}

#[test]
fn test_empty_pipeline_is_identity() {
    let pipeline = Pipeline::default();
    assert!(pipeline.is_empty());
    assert!(pipeline.input_keys().is_empty());
    let dataset = pipeline
        .make_dataset(Dataset::from_vec(frames(3)).map(Ok))
        .unwrap();
    assert_eq!(dataset.iter().count(), 3);
}
