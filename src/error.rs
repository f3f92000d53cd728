use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PafError>;

#[derive(Error, Debug)]
pub enum PafError {
    #[error("Shape mismatch for `{key}`: expected {expected}, got {actual:?}")]
    ShapeMismatch {
        key: String,
        expected: String,
        actual: Vec<usize>,
    },

    #[error("Edge {edge:?} of skeleton `{skeleton}` is out of range for {n_nodes} nodes")]
    OutOfRangeEdgeIndex {
        skeleton: String,
        edge: (usize, usize),
        n_nodes: usize,
    },

    #[error("Unknown node `{node}` in skeleton `{skeleton}`")]
    UnknownNode { skeleton: String, node: String },

    #[error("Example is missing key `{0}`")]
    MissingKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset produced no examples")]
    EmptyDataset,

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl PafError {
    pub(crate) fn shape_mismatch(key: &str, expected: impl Into<String>, actual: &[usize]) -> Self {
        PafError::ShapeMismatch {
            key: key.to_string(),
            expected: expected.into(),
            actual: actual.to_vec(),
        }
    }
}
