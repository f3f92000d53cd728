use std::io::Write;
use std::path::Path;

use serde::{Serialize, de::DeserializeOwned};

use crate::error::Result;

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize>(output_path: impl AsRef<Path>, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Per-frame statistics of generated fields.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct FrameReport {
    pub frame_idx: usize,
    pub shape: Vec<usize>,
    pub n_instances: usize,
    pub max_magnitude: f32,
}

#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct GenerationReport {
    pub skeleton: String,
    pub sigma: f32,
    pub output_stride: usize,
    pub frames: Vec<FrameReport>,
}

pub fn write_report(output_path: impl AsRef<Path>, report: &GenerationReport) -> Result<()> {
    log::info!(
        "writing report for {} frames to {}",
        report.frames.len(),
        output_path.as_ref().display()
    );
    object_to_json(output_path, report)
}
