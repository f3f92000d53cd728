use serde::{Deserialize, Serialize};

use crate::error::{PafError, Result};

/// Serialized form of a skeleton. Edges are given by node name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkeletonConfig {
    #[serde(default = "default_skeleton_name")]
    pub name: String,
    pub nodes: Vec<String>,
    pub edges: Vec<(String, String)>,
}

fn default_skeleton_name() -> String {
    "skeleton".to_string()
}

/// Named nodes connected by directed edges.
///
/// Edge indices are validated against the node count when the skeleton is
/// built, so any `Skeleton` value can be used to gather points without
/// further bounds checks on the topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SkeletonConfig", into = "SkeletonConfig")]
pub struct Skeleton {
    name: String,
    nodes: Vec<String>,
    edges: Vec<(usize, usize)>,
}

impl Skeleton {
    pub fn new(name: &str, nodes: Vec<String>, edges: Vec<(usize, usize)>) -> Result<Skeleton> {
        let n_nodes = nodes.len();
        if let Some(&edge) = edges.iter().find(|(s, d)| *s >= n_nodes || *d >= n_nodes) {
            return Err(PafError::OutOfRangeEdgeIndex {
                skeleton: name.to_string(),
                edge,
                n_nodes,
            });
        }
        Ok(Skeleton {
            name: name.to_string(),
            nodes,
            edges,
        })
    }

    pub fn from_config(config: &SkeletonConfig) -> Result<Skeleton> {
        let edges = config
            .edges
            .iter()
            .map(|(src, dst)| {
                Ok((
                    node_index(&config.name, &config.nodes, src)?,
                    node_index(&config.name, &config.nodes, dst)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Skeleton::new(&config.name, config.nodes.clone(), edges)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    /// Source and destination node indices of every edge.
    pub fn edge_inds(&self) -> &[(usize, usize)] {
        &self.edges
    }

    pub fn edge_names(&self) -> Vec<(&str, &str)> {
        self.edges
            .iter()
            .map(|&(s, d)| (self.nodes[s].as_str(), self.nodes[d].as_str()))
            .collect()
    }
}

fn node_index(skeleton: &str, nodes: &[String], node: &str) -> Result<usize> {
    nodes
        .iter()
        .position(|n| n == node)
        .ok_or_else(|| PafError::UnknownNode {
            skeleton: skeleton.to_string(),
            node: node.to_string(),
        })
}

impl TryFrom<SkeletonConfig> for Skeleton {
    type Error = PafError;

    fn try_from(config: SkeletonConfig) -> Result<Self> {
        Skeleton::from_config(&config)
    }
}

impl From<Skeleton> for SkeletonConfig {
    fn from(skeleton: Skeleton) -> Self {
        let edges = skeleton
            .edges
            .iter()
            .map(|&(s, d)| (skeleton.nodes[s].clone(), skeleton.nodes[d].clone()))
            .collect();
        SkeletonConfig {
            name: skeleton.name,
            nodes: skeleton.nodes,
            edges,
        }
    }
}
