use glam::Vec2;
use ndarray::{Array3, Array4, ArrayD, ArrayView2, ArrayView3, ArrayViewD, Axis, IxDyn};

use crate::error::{PafError, Result};
use crate::util::{SamplingGrid, gaussian_pdf};

/// A directed edge prepared for point-to-segment queries.
#[derive(Debug, Clone, Copy)]
struct Segment {
    source: Vec2,
    direction: Vec2,
    /// Squared length, clamped to at least 1 so zero-length edges degrade to a
    /// point distance instead of dividing by zero.
    length_sq: f32,
}

impl Segment {
    fn new(source: Vec2, destination: Vec2) -> Segment {
        let direction = destination - source;
        Segment {
            source,
            direction,
            length_sq: direction.length_squared().max(1.0),
        }
    }

    #[inline]
    fn distance_sq(&self, point: Vec2) -> f32 {
        let relative = point - self.source;
        let projection = (relative.dot(self.direction) / self.length_sq).clamp(0.0, 1.0);
        (self.direction * projection - relative).length_squared()
    }
}

fn segments(edge_source: ArrayView2<f32>, edge_destination: ArrayView2<f32>) -> Result<Vec<Segment>> {
    check_edge_points("edge_source", edge_source.shape())?;
    check_edge_points("edge_destination", edge_destination.shape())?;
    if edge_source.shape() != edge_destination.shape() {
        return Err(PafError::shape_mismatch(
            "edge_destination",
            format!("{:?} to match edge_source", edge_source.shape()),
            edge_destination.shape(),
        ));
    }
    Ok(edge_source
        .outer_iter()
        .zip(edge_destination.outer_iter())
        .map(|(s, d)| Segment::new(Vec2::new(s[0], s[1]), Vec2::new(d[0], d[1])))
        .collect())
}

fn check_edge_points(key: &str, shape: &[usize]) -> Result<()> {
    if shape.len() != 2 || shape[1] != 2 {
        return Err(PafError::shape_mismatch(key, "[n_edges, 2]", shape));
    }
    Ok(())
}

/// Returns the source and destination points of every edge of every instance.
///
/// `instances` is `[n_instances, n_nodes, 2]` and `edge_inds` holds
/// `(source_node, destination_node)` pairs. Both outputs are
/// `[n_instances, n_edges, 2]`.
pub fn get_edge_points(
    instances: ArrayView3<f32>,
    edge_inds: &[(usize, usize)],
) -> Result<(Array3<f32>, Array3<f32>)> {
    let (n_instances, n_nodes, n_coords) = instances.dim();
    if n_coords != 2 {
        return Err(PafError::shape_mismatch(
            "instances",
            "[n_instances, n_nodes, 2]",
            instances.shape(),
        ));
    }
    if let Some(&(s, d)) = edge_inds.iter().find(|(s, d)| *s >= n_nodes || *d >= n_nodes) {
        return Err(PafError::shape_mismatch(
            "instances",
            format!("at least {} nodes for edge ({s}, {d})", s.max(d) + 1),
            instances.shape(),
        ));
    }
    let n_edges = edge_inds.len();
    let gather = |pick: fn(&(usize, usize)) -> usize| {
        Array3::from_shape_fn((n_instances, n_edges, 2), |(i, e, c)| {
            instances[[i, pick(&edge_inds[e]), c]]
        })
    };
    Ok((gather(|e| e.0), gather(|e| e.1)))
}

/// Squared distance from each point to each edge segment.
///
/// Coordinates are `(x, y)` in the pixel space of the current image.
/// `points` has any leading shape with a trailing axis of 2; the result has the
/// same leading shape with a trailing axis of `n_edges`. Projections are clipped
/// to the segment, so points beyond an endpoint measure to that endpoint.
pub fn distance_to_edge(
    points: ArrayViewD<f32>,
    edge_source: ArrayView2<f32>,
    edge_destination: ArrayView2<f32>,
) -> Result<ArrayD<f32>> {
    let segments = segments(edge_source, edge_destination)?;
    let shape = points.shape();
    if shape.last() != Some(&2) {
        return Err(PafError::shape_mismatch("points", "[..., 2]", shape));
    }
    let mut out_shape = shape[..shape.len() - 1].to_vec();
    out_shape.push(segments.len());

    let n_points = shape[..shape.len() - 1].iter().product::<usize>();
    let flat = points.to_shape((n_points, 2))?;
    let distances: Vec<f32> = flat
        .outer_iter()
        .flat_map(|p| {
            let point = Vec2::new(p[0], p[1]);
            segments.iter().map(move |s| s.distance_sq(point))
        })
        .collect();
    Ok(ArrayD::from_shape_vec(IxDyn(&out_shape), distances)?)
}

/// `[grid_height, grid_width, 2]` array of `(x, y)` sample locations.
pub fn make_sampling_points(grid: &SamplingGrid) -> Array3<f32> {
    Array3::from_shape_fn((grid.height(), grid.width(), 2), |(r, c, i)| {
        if i == 0 { grid.xv[c] } else { grid.yv[r] }
    })
}

/// Confidence of each grid sample lying on each edge, `[grid_height, grid_width, n_edges]`.
///
/// The distance field is passed through an unnormalized Gaussian, so samples
/// on an edge get exactly 1.0.
pub fn make_edge_maps(
    grid: &SamplingGrid,
    edge_source: ArrayView2<f32>,
    edge_destination: ArrayView2<f32>,
    sigma: f32,
) -> Result<Array3<f32>> {
    let sampling_points = make_sampling_points(grid);
    let distances = distance_to_edge(sampling_points.view().into_dyn(), edge_source, edge_destination)?;
    let edge_maps = distances.mapv_into(|d| gaussian_pdf(d, sigma));
    Ok(edge_maps.into_dimensionality()?)
}

/// Part affinity fields for a single instance, `[grid_height, grid_width, n_edges, 2]`.
///
/// Each edge contributes its unit direction scaled by its confidence map.
/// Zero-length edges have no direction and yield NaN vectors.
pub fn make_pafs(
    grid: &SamplingGrid,
    edge_source: ArrayView2<f32>,
    edge_destination: ArrayView2<f32>,
    sigma: f32,
) -> Result<Array4<f32>> {
    let edge_maps = make_edge_maps(grid, edge_source, edge_destination, sigma)?;
    let unit_vectors: Vec<Vec2> = edge_source
        .outer_iter()
        .zip(edge_destination.outer_iter())
        .map(|(s, d)| {
            let direction = Vec2::new(d[0] - s[0], d[1] - s[1]);
            direction / direction.length()
        })
        .collect();
    let (h, w, n_edges) = edge_maps.dim();
    Ok(Array4::from_shape_fn((h, w, n_edges, 2), |(r, c, e, i)| {
        edge_maps[[r, c, e]] * unit_vectors[e][i]
    }))
}

/// Sum of the part affinity fields of every instance.
///
/// `edge_sources` and `edge_destinations` are `[n_instances, n_edges, 2]`.
/// NaN contributions (missing points or zero-length edges) count as zero, so
/// the result is always finite. Overlapping instances add up.
pub fn make_multi_pafs(
    grid: &SamplingGrid,
    edge_sources: ArrayView3<f32>,
    edge_destinations: ArrayView3<f32>,
    sigma: f32,
) -> Result<Array4<f32>> {
    if edge_sources.shape() != edge_destinations.shape() || edge_sources.dim().2 != 2 {
        return Err(PafError::shape_mismatch(
            "edge_destinations",
            format!("{:?} matching edge_sources", edge_sources.shape()),
            edge_destinations.shape(),
        ));
    }
    let (n_instances, n_edges, _) = edge_sources.dim();
    let mut pafs = Array4::<f32>::zeros((grid.height(), grid.width(), n_edges, 2));
    for i in 0..n_instances {
        let paf = make_pafs(
            grid,
            edge_sources.index_axis(Axis(0), i),
            edge_destinations.index_axis(Axis(0), i),
            sigma,
        )?;
        pafs.zip_mut_with(&paf, |acc, &v| {
            if !v.is_nan() {
                *acc += v;
            }
        });
    }
    Ok(pafs)
}
