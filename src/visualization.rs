use image::{Rgb, RgbImage};
use ndarray::{ArrayD, ArrayView4, Ix4};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::error::{PafError, Result};
use crate::record::PAFS_KEY;

/// Deterministic color for an edge index.
pub fn id_to_color(id: usize) -> (u8, u8, u8) {
    let mut rng = ChaCha8Rng::seed_from_u64(id as u64);
    let color_num = rng.random_range(0..2u32.pow(24));
    (
        ((color_num >> 16) % 256) as u8,
        ((color_num >> 8) % 256) as u8,
        (color_num % 256) as u8,
    )
}

/// Views generated fields as `[height, width, n_edges, 2]`, undoing channel
/// flattening if needed.
pub fn paf_view(pafs: &ArrayD<f32>) -> Result<ArrayView4<'_, f32>> {
    match *pafs.shape() {
        [_, _, _, 2] => Ok(pafs.view().into_dimensionality::<Ix4>()?),
        [h, w, c] if c % 2 == 0 && pafs.is_standard_layout() => {
            Ok(pafs.view().into_shape_with_order((h, w, c / 2, 2))?)
        }
        _ => Err(PafError::shape_mismatch(
            PAFS_KEY,
            "[height, width, n_edges, 2] or [height, width, n_edges * 2]",
            pafs.shape(),
        )),
    }
}

fn magnitude(pafs: &ArrayView4<f32>, r: usize, c: usize, e: usize) -> f32 {
    pafs[[r, c, e, 0]].hypot(pafs[[r, c, e, 1]])
}

/// Largest vector magnitude over the whole field.
pub fn max_magnitude(pafs: &ArrayView4<f32>) -> f32 {
    let (h, w, n_edges, _) = pafs.dim();
    let mut max = 0.0f32;
    for r in 0..h {
        for c in 0..w {
            for e in 0..n_edges {
                max = max.max(magnitude(pafs, r, c, e));
            }
        }
    }
    max
}

/// Magnitude of one edge's field, normalized to its maximum and mapped
/// through the viridis colormap.
pub fn render_edge_magnitude(pafs: &ArrayView4<f32>, edge: usize) -> Result<RgbImage> {
    let (h, w, n_edges, _) = pafs.dim();
    if edge >= n_edges {
        return Err(PafError::Config(format!(
            "edge {edge} requested but the fields have {n_edges} edges"
        )));
    }
    let edge_view = pafs.slice(ndarray::s![.., .., edge..edge + 1, ..]);
    let scale = max_magnitude(&edge_view).max(f32::EPSILON);
    Ok(RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let t = magnitude(pafs, y as usize, x as usize, edge) / scale;
        let color = colorous::VIRIDIS.eval_continuous(t.clamp(0.0, 1.0) as f64);
        Rgb([color.r, color.g, color.b])
    }))
}

/// Every pixel takes the color of its strongest edge, scaled by that edge's
/// magnitude (clamped to 1).
pub fn render_pafs(pafs: &ArrayView4<f32>) -> RgbImage {
    let (h, w, n_edges, _) = pafs.dim();
    let colors: Vec<(u8, u8, u8)> = (0..n_edges).map(id_to_color).collect();
    RgbImage::from_fn(w as u32, h as u32, |x, y| {
        let (r, c) = (y as usize, x as usize);
        let strongest = (0..n_edges)
            .map(|e| (e, magnitude(pafs, r, c, e)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        match strongest {
            Some((e, m)) => {
                let m = m.clamp(0.0, 1.0);
                let (cr, cg, cb) = colors[e];
                Rgb([
                    (cr as f32 * m) as u8,
                    (cg as f32 * m) as u8,
                    (cb as f32 * m) as u8,
                ])
            }
            None => Rgb([0, 0, 0]),
        }
    })
}
