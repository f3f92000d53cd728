use crate::error::{PafError, Result};

/// Unnormalized zero-mean Gaussian, `exp(-x^2 / (2 * sigma^2))`.
///
/// Peaks at exactly 1.0 for `x == 0`.
#[inline]
pub fn gaussian_pdf(x: f32, sigma: f32) -> f32 {
    (-(x * x) / (2.0 * sigma * sigma)).exp()
}

/// Sampling grid coordinates for an image downsampled by `output_stride`.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingGrid {
    /// x-coordinates of the grid columns, length `grid_width`.
    pub xv: Vec<f32>,
    /// y-coordinates of the grid rows, length `grid_height`.
    pub yv: Vec<f32>,
}

impl SamplingGrid {
    /// Builds grid vectors with `coord[i] = i * output_stride`, i.e. one sample
    /// every `output_stride` pixels starting at the top-left pixel.
    pub fn new(image_height: usize, image_width: usize, output_stride: usize) -> Result<SamplingGrid> {
        if output_stride == 0 {
            return Err(PafError::Config("output_stride must be at least 1".to_string()));
        }
        if image_height == 0 || image_width == 0 {
            return Err(PafError::shape_mismatch(
                "image",
                "non-empty height and width",
                &[image_height, image_width],
            ));
        }
        let axis = |size: usize| -> Vec<f32> {
            (0..size).step_by(output_stride).map(|v| v as f32).collect()
        };
        Ok(SamplingGrid {
            xv: axis(image_width),
            yv: axis(image_height),
        })
    }

    pub fn width(&self) -> usize {
        self.xv.len()
    }

    pub fn height(&self) -> usize {
        self.yv.len()
    }

    /// Largest sampled x and y coordinates.
    pub fn max_xy(&self) -> (f32, f32) {
        (
            self.xv.last().copied().unwrap_or(0.0),
            self.yv.last().copied().unwrap_or(0.0),
        )
    }
}
