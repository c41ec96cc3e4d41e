//! Summed-area tables for O(1) rectangular mean/sum queries.

use crate::types::{SonarImage, SonarMask};
use ndarray::Array2;
use num_traits::Float;

/// Inclusive pixel window, already clipped to the image bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl WindowRect {
    /// Number of pixels covered by the window
    pub fn area(&self) -> usize {
        (self.x1 - self.x0 + 1) * (self.y1 - self.y0 + 1)
    }
}

/// Square window of half-width `n` centered on (x, y), clipped to the image.
pub fn neighborhood_rect(x: usize, y: usize, n: usize, width: usize, height: usize) -> WindowRect {
    WindowRect {
        x0: x.saturating_sub(n),
        y0: y.saturating_sub(n),
        x1: (x + n).min(width - 1),
        y1: (y + n).min(height - 1),
    }
}

/// Replace non-finite values with zero
pub(crate) fn nan_to_zero<T: Float>(v: T) -> T {
    if v.is_finite() {
        v
    } else {
        T::zero()
    }
}

/// Summed-area table over a float raster, optionally restricted to a
/// validity mask.
///
/// Alongside the value prefix sums a valid-pixel count table is kept, so
/// window means are taken over valid pixels only and an all-invalid window
/// yields 0 rather than a division by zero.
pub struct IntegralImage {
    sum: Array2<f64>,
    count: Array2<u32>,
    width: usize,
    height: usize,
}

impl IntegralImage {
    /// Build the table treating every pixel as valid.
    pub fn new(src: &SonarImage) -> Self {
        Self::with_mask(src, None)
    }

    /// Build the table; pixels with mask 0 contribute neither sum nor count.
    pub fn with_mask(src: &SonarImage, mask: Option<&SonarMask>) -> Self {
        let (height, width) = src.dim();
        let mut sum = Array2::<f64>::zeros((height + 1, width + 1));
        let mut count = Array2::<u32>::zeros((height + 1, width + 1));

        for y in 0..height {
            for x in 0..width {
                let valid = mask.map_or(true, |m| m[[y, x]] != 0);
                let v = if valid {
                    nan_to_zero(src[[y, x]]) as f64
                } else {
                    0.0
                };
                sum[[y + 1, x + 1]] = v + sum[[y, x + 1]] + sum[[y + 1, x]] - sum[[y, x]];
                count[[y + 1, x + 1]] = u32::from(valid) + count[[y, x + 1]] + count[[y + 1, x]]
                    - count[[y, x]];
            }
        }

        Self {
            sum,
            count,
            width,
            height,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Sum of valid pixel values inside the window
    pub fn window_sum(&self, r: WindowRect) -> f64 {
        self.sum[[r.y1 + 1, r.x1 + 1]] + self.sum[[r.y0, r.x0]]
            - self.sum[[r.y0, r.x1 + 1]]
            - self.sum[[r.y1 + 1, r.x0]]
    }

    /// Number of valid pixels inside the window
    pub fn window_count(&self, r: WindowRect) -> u32 {
        (i64::from(self.count[[r.y1 + 1, r.x1 + 1]]) + i64::from(self.count[[r.y0, r.x0]])
            - i64::from(self.count[[r.y0, r.x1 + 1]])
            - i64::from(self.count[[r.y1 + 1, r.x0]])) as u32
    }

    /// Mean over valid pixels inside the window, 0 when the window holds none
    pub fn window_mean(&self, r: WindowRect) -> f32 {
        let count = self.window_count(r);
        if count == 0 {
            0.0
        } else {
            (self.window_sum(r) / f64::from(count)) as f32
        }
    }
}
