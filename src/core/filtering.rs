//! Stateless spatial operators over float rasters with optional validity
//! masks.
//!
//! Every operator treats mask value 0 as "not a sonar return": such pixels
//! are excluded from local statistics and, unless noted otherwise, the
//! output there is left at 0. Degenerate windows (no valid pixel) always
//! produce 0, never NaN.

use crate::core::integral::{nan_to_zero, neighborhood_rect, IntegralImage, WindowRect};
use crate::types::{SonarColorImage, SonarError, SonarImage, SonarMask, SonarResult};
use ndarray::{arr2, Array2, Zip};
use serde::{Deserialize, Serialize};

/// Number of scales used by the multi-scale saliency operators
pub const SALIENCY_SCALE_COUNT: usize = 3;

/// Rows closest to the fan apex skipped by insonification correction
pub const INSONIFICATION_SKIP_ROWS: usize = 30;

// Matches the 0.5 gradient scale of the reference border detector.
const GRADIENT_SCALE: f32 = 0.5;

/// 3x3 gradient kernel family for the mask-aware border filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BorderKernel {
    Scharr,
    Prewitt,
    Sobel,
}

impl BorderKernel {
    /// Horizontal-gradient kernel
    pub fn kernel_x(&self) -> Array2<f32> {
        match self {
            BorderKernel::Scharr => arr2(&[[-3.0, 0.0, 3.0], [-10.0, 0.0, 10.0], [-3.0, 0.0, 3.0]]),
            BorderKernel::Prewitt => arr2(&[[-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0], [-1.0, 0.0, 1.0]]),
            BorderKernel::Sobel => arr2(&[[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]]),
        }
    }

    /// Vertical-gradient kernel (transpose of the horizontal one)
    pub fn kernel_y(&self) -> Array2<f32> {
        self.kernel_x().t().to_owned()
    }
}

fn check_mask_shape(dim: (usize, usize), mask: Option<&SonarMask>) -> SonarResult<()> {
    if let Some(m) = mask {
        if m.dim() != dim {
            return Err(SonarError::FilterInput(format!(
                "mask size {:?} does not match raster size {:?}",
                m.dim(),
                dim
            )));
        }
    }
    Ok(())
}

fn is_valid(mask: Option<&SonarMask>, y: usize, x: usize) -> bool {
    mask.map_or(true, |m| m[[y, x]] != 0)
}

/// Window half-widths for the multi-scale saliency operators:
/// `N_k = min(width, height) / 2^(k+1)`. Scales that collapse to zero on
/// small rasters are dropped.
fn saliency_scales(width: usize, height: usize) -> Vec<usize> {
    (0..SALIENCY_SCALE_COUNT)
        .map(|k| width.min(height) >> (k + 1))
        .filter(|&n| n > 0)
        .collect()
}

/// Multi-scale saliency over a single-channel raster: per pixel the squared
/// deviation from the local mean, accumulated over all scales. A perfectly
/// uniform raster scores 0 everywhere.
pub fn saliency_gray(src: &SonarImage, mask: Option<&SonarMask>) -> SonarResult<SonarImage> {
    check_mask_shape(src.dim(), mask)?;
    let (height, width) = src.dim();
    let scales = saliency_scales(width, height);
    let integral = IntegralImage::with_mask(src, mask);
    let mut sm = Array2::<f32>::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            if !is_valid(mask, y, x) {
                continue;
            }
            let val = src[[y, x]];
            let mut cv_sum = 0.0;
            for &n in &scales {
                let r = neighborhood_rect(x, y, n, width, height);
                let diff = val - integral.window_mean(r);
                cv_sum += diff * diff;
            }
            sm[[y, x]] = cv_sum;
        }
    }
    Ok(sm)
}

/// Multi-scale saliency over an RGB raster, computed per Lab channel and
/// summed. For each pixel the scale loop stops at the first scale whose
/// extreme window corners fall on masked-out pixels, so a scale never
/// contributes partially.
pub fn saliency_color(rgb: &SonarColorImage, mask: Option<&SonarMask>) -> SonarResult<SonarImage> {
    let (height, width, channels) = rgb.dim();
    if channels != 3 {
        return Err(SonarError::FilterInput(format!(
            "color saliency expects an RGB raster with 3 channels, got {}",
            channels
        )));
    }
    check_mask_shape((height, width), mask)?;

    let (l, a, b) = rgb_to_lab(rgb);
    let scales = saliency_scales(width, height);
    let l_integral = IntegralImage::with_mask(&l, mask);
    let a_integral = IntegralImage::with_mask(&a, mask);
    let b_integral = IntegralImage::with_mask(&b, mask);
    let mut sm = Array2::<f32>::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            if !is_valid(mask, y, x) {
                continue;
            }
            let mut cv_sum = 0.0;
            for &n in &scales {
                let r = neighborhood_rect(x, y, n, width, height);
                if let Some(m) = mask {
                    if m[[r.y0, r.x0]] == 0 || m[[r.y1, r.x1]] == 0 {
                        break;
                    }
                }
                let l_diff = l[[y, x]] - l_integral.window_mean(r);
                let a_diff = a[[y, x]] - a_integral.window_mean(r);
                let b_diff = b[[y, x]] - b_integral.window_mean(r);
                cv_sum += l_diff * l_diff + a_diff * a_diff + b_diff * b_diff;
            }
            sm[[y, x]] = cv_sum;
        }
    }
    Ok(sm)
}

/// Convert an sRGB raster (channels in [0, 1]) to CIELAB channels
/// (D65 white point).
pub fn rgb_to_lab(rgb: &SonarColorImage) -> (SonarImage, SonarImage, SonarImage) {
    let (height, width, _) = rgb.dim();
    let mut l = Array2::<f32>::zeros((height, width));
    let mut a = Array2::<f32>::zeros((height, width));
    let mut b = Array2::<f32>::zeros((height, width));

    fn srgb_to_linear(c: f32) -> f32 {
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    }

    fn lab_f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    for y in 0..height {
        for x in 0..width {
            let r_lin = srgb_to_linear(rgb[[y, x, 0]]);
            let g_lin = srgb_to_linear(rgb[[y, x, 1]]);
            let b_lin = srgb_to_linear(rgb[[y, x, 2]]);

            // sRGB to XYZ, normalized by the D65 white point
            let xn = (0.4124 * r_lin + 0.3576 * g_lin + 0.1805 * b_lin) / 0.95047;
            let yn = 0.2126 * r_lin + 0.7152 * g_lin + 0.0722 * b_lin;
            let zn = (0.0193 * r_lin + 0.1192 * g_lin + 0.9505 * b_lin) / 1.08883;

            let fx = lab_f(xn);
            let fy = lab_f(yn);
            let fz = lab_f(zn);

            l[[y, x]] = 116.0 * fy - 16.0;
            a[[y, x]] = 500.0 * (fx - fy);
            b[[y, x]] = 200.0 * (fy - fz);
        }
    }
    (l, a, b)
}

/// Box mean over the clipped `(2*ksize+1)²` window around each pixel.
pub fn mean_filter(
    src: &SonarImage,
    ksize: usize,
    mask: Option<&SonarMask>,
) -> SonarResult<SonarImage> {
    check_mask_shape(src.dim(), mask)?;
    let integral = IntegralImage::with_mask(src, mask);
    integral_mean_filter(&integral, ksize, mask)
}

/// [`mean_filter`] over an already computed integral image, avoiding the
/// table rebuild when several filters share one source raster.
pub fn integral_mean_filter(
    integral: &IntegralImage,
    ksize: usize,
    mask: Option<&SonarMask>,
) -> SonarResult<SonarImage> {
    let (height, width) = (integral.height(), integral.width());
    check_mask_shape((height, width), mask)?;
    let mut dst = Array2::<f32>::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            if !is_valid(mask, y, x) {
                continue;
            }
            dst[[y, x]] = integral.window_mean(neighborhood_rect(x, y, ksize, width, height));
        }
    }
    Ok(dst)
}

/// Local-contrast band pass: `mean(inner window) - mean(outer window)`.
pub fn double_mean_filter(
    src: &SonarImage,
    ksize_inner: usize,
    ksize_outer: usize,
    mask: Option<&SonarMask>,
) -> SonarResult<SonarImage> {
    check_mask_shape(src.dim(), mask)?;
    let (height, width) = src.dim();
    let integral = IntegralImage::with_mask(src, mask);
    let mut dst = Array2::<f32>::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            if !is_valid(mask, y, x) {
                continue;
            }
            let inner = integral.window_mean(neighborhood_rect(x, y, ksize_inner, width, height));
            let outer = integral.window_mean(neighborhood_rect(x, y, ksize_outer, width, height));
            dst[[y, x]] = inner - outer;
        }
    }
    Ok(dst)
}

/// Subtract the local mean of `baseline` from `detail` pixel-wise, clipped
/// to [0, 1]. Both rasters must share one shape.
pub fn mean_difference_filter(
    baseline: &SonarImage,
    detail: &SonarImage,
    ksize: usize,
    mask: Option<&SonarMask>,
) -> SonarResult<SonarImage> {
    if baseline.dim() != detail.dim() {
        return Err(SonarError::FilterInput(format!(
            "raster sizes differ: {:?} vs {:?}",
            baseline.dim(),
            detail.dim()
        )));
    }
    check_mask_shape(baseline.dim(), mask)?;

    let (height, width) = baseline.dim();
    let integral = IntegralImage::with_mask(baseline, mask);
    let mut dst = Array2::<f32>::zeros((height, width));

    for y in 0..height {
        for x in 0..width {
            if !is_valid(mask, y, x) {
                continue;
            }
            let mean = integral.window_mean(neighborhood_rect(x, y, ksize, width, height));
            dst[[y, x]] = (detail[[y, x]] - mean).clamp(0.0, 1.0);
        }
    }
    Ok(dst)
}

/// Block-pairwise saliency: the raster is tiled with `block_count` blocks
/// per side at 50% overlap; every unordered pair of blocks contributes
/// `|mean_i - mean_j|` to the later block, and the per-pixel accumulation
/// is divided by the contribution count (0 where nothing contributed).
///
/// Quadratic in the number of blocks by design; block counts stay small
/// relative to pixel counts.
pub fn block_saliency(
    src: &SonarImage,
    block_count: usize,
    mask: Option<&SonarMask>,
) -> SonarResult<SonarImage> {
    check_mask_shape(src.dim(), mask)?;
    let (height, width) = src.dim();
    if block_count == 0 {
        return Err(SonarError::FilterInput(
            "block count must be positive".to_string(),
        ));
    }
    let block_width = width / block_count;
    let block_height = height / block_count;
    if block_width == 0 || block_height == 0 {
        return Err(SonarError::FilterInput(format!(
            "raster {}x{} is too small for {} blocks per side",
            width, height, block_count
        )));
    }

    let integral = IntegralImage::with_mask(src, mask);
    let stride_y = (block_height / 2).max(1);
    let stride_x = (block_width / 2).max(1);

    let mut rects = Vec::new();
    let mut means = Vec::new();
    let mut y = 0;
    while y + block_height < height {
        let mut x = 0;
        while x + block_width < width {
            let r = WindowRect {
                x0: x,
                y0: y,
                x1: x + block_width - 1,
                y1: y + block_height - 1,
            };
            means.push(integral.window_mean(r));
            rects.push(r);
            x += stride_x;
        }
        y += stride_y;
    }

    let mut res = Array2::<f32>::zeros((height, width));
    let mut cnt = Array2::<f32>::zeros((height, width));

    for l in 1..rects.len() {
        let mut acc = 0.0;
        for k in 0..l {
            acc += (means[l] - means[k]).abs();
        }
        let r = rects[l];
        for yy in r.y0..=r.y1 {
            for xx in r.x0..=r.x1 {
                res[[yy, xx]] += acc;
                cnt[[yy, xx]] += l as f32;
            }
        }
    }

    let mut dst = Array2::<f32>::zeros((height, width));
    for yy in 0..height {
        for xx in 0..width {
            if cnt[[yy, xx]] > 0.0 && is_valid(mask, yy, xx) {
                dst[[yy, xx]] = res[[yy, xx]] / cnt[[yy, xx]];
            }
        }
    }
    Ok(dst)
}

fn convolve3x3_replicate(src: &SonarImage, kernel: &Array2<f32>) -> SonarImage {
    let (height, width) = src.dim();
    let mut dst = Array2::<f32>::zeros((height, width));
    for y in 0..height {
        for x in 0..width {
            let mut sum = 0.0;
            for ky in 0..3 {
                for kx in 0..3 {
                    let yy = (y + ky).saturating_sub(1).min(height - 1);
                    let xx = (x + kx).saturating_sub(1).min(width - 1);
                    sum += src[[yy, xx]] * kernel[[ky, kx]];
                }
            }
            dst[[y, x]] = sum;
        }
    }
    dst
}

/// Scharr gradient magnitude, combined as `0.5*|Gx| + 0.5*|Gy|` with
/// replicated borders.
pub fn border_filter(src: &SonarImage) -> SonarImage {
    let kernel_x = BorderKernel::Scharr.kernel_x();
    let kernel_y = BorderKernel::Scharr.kernel_y();
    let gx = convolve3x3_replicate(src, &kernel_x);
    let gy = convolve3x3_replicate(src, &kernel_y);

    let mut dst = Array2::<f32>::zeros(src.dim());
    Zip::from(&mut dst).and(&gx).and(&gy).for_each(|d, &x, &y| {
        *d = 0.5 * (x * GRADIENT_SCALE).abs() + 0.5 * (y * GRADIENT_SCALE).abs();
    });
    dst
}

/// Mask-aware gradient magnitude using a selectable kernel family; combined
/// as `0.5*|Gx| + 0.5*|Gy|` where both convolutions had full coverage.
pub fn border_filter_masked(
    src: &SonarImage,
    mask: &SonarMask,
    kind: BorderKernel,
) -> SonarResult<SonarImage> {
    let gx = filter2d_masked(src, &kind.kernel_x(), mask)?;
    let gy = filter2d_masked(src, &kind.kernel_y(), mask)?;

    let mut dst = Array2::<f32>::zeros(src.dim());
    Zip::from(&mut dst).and(&gx).and(&gy).for_each(|d, &x, &y| {
        *d = 0.5 * x.abs() + 0.5 * y.abs();
    });
    Ok(dst)
}

/// Convolution with an all-or-nothing coverage policy: a pixel is written
/// only when every input pixel under the kernel is mask-valid, otherwise it
/// stays 0. Border pixels the kernel cannot fully cover also stay 0.
pub fn filter2d_masked(
    src: &SonarImage,
    kernel: &Array2<f32>,
    mask: &SonarMask,
) -> SonarResult<SonarImage> {
    let (kernel_height, kernel_width) = kernel.dim();
    if kernel_height == 0 || kernel_width == 0 {
        return Err(SonarError::FilterInput("kernel must not be empty".to_string()));
    }
    if kernel_height != kernel_width {
        return Err(SonarError::FilterInput(format!(
            "kernel must be square, got {}x{}",
            kernel_height, kernel_width
        )));
    }
    if kernel_height % 2 == 0 {
        return Err(SonarError::FilterInput(format!(
            "kernel side must be odd, got {}",
            kernel_height
        )));
    }
    if mask.dim() != src.dim() {
        return Err(SonarError::FilterInput(format!(
            "mask size {:?} does not match raster size {:?}",
            mask.dim(),
            src.dim()
        )));
    }

    let (height, width) = src.dim();
    let d = kernel_height / 2;
    let mut dst = Array2::<f32>::zeros((height, width));

    for y in d..height.saturating_sub(d) {
        'pixel: for x in d..width.saturating_sub(d) {
            let mut sum = 0.0;
            for ky in 0..kernel_height {
                for kx in 0..kernel_width {
                    let yy = y + ky - d;
                    let xx = x + kx - d;
                    if mask[[yy, xx]] == 0 {
                        continue 'pixel;
                    }
                    sum += src[[yy, xx]] * kernel[[ky, kx]];
                }
            }
            dst[[y, x]] = sum;
        }
    }
    Ok(dst)
}

/// Per-row gain normalization. The first `skip_rows` rows (the fan apex
/// blind zone) are left untouched; every other row with a non-zero
/// valid-pixel mean is rescaled by `max_row_mean / row_mean` and the result
/// is clamped to at most 1. Rows without valid pixels stay unchanged.
pub fn insonification_correction(
    src: &SonarImage,
    mask: &SonarMask,
    skip_rows: usize,
) -> SonarResult<SonarImage> {
    if mask.dim() != src.dim() {
        return Err(SonarError::FilterInput(format!(
            "mask size {:?} does not match raster size {:?}",
            mask.dim(),
            src.dim()
        )));
    }

    let (rows, cols) = src.dim();
    let mut dst = src.clone();

    let mut row_mean = vec![0.0f64; rows];
    for i in skip_rows..rows {
        let mut sum = 0.0f64;
        let mut count = 0u32;
        for x in 0..cols {
            if mask[[i, x]] != 0 {
                sum += f64::from(nan_to_zero(src[[i, x]]));
                count += 1;
            }
        }
        if count > 0 {
            row_mean[i] = nan_to_zero(sum / f64::from(count));
        }
    }

    let max_mean = row_mean.iter().cloned().fold(0.0f64, f64::max);
    for i in skip_rows..rows {
        if row_mean[i] > 0.0 {
            let factor = (max_mean / row_mean[i]) as f32;
            for x in 0..cols {
                dst[[i, x]] *= factor;
            }
        }
    }
    dst.mapv_inplace(|v| nan_to_zero(v).min(1.0));
    Ok(dst)
}

/// Median over the clipped `(2*ksize+1)²` window around each pixel.
pub fn median_blur(src: &SonarImage, ksize: usize) -> SonarImage {
    let (height, width) = src.dim();
    let mut dst = Array2::<f32>::zeros((height, width));
    let mut window = Vec::with_capacity((2 * ksize + 1) * (2 * ksize + 1));

    for y in 0..height {
        for x in 0..width {
            window.clear();
            let r = neighborhood_rect(x, y, ksize, width, height);
            for yy in r.y0..=r.y1 {
                for xx in r.x0..=r.x1 {
                    window.push(src[[yy, xx]]);
                }
            }
            window.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            dst[[y, x]] = window[window.len() / 2];
        }
    }
    dst
}

/// Morphological erosion of a mask: each pixel becomes the minimum over the
/// clipped `(2*ksize+1)²` window, repeated `iterations` times.
pub fn erode(mask: &SonarMask, ksize: usize, iterations: usize) -> SonarMask {
    let (height, width) = mask.dim();
    let mut current = mask.clone();

    for _ in 0..iterations {
        let mut next = current.clone();
        for y in 0..height {
            for x in 0..width {
                let r = neighborhood_rect(x, y, ksize, width, height);
                let mut min = u8::MAX;
                for yy in r.y0..=r.y1 {
                    for xx in r.x0..=r.x1 {
                        min = min.min(current[[yy, xx]]);
                    }
                }
                next[[y, x]] = min;
            }
        }
        current = next;
    }
    current
}

/// Zero every pixel the mask marks invalid.
pub fn apply_mask(src: &SonarImage, mask: &SonarMask) -> SonarResult<SonarImage> {
    if mask.dim() != src.dim() {
        return Err(SonarError::FilterInput(format!(
            "mask size {:?} does not match raster size {:?}",
            mask.dim(),
            src.dim()
        )));
    }
    let mut dst = src.clone();
    Zip::from(&mut dst).and(mask).for_each(|d, &m| {
        if m == 0 {
            *d = 0.0;
        }
    });
    Ok(dst)
}

/// Min-max normalize to [0, 1] over mask-valid pixels; masked-out pixels
/// and constant inputs map to 0.
pub fn normalize_minmax(src: &SonarImage, mask: &SonarMask) -> SonarResult<SonarImage> {
    if mask.dim() != src.dim() {
        return Err(SonarError::FilterInput(format!(
            "mask size {:?} does not match raster size {:?}",
            mask.dim(),
            src.dim()
        )));
    }

    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    for ((y, x), &m) in mask.indexed_iter() {
        if m != 0 {
            let v = nan_to_zero(src[[y, x]]);
            min = min.min(v);
            max = max.max(v);
        }
    }

    let (height, width) = src.dim();
    let mut dst = Array2::<f32>::zeros((height, width));
    let range = max - min;
    if !range.is_finite() || range <= 0.0 {
        return Ok(dst);
    }
    for ((y, x), &m) in mask.indexed_iter() {
        if m != 0 {
            dst[[y, x]] = (nan_to_zero(src[[y, x]]) - min) / range;
        }
    }
    Ok(dst)
}

/// Quantize a unit-range raster to 8 bits.
pub fn to_u8_image(src: &SonarImage) -> Array2<u8> {
    src.mapv(|v| (nan_to_zero(v) * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// Expand an 8-bit raster back to unit-range floats.
pub fn from_u8_image(src: &Array2<u8>) -> SonarImage {
    src.mapv(|v| f32::from(v) / 255.0)
}

/// Bilinear resample to a new size.
pub fn resize_bilinear(src: &SonarImage, new_height: usize, new_width: usize) -> SonarImage {
    let (height, width) = src.dim();
    if (height, width) == (new_height, new_width) {
        return src.clone();
    }
    let scale_y = height as f32 / new_height as f32;
    let scale_x = width as f32 / new_width as f32;
    let mut dst = Array2::<f32>::zeros((new_height, new_width));

    for y in 0..new_height {
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).max(0.0);
        let y0 = (sy as usize).min(height - 1);
        let y1 = (y0 + 1).min(height - 1);
        let fy = sy - y0 as f32;
        for x in 0..new_width {
            let sx = ((x as f32 + 0.5) * scale_x - 0.5).max(0.0);
            let x0 = (sx as usize).min(width - 1);
            let x1 = (x0 + 1).min(width - 1);
            let fx = sx - x0 as f32;

            let top = src[[y0, x0]] * (1.0 - fx) + src[[y0, x1]] * fx;
            let bottom = src[[y1, x0]] * (1.0 - fx) + src[[y1, x1]] * fx;
            dst[[y, x]] = top * (1.0 - fy) + bottom * fy;
        }
    }
    dst
}

/// Nearest-neighbor resample of a binary mask.
pub fn resize_mask_nearest(mask: &SonarMask, new_height: usize, new_width: usize) -> SonarMask {
    let (height, width) = mask.dim();
    if (height, width) == (new_height, new_width) {
        return mask.clone();
    }
    let scale_y = height as f32 / new_height as f32;
    let scale_x = width as f32 / new_width as f32;
    let mut dst = Array2::<u8>::zeros((new_height, new_width));

    for y in 0..new_height {
        let sy = (((y as f32 + 0.5) * scale_y) as usize).min(height - 1);
        for x in 0..new_width {
            let sx = (((x as f32 + 0.5) * scale_x) as usize).min(width - 1);
            dst[[y, x]] = mask[[sy, sx]];
        }
    }
    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MASK_VALID;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array2, Array3};

    fn full_mask(height: usize, width: usize) -> SonarMask {
        Array2::from_elem((height, width), MASK_VALID)
    }

    #[test]
    fn test_mean_filter_constant_input_invariance() {
        let src = Array2::from_elem((20, 30), 0.37f32);
        let mask = full_mask(20, 30);
        let filtered = mean_filter(&src, 4, Some(&mask)).unwrap();
        for &v in filtered.iter() {
            assert_abs_diff_eq!(v, 0.37, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_mean_filter_masked_output_is_zero() {
        let src = Array2::from_elem((10, 10), 1.0f32);
        let mut mask = full_mask(10, 10);
        mask[[5, 5]] = 0;
        let filtered = mean_filter(&src, 2, Some(&mask)).unwrap();
        assert_eq!(filtered[[5, 5]], 0.0);
        assert!(filtered[[0, 0]] > 0.0);
    }

    #[test]
    fn test_mean_filter_rejects_mismatched_mask() {
        let src = Array2::zeros((10, 10));
        let mask = full_mask(9, 10);
        assert!(mean_filter(&src, 2, Some(&mask)).is_err());
    }

    #[test]
    fn test_integral_mean_filter_matches_mean_filter() {
        let src = Array2::from_shape_fn((12, 9), |(y, x)| ((y * 9 + x) % 7) as f32 / 7.0);
        let via_src = mean_filter(&src, 3, None).unwrap();
        let integral = IntegralImage::new(&src);
        let via_integral = integral_mean_filter(&integral, 3, None).unwrap();
        for (a, b) in via_src.iter().zip(via_integral.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_double_mean_filter_uniform_is_zero() {
        let src = Array2::from_elem((16, 16), 0.8f32);
        let out = double_mean_filter(&src, 1, 4, None).unwrap();
        for &v in out.iter() {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_mean_difference_filter_is_clamped() {
        let baseline = Array2::from_shape_fn((15, 15), |(y, _)| y as f32 / 3.0);
        let detail = Array2::from_shape_fn((15, 15), |(y, x)| (x as f32 - y as f32) * 2.0);
        let out = mean_difference_filter(&baseline, &detail, 3, None).unwrap();
        for &v in out.iter() {
            assert!((0.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_mean_difference_filter_rejects_mismatched_shapes() {
        let a = Array2::zeros((5, 5));
        let b = Array2::zeros((5, 6));
        assert!(mean_difference_filter(&a, &b, 3, None).is_err());
    }

    #[test]
    fn test_saliency_gray_uniform_is_zero() {
        let src = Array2::from_elem((32, 32), 0.42f32);
        let out = saliency_gray(&src, None).unwrap();
        for &v in out.iter() {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_saliency_gray_peaks_on_bright_spot() {
        let mut src = Array2::from_elem((32, 32), 0.1f32);
        src[[16, 16]] = 1.0;
        let out = saliency_gray(&src, None).unwrap();
        assert!(out[[16, 16]] > out[[2, 2]]);
    }

    #[test]
    fn test_saliency_color_uniform_is_zero() {
        let rgb = Array3::from_elem((16, 16, 3), 0.5f32);
        let out = saliency_color(&rgb, None).unwrap();
        for &v in out.iter() {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_saliency_color_scale_loop_stops_at_masked_corner() {
        // 16x16 gives window half-widths 8, 4, 2; for the pixel at (8, 8)
        // the corresponding window corners are (0,0)/(15,15), (4,4)/(12,12)
        // and (6,6)/(10,10)
        let mut rgb = Array3::from_elem((16, 16, 3), 0.2f32);
        for c in 0..3 {
            rgb[[8, 8, c]] = 0.9;
            rgb[[4, 4, c]] = 0.9;
        }

        let baseline = saliency_color(&rgb, Some(&full_mask(16, 16))).unwrap();
        assert!(baseline[[8, 8]] > 0.0);
        assert!(baseline[[4, 4]] > 0.0);

        // corner of the largest scale masked: no scale may contribute
        let mut mask = full_mask(16, 16);
        mask[[15, 15]] = 0;
        let out = saliency_color(&rgb, Some(&mask)).unwrap();
        assert_eq!(out[[8, 8]], 0.0);
        // (4, 4) spans (0,0)..(12,12) at the largest scale and is unaffected
        assert!(out[[4, 4]] > 0.0);

        // corner of the smallest scale masked: the larger scales still count
        let mut mask = full_mask(16, 16);
        mask[[10, 10]] = 0;
        let out = saliency_color(&rgb, Some(&mask)).unwrap();
        assert!(out[[8, 8]] > 0.0);
    }

    #[test]
    fn test_saliency_color_rejects_wrong_channel_count() {
        let rgb = Array3::from_elem((8, 8, 2), 0.5f32);
        assert!(saliency_color(&rgb, None).is_err());
    }

    #[test]
    fn test_block_saliency_uniform_is_zero() {
        let src = Array2::from_elem((32, 32), 0.6f32);
        let out = block_saliency(&src, 4, None).unwrap();
        for &v in out.iter() {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_block_saliency_rejects_degenerate_blocks() {
        let src = Array2::from_elem((4, 4), 0.5f32);
        assert!(block_saliency(&src, 0, None).is_err());
        assert!(block_saliency(&src, 8, None).is_err());
    }

    #[test]
    fn test_border_filter_flat_interior_is_zero() {
        let src = Array2::from_elem((10, 10), 0.5f32);
        let out = border_filter(&src);
        for &v in out.iter() {
            assert_abs_diff_eq!(v, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_border_filter_responds_to_vertical_edge() {
        let src = Array2::from_shape_fn((10, 10), |(_, x)| if x < 5 { 0.0 } else { 1.0 });
        let out = border_filter(&src);
        assert!(out[[5, 5]] > 0.0);
        assert_abs_diff_eq!(out[[5, 1]], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_filter2d_masked_all_or_nothing() {
        let src = Array2::from_elem((8, 8), 1.0f32);
        let mut mask = full_mask(8, 8);
        mask[[4, 4]] = 0;
        let kernel = arr2(&[[1.0f32; 3]; 3]);

        let out = filter2d_masked(&src, &kernel, &mask).unwrap();
        // every output within reach of the hole stays 0
        for y in 3..=5 {
            for x in 3..=5 {
                assert_eq!(out[[y, x]], 0.0);
            }
        }
        // fully covered pixels see the whole kernel
        assert_abs_diff_eq!(out[[1, 1]], 9.0, epsilon = 1e-6);
        // border pixels are never written
        assert_eq!(out[[0, 3]], 0.0);
    }

    #[test]
    fn test_filter2d_masked_rejects_bad_kernels() {
        let src = Array2::zeros((8, 8));
        let mask = full_mask(8, 8);
        assert!(filter2d_masked(&src, &Array2::zeros((0, 0)), &mask).is_err());
        assert!(filter2d_masked(&src, &Array2::zeros((3, 2)), &mask).is_err());
        assert!(filter2d_masked(&src, &Array2::zeros((2, 2)), &mask).is_err());
    }

    #[test]
    fn test_insonification_correction_clamps_to_one() {
        let mut src = Array2::from_elem((40, 12), 0.2f32);
        for x in 0..12 {
            src[[35, x]] = 0.9;
        }
        let mask = full_mask(40, 12);
        let out = insonification_correction(&src, &mask, INSONIFICATION_SKIP_ROWS).unwrap();
        for &v in out.iter() {
            assert!(v <= 1.0);
        }
        // the dim rows are lifted toward the brightest row's mean
        assert!(out[[32, 3]] > src[[32, 3]]);
    }

    #[test]
    fn test_insonification_correction_zeroes_nan_samples() {
        let mut src = Array2::from_elem((40, 12), 0.2f32);
        src[[35, 3]] = f32::NAN;
        src[[5, 7]] = f32::NAN;
        let mask = full_mask(40, 12);
        let out = insonification_correction(&src, &mask, INSONIFICATION_SKIP_ROWS).unwrap();
        assert_eq!(out[[35, 3]], 0.0);
        assert_eq!(out[[5, 7]], 0.0);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_insonification_correction_leaves_masked_rows_unchanged() {
        let src = Array2::from_elem((40, 12), 0.3f32);
        let mut mask = full_mask(40, 12);
        for x in 0..12 {
            mask[[33, x]] = 0;
        }
        let out = insonification_correction(&src, &mask, INSONIFICATION_SKIP_ROWS).unwrap();
        for x in 0..12 {
            assert_abs_diff_eq!(out[[33, x]], src[[33, x]], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_insonification_correction_skips_leading_rows() {
        let mut src = Array2::from_elem((40, 12), 0.1f32);
        for x in 0..12 {
            src[[35, x]] = 0.8;
        }
        let mask = full_mask(40, 12);
        let out = insonification_correction(&src, &mask, INSONIFICATION_SKIP_ROWS).unwrap();
        for x in 0..12 {
            assert_abs_diff_eq!(out[[10, x]], src[[10, x]], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_median_blur_suppresses_impulse() {
        let mut src = Array2::from_elem((11, 11), 0.2f32);
        src[[5, 5]] = 1.0;
        let out = median_blur(&src, 2);
        assert_abs_diff_eq!(out[[5, 5]], 0.2, epsilon = 1e-6);
    }

    #[test]
    fn test_erode_shrinks_valid_region() {
        let mut mask = Array2::<u8>::zeros((15, 15));
        for y in 3..12 {
            for x in 3..12 {
                mask[[y, x]] = MASK_VALID;
            }
        }
        let eroded = erode(&mask, 1, 1);
        assert_eq!(eroded[[3, 3]], 0);
        assert_eq!(eroded[[7, 7]], MASK_VALID);

        let twice = erode(&mask, 1, 2);
        assert_eq!(twice[[5, 5]], 0);
        assert_eq!(twice[[7, 7]], MASK_VALID);
    }

    #[test]
    fn test_normalize_minmax_within_mask() {
        let mut src = Array2::<f32>::zeros((6, 6));
        src[[2, 2]] = 0.5;
        src[[3, 3]] = 1.5;
        // an out-of-mask extreme must not influence the range
        src[[0, 0]] = 100.0;
        let mut mask = full_mask(6, 6);
        mask[[0, 0]] = 0;

        let out = normalize_minmax(&src, &mask).unwrap();
        assert_eq!(out[[0, 0]], 0.0);
        assert_abs_diff_eq!(out[[3, 3]], 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out[[2, 2]], 0.5 / 1.5, epsilon = 1e-6);
    }

    #[test]
    fn test_normalize_minmax_constant_input_is_zero() {
        let src = Array2::from_elem((5, 5), 0.7f32);
        let mask = full_mask(5, 5);
        let out = normalize_minmax(&src, &mask).unwrap();
        for &v in out.iter() {
            assert_eq!(v, 0.0);
        }
    }

    #[test]
    fn test_u8_round_trip() {
        let src = Array2::from_shape_fn((4, 4), |(y, x)| (y * 4 + x) as f32 / 15.0);
        let round = from_u8_image(&to_u8_image(&src));
        for (a, b) in src.iter().zip(round.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1.0 / 255.0);
        }
    }

    #[test]
    fn test_resize_round_trip_dimensions() {
        let src = Array2::from_shape_fn((20, 30), |(y, x)| (y + x) as f32 / 50.0);
        let down = resize_bilinear(&src, 10, 15);
        assert_eq!(down.dim(), (10, 15));
        let up = resize_bilinear(&down, 20, 30);
        assert_eq!(up.dim(), (20, 30));

        let mask = Array2::from_elem((20, 30), MASK_VALID);
        let small = resize_mask_nearest(&mask, 10, 15);
        assert!(small.iter().all(|&m| m == MASK_VALID));
    }

    #[test]
    fn test_rgb_to_lab_white_point() {
        let rgb = Array3::from_elem((1, 1, 3), 1.0f32);
        let (l, a, b) = rgb_to_lab(&rgb);
        assert_abs_diff_eq!(l[[0, 0]], 100.0, epsilon = 0.5);
        assert_abs_diff_eq!(a[[0, 0]], 0.0, epsilon = 0.5);
        assert_abs_diff_eq!(b[[0, 0]], 0.0, epsilon = 0.5);
    }
}
