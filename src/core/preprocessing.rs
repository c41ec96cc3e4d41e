//! Preprocessing pipeline: ROI trimming plus the fixed filter chain that
//! turns a reconstructed cartesian raster into a normalized image and mask
//! ready for target detection.

use crate::core::filtering;
use crate::core::geometry::SonarGeometry;
use crate::types::{SonarError, SonarImage, SonarMask, SonarResult, MASK_VALID};
use serde::{Deserialize, Serialize};

// Mask erosion applied before the border map is combined back in.
const MASK_ERODE_KSIZE: usize = 7;
const MASK_ERODE_ITERATIONS: usize = 2;
const MASK_BINARY_THRESHOLD: u8 = 128;

/// Pipeline parameters. The kernel sizes are window radii.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// Box-mean denoise radius
    pub mean_filter_ksize: usize,
    /// Baseline window radius of the mean-difference filter
    pub mean_difference_filter_ksize: usize,
    /// Median blur radius
    pub median_blur_ksize: usize,
    /// Fraction of the cumulative row-brightness range that marks usable
    /// signal during ROI extraction
    pub roi_alpha: f32,
    /// First row (counted from the far edge) considered by the ROI scan
    pub roi_start_row: usize,
    /// Uniform rescale applied before filtering and undone afterwards
    pub scale_factor: f32,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            mean_filter_ksize: 7,
            mean_difference_filter_ksize: 25,
            median_blur_ksize: 5,
            roi_alpha: 0.005,
            roi_start_row: 30,
            scale_factor: 1.0,
        }
    }
}

/// One preprocessed frame
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Normalized intensity raster in [0, 1]
    pub image: SonarImage,
    /// Validity mask after ROI trimming and erosion
    pub mask: SonarMask,
    /// First raster row of the trimmed far-field region; equals the row
    /// count when nothing was trimmed
    pub roi_row: usize,
}

/// Preprocessing pipeline over reconstructed cartesian rasters
pub struct SonarPreprocessing {
    config: PreprocessingConfig,
}

impl SonarPreprocessing {
    pub fn new() -> Self {
        Self {
            config: PreprocessingConfig::default(),
        }
    }

    pub fn with_config(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Run the full chain on a geometry engine's reconstructed raster.
    pub fn apply(&self, geometry: &SonarGeometry) -> SonarResult<Preprocessed> {
        self.apply_to(geometry.cart_image(), geometry.cart_image_mask())
    }

    /// Run the full chain on an explicit raster/mask pair.
    pub fn apply_to(&self, image: &SonarImage, mask: &SonarMask) -> SonarResult<Preprocessed> {
        if image.dim() != mask.dim() {
            return Err(SonarError::FilterInput(format!(
                "mask size {:?} does not match raster size {:?}",
                mask.dim(),
                image.dim()
            )));
        }
        let (roi_mask, roi_row) = self.extract_roi(image, mask)?;
        let (image, mask) = self.preprocess(image, &roi_mask)?;
        Ok(Preprocessed {
            image,
            mask,
            roi_row,
        })
    }

    /// Trim rows whose sonar return falls below usable signal.
    ///
    /// Rows are scanned from the far edge (last row) toward the near edge;
    /// the cumulative sum of per-row valid-pixel means is thresholded at
    /// `roi_alpha * (max - min) + min`, and everything beyond the first
    /// crossing is zeroed in the returned mask. The returned row index is
    /// the first trimmed row, or the row count when nothing crossed.
    pub fn extract_roi(
        &self,
        image: &SonarImage,
        mask: &SonarMask,
    ) -> SonarResult<(SonarMask, usize)> {
        if image.dim() != mask.dim() {
            return Err(SonarError::FilterInput(format!(
                "mask size {:?} does not match raster size {:?}",
                mask.dim(),
                image.dim()
            )));
        }
        let (rows, cols) = image.dim();
        if rows == 0 || cols == 0 {
            return Err(SonarError::Processing(
                "cannot extract roi from an empty raster".to_string(),
            ));
        }

        let start_row = self.config.roi_start_row;
        let end_row = rows - 1;
        let mut trimmed = mask.clone();
        if start_row > end_row {
            log::debug!("raster too short for roi scan, keeping full mask");
            return Ok((trimmed, rows));
        }

        // per-row mean over valid pixels, indexed by distance from the far edge
        let mut row_mean = vec![0.0f32; end_row + 1];
        for (i, mean) in row_mean.iter_mut().enumerate().take(end_row + 1).skip(start_row) {
            let r = rows - 1 - i;
            let mut sum = 0.0f64;
            let mut count = 0u32;
            for x in 0..cols {
                if mask[[r, x]] != 0 {
                    sum += f64::from(image[[r, x]]);
                    count += 1;
                }
            }
            if count > 0 {
                let value = (sum / f64::from(count)) as f32;
                *mean = if value.is_finite() { value } else { 0.0 };
            }
        }

        let mut accum = vec![0.0f32; row_mean.len()];
        let mut running = 0.0f32;
        for (a, &m) in accum.iter_mut().zip(&row_mean) {
            running += m;
            *a = running;
        }

        let min = accum.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = accum.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let thresh = self.config.roi_alpha * (max - min) + min;

        match accum.iter().position(|&v| v > thresh) {
            Some(pos) => {
                let new_y = pos + 1;
                let roi_row = rows - new_y;
                for y in roi_row..rows {
                    for x in 0..cols {
                        trimmed[[y, x]] = 0;
                    }
                }
                log::debug!("roi boundary at row {} ({} far rows trimmed)", roi_row, new_y);
                Ok((trimmed, roi_row))
            }
            None => {
                log::debug!("no row crossed the roi threshold, keeping full mask");
                Ok((trimmed, rows))
            }
        }
    }

    fn preprocess(
        &self,
        source_image: &SonarImage,
        source_mask: &SonarMask,
    ) -> SonarResult<(SonarImage, SonarMask)> {
        let (source_height, source_width) = source_image.dim();
        let scale = self.config.scale_factor;

        let (cart_image, cart_mask) = if scale != 1.0 {
            let height = ((source_height as f32 * scale).round() as usize).max(1);
            let width = ((source_width as f32 * scale).round() as usize).max(1);
            log::debug!("rescaling raster to {}x{} before filtering", width, height);
            (
                filtering::resize_bilinear(source_image, height, width),
                filtering::resize_mask_nearest(source_mask, height, width),
            )
        } else {
            (source_image.clone(), source_mask.clone())
        };

        let enhanced = filtering::insonification_correction(
            &cart_image,
            &cart_mask,
            filtering::INSONIFICATION_SKIP_ROWS,
        )?;

        let denoised =
            filtering::mean_filter(&enhanced, self.config.mean_filter_ksize, Some(&cart_mask))?;

        // gradient map over the 8-bit quantized copy of the denoised raster
        let denoised_q = filtering::from_u8_image(&filtering::to_u8_image(&denoised));
        let border = filtering::border_filter(&denoised_q);

        // shrink the valid region to suppress fan-edge artifacts
        let cart_mask = binarize(filtering::erode(
            &cart_mask,
            MASK_ERODE_KSIZE,
            MASK_ERODE_ITERATIONS,
        ));

        let border = filtering::apply_mask(&border, &cart_mask)?;
        let border = filtering::normalize_minmax(&border, &cart_mask)?;

        let mean_diff = filtering::mean_difference_filter(
            &enhanced,
            &border,
            self.config.mean_difference_filter_ksize,
            Some(&cart_mask),
        )?;

        let mean_diff_q = filtering::from_u8_image(&filtering::to_u8_image(&mean_diff));
        let blurred = filtering::median_blur(&mean_diff_q, self.config.median_blur_ksize);

        let mut preprocessed = filtering::normalize_minmax(&blurred, &cart_mask)?;
        let mut result_mask = cart_mask;

        if scale != 1.0 {
            preprocessed = filtering::resize_bilinear(&preprocessed, source_height, source_width);
            result_mask =
                filtering::resize_mask_nearest(&result_mask, source_height, source_width);
        }

        log::debug!("preprocessing chain completed");
        Ok((preprocessed, result_mask))
    }
}

impl Default for SonarPreprocessing {
    fn default() -> Self {
        Self::new()
    }
}

fn binarize(mask: SonarMask) -> SonarMask {
    mask.mapv(|v| if v >= MASK_BINARY_THRESHOLD { MASK_VALID } else { 0 })
}
