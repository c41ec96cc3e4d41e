//! fanbeam: polar-to-cartesian reconstruction and preprocessing for imaging sonar
//!
//! This library turns raw polar sonar returns (bin intensities organized by
//! beam angle) into rectified cartesian rasters and runs them through a
//! fixed chain of spatial filters, producing a normalized image and validity
//! mask suitable for downstream target detection.

pub mod core;
pub mod types;

// Re-export main types and functions for easier access
pub use crate::core::filtering::BorderKernel;
pub use crate::core::geometry::{InterpolationMode, Point2, RectF, SectorLimits, SonarGeometry};
pub use crate::core::integral::{IntegralImage, WindowRect};
pub use crate::core::preprocessing::{Preprocessed, PreprocessingConfig, SonarPreprocessing};
pub use crate::types::{
    PolarFrame, SonarError, SonarImage, SonarMask, SonarResult, MASK_VALID,
};
