//! Core sonar processing modules

pub mod filtering;
pub mod geometry;
pub mod integral;
pub mod preprocessing;

// Re-export main types
pub use filtering::BorderKernel;
pub use geometry::{InterpolationMode, Point2, RectF, SectorLimits, SonarGeometry};
pub use integral::{IntegralImage, WindowRect};
pub use preprocessing::{Preprocessed, PreprocessingConfig, SonarPreprocessing};
